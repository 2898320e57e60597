use std::sync::Arc;

use api::{
    Config, build,
    telemetry::{get_subscriber, init_subscriber},
};
use engine::persistence::NullSink;
use engine::time::TimeSource;

/// Environment variables can be set directly or loaded from a .env file in the project root.
///
/// - IP_ADDRESS: Server bind address (127.0.0.1 for local, 0.0.0.0 for public)
/// - PORT: Server port
/// - ALLOWED_ORIGINS: CORS origins ("*" for any origin in development, or comma-separated list for production)
/// - SESSION_MASTER_KEY: base64-encoded 64-byte session signing key (optional)
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info".into());
    init_subscriber(subscriber);

    let mut config = Config::from_env();

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new(jiff::Timestamp::now());

    // No durable store is wired up yet; bids and snapshots are persisted
    // nowhere until a real PersistenceSink is built.
    let persistence = Arc::new(NullSink);

    let server = build(&mut config, time_source, persistence).await?;
    server.await
}
