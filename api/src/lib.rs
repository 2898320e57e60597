pub mod routes;
pub mod telemetry;

use std::net::TcpListener;
use std::sync::Arc;

use actix_cors::Cors;
use actix_identity::IdentityMiddleware;
use actix_session::{SessionMiddleware, config::BrowserSession, storage::CookieSessionStore};
use actix_web::cookie::{Key, time::Duration};
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use engine::Engine;
use engine::persistence::PersistenceSink;
use engine::time::TimeSource;
use secrecy::{ExposeSecret, SecretBox};

/// Build the server, but not await it.
///
/// Returns the port that the server has bound to by modifying the config.
pub async fn build(
    config: &mut Config,
    time_source: TimeSource,
    persistence: Arc<dyn PersistenceSink>,
) -> std::io::Result<Server> {
    let secret_key = match &config.session_master_key {
        Some(master_key) => {
            use base64::{Engine as _, engine::general_purpose::STANDARD};
            let decoded = STANDARD
                .decode(master_key.expose_secret())
                .expect("SESSION_MASTER_KEY must be valid base64");
            if decoded.len() != 64 {
                panic!(
                    "SESSION_MASTER_KEY must decode to exactly 64 bytes, got {} bytes",
                    decoded.len()
                );
            }
            Key::from(&decoded[..])
        }
        None => {
            tracing::warn!(
                "No SESSION_MASTER_KEY provided; using temporary key. \
                Sessions will not persist across restarts or between multiple instances. \
                Generate a key with: openssl rand -base64 64 | tr -d '\\n'"
            );
            Key::generate()
        }
    };

    let engine = web::Data::new(Engine::new(persistence, time_source));
    let allowed_origins = config.allowed_origins.clone();

    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        let cors = if allowed_origins.contains(&"*".to_string()) {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        } else {
            let mut cors = Cors::default()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials();
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(cors)
            .wrap(SecurityHeadersMiddleware)
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_name("auctionhouse".into())
                    .session_lifecycle(BrowserSession::default().state_ttl(Duration::days(30)))
                    .build(),
            )
            .service(routes::api_services())
            .app_data(engine.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Configuration loaded from environment variables at startup.
pub struct Config {
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin (development only)
    pub allowed_origins: Vec<String>,
    /// Optional master key for session cookies (base64-encoded 64-byte key)
    pub session_master_key: Option<SecretBox<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        use std::env::var;

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            ip: var("IP_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var("PORT").unwrap_or_else(|_| "8000".to_string()).parse().unwrap(),
            allowed_origins,
            session_master_key: var("SESSION_MASTER_KEY")
                .ok()
                .map(|k| SecretBox::new(Box::new(k))),
        }
    }
}

/// Middleware to add security headers to API responses
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{CACHE_CONTROL, EXPIRES, HeaderValue, PRAGMA},
};
use std::{
    future::{Ready, ready},
    pin::Pin,
    rc::Rc,
};

type LocalBoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T>>>;

pub struct SecurityHeadersMiddleware;

impl<S, B> Transform<S, ServiceRequest> for SecurityHeadersMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecurityHeadersMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddlewareService { service: Rc::new(service) }))
    }
}

pub struct SecurityHeadersMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let is_api_endpoint =
                req.path().starts_with("/api") && req.path() != "/api/health_check";

            let res = service.call(req).await?;

            if is_api_endpoint {
                let (req, mut res) = res.into_parts();
                res.headers_mut().insert(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
                );
                res.headers_mut().insert(PRAGMA, HeaderValue::from_static("no-cache"));
                res.headers_mut().insert(EXPIRES, HeaderValue::from_static("0"));
                Ok(ServiceResponse::new(req, res))
            } else {
                Ok(res)
            }
        })
    }
}
