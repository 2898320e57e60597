use std::sync::Arc;

use actix_web::{App, test, web};
use api::SecurityHeadersMiddleware;
use api::routes;
use engine::Engine;
use engine::persistence::NullSink;
use engine::time::TimeSource;

fn test_engine_data() -> web::Data<Engine> {
    let time_source = TimeSource::new(jiff::Timestamp::from_second(0).unwrap());
    web::Data::new(Engine::new(Arc::new(NullSink), time_source))
}

#[actix_web::test]
async fn health_check_has_no_security_headers() {
    let engine = test_engine_data();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeadersMiddleware)
            .service(routes::api_services())
            .app_data(engine),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/health_check").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert!(resp.headers().get("cache-control").is_none());
}

#[actix_web::test]
async fn api_endpoints_carry_security_headers() {
    let engine = test_engine_data();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeadersMiddleware)
            .service(routes::api_services())
            .app_data(engine),
    )
    .await;

    // No identity cookie present, so this 401s, but the security headers
    // middleware runs on every /api path regardless of the response status.
    let req = test::TestRequest::post().uri("/api/snapshot").to_request();
    let resp = test::call_service(&app, req).await;

    let headers = resp.headers();
    assert_eq!(
        headers.get("cache-control").unwrap().to_str().unwrap(),
        "no-store, no-cache, must-revalidate, private"
    );
    assert_eq!(headers.get("pragma").unwrap().to_str().unwrap(), "no-cache");
    assert_eq!(headers.get("expires").unwrap().to_str().unwrap(), "0");
}
