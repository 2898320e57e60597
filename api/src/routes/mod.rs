pub mod auction;

use actix_identity::Identity;
use actix_web::{
    HttpResponse, Responder, ResponseError, body::BoxBody,
    dev::HttpServiceFactory, get, web,
};
use payloads::ErrorKind;
use uuid::Uuid;

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(auction::create_auction)
        .service(auction::start_auction)
        .service(auction::stop_auction)
        .service(auction::continue_auction)
        .service(auction::final_call)
        .service(auction::skip)
        .service(auction::undo)
        .service(auction::place_bid)
        .service(auction::vote)
        .service(auction::get_snapshot)
        .service(auction::get_bid_history)
        .service(auction::subscribe)
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::AuthError(e) => {
                HttpResponse::Unauthorized().body(format!("{self}: {e}"))
            }
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::NotFound(e) => {
                HttpResponse::NotFound().body(format!("{self}: {e}"))
            }
            Self::UnexpectedError(_) => {
                HttpResponse::InternalServerError().body(self.to_string())
            }
        }
    }
}

impl From<engine::EngineError> for APIError {
    fn from(e: engine::EngineError) -> Self {
        match e.kind {
            ErrorKind::UnknownAuction
            | ErrorKind::UnknownPlayer
            | ErrorKind::UnknownManager => APIError::NotFound(e.into()),
            ErrorKind::NotOwner => APIError::AuthError(e.into()),
            ErrorKind::PersistenceError => APIError::UnexpectedError(e.into()),
            _ => APIError::BadRequest(e.into()),
        }
    }
}

/// Extracts the authenticated manager's id. Authentication itself (how the
/// identity cookie was established) is an external collaborator's concern;
/// this crate only trusts whatever `Identity` the auth middleware set.
fn get_manager_id(user: &Identity) -> Result<payloads::ManagerId, APIError> {
    let id_str = user.id().map_err(|e| {
        APIError::AuthError(anyhow::Error::from(e).context("invalid login session"))
    })?;
    tracing::Span::current()
        .record("manager_id", tracing::field::display(&id_str));
    Ok(payloads::ManagerId(
        Uuid::parse_str(&id_str).map_err(anyhow::Error::from)?,
    ))
}
