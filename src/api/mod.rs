mod chain;
mod health;
mod mining;
pub mod models;
pub mod ratelimit;
mod stats;
pub mod submission;

use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::web::{self, JsonConfig, QueryConfig, ServiceConfig};
use actix_web::{HttpRequest, HttpResponse};
use log::debug;

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(query_config())
            .app_data(json_config())
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::append_block)
            .service(stats::get_stats)
            .service(mining::start_job)
            .service(mining::get_job)
            .service(mining::cancel_job),
    );
}

/// Malformed query strings get the same JSON error body as every other 400.
fn query_config() -> QueryConfig {
    QueryConfig::default().error_handler(|err, req: &HttpRequest| {
        debug!("{} {} - bad query string: {err}", req.method(), req.path());
        let response = error_json(StatusCode::BAD_REQUEST, "invalid_request", &err.to_string());
        InternalError::from_response(err, response).into()
    })
}

fn json_config() -> JsonConfig {
    JsonConfig::default().error_handler(|err, req: &HttpRequest| {
        debug!("{} {} - bad JSON body: {err}", req.method(), req.path());
        let response = error_json(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Request body must be a JSON object",
        );
        InternalError::from_response(err, response).into()
    })
}

/// `{ "error": code, "message": ... }` with the given status.
pub(crate) fn error_json(status: StatusCode, code: &'static str, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(models::ErrorResponse {
        error: code,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests;
