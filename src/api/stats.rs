use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, get, web};
use log::error;

use super::error_json;
use super::models::{AppState, StatsResponse};

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let chain = match state.ledger.read() {
        Ok(chain) => chain,
        Err(e) => {
            error!("GET /stats/ - {e}");
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to read blockchain",
            );
        }
    };

    // Short lock, just to count jobs still searching
    let mining_jobs = {
        let mut jobs = state.mining_jobs.lock().expect("mutex poisoned");
        jobs.values_mut()
            .map(|job| {
                job.refresh();
                job.is_running()
            })
            .filter(|running| *running)
            .count()
    };

    HttpResponse::Ok().json(StatsResponse {
        height: chain.len(),
        difficulty: state.ledger.difficulty(),
        latest_hash: chain.last().map(|b| b.hash.clone()).unwrap_or_default(),
        storage: state.ledger.storage_kind(),
        mining_jobs,
    })
}
