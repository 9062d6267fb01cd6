use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, delete, get, post, web};
use log::{debug, error, info, warn};
use std::time::Instant;
use uuid::Uuid;

use super::error_json;
use super::models::{AppState, MiningJob, NewJobRequest, NewJobResponse};
use super::submission::normalize_data;
use crate::miner::{MiningInput, MiningPolicy, MiningTask};

/// Start a background nonce search on top of the current tail.
/// The timestamp is fixed here and must be reused when submitting the block.
#[post("/mining/jobs/")]
pub async fn start_job(
    state: web::Data<AppState>,
    req: web::Json<NewJobRequest>,
) -> impl Responder {
    let data = match normalize_data(req.data.as_ref()) {
        Ok(d) => d,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e.code(), &e.to_string()),
    };

    let tail = match state.ledger.latest() {
        Ok(b) => b,
        Err(e) => {
            error!("POST /mining/jobs/ - {e}");
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to read blockchain",
            );
        }
    };

    let mut jobs = state.mining_jobs.lock().expect("mutex poisoned");

    // refresh and drop stale finished jobs before counting
    let now = Instant::now();
    jobs.values_mut().for_each(MiningJob::refresh);
    jobs.retain(|_, job| !job.expired(now));
    let running = jobs.values().filter(|job| job.is_running()).count();
    if running >= state.mining_max_jobs {
        warn!("POST /mining/jobs/ - busy ({running} jobs running)");
        return error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "mining_busy",
            "Too many mining jobs in progress. Please try again later.",
        );
    }

    let input = MiningInput::next_after(&tail, data);
    let policy = MiningPolicy::for_difficulty(state.ledger.difficulty());
    let task = match MiningTask::spawn(input.clone(), policy) {
        Ok(t) => t,
        Err(e) => {
            error!("POST /mining/jobs/ - could not start miner thread: {e}");
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to start mining",
            );
        }
    };

    let job_id = Uuid::new_v4().to_string();
    jobs.insert(job_id.clone(), MiningJob::new(task));
    info!(
        "MINING - job {} started for block #{} (diff={}, ceiling={})",
        job_id, input.index, policy.difficulty, policy.nonce_ceiling
    );

    HttpResponse::Accepted().json(NewJobResponse {
        job_id,
        index: input.index,
        prev_hash: input.prev_hash,
        timestamp: input.timestamp,
        difficulty: policy.difficulty,
        nonce_ceiling: policy.nonce_ceiling,
    })
}

/// Latest progress, or the result once the search finished.
#[get("/mining/jobs/{id}/")]
pub async fn get_job(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let job_id = path.into_inner().0;
    let mut jobs = state.mining_jobs.lock().expect("mutex poisoned");
    match jobs.get_mut(&job_id) {
        Some(job) => {
            job.refresh();
            debug!("MINING - job {} polled: {:?}", job_id, job.status);
            HttpResponse::Ok().json(job.report(&job_id))
        }
        None => error_json(StatusCode::NOT_FOUND, "not_found", "Unknown mining job"),
    }
}

/// Cancel (if still running) and forget a job.
#[delete("/mining/jobs/{id}/")]
pub async fn cancel_job(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let job_id = path.into_inner().0;
    let removed = {
        let mut jobs = state.mining_jobs.lock().expect("mutex poisoned");
        jobs.remove(&job_id)
    };
    match removed {
        Some(job) => {
            job.task.cancel();
            debug!("MINING - job {job_id} cancelled");
            HttpResponse::NoContent().finish()
        }
        None => error_json(StatusCode::NOT_FOUND, "not_found", "Unknown mining job"),
    }
}
