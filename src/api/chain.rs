use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, Responder, get, post, web};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::time::Instant;

use super::error_json;
use super::models::{AppState, ErrorResponse, RateLimitedResponse, ValidateResponse};
use super::ratelimit::{RateDecision, caller_identity};
use super::submission::NewBlockRequest;
use crate::blockchain::{LedgerError, PageQuery};

/// Read the chain, optionally paginated: `?limit=10&offset=0&reverse=true`.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>, query: web::Query<PageQuery>) -> impl Responder {
    match state.ledger.page(query.into_inner()) {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => {
            error!("GET /chain/ - {e}");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to fetch blockchain",
            )
        }
    }
}

/// Re-validate the whole stored chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    match state.ledger.verify() {
        Ok(report) => HttpResponse::Ok().json(ValidateResponse {
            valid: report.fault.is_none(),
            length: report.length,
            difficulty: state.ledger.difficulty(),
            reason: report.fault.map(|f| f.to_string()),
        }),
        Err(e) => {
            error!("GET /validate/ - {e}");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to validate blockchain",
            )
        }
    }
}

/// Submit a mined block: `{ data, nonce, timestamp }` plus optional
/// `index`, `prevHash` and `hash`. Rate-limited per caller.
#[post("/blocks/")]
pub async fn append_block(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let t0 = Instant::now();
    let caller = caller_identity(&req);

    let decision = state.limiter.check(&caller);
    if !decision.allowed {
        warn!("POST /blocks/ - rate limited caller {caller}");
        return rate_limited(&decision);
    }

    let request: NewBlockRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!("POST /blocks/ - unparsable body from {caller}: {e}");
            return with_rate_headers(HttpResponse::BadRequest(), &decision).json(ErrorResponse {
                error: "invalid_request",
                message: "Request body must be a JSON object".to_string(),
            });
        }
    };

    let submission = match request.validate() {
        Ok(s) => s,
        Err(e) => {
            warn!("POST /blocks/ - rejected input from {caller}: {e}");
            return with_rate_headers(HttpResponse::BadRequest(), &decision).json(
                ErrorResponse {
                    error: e.code(),
                    message: e.to_string(),
                },
            );
        }
    };

    let result = state
        .ledger
        .latest()
        .and_then(|tail| state.ledger.append(submission.into_candidate(&tail)));

    match result {
        Ok(block) => {
            info!(
                "POST /blocks/ - block #{} accepted from {caller} ({} ms)",
                block.index,
                t0.elapsed().as_millis()
            );
            with_rate_headers(HttpResponse::Created(), &decision).json(block)
        }
        Err(LedgerError::Rejected(reason)) => {
            warn!("POST /blocks/ - block from {caller} failed validation: {reason}");
            with_rate_headers(HttpResponse::BadRequest(), &decision).json(
                ErrorResponse {
                    error: "invalid_block",
                    message: "Block validation failed".to_string(),
                },
            )
        }
        Err(LedgerError::Store(e)) => {
            error!("POST /blocks/ - storage failure: {e}");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to create block",
            )
        }
    }
}

fn with_rate_headers(
    mut builder: HttpResponseBuilder,
    decision: &RateDecision,
) -> HttpResponseBuilder {
    if decision.limit > 0 {
        builder
            .insert_header(("X-RateLimit-Limit", decision.limit.to_string()))
            .insert_header(("X-RateLimit-Remaining", decision.remaining.to_string()))
            .insert_header(("X-RateLimit-Reset", decision.reset_ms.to_string()));
    }
    builder
}

fn rate_limited(decision: &RateDecision) -> HttpResponse {
    let retry_after = decision.retry_after_secs(Utc::now().timestamp_millis());
    with_rate_headers(HttpResponse::TooManyRequests(), decision)
        .insert_header(("Retry-After", retry_after.to_string()))
        .json(RateLimitedResponse {
            error: "rate_limited",
            message: "Too many requests. Please try again later.",
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_ms,
        })
}
