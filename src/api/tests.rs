use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use serde_json::{Value, json};
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use super::init_routes;
use super::models::AppState;
use super::ratelimit::RateLimiter;
use crate::blockchain::{Block, Ledger};
use crate::miner::{MiningInput, MiningPolicy, SearchOutcome, search};
use crate::storage::{ChainStore, StoreResult};

fn app_state(difficulty: u32, rate_limit_max: u32, mining_max_jobs: usize) -> web::Data<AppState> {
    web::Data::new(AppState::new(
        Ledger::in_memory(difficulty),
        RateLimiter::new(rate_limit_max, 60),
        mining_max_jobs,
    ))
}

/// Mine on top of `prev` the way a client would, returning the submit payload.
fn mined_payload(prev: &Block, data: &str, difficulty: u32) -> Value {
    let input = MiningInput::next_after(prev, data);
    let cancel = AtomicBool::new(false);
    let policy = MiningPolicy::for_difficulty(difficulty);
    let SearchOutcome::Found(found) = search(&input, &policy, &cancel, |_| ControlFlow::Continue(()))
    else {
        panic!("mining did not find a nonce");
    };
    json!({
        "data": data,
        "nonce": found.nonce,
        "timestamp": input.timestamp,
        "hash": found.hash,
    })
}

macro_rules! service {
    ($state:expr) => {
        test::init_service(App::new().app_data($state.clone()).configure(init_routes)).await
    };
}

#[actix_web::test]
async fn health_is_up() {
    let state = app_state(1, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn fresh_chain_has_only_genesis() {
    let state = app_state(1, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::get().uri("/api/v1/chain/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["hasMore"], false);
    let genesis = &body["blocks"][0];
    assert_eq!(genesis["index"], 0);
    assert_eq!(genesis["prevHash"], "0");
    assert_eq!(genesis["timestamp"], "2025-01-01T00:00:00.000Z");
    assert_eq!(genesis["data"], "Genesis Block");
    assert_eq!(genesis["nonce"], 0);
    assert_eq!(genesis["hash"], Block::genesis().hash);
}

#[actix_web::test]
async fn append_then_stale_resubmit() {
    let state = app_state(2, 0, 1);
    let app = service!(state);
    let payload = mined_payload(&Block::genesis(), "hello", 2);

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let block: Value = test::read_body_json(resp).await;
    assert_eq!(block["index"], 1);
    assert_eq!(block["prevHash"], Block::genesis().hash);
    assert_eq!(block["data"], "hello");
    assert_eq!(block["hash"], payload["hash"]);
    assert_eq!(state.ledger.len().unwrap(), 2);

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_block");
    assert_eq!(state.ledger.len().unwrap(), 2);
}

#[actix_web::test]
async fn append_accepts_payload_without_hash() {
    let state = app_state(2, 0, 1);
    let app = service!(state);
    let mut payload = mined_payload(&Block::genesis(), "no hash sent", 2);
    payload.as_object_mut().unwrap().remove("hash");

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn tampered_hash_is_rejected() {
    let state = app_state(2, 0, 1);
    let app = service!(state);
    let mut payload = mined_payload(&Block::genesis(), "hello", 2);
    payload["hash"] = json!(format!("00{}", "a".repeat(62)));

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_block");
}

#[actix_web::test]
async fn boundary_errors_carry_reason_codes() {
    let state = app_state(2, 0, 1);
    let app = service!(state);

    let cases = [
        (json!({"data": "  ", "nonce": 1, "timestamp": "t"}), "invalid_data"),
        (json!({"data": "x".repeat(1001), "nonce": 1, "timestamp": "t"}), "invalid_data"),
        (json!({"data": "ok", "nonce": -3, "timestamp": "t"}), "invalid_nonce"),
        (json!({"data": "ok", "nonce": 2.5, "timestamp": "t"}), "invalid_nonce"),
        (json!({"data": "ok", "nonce": 1}), "invalid_timestamp"),
    ];
    for (payload, code) in cases {
        let req = test::TestRequest::post()
            .uri("/api/v1/blocks/")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{payload}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], code, "{payload}");
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_request");

    assert_eq!(state.ledger.len().unwrap(), 1);
}

#[actix_web::test]
async fn appends_are_rate_limited_per_caller() {
    let state = app_state(2, 2, 1);
    let app = service!(state);
    let bad = json!({"data": "", "nonce": 0, "timestamp": "t"});

    for remaining in ["1", "0"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/blocks/")
            .insert_header(("X-Forwarded-For", "203.0.113.9"))
            .set_json(&bad)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), remaining);
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .insert_header(("X-Forwarded-For", "203.0.113.9"))
        .set_json(&bad)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("Retry-After"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["limit"], 2);
    assert_eq!(body["remaining"], 0);

    // a different caller still gets through to validation
    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .insert_header(("X-Forwarded-For", "198.51.100.1"))
        .set_json(&bad)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn paginates_newest_first() {
    let state = app_state(1, 0, 1);
    for i in 0..11 {
        let tail = state.ledger.latest().unwrap();
        let payload = mined_payload(&tail, &format!("block {i}"), 1);
        let block = Block {
            index: tail.index + 1,
            timestamp: payload["timestamp"].as_str().unwrap().to_string(),
            data: format!("block {i}"),
            prev_hash: tail.hash.clone(),
            nonce: payload["nonce"].as_u64().unwrap(),
            hash: payload["hash"].as_str().unwrap().to_string(),
        };
        state.ledger.append(block).unwrap();
    }
    let app = service!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/chain/?limit=10&offset=0&reverse=true")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let indices: Vec<u64> = body["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, (2..=11).rev().collect::<Vec<_>>());
    assert_eq!(
        body["pagination"],
        json!({"total": 12, "limit": 10, "offset": 0, "hasMore": true})
    );

    let req = test::TestRequest::get()
        .uri("/api/v1/chain/?limit=10&offset=10&reverse=true")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let indices: Vec<u64> = body["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![1, 0]);
    assert_eq!(body["pagination"]["hasMore"], false);

    let req = test::TestRequest::get().uri("/api/v1/validate/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["length"], 12);
}

#[actix_web::test]
async fn stats_report_height_and_storage() {
    let state = app_state(3, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::get().uri("/api/v1/stats/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["height"], 1);
    assert_eq!(body["difficulty"], 3);
    assert_eq!(body["storage"], "in-memory");
    assert_eq!(body["latestHash"], Block::genesis().hash);
}

#[actix_web::test]
async fn mining_job_result_can_be_submitted() {
    let state = app_state(2, 0, 2);
    let app = service!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .set_json(json!({"data": "  mined by job  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let job: Value = test::read_body_json(resp).await;
    assert_eq!(job["index"], 1);
    assert_eq!(job["prevHash"], Block::genesis().hash);
    let uri = format!("/api/v1/mining/jobs/{}/", job["jobId"].as_str().unwrap());

    let deadline = Instant::now() + Duration::from_secs(30);
    let report = loop {
        let req = test::TestRequest::get().uri(&uri).to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        if report["status"] != "running" {
            break report;
        }
        assert!(Instant::now() < deadline, "mining job did not finish");
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(report["status"], "found");
    let result = &report["result"];
    assert_eq!(result["timestamp"], job["timestamp"]);
    assert!(result["hash"].as_str().unwrap().starts_with("00"));

    let req = test::TestRequest::post()
        .uri("/api/v1/blocks/")
        .set_json(json!({
            "data": "mined by job",
            "nonce": result["nonce"],
            "timestamp": result["timestamp"],
            "hash": result["hash"],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::delete().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let req = test::TestRequest::get().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn mining_jobs_are_capped_and_cancellable() {
    // difficulty 64 is never satisfied, so jobs run until cancelled
    let state = app_state(64, 0, 1);
    let app = service!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .set_json(json!({"data": "forever"}))
        .to_request();
    let job: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .set_json(json!({"data": "second"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "mining_busy");

    let uri = format!("/api/v1/mining/jobs/{}/", job["jobId"].as_str().unwrap());
    let req = test::TestRequest::delete().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .set_json(json!({"data": "third"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[actix_web::test]
async fn mining_job_rejects_empty_data() {
    let state = app_state(2, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .set_json(json!({"data": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_data");
}

#[actix_web::test]
async fn zero_limit_returns_whole_chain() {
    let state = app_state(1, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::get().uri("/api/v1/chain/?limit=0").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["blocks"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({"total": 1, "limit": 1, "offset": 0, "hasMore": false})
    );
}

#[actix_web::test]
async fn reverse_only_for_literal_true() {
    let state = app_state(1, 0, 1);
    let tail = state.ledger.latest().unwrap();
    let payload = mined_payload(&tail, "second", 1);
    state
        .ledger
        .append(Block::candidate(
            &tail,
            payload["timestamp"].as_str().unwrap().to_string(),
            "second".into(),
            payload["nonce"].as_u64().unwrap(),
        ))
        .unwrap();
    let app = service!(state);

    for (query, first) in [("reverse=1", 0), ("reverse=TRUE", 0), ("reverse=false", 0), ("reverse=true", 1)] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/chain/?{query}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{query}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["blocks"][0]["index"], first, "{query}");
    }
}

#[actix_web::test]
async fn malformed_query_is_json_invalid_request() {
    let state = app_state(1, 0, 1);
    let app = service!(state);

    for query in ["limit=abc", "offset=-1"] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/chain/?{query}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{query}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_request", "{query}");
        assert!(body["message"].is_string(), "{query}");
    }
}

#[actix_web::test]
async fn malformed_mining_body_is_json_invalid_request() {
    let state = app_state(2, 0, 1);
    let app = service!(state);
    let req = test::TestRequest::post()
        .uri("/api/v1/mining/jobs/")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_request");
}

/// A backend that is always down.
struct BrokenStore;

impl ChainStore for BrokenStore {
    fn get(&self, _key: &str) -> StoreResult<Option<Vec<Block>>> {
        Err(io::Error::other("disk /dev/sdz exploded").into())
    }

    fn set(&self, _key: &str, _chain: &[Block]) -> StoreResult<()> {
        Err(io::Error::other("disk /dev/sdz exploded").into())
    }

    fn kind(&self) -> &'static str {
        "broken"
    }
}

#[actix_web::test]
async fn storage_failure_is_generic_internal_error() {
    let state = web::Data::new(AppState::new(
        Ledger::new(Box::new(BrokenStore), "demo:chain", 1),
        RateLimiter::new(0, 60),
        1,
    ));
    let app = service!(state);

    let requests = [
        test::TestRequest::get().uri("/api/v1/chain/").to_request(),
        test::TestRequest::get().uri("/api/v1/validate/").to_request(),
        test::TestRequest::post()
            .uri("/api/v1/blocks/")
            .set_json(json!({"data": "hello", "nonce": 0, "timestamp": "t"}))
            .to_request(),
    ];
    for req in requests {
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "internal_error");
        assert!(!body.to_string().contains("sdz"));
    }
}
