use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::ratelimit::RateLimiter;
use crate::blockchain::{Block, Ledger};
use crate::config::Config;
use crate::miner::{MinedNonce, MinerEvent, MiningProgress, MiningTask};
use crate::storage::{ChainStore, FileStore, MemoryStore};

/// Finished mining jobs nobody collected are dropped after this long.
pub const JOB_RETENTION: Duration = Duration::from_secs(600);

/// Shared application state: the ledger, admission control and mining jobs.
pub struct AppState {
    pub ledger: Ledger,
    pub limiter: RateLimiter,
    pub mining_jobs: Mutex<HashMap<String, MiningJob>>,
    pub mining_max_jobs: usize,
}

impl AppState {
    pub fn new(ledger: Ledger, limiter: RateLimiter, mining_max_jobs: usize) -> Self {
        Self {
            ledger,
            limiter,
            mining_jobs: Mutex::new(HashMap::new()),
            mining_max_jobs,
        }
    }

    /// Pick the storage backend once, from configuration.
    pub fn from_config(cfg: &Config) -> io::Result<Self> {
        let store: Box<dyn ChainStore> = match &cfg.storage_dir {
            Some(dir) => Box::new(FileStore::open(dir)?),
            None => Box::new(MemoryStore::new()),
        };
        let ledger = Ledger::new(store, cfg.chain_key.clone(), cfg.difficulty);
        let limiter = RateLimiter::new(cfg.rate_limit_max, cfg.rate_limit_window_secs);
        Ok(Self::new(ledger, limiter, cfg.mining_max_jobs))
    }
}

/* ---------- Mining jobs ---------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Found(MinedNonce),
    TimedOut { attempts: u64, ceiling: u64 },
}

/// A background nonce search plus the latest state read from it.
pub struct MiningJob {
    pub task: MiningTask,
    pub status: JobStatus,
    pub last_progress: Option<MiningProgress>,
    pub finished_at: Option<Instant>,
}

impl MiningJob {
    pub fn new(task: MiningTask) -> Self {
        Self {
            task,
            status: JobStatus::Running,
            last_progress: None,
            finished_at: None,
        }
    }

    /// Drain pending events from the worker into `status`/`last_progress`.
    pub fn refresh(&mut self) {
        for event in self.task.try_events() {
            match event {
                MinerEvent::Progress(p) => self.last_progress = Some(p),
                MinerEvent::Found(found) => {
                    self.status = JobStatus::Found(found);
                    self.finished_at = Some(Instant::now());
                }
                MinerEvent::TimedOut { attempts, ceiling } => {
                    self.status = JobStatus::TimedOut { attempts, ceiling };
                    self.finished_at = Some(Instant::now());
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.finished_at
            .is_some_and(|done| now.duration_since(done) >= JOB_RETENTION)
    }

    pub fn report(&self, job_id: &str) -> JobStatusResponse {
        let (status, result, error) = match &self.status {
            JobStatus::Running => ("running", None, None),
            JobStatus::Found(found) => {
                let block = self.task.input().clone().into_block(found.nonce);
                let result = JobResult {
                    nonce: found.nonce,
                    hash: found.hash.clone(),
                    attempts: found.attempts,
                    hash_rate: found.hash_rate,
                    elapsed_ms: found.elapsed_ms,
                    timestamp: block.timestamp.clone(),
                    block,
                };
                ("found", Some(result), None)
            }
            JobStatus::TimedOut { ceiling, .. } => (
                "timed_out",
                None,
                Some(format!("Mining timeout - nonce exceeded limit ({ceiling})")),
            ),
        };
        JobStatusResponse {
            job_id: job_id.to_string(),
            status,
            progress: self.last_progress.clone(),
            result,
            error,
        }
    }
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct NewJobRequest {
    pub data: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJobResponse {
    pub job_id: String,
    pub index: u64,
    pub prev_hash: String,
    pub timestamp: String,
    pub difficulty: u32,
    pub nonce_ceiling: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub nonce: u64,
    pub hash: String,
    pub attempts: u64,
    pub hash_rate: u64,
    pub elapsed_ms: u64,
    pub timestamp: String,
    pub block: Block,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<MiningProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub height: usize,
    pub difficulty: u32,
    pub latest_hash: String,
    pub storage: &'static str,
    pub mining_jobs: usize,
}

/* ---------- Errors ---------- */

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct RateLimitedResponse {
    pub error: &'static str,
    pub message: &'static str,
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
}
