//! Per-Operation Evaluation Records
//!
//! Every store operation issued by the replay driver yields one [`OpRecord`]
//! carrying the command, a request id, start time, duration, size, result
//! code and the store's short name. Records are emitted as structured
//! `tracing` events on the [`EVAL_TARGET`] target, so
//! `RUST_LOG=sionsim::eval=info --log-json` produces one JSON line per
//! operation.

use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::info;
use uuid::Uuid;

use super::{Payload, StorageAdapter};
use crate::error::Result;

/// Tracing target of evaluation events
pub const EVAL_TARGET: &str = "sionsim::eval";

/// Store command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Set,
    Get,
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Set => "set",
            Command::Get => "get",
        }
    }
}

/// Outcome of a store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    Error,
    /// The store answered "not found"
    NotFound,
}

impl ResultCode {
    /// Classify a store result; misses stay distinct from failures
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(e) if e.is_not_found() => ResultCode::NotFound,
            Err(_) => ResultCode::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::Error => "error",
            ResultCode::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One store operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    pub cmd: Command,
    pub req_id: Uuid,
    /// Wall-clock start, nanoseconds since the Unix epoch
    pub start_ns: i64,
    pub duration: Duration,
    /// Payload bytes moved (0 for a failed get)
    pub size: usize,
    pub result: ResultCode,
    /// Store short name
    pub client: String,
}

impl OpRecord {
    pub fn duration_ns(&self) -> u64 {
        u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX)
    }

    fn emit(&self) {
        info!(
            target: EVAL_TARGET,
            cmd = self.cmd.label(),
            req_id = %self.req_id,
            start_ns = self.start_ns,
            duration_ns = self.duration_ns(),
            size = self.size as u64,
            result = self.result.label(),
            client = %self.client,
            "storage op"
        );
    }
}

struct OpTimer {
    req_id: Uuid,
    start_ns: i64,
    started: Instant,
}

impl OpTimer {
    fn start() -> Self {
        let start_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self {
            req_id: Uuid::new_v4(),
            start_ns,
            started: Instant::now(),
        }
    }

    fn finish(self, cmd: Command, size: usize, result: ResultCode, client: &str) -> OpRecord {
        let record = OpRecord {
            cmd,
            req_id: self.req_id,
            start_ns: self.start_ns,
            duration: self.started.elapsed(),
            size,
            result,
            client: client.to_string(),
        };
        record.emit();
        record
    }
}

/// `store.get(key)`, timed and recorded
pub async fn timed_get(store: &dyn StorageAdapter, key: &str) -> (Result<Payload>, OpRecord) {
    let timer = OpTimer::start();
    let result = store.get(key).await;
    let size = result.as_ref().map_or(0, Payload::len);
    let record = timer.finish(Command::Get, size, ResultCode::of(&result), store.name());
    (result, record)
}

/// `store.set(key, value)`, timed and recorded
pub async fn timed_set(
    store: &dyn StorageAdapter,
    key: &str,
    value: Payload,
) -> (Result<()>, OpRecord) {
    let size = value.len();
    let timer = OpTimer::start();
    let result = store.set(key, value).await;
    let record = timer.finish(Command::Set, size, ResultCode::of(&result), store.name());
    (result, record)
}
