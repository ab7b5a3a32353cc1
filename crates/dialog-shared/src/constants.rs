//! Application-wide constants

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. You talk to people and help them. Answer briefly.";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_MAX_COMPACTION_ROUNDS: u64 = 1024;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAILBOX_CAPACITY: u64 = 32;
pub const DEFAULT_IDLE_WORKER_SECS: u64 = 600;
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;
