//! # Vigil Watchdog
//!
//! Health supervisor for the gateway process. One cycle per minute:
//!
//! ```text
//! 1. host CPU / free RAM            → critical → restart + 2× backoff
//! 2. gateway present (cmdline match) → missing → restart
//! 3. gateway resident memory        → over ceiling → restart
//! 4. HTTP liveness probe            → non-200 / timeout → restart
//! 5. rogue sweep (watch-listed, old, hot processes are killed)
//! ```
//!
//! All restarts pass one throttle gate; a restart also enqueues an alert
//! into the courier outbox and records a WAL event.

pub mod process;
pub mod supervisor;

pub use process::{ProcessController, SystemController, is_rogue};
pub use supervisor::{CycleOutcome, RestartGate, Supervisor};
