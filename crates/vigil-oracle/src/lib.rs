//! # Vigil Oracle
//!
//! Coarse early-warning signal from a single proxy metric: the number of
//! active session records. Every cycle a [`risk_log::RiskSample`] is
//! appended to a JSONL audit log; a CRITICAL score raises a loud alert and
//! enqueues a courier message, nothing more. Escalation is advisory only.

pub mod predictor;
pub mod risk_log;
pub mod session;

pub use predictor::{Oracle, classify, risk_score};
pub use risk_log::{RiskLog, RiskSample, RiskStatus};
pub use session::{CommandSessionSource, SessionSource};
