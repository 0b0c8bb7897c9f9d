//! # Vigil Courier
//!
//! Durable notification delivery: messages are committed to a SQLite outbox
//! before any send, then drained by a loop that chunks oversized bodies,
//! respects Telegram rate limits, retries with a bounded budget, and
//! dead-letters what it cannot deliver.
//!
//! ```text
//! producer ── enqueue ──▶ outbox (sqlite)
//!                           │ every 5s, FIFO by created_at
//!                           ▼
//!                        split into ≤4000-char chunks
//!                           ▼
//!                        sendMessage (per chunk, 0.5s apart)
//!                           ├── all sent  → DELETE row
//!                           ├── failure   → attempts += 1
//!                           └── attempts == budget → status 'failed'
//! ```

pub mod chunk;
pub mod outbox;
pub mod queue;
pub mod telegram;

pub use chunk::split_message;
pub use outbox::{MessageStatus, Outbox, OutboxMessage};
pub use queue::Courier;
pub use telegram::{MessageSender, SendOutcome, TelegramSender};
