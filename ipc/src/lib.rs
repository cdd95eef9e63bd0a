//! # IPC
//!
//! Message passing between tasks over per-receiver mailboxes.
//!
//! ## Philosophy
//!
//! Communication is through copied messages, never shared memory. Every
//! registered task owns exactly one FIFO mailbox; senders enqueue,
//! receivers drain, and nothing blocks: the `blocking` flag is carried
//! on the message but the simulation always returns immediately.
//!
//! ## Key Types
//!
//! - [`Message`]: one delivered unit, payload capped at [`MAX_MESSAGE_SIZE`]
//! - [`Mailbox`]: a per-receiver FIFO behind its own lock
//! - [`IpcManager`]: registration, send/receive, request-reply with timeout

pub mod mailbox;
pub mod manager;
pub mod message;

pub use mailbox::Mailbox;
pub use manager::IpcManager;
pub use message::{Message, MessageKind, MAX_MESSAGE_SIZE};
