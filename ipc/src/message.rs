//! Message structure and payload rules

use core_types::{MessageId, TaskId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Maximum payload size in bytes. Larger payloads are dropped silently.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// What a message means to its receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Plain data transfer
    Data,
    /// Lightweight notification without payload semantics
    Signal,
    /// Expects a `Response` back
    Request,
    /// Answer to a `Request`
    Response,
    /// One-way event
    Notification,
}

/// One unit of inter-task communication
///
/// Messages are copied on send; the receiver owns the delivered instance.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub sender: TaskId,
    pub receiver: TaskId,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
    pub timestamp: Instant,
    pub blocking: bool,
}

impl Message {
    /// Creates an empty message
    pub fn new(id: MessageId, sender: TaskId, receiver: TaskId, kind: MessageKind) -> Self {
        Self {
            id,
            sender,
            receiver,
            kind,
            payload: Vec::new(),
            timestamp: Instant::now(),
            blocking: false,
        }
    }

    /// Copies up to [`MAX_MESSAGE_SIZE`] bytes into the message
    ///
    /// Oversize payloads are dropped without error; the message is still
    /// delivered empty.
    pub fn set_payload(&mut self, data: &[u8]) {
        if data.len() <= MAX_MESSAGE_SIZE {
            self.payload = data.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind) -> Message {
        Message::new(MessageId::new(1), TaskId::new(1), TaskId::new(2), kind)
    }

    #[test]
    fn test_new_message_has_empty_payload() {
        let msg = message(MessageKind::Data);
        assert!(msg.payload.is_empty());
        assert!(!msg.blocking);
    }

    #[test]
    fn test_payload_within_limit_is_copied() {
        let mut msg = message(MessageKind::Data);
        msg.set_payload(b"hello");
        assert_eq!(msg.payload, b"hello");
    }

    #[test]
    fn test_payload_at_limit_is_copied() {
        let mut msg = message(MessageKind::Data);
        msg.set_payload(&vec![0xAB; MAX_MESSAGE_SIZE]);
        assert_eq!(msg.payload.len(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_oversize_payload_is_dropped() {
        let mut msg = message(MessageKind::Data);
        msg.set_payload(&vec![0xAB; MAX_MESSAGE_SIZE + 1]);
        assert!(msg.payload.is_empty());
    }
}
