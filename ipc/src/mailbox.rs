//! Per-receiver message FIFO with its own lock

use crate::message::Message;
use core_types::TaskId;
use std::collections::VecDeque;
use std::sync::Mutex;

/// FIFO of messages owned by one receiving task
///
/// The queue is guarded by a mailbox-local mutex so senders and the
/// receiver contend only on this mailbox, never on the whole manager.
#[derive(Debug)]
pub struct Mailbox {
    owner: TaskId,
    messages: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    /// Creates an empty mailbox for `owner`
    pub fn new(owner: TaskId) -> Self {
        Self {
            owner,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the owning task
    pub fn owner(&self) -> TaskId {
        self.owner
    }

    /// Appends a message in send order
    pub fn enqueue(&self, message: Message) {
        self.messages.lock().unwrap().push_back(message);
    }

    /// Removes and returns the oldest message
    pub fn dequeue(&self) -> Option<Message> {
        self.messages.lock().unwrap().pop_front()
    }

    /// Removes the head only if it was sent by `sender`
    ///
    /// A head from any other sender stays queued; this peek-and-match
    /// happens under a single lock acquisition.
    pub fn dequeue_if_from(&self, sender: TaskId) -> Option<Message> {
        let mut messages = self.messages.lock().unwrap();
        if messages.front()?.sender == sender {
            messages.pop_front()
        } else {
            None
        }
    }

    /// Returns the number of queued messages
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Returns whether the mailbox is empty
    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}
