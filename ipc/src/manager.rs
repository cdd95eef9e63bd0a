//! The IPC manager: registration, delivery, and request-reply

use crate::mailbox::Mailbox;
use crate::message::{Message, MessageKind};
use core_types::{MessageId, TaskId};
use logger::Logger;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const COMPONENT: &str = "IPC";

/// Interval between reply polls in `send_and_wait_reply`.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Routes messages between registered tasks
///
/// The mailbox map sits behind its own mutex; each mailbox carries its
/// own lock. Operations take the map lock only long enough to resolve a
/// mailbox, then operate on the mailbox alone, so no call path holds
/// both locks except the strictly-dequeueing ones.
///
/// All methods take `&self`; the manager can be shared across threads
/// behind an `Arc` without external locking.
pub struct IpcManager {
    mailboxes: Mutex<BTreeMap<TaskId, Arc<Mailbox>>>,
    next_message_id: AtomicU32,
    total_sent: AtomicU64,
    total_received: AtomicU64,
    log: Logger,
}

impl IpcManager {
    /// Creates an empty manager; message ids start at 1
    pub fn new(log: Logger) -> Self {
        log.info(COMPONENT, "Initialized IPC manager");
        Self {
            mailboxes: Mutex::new(BTreeMap::new()),
            next_message_id: AtomicU32::new(1),
            total_sent: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
            log,
        }
    }

    /// Creates a mailbox for `task`; false if one already exists
    pub fn register_task(&self, task: TaskId) -> bool {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        if mailboxes.contains_key(&task) {
            self.log
                .warn(COMPONENT, &format!("{} already registered", task));
            return false;
        }
        mailboxes.insert(task, Arc::new(Mailbox::new(task)));
        self.log
            .debug(COMPONENT, &format!("Registered {} for IPC", task));
        true
    }

    /// Discards the mailbox of `task` along with any pending messages
    pub fn unregister_task(&self, task: TaskId) -> bool {
        let removed = self.mailboxes.lock().unwrap().remove(&task).is_some();
        if removed {
            self.log
                .debug(COMPONENT, &format!("Unregistered {} from IPC", task));
        }
        removed
    }

    fn mailbox_of(&self, task: TaskId) -> Option<Arc<Mailbox>> {
        self.mailboxes.lock().unwrap().get(&task).cloned()
    }

    /// Queues a message on the receiver's mailbox
    ///
    /// Returns the assigned id, or [`MessageId::INVALID`] when the
    /// receiver is not registered. Payloads above the size limit are
    /// dropped silently; the message is still delivered empty.
    pub fn send_message(
        &self,
        sender: TaskId,
        receiver: TaskId,
        data: &[u8],
        kind: MessageKind,
        blocking: bool,
    ) -> MessageId {
        let Some(mailbox) = self.mailbox_of(receiver) else {
            self.log.error(
                COMPONENT,
                &format!("Cannot send to unregistered {}", receiver),
            );
            return MessageId::INVALID;
        };

        let id = MessageId::new(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let mut message = Message::new(id, sender, receiver, kind);
        message.blocking = blocking;
        if !data.is_empty() {
            message.set_payload(data);
        }

        mailbox.enqueue(message);
        self.total_sent.fetch_add(1, Ordering::Relaxed);

        self.log.debug(
            COMPONENT,
            &format!("{} sent from {} to {}", id, sender, receiver),
        );
        id
    }

    /// Non-blocking alias for [`IpcManager::send_message`]
    pub fn send_async(
        &self,
        sender: TaskId,
        receiver: TaskId,
        data: &[u8],
        kind: MessageKind,
    ) -> MessageId {
        self.send_message(sender, receiver, data, kind, false)
    }

    /// Removes and returns the oldest message for `receiver`
    ///
    /// `None` on an empty mailbox or an unknown receiver. The `blocking`
    /// flag is declarative; this call always returns immediately.
    pub fn receive_message(&self, receiver: TaskId, _blocking: bool) -> Option<Message> {
        let mailbox = self.mailbox_of(receiver)?;
        let message = mailbox.dequeue()?;
        self.total_received.fetch_add(1, Ordering::Relaxed);
        self.log.debug(
            COMPONENT,
            &format!("{} received by {}", message.id, receiver),
        );
        Some(message)
    }

    /// Dequeues the head of `receiver`'s mailbox only if `sender` sent it
    ///
    /// A head from any other sender is left in place.
    pub fn receive_message_from(
        &self,
        receiver: TaskId,
        sender: TaskId,
        _blocking: bool,
    ) -> Option<Message> {
        self.mailbox_of(receiver)?.dequeue_if_from(sender)
    }

    /// Returns whether `task` has pending messages
    pub fn has_messages(&self, task: TaskId) -> bool {
        self.mailbox_of(task).is_some_and(|mailbox| !mailbox.is_empty())
    }

    /// Returns the number of pending messages for `task`
    pub fn message_count(&self, task: TaskId) -> usize {
        self.mailbox_of(task).map_or(0, |mailbox| mailbox.len())
    }

    /// Sends a `Request` and polls for the matching `Response`
    ///
    /// The deadline runs from the moment the request is queued. On
    /// timeout the request is not retracted from the receiver's mailbox
    /// and `None` is returned.
    pub fn send_and_wait_reply(
        &self,
        sender: TaskId,
        receiver: TaskId,
        data: &[u8],
        timeout: Duration,
    ) -> Option<Message> {
        let id = self.send_message(sender, receiver, data, MessageKind::Request, true);
        if !id.is_valid() {
            return None;
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(reply) = self.receive_message_from(sender, receiver, false) {
                if reply.kind == MessageKind::Response {
                    return Some(reply);
                }
            }
            thread::sleep(REPLY_POLL_INTERVAL);
        }

        self.log.warn(
            COMPONENT,
            &format!("Timeout waiting for reply from {}", receiver),
        );
        None
    }

    /// Total successful sends since construction
    pub fn total_messages_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    /// Total successful receives since construction
    pub fn total_messages_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mailboxes = self.mailboxes.lock().unwrap();
        let mut out = String::new();
        out.push_str("=== IPC Manager Report ===\n");
        let _ = writeln!(out, "Registered Tasks: {}", mailboxes.len());
        let _ = writeln!(
            out,
            "Total Messages Sent: {}",
            self.total_sent.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "Total Messages Received: {}",
            self.total_received.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "Next Message ID: {}",
            self.next_message_id.load(Ordering::Relaxed)
        );
        out.push_str("\nPending Messages per Task:\n");
        for (task, mailbox) in mailboxes.iter() {
            let _ = writeln!(out, "  {}: {} messages", task, mailbox.len());
        }
        out
    }
}
