//! # Core Types
//!
//! This crate defines the fundamental types used throughout Osmium.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Explicit over implicit**: identifiers are distinct newtypes and
//!   cannot be confused with one another.
//! - **Deterministic**: identifiers are monotonic counters, not random
//!   values, so runs are reproducible.
//! - **Sentinels are part of the contract**: `TaskId::INVALID` and
//!   `MessageId::INVALID` are visible to callers and tested against.
//!
//! ## Key Types
//!
//! - [`TaskId`], [`PageNumber`], [`FrameNumber`], [`MessageId`]: core ids
//! - [`TaskState`], [`TaskPriority`]: scheduler-visible task attributes
//! - [`Protection`]: page protection bitflags

pub mod ids;
pub mod memory;
pub mod task;

pub use ids::{
    FileDescriptor, FrameNumber, InodeNumber, InterruptNumber, MessageId, PageNumber, TaskId,
};
pub use memory::{PhysicalAddress, Protection, PAGE_SIZE, TOTAL_PHYSICAL_FRAMES};
pub use task::{TaskPriority, TaskState, TASK_STACK_SIZE, TIME_QUANTUM_MS};

/// Sentinel for "no task". Kept as a named constant because callers
/// compare against it directly.
pub const INVALID_TASK_ID: TaskId = TaskId::INVALID;
