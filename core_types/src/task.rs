//! Task attributes shared between the scheduler and its callers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::PAGE_SIZE;

/// Time quantum granted to a task on each selection, in millisecond ticks.
pub const TIME_QUANTUM_MS: u32 = 100;

/// Size of the stack region owned by every task control block.
pub const TASK_STACK_SIZE: usize = PAGE_SIZE * 4;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Constructed, not yet enqueued
    Created,
    /// Eligible to run, sitting in a ready structure
    Ready,
    /// Currently selected
    Running,
    /// Explicitly blocked, not schedulable
    Blocked,
    /// Waiting on an event (reserved; the core never enters it)
    Waiting,
    /// Exited; never reaped
    Terminated,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "Created",
            TaskState::Ready => "Ready",
            TaskState::Running => "Running",
            TaskState::Blocked => "Blocked",
            TaskState::Waiting => "Waiting",
            TaskState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// Scheduling priority
///
/// Ordered so that `RealTime` compares greatest. Under the priority
/// discipline, higher priorities always win; lower ones may starve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Idle = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    RealTime = 4,
}

impl TaskPriority {
    /// All priorities from most to least urgent, the order the priority
    /// discipline scans them in.
    pub const DESCENDING: [TaskPriority; 5] = [
        TaskPriority::RealTime,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Idle,
    ];
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Idle => "Idle",
            TaskPriority::Low => "Low",
            TaskPriority::Normal => "Normal",
            TaskPriority::High => "High",
            TaskPriority::RealTime => "RealTime",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::RealTime > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert!(TaskPriority::Low > TaskPriority::Idle);
    }

    #[test]
    fn test_descending_scan_order() {
        let order = TaskPriority::DESCENDING;
        assert_eq!(order[0], TaskPriority::RealTime);
        assert_eq!(order[4], TaskPriority::Idle);
        for pair in order.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_stack_size_is_sixteen_kib() {
        assert_eq!(TASK_STACK_SIZE, 16 * 1024);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", TaskState::Ready), "Ready");
        assert_eq!(format!("{}", TaskState::Terminated), "Terminated");
    }
}
