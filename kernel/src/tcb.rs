//! Task control block

use core_types::{
    FileDescriptor, PageNumber, TaskId, TaskPriority, TaskState, TASK_STACK_SIZE, TIME_QUANTUM_MS,
};
use std::collections::BTreeSet;
use std::time::Instant;

/// Everything the scheduler knows about one task
///
/// The scheduler exclusively owns all control blocks, keyed by id. The
/// stack region is owned but never executed on; the simulator tracks
/// task state, not task code.
#[derive(Debug)]
pub struct TaskControlBlock {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub priority: TaskPriority,

    stack: Vec<u8>,

    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,

    pub creation_time: Instant,
    pub last_scheduled_time: Instant,
    /// Cumulative simulated CPU time, in milliseconds
    pub cpu_time_ms: u64,
    /// Millisecond ticks left in the current quantum
    pub time_slice_remaining: u32,

    pub memory_usage: usize,
    pub allocated_pages: BTreeSet<PageNumber>,
    pub open_files: BTreeSet<FileDescriptor>,

    pub exit_code: i32,
}

impl TaskControlBlock {
    /// Creates a block in the `Created` state with a fresh quantum
    pub fn new(id: TaskId, name: &str, priority: TaskPriority) -> Self {
        let now = Instant::now();
        Self {
            id,
            name: name.to_string(),
            state: TaskState::Created,
            priority,
            stack: vec![0; TASK_STACK_SIZE],
            parent: None,
            children: Vec::new(),
            creation_time: now,
            last_scheduled_time: now,
            cpu_time_ms: 0,
            time_slice_remaining: TIME_QUANTUM_MS,
            memory_usage: 0,
            allocated_pages: BTreeSet::new(),
            open_files: BTreeSet::new(),
            exit_code: 0,
        }
    }

    /// Size of the owned stack region, in bytes
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }
}
