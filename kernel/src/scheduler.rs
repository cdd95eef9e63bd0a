//! Task scheduler
//!
//! ## Design
//!
//! - **Two disciplines**: round-robin (one FIFO) and strict priority
//!   (one FIFO per priority, scanned highest first). Tie-break within a
//!   priority is FIFO. No ageing; lower priorities may starve.
//! - **Determinism first**: same calls in the same order produce the
//!   same schedule.
//! - **State, not execution**: entry functions are stored with the task
//!   but the simulator never runs them on a thread; `schedule` moves
//!   state and stamps accounting only.
//!
//! All operations on unknown ids return `false` or `None`; nothing here
//! panics.

use crate::tcb::TaskControlBlock;
use core_types::{TaskId, TaskPriority, TaskState, TIME_QUANTUM_MS};
use logger::Logger;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::time::Instant;

const COMPONENT: &str = "Scheduler";

/// A task body. Stored for bookkeeping; the simulator tracks task state,
/// not task execution.
pub type TaskEntry = Box<dyn FnMut() + Send>;

/// Ready-queue discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerType {
    RoundRobin,
    Priority,
}

impl SchedulerType {
    fn label(&self) -> &'static str {
        match self {
            SchedulerType::RoundRobin => "Round-Robin",
            SchedulerType::Priority => "Priority",
        }
    }
}

/// Owns every task control block and decides who runs next
pub struct Scheduler {
    scheduler_type: SchedulerType,
    next_task_id: u32,
    current: Option<TaskId>,

    tasks: BTreeMap<TaskId, TaskControlBlock>,
    entries: BTreeMap<TaskId, TaskEntry>,

    ready_queue: VecDeque<TaskId>,
    priority_queues: BTreeMap<TaskPriority, VecDeque<TaskId>>,

    tick_count: u64,
    log: Logger,
}

impl Scheduler {
    /// Creates an empty scheduler; task ids start at 1
    pub fn new(scheduler_type: SchedulerType, log: Logger) -> Self {
        log.info(
            COMPONENT,
            &format!(
                "Initializing scheduler with {} algorithm",
                scheduler_type.label()
            ),
        );
        Self {
            scheduler_type,
            next_task_id: 1,
            current: None,
            tasks: BTreeMap::new(),
            entries: BTreeMap::new(),
            ready_queue: VecDeque::new(),
            priority_queues: BTreeMap::new(),
            tick_count: 0,
            log,
        }
    }

    /// Creates a task in `Ready` and enqueues it. Never fails.
    pub fn create_task(&mut self, name: &str, entry: TaskEntry, priority: TaskPriority) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;

        let mut tcb = TaskControlBlock::new(id, name, priority);
        tcb.state = TaskState::Ready;
        self.tasks.insert(id, tcb);
        self.entries.insert(id, entry);

        self.add_to_ready_queue(id);

        self.log.info(
            COMPONENT,
            &format!(
                "Created task '{}' with {} (Priority: {})",
                name, id, priority
            ),
        );
        id
    }

    /// Terminates a task; reschedules immediately if it was current
    pub fn terminate_task(&mut self, id: TaskId) -> bool {
        let Some(tcb) = self.tasks.get_mut(&id) else {
            self.log
                .error(COMPONENT, &format!("Cannot terminate non-existent {}", id));
            return false;
        };

        tcb.state = TaskState::Terminated;
        let name = tcb.name.clone();
        self.remove_from_ready_queue(id);

        self.log
            .info(COMPONENT, &format!("Terminated task '{}' ({})", name, id));

        if self.current == Some(id) {
            self.current = None;
            self.schedule();
        }
        true
    }

    /// Blocks a `Running` or `Ready` task; false in any other state
    pub fn block_task(&mut self, id: TaskId) -> bool {
        let Some(tcb) = self.tasks.get_mut(&id) else {
            return false;
        };
        if tcb.state != TaskState::Running && tcb.state != TaskState::Ready {
            return false;
        }

        tcb.state = TaskState::Blocked;
        let name = tcb.name.clone();
        self.remove_from_ready_queue(id);

        self.log
            .debug(COMPONENT, &format!("Blocked task '{}'", name));

        if self.current == Some(id) {
            self.schedule();
        }
        true
    }

    /// Returns a `Blocked` task to `Ready`; false in any other state
    pub fn unblock_task(&mut self, id: TaskId) -> bool {
        let Some(tcb) = self.tasks.get_mut(&id) else {
            return false;
        };
        if tcb.state != TaskState::Blocked {
            return false;
        }

        tcb.state = TaskState::Ready;
        let name = tcb.name.clone();
        self.add_to_ready_queue(id);

        self.log
            .debug(COMPONENT, &format!("Unblocked task '{}'", name));
        true
    }

    /// Selects the next runnable task and switches to it
    ///
    /// No effect when nothing is runnable or the selection equals the
    /// current task. A still-running current task is demoted to `Ready`
    /// and re-enqueued before the switch.
    pub fn schedule(&mut self) {
        let Some(next) = self.select_next_task() else {
            return;
        };
        if self.current == Some(next) {
            return;
        }

        if let Some(current_id) = self.current {
            let still_running = self
                .tasks
                .get(&current_id)
                .is_some_and(|tcb| tcb.state == TaskState::Running);
            if still_running {
                if let Some(tcb) = self.tasks.get_mut(&current_id) {
                    tcb.state = TaskState::Ready;
                }
                self.add_to_ready_queue(current_id);
            }
        }

        self.context_switch(self.current, next);

        self.current = Some(next);
        if let Some(tcb) = self.tasks.get_mut(&next) {
            tcb.state = TaskState::Running;
            tcb.last_scheduled_time = Instant::now();
            tcb.time_slice_remaining = TIME_QUANTUM_MS;
        }
        self.remove_from_ready_queue(next);
    }

    /// Advances accounting by one millisecond tick
    ///
    /// Decrements the current task's remaining slice and credits its
    /// cpu time; reschedules when the slice reaches zero, or right away
    /// when no task is current.
    pub fn tick(&mut self) {
        self.tick_count += 1;

        let Some(current_id) = self.current else {
            self.schedule();
            return;
        };
        let Some(tcb) = self.tasks.get_mut(&current_id) else {
            self.schedule();
            return;
        };

        if tcb.time_slice_remaining > 0 {
            tcb.time_slice_remaining -= 1;
            tcb.cpu_time_ms += 1;
        }

        if tcb.time_slice_remaining == 0 {
            let name = tcb.name.clone();
            self.log
                .debug(COMPONENT, &format!("Time slice expired for task '{}'", name));
            self.schedule();
        }
    }

    /// Gives up the rest of the current quantum
    pub fn yield_now(&mut self) {
        if let Some(current_id) = self.current {
            if let Some(tcb) = self.tasks.get_mut(&current_id) {
                tcb.time_slice_remaining = 0;
                let name = tcb.name.clone();
                self.log
                    .debug(COMPONENT, &format!("Task '{}' yielded CPU", name));
            }
        }
        self.schedule();
    }

    /// Returns the currently running task's control block
    pub fn current_task(&self) -> Option<&TaskControlBlock> {
        self.tasks.get(&self.current?)
    }

    /// Returns the currently running task's id
    pub fn current_task_id(&self) -> Option<TaskId> {
        self.current
    }

    /// Looks up a task by id
    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks.get(&id)
    }

    /// Looks up a task by id, mutably
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        self.tasks.get_mut(&id)
    }

    /// Returns whether an entry function is registered for `id`
    pub fn entry_registered(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Switches discipline at runtime
    ///
    /// Every task sitting in the old ready structure is re-placed into
    /// the new one, in the order the old discipline would have selected
    /// them.
    pub fn set_scheduler_type(&mut self, scheduler_type: SchedulerType) {
        if self.scheduler_type == scheduler_type {
            return;
        }

        let ready: Vec<TaskId> = match self.scheduler_type {
            SchedulerType::RoundRobin => self.ready_queue.drain(..).collect(),
            SchedulerType::Priority => {
                let mut ids = Vec::new();
                for priority in TaskPriority::DESCENDING {
                    if let Some(queue) = self.priority_queues.get_mut(&priority) {
                        ids.extend(queue.drain(..));
                    }
                }
                ids
            }
        };

        self.scheduler_type = scheduler_type;
        self.log.info(
            COMPONENT,
            &format!("Switched to {} scheduling", scheduler_type.label()),
        );

        for id in ready {
            self.add_to_ready_queue(id);
        }
    }

    /// Returns the active discipline
    pub fn scheduler_type(&self) -> SchedulerType {
        self.scheduler_type
    }

    /// Number of tasks currently enqueued as ready
    pub fn ready_queue_size(&self) -> usize {
        match self.scheduler_type {
            SchedulerType::RoundRobin => self.ready_queue.len(),
            SchedulerType::Priority => self.priority_queues.values().map(VecDeque::len).sum(),
        }
    }

    /// Number of tasks ever created and not reaped (all of them)
    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Total ticks delivered
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Formatted table of every task's state
    pub fn task_table(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Task States ===\n");
        let _ = writeln!(
            out,
            "{:>6} | {:>15} | {:>10} | {:>8} | {:>8}",
            "ID", "Name", "State", "Priority", "CPU(ms)"
        );
        out.push_str(&"-".repeat(60));
        out.push('\n');
        for (id, tcb) in &self.tasks {
            let _ = writeln!(
                out,
                "{:>6} | {:>15} | {:>10} | {:>8} | {:>8}",
                id.as_u32(),
                tcb.name,
                tcb.state.to_string(),
                tcb.priority.to_string(),
                tcb.cpu_time_ms
            );
        }
        out
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Scheduler Report ===\n");
        let _ = writeln!(out, "Type: {}", self.scheduler_type.label());
        let _ = writeln!(out, "Total Tasks: {}", self.tasks.len());
        let _ = writeln!(out, "Ready Queue Size: {}", self.ready_queue_size());
        let _ = writeln!(
            out,
            "Current Task: {}",
            match self.current {
                Some(id) => id.as_u32().to_string(),
                None => "None".to_string(),
            }
        );
        let _ = writeln!(out, "Total Ticks: {}", self.tick_count);
        out
    }

    fn context_switch(&self, from: Option<TaskId>, to: TaskId) {
        let to_name = self
            .tasks
            .get(&to)
            .map(|tcb| tcb.name.clone())
            .unwrap_or_default();
        let from_name = from
            .and_then(|id| self.tasks.get(&id))
            .map(|tcb| tcb.name.clone());
        match from_name {
            Some(from_name) => self.log.debug(
                COMPONENT,
                &format!("Context switch: {} -> {}", from_name, to_name),
            ),
            None => self
                .log
                .debug(COMPONENT, &format!("Context switch: (none) -> {}", to_name)),
        }
    }

    fn select_next_task(&self) -> Option<TaskId> {
        match self.scheduler_type {
            SchedulerType::RoundRobin => self.ready_queue.front().copied(),
            SchedulerType::Priority => {
                for priority in TaskPriority::DESCENDING {
                    if let Some(id) = self
                        .priority_queues
                        .get(&priority)
                        .and_then(|queue| queue.front())
                    {
                        return Some(*id);
                    }
                }
                None
            }
        }
    }

    fn add_to_ready_queue(&mut self, id: TaskId) {
        let Some(priority) = self.tasks.get(&id).map(|tcb| tcb.priority) else {
            return;
        };

        match self.scheduler_type {
            SchedulerType::RoundRobin => {
                if !self.ready_queue.contains(&id) {
                    self.ready_queue.push_back(id);
                }
            }
            SchedulerType::Priority => {
                let queue = self.priority_queues.entry(priority).or_default();
                if !queue.contains(&id) {
                    queue.push_back(id);
                }
            }
        }
    }

    fn remove_from_ready_queue(&mut self, id: TaskId) {
        match self.scheduler_type {
            SchedulerType::RoundRobin => {
                self.ready_queue.retain(|&queued| queued != id);
            }
            SchedulerType::Priority => {
                for queue in self.priority_queues.values_mut() {
                    if let Some(pos) = queue.iter().position(|&queued| queued == id) {
                        queue.remove(pos);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(kind: SchedulerType) -> Scheduler {
        Scheduler::new(kind, Logger::quiet())
    }

    fn noop() -> TaskEntry {
        Box::new(|| {})
    }

    #[test]
    fn test_task_creation() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("test1", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("test2", noop(), TaskPriority::High);

        assert!(id1.is_valid());
        assert!(id2.is_valid());
        assert_ne!(id1, id2);
        assert_eq!(sched.total_tasks(), 2);
        assert!(sched.entry_registered(id1));
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        assert_eq!(
            sched.create_task("a", noop(), TaskPriority::Normal),
            TaskId::new(1)
        );
        assert_eq!(
            sched.create_task("b", noop(), TaskPriority::Normal),
            TaskId::new(2)
        );
    }

    #[test]
    fn test_task_state_transitions() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);
        assert_eq!(sched.task(id).unwrap().state, TaskState::Ready);

        sched.schedule();
        assert_eq!(sched.task(id).unwrap().state, TaskState::Running);

        assert!(sched.block_task(id));
        assert_eq!(sched.task(id).unwrap().state, TaskState::Blocked);

        assert!(sched.unblock_task(id));
        assert_eq!(sched.task(id).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_round_robin_rotation() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("task1", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("task2", noop(), TaskPriority::Normal);
        let id3 = sched.create_task("task3", noop(), TaskPriority::Normal);

        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id1));

        sched.yield_now();
        assert_eq!(sched.current_task_id(), Some(id2));

        sched.yield_now();
        assert_eq!(sched.current_task_id(), Some(id3));

        sched.yield_now();
        assert_eq!(sched.current_task_id(), Some(id1));
    }

    #[test]
    fn test_priority_selection() {
        let mut sched = scheduler(SchedulerType::Priority);
        sched.create_task("low", noop(), TaskPriority::Low);
        let id_normal = sched.create_task("normal", noop(), TaskPriority::Normal);
        let id_high = sched.create_task("high", noop(), TaskPriority::High);

        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id_high));

        sched.terminate_task(id_high);
        assert_eq!(sched.current_task_id(), Some(id_normal));
    }

    #[test]
    fn test_priority_fifo_tie_break() {
        let mut sched = scheduler(SchedulerType::Priority);
        let id1 = sched.create_task("first", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("second", noop(), TaskPriority::Normal);

        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id1));
        sched.yield_now();
        assert_eq!(sched.current_task_id(), Some(id2));
    }

    #[test]
    fn test_termination() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);

        assert!(sched.terminate_task(id));
        assert_eq!(sched.task(id).unwrap().state, TaskState::Terminated);
        assert_eq!(sched.ready_queue_size(), 0);
        // Terminated, not reaped.
        assert_eq!(sched.total_tasks(), 1);
    }

    #[test]
    fn test_terminating_current_reschedules() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("one", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("two", noop(), TaskPriority::Normal);

        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id1));

        sched.terminate_task(id1);
        assert_eq!(sched.current_task_id(), Some(id2));
    }

    #[test]
    fn test_unknown_ids_return_false() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let ghost = TaskId::new(42);
        assert!(!sched.terminate_task(ghost));
        assert!(!sched.block_task(ghost));
        assert!(!sched.unblock_task(ghost));
        assert!(sched.task(ghost).is_none());
    }

    #[test]
    fn test_block_requires_running_or_ready() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);

        assert!(sched.block_task(id));
        // Already blocked.
        assert!(!sched.block_task(id));
        // Unblock only applies to blocked tasks.
        assert!(sched.unblock_task(id));
        assert!(!sched.unblock_task(id));
    }

    #[test]
    fn test_blocking_current_reschedules() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("one", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("two", noop(), TaskPriority::Normal);

        sched.schedule();
        sched.block_task(id1);
        assert_eq!(sched.current_task_id(), Some(id2));
    }

    #[test]
    fn test_quantum_expiry_preempts() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("one", noop(), TaskPriority::Normal);
        let id2 = sched.create_task("two", noop(), TaskPriority::Normal);

        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id1));

        for _ in 0..TIME_QUANTUM_MS {
            sched.tick();
        }
        assert_eq!(sched.current_task_id(), Some(id2));
        assert_eq!(sched.task(id1).unwrap().cpu_time_ms, TIME_QUANTUM_MS as u64);
        assert_eq!(sched.task(id1).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_tick_with_no_current_schedules() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);

        sched.tick();
        assert_eq!(sched.current_task_id(), Some(id));
        assert_eq!(sched.tick_count(), 1);
    }

    #[test]
    fn test_yield_with_no_current_schedules() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);

        // Nothing has run yet; yielding still selects the ready task.
        sched.yield_now();
        assert_eq!(sched.current_task_id(), Some(id));
    }

    #[test]
    fn test_schedule_with_nothing_ready_is_noop() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        sched.schedule();
        assert_eq!(sched.current_task_id(), None);
    }

    #[test]
    fn test_single_task_keeps_running() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("only", noop(), TaskPriority::Normal);

        sched.schedule();
        sched.yield_now();
        // Selection equals current; no effect.
        assert_eq!(sched.current_task_id(), Some(id));
        assert_eq!(sched.task(id).unwrap().state, TaskState::Running);
    }

    #[test]
    fn test_ready_queue_deduplication() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id = sched.create_task("test", noop(), TaskPriority::Normal);

        // Force a second unblock cycle that would re-add the id.
        sched.block_task(id);
        sched.unblock_task(id);
        assert!(!sched.unblock_task(id));
        assert_eq!(sched.ready_queue_size(), 1);
    }

    #[test]
    fn test_discipline_switch_preserves_ready_membership() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        let id1 = sched.create_task("one", noop(), TaskPriority::Low);
        let id2 = sched.create_task("two", noop(), TaskPriority::High);
        let id3 = sched.create_task("three", noop(), TaskPriority::Normal);

        assert_eq!(sched.ready_queue_size(), 3);
        sched.set_scheduler_type(SchedulerType::Priority);
        assert_eq!(sched.ready_queue_size(), 3);

        // The high-priority task wins under the new discipline.
        sched.schedule();
        assert_eq!(sched.current_task_id(), Some(id2));

        sched.set_scheduler_type(SchedulerType::RoundRobin);
        // id2 is running, the other two remain ready.
        assert_eq!(sched.ready_queue_size(), 2);
        sched.yield_now();
        let next = sched.current_task_id().unwrap();
        assert!(next == id1 || next == id3);
    }

    #[test]
    fn test_switch_to_same_discipline_is_noop() {
        let mut sched = scheduler(SchedulerType::RoundRobin);
        sched.create_task("one", noop(), TaskPriority::Normal);
        sched.set_scheduler_type(SchedulerType::RoundRobin);
        assert_eq!(sched.scheduler_type(), SchedulerType::RoundRobin);
        assert_eq!(sched.ready_queue_size(), 1);
    }

    #[test]
    fn test_deterministic_selection() {
        let mut a = scheduler(SchedulerType::RoundRobin);
        let mut b = scheduler(SchedulerType::RoundRobin);

        for sched in [&mut a, &mut b] {
            sched.create_task("x", noop(), TaskPriority::Normal);
            sched.create_task("y", noop(), TaskPriority::Normal);
            sched.schedule();
            sched.yield_now();
        }
        assert_eq!(a.current_task_id(), b.current_task_id());
    }

    #[test]
    fn test_report_contents() {
        let mut sched = scheduler(SchedulerType::Priority);
        sched.create_task("worker", noop(), TaskPriority::Normal);

        let report = sched.report();
        assert!(report.contains("Type: Priority"));
        assert!(report.contains("Total Tasks: 1"));

        let table = sched.task_table();
        assert!(table.contains("worker"));
        assert!(table.contains("Ready"));
    }
}
