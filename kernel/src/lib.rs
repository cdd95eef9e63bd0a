//! # Osmium Kernel
//!
//! An educational, in-process simulation of a microkernel. The
//! simulator runs as an ordinary user program: it models the lifecycles
//! and interactions of kernel subsystems without touching hardware.
//!
//! ## Philosophy
//!
//! - **Runs under `cargo test`**: every subsystem is an ordinary value
//!   constructed by whoever needs it; tests build isolated instances.
//! - **Deterministic**: counters instead of random ids, first-fit scans
//!   instead of heuristics, explicit ticks instead of wall-clock races.
//! - **Inspectable**: every subsystem renders a report; the kernel
//!   aggregates them.
//!
//! ## Structure
//!
//! [`Kernel`] owns a [`KernelServices`] bundle (scheduler, memory
//! manager, file system, IPC manager, driver manager) and an
//! [`InterruptController`] instantiated over that bundle, so interrupt
//! handlers can reach the subsystems without globals. A periodic timer
//! tick drives scheduler preemption through the controller.

pub mod drivers;
pub mod fs;
pub mod heap;
pub mod interrupt;
pub mod memory;
pub mod scheduler;
pub mod syscall;
pub mod tcb;

pub use drivers::{Driver, DriverError, DriverKind, DriverManager, KeyboardDriver, TimerDriver};
pub use fs::{FileSystem, FileType, FsError, OpenMode};
pub use heap::{HeapAllocator, BLOCK_HEADER_SIZE};
pub use interrupt::{vector, InterruptController, InterruptHandler};
pub use memory::{MemoryManager, PageTable, PageTableEntry};
pub use scheduler::{Scheduler, SchedulerType, TaskEntry};
pub use syscall::{Syscall, SyscallOutcome};
pub use tcb::TaskControlBlock;

use core_types::{InterruptNumber, TaskPriority, TIME_QUANTUM_MS};
use ipc::IpcManager;
use logger::Logger;
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const COMPONENT: &str = "Kernel";

/// Kernel name reported in banners and logs.
pub const KERNEL_NAME: &str = "Osmium";
/// Kernel version reported in banners and logs.
pub const KERNEL_VERSION: &str = "0.1.0";

/// Lifecycle of the kernel itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Uninitialized,
    Booting,
    Running,
    Halting,
    Halted,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelState::Uninitialized => "Uninitialized",
            KernelState::Booting => "Booting",
            KernelState::Running => "Running",
            KernelState::Halting => "Halting",
            KernelState::Halted => "Halted",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the kernel façade
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel already booted")]
    AlreadyBooted,
    #[error("kernel is not in a runnable state")]
    NotRunning,
    #[error("driver initialization failed")]
    DriverInitFailed,
    #[error("no current task")]
    NoCurrentTask,
    #[error("page allocation failed for {0}")]
    AllocationFailed(String),
    #[error("page free failed for {0}")]
    FreeFailed(String),
    #[error("send failed to {0}")]
    SendFailed(String),
    #[error(transparent)]
    FileSystem(#[from] FsError),
}

/// The subsystem bundle interrupt handlers operate on
pub struct KernelServices {
    pub scheduler: Scheduler,
    pub memory: MemoryManager,
    pub fs: FileSystem,
    pub ipc: IpcManager,
    pub drivers: DriverManager,
}

/// The kernel façade: owns every subsystem and the main loop
pub struct Kernel {
    pub(crate) services: KernelServices,
    interrupts: InterruptController<KernelServices>,
    state: KernelState,
    running: Arc<AtomicBool>,
    boot_time: Option<Instant>,
    tick_count: u64,
    log: Logger,
}

impl Kernel {
    /// Constructs an unbooted kernel; subsystems are ready, drivers and
    /// interrupt handlers are wired at boot
    pub fn new(log: Logger) -> Self {
        Self {
            services: KernelServices {
                scheduler: Scheduler::new(SchedulerType::RoundRobin, log.clone()),
                memory: MemoryManager::new(log.clone()),
                fs: FileSystem::new(log.clone()),
                ipc: IpcManager::new(log.clone()),
                drivers: DriverManager::new(log.clone()),
            },
            interrupts: InterruptController::new(log.clone()),
            state: KernelState::Uninitialized,
            running: Arc::new(AtomicBool::new(false)),
            boot_time: None,
            tick_count: 0,
            log,
        }
    }

    /// Boots the kernel: drivers, interrupt handlers, idle task
    pub fn boot(&mut self) -> Result<(), KernelError> {
        if self.state != KernelState::Uninitialized {
            self.log.error(COMPONENT, "Kernel already booted");
            return Err(KernelError::AlreadyBooted);
        }

        self.state = KernelState::Booting;
        self.boot_time = Some(Instant::now());

        self.log.info(COMPONENT, "========================================");
        self.log
            .info(COMPONENT, &format!("  {} v{}", KERNEL_NAME, KERNEL_VERSION));
        self.log.info(COMPONENT, "  Mini Microkernel Operating System");
        self.log.info(COMPONENT, "========================================");
        self.log.info(COMPONENT, "Starting boot sequence...");

        self.services
            .drivers
            .register_driver(Box::new(TimerDriver::new(self.log.clone())));
        self.services
            .drivers
            .register_driver(Box::new(KeyboardDriver::new(self.log.clone())));
        if !self.services.drivers.init_all() {
            self.log.critical(COMPONENT, "Failed to initialize drivers");
            self.state = KernelState::Halted;
            return Err(KernelError::DriverInitFailed);
        }

        self.setup_interrupt_handlers();
        self.create_idle_task();

        self.state = KernelState::Running;
        self.running.store(true, Ordering::SeqCst);

        self.log.info(COMPONENT, "Boot complete. System ready.");
        self.log.info(COMPONENT, "========================================");
        Ok(())
    }

    fn setup_interrupt_handlers(&mut self) {
        self.log.info(COMPONENT, "Setting up interrupt handlers...");

        self.interrupts.register_handler(
            vector::TIMER,
            "Timer",
            Box::new(|services, _irq, _data| {
                services.scheduler.tick();
            }),
        );

        let log = self.log.clone();
        self.interrupts.register_handler(
            vector::KEYBOARD,
            "Keyboard",
            Box::new(move |_services, _irq, _data| {
                log.debug(COMPONENT, "Keyboard interrupt received");
            }),
        );

        let log = self.log.clone();
        self.interrupts.register_handler(
            vector::SYSCALL,
            "SystemCall",
            Box::new(move |_services, _irq, _data| {
                log.debug(COMPONENT, "System call interrupt");
            }),
        );

        let log = self.log.clone();
        self.interrupts.register_handler(
            vector::PAGE_FAULT,
            "PageFault",
            Box::new(move |_services, _irq, _data| {
                log.warn(COMPONENT, "Page fault occurred");
            }),
        );

        self.log.info(COMPONENT, "Interrupt handlers configured");
    }

    fn create_idle_task(&mut self) {
        self.log.info(COMPONENT, "Creating idle task...");
        let idle = self
            .services
            .scheduler
            .create_task("idle", Box::new(|| {}), TaskPriority::Idle);
        self.services.ipc.register_task(idle);
        self.services.memory.create_address_space(idle);
    }

    /// Enables interrupts and runs the main loop until halted
    pub fn run(&mut self) -> Result<(), KernelError> {
        if self.state != KernelState::Running {
            self.log
                .error(COMPONENT, "Cannot run: kernel not in running state");
            return Err(KernelError::NotRunning);
        }

        self.log.info(COMPONENT, "Entering main kernel loop");
        self.interrupts.enable_interrupts();
        self.main_loop();
        Ok(())
    }

    /// One timer tick is emitted per quantum; between ticks the loop
    /// sleeps briefly. This is the only suspension point in the kernel.
    fn main_loop(&mut self) {
        let tick_interval = Duration::from_millis(TIME_QUANTUM_MS as u64);
        let mut next_tick = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= next_tick {
                self.tick_count += 1;

                if let Some(timer) = self
                    .services
                    .drivers
                    .get_mut("timer")
                    .and_then(|driver| driver.as_any_mut().downcast_mut::<TimerDriver>())
                {
                    timer.tick();
                }

                self.interrupts
                    .trigger_interrupt(&mut self.services, vector::TIMER, &[]);

                next_tick = now + tick_interval;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Requests the main loop to stop
    pub fn halt(&mut self) {
        self.log.info(COMPONENT, "Halting kernel...");
        self.state = KernelState::Halting;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Halts, masks interrupts, and shuts down drivers
    pub fn shutdown(&mut self) {
        self.log.info(COMPONENT, "Shutting down...");
        self.halt();
        self.interrupts.disable_interrupts();
        self.services.drivers.shutdown_all();
        self.log.info(COMPONENT, "Shutdown complete");
        self.state = KernelState::Halted;
    }

    /// Catastrophic-invariant hook: log, mask interrupts, halt
    pub fn panic(&mut self, message: &str) {
        self.log.critical(COMPONENT, "!!! KERNEL PANIC !!!");
        self.log.critical(COMPONENT, message);
        self.interrupts.disable_interrupts();
        eprintln!("\n*** KERNEL PANIC ***\n{}\nSystem halted.", message);
        self.state = KernelState::Halted;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Shared flag the main loop polls; clearing it stops `run`
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Fires an interrupt against the subsystem bundle
    pub fn trigger_interrupt(&mut self, interrupt: InterruptNumber, data: &[u8]) {
        self.interrupts
            .trigger_interrupt(&mut self.services, interrupt, data);
    }

    /// Opens the global interrupt gate
    pub fn enable_interrupts(&mut self) {
        self.interrupts.enable_interrupts();
    }

    /// Closes the global interrupt gate
    pub fn disable_interrupts(&mut self) {
        self.interrupts.disable_interrupts();
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    /// Milliseconds since boot
    pub fn uptime_ms(&self) -> u64 {
        self.boot_time
            .map_or(0, |booted| booted.elapsed().as_millis() as u64)
    }

    /// Main-loop ticks emitted
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.services.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.services.scheduler
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.services.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryManager {
        &mut self.services.memory
    }

    pub fn fs(&self) -> &FileSystem {
        &self.services.fs
    }

    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.services.fs
    }

    pub fn ipc(&self) -> &IpcManager {
        &self.services.ipc
    }

    pub fn drivers(&self) -> &DriverManager {
        &self.services.drivers
    }

    pub fn drivers_mut(&mut self) -> &mut DriverManager {
        &mut self.services.drivers
    }

    pub fn interrupts(&self) -> &InterruptController<KernelServices> {
        &self.interrupts
    }

    /// Name, version, state, uptime, tick count
    pub fn system_info(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} v{}", KERNEL_NAME, KERNEL_VERSION);
        let _ = writeln!(out, "State: {}", self.state);
        let _ = writeln!(out, "Uptime: {} ms", self.uptime_ms());
        let _ = writeln!(out, "Tick Count: {}", self.tick_count);
        out
    }

    /// Aggregated report across every subsystem
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("\n==============================================================\n");
        out.push_str("                    OSMIUM KERNEL REPORT\n");
        out.push_str("==============================================================\n\n");
        out.push_str(&self.system_info());
        out.push('\n');
        out.push_str(&self.services.scheduler.report());
        out.push('\n');
        out.push_str(&self.services.memory.report());
        out.push('\n');
        out.push_str(&self.services.fs.report());
        out.push('\n');
        out.push_str(&self.services.ipc.report());
        out.push('\n');
        out.push_str(&self.services.drivers.report());
        out.push('\n');
        out.push_str(&self.interrupts.report());
        out
    }
}
