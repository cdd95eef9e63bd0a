//! Interrupt controller
//!
//! A descriptor table mapping interrupt numbers to named handlers with
//! per-entry enable flags and trigger counters, gated by a global
//! enable switch. Dispatch is synchronous on the caller's thread.
//!
//! The controller is generic over a context type `C`: handlers receive
//! `&mut C` when triggered. The kernel instantiates it with its
//! subsystem bundle so the timer handler can drive the scheduler
//! without any shared globals.

use core_types::InterruptNumber;
use logger::Logger;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const COMPONENT: &str = "InterruptController";

/// Well-known interrupt vectors
pub mod vector {
    use core_types::InterruptNumber;

    pub const TIMER: InterruptNumber = InterruptNumber::new(0);
    pub const KEYBOARD: InterruptNumber = InterruptNumber::new(1);
    pub const DISK: InterruptNumber = InterruptNumber::new(2);
    pub const NETWORK: InterruptNumber = InterruptNumber::new(3);
    pub const GENERAL_PROTECTION: InterruptNumber = InterruptNumber::new(13);
    pub const PAGE_FAULT: InterruptNumber = InterruptNumber::new(14);
    pub const SYSCALL: InterruptNumber = InterruptNumber::new(128);
}

/// Handler invoked when its interrupt fires
pub type InterruptHandler<C> = Box<dyn FnMut(&mut C, InterruptNumber, &[u8]) + Send>;

/// One registered handler and its dispatch bookkeeping
pub struct InterruptDescriptor<C> {
    pub number: InterruptNumber,
    handler: InterruptHandler<C>,
    pub name: String,
    pub trigger_count: u64,
    pub enabled: bool,
}

/// Dispatches interrupts to registered handlers
pub struct InterruptController<C> {
    handlers: BTreeMap<InterruptNumber, InterruptDescriptor<C>>,
    interrupts_enabled: bool,
    total_interrupts: u64,
    log: Logger,
}

impl<C> InterruptController<C> {
    /// Creates a controller with dispatch globally disabled
    pub fn new(log: Logger) -> Self {
        log.info(COMPONENT, "Initialized interrupt controller");
        Self {
            handlers: BTreeMap::new(),
            interrupts_enabled: false,
            total_interrupts: 0,
            log,
        }
    }

    /// Registers a named handler; false if the vector is taken
    pub fn register_handler(
        &mut self,
        interrupt: InterruptNumber,
        name: &str,
        handler: InterruptHandler<C>,
    ) -> bool {
        if self.handlers.contains_key(&interrupt) {
            self.log.warn(
                COMPONENT,
                &format!("Handler already registered for {}", interrupt),
            );
            return false;
        }

        self.handlers.insert(
            interrupt,
            InterruptDescriptor {
                number: interrupt,
                handler,
                name: name.to_string(),
                trigger_count: 0,
                enabled: true,
            },
        );
        self.log.info(
            COMPONENT,
            &format!("Registered handler '{}' for {}", name, interrupt),
        );
        true
    }

    /// Removes a handler; false if none is registered
    pub fn unregister_handler(&mut self, interrupt: InterruptNumber) -> bool {
        if self.handlers.remove(&interrupt).is_none() {
            return false;
        }
        self.log
            .info(COMPONENT, &format!("Unregistered handler for {}", interrupt));
        true
    }

    /// Fires an interrupt
    ///
    /// Dropped silently when dispatch is globally disabled, no handler
    /// is registered, or the entry is disabled. Otherwise counters are
    /// bumped and the handler runs synchronously with `ctx`.
    pub fn trigger_interrupt(&mut self, ctx: &mut C, interrupt: InterruptNumber, data: &[u8]) {
        if !self.interrupts_enabled {
            self.log.debug(
                COMPONENT,
                &format!("Interrupts disabled, ignoring {}", interrupt),
            );
            return;
        }

        let Some(descriptor) = self.handlers.get_mut(&interrupt) else {
            self.log
                .warn(COMPONENT, &format!("No handler for {}", interrupt));
            return;
        };
        if !descriptor.enabled {
            return;
        }

        self.total_interrupts += 1;
        descriptor.trigger_count += 1;

        self.log.debug(
            COMPONENT,
            &format!("Triggering {} ({})", interrupt, descriptor.name),
        );
        (descriptor.handler)(ctx, interrupt, data);
    }

    /// Enables one vector's dispatch
    pub fn enable_interrupt(&mut self, interrupt: InterruptNumber) {
        if let Some(descriptor) = self.handlers.get_mut(&interrupt) {
            descriptor.enabled = true;
        }
    }

    /// Disables one vector's dispatch
    pub fn disable_interrupt(&mut self, interrupt: InterruptNumber) {
        if let Some(descriptor) = self.handlers.get_mut(&interrupt) {
            descriptor.enabled = false;
        }
    }

    /// Returns whether a vector is registered and enabled
    pub fn is_enabled(&self, interrupt: InterruptNumber) -> bool {
        self.handlers
            .get(&interrupt)
            .is_some_and(|descriptor| descriptor.enabled)
    }

    /// Opens the global dispatch gate
    pub fn enable_interrupts(&mut self) {
        self.interrupts_enabled = true;
        self.log.info(COMPONENT, "Interrupts enabled");
    }

    /// Closes the global dispatch gate
    pub fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
        self.log.info(COMPONENT, "Interrupts disabled");
    }

    /// Returns the global gate state
    pub fn are_interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    /// Total interrupts dispatched
    pub fn total_interrupts(&self) -> u64 {
        self.total_interrupts
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Interrupt Controller Report ===\n");
        let _ = writeln!(
            out,
            "Interrupts Enabled: {}",
            if self.interrupts_enabled { "Yes" } else { "No" }
        );
        let _ = writeln!(out, "Total Interrupts Handled: {}", self.total_interrupts);
        let _ = writeln!(out, "Registered Handlers: {}", self.handlers.len());
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>8} | {:>20} | {:>8} | Count",
            "IRQ", "Name", "Enabled"
        );
        out.push_str(&"-".repeat(55));
        out.push('\n');
        for (number, descriptor) in &self.handlers {
            let _ = writeln!(
                out,
                "{:>8} | {:>20} | {:>8} | {}",
                number.as_u16(),
                descriptor.name,
                if descriptor.enabled { "Yes" } else { "No" },
                descriptor.trigger_count
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        fired: u32,
        last_data: Vec<u8>,
    }

    fn controller() -> InterruptController<Counter> {
        InterruptController::new(Logger::quiet())
    }

    fn counting_handler() -> InterruptHandler<Counter> {
        Box::new(|ctx, _irq, data| {
            ctx.fired += 1;
            ctx.last_data = data.to_vec();
        })
    }

    #[test]
    fn test_register_and_duplicate() {
        let mut ic = controller();
        assert!(ic.register_handler(vector::TIMER, "Timer", counting_handler()));
        assert!(!ic.register_handler(vector::TIMER, "Timer2", counting_handler()));
    }

    #[test]
    fn test_unregister() {
        let mut ic = controller();
        ic.register_handler(vector::TIMER, "Timer", counting_handler());
        assert!(ic.unregister_handler(vector::TIMER));
        assert!(!ic.unregister_handler(vector::TIMER));
    }

    #[test]
    fn test_trigger_invokes_handler_with_context() {
        let mut ic = controller();
        let mut ctx = Counter { fired: 0, last_data: Vec::new() };
        ic.register_handler(vector::TIMER, "Timer", counting_handler());

        ic.enable_interrupts();
        ic.trigger_interrupt(&mut ctx, vector::TIMER, &[1, 2, 3]);

        assert_eq!(ctx.fired, 1);
        assert_eq!(ctx.last_data, vec![1, 2, 3]);
        assert_eq!(ic.total_interrupts(), 1);
    }

    #[test]
    fn test_globally_disabled_drops_silently() {
        let mut ic = controller();
        let mut ctx = Counter { fired: 0, last_data: Vec::new() };
        ic.register_handler(vector::TIMER, "Timer", counting_handler());

        ic.trigger_interrupt(&mut ctx, vector::TIMER, &[]);
        assert_eq!(ctx.fired, 0);
        assert_eq!(ic.total_interrupts(), 0);
    }

    #[test]
    fn test_per_entry_disable() {
        let mut ic = controller();
        let mut ctx = Counter { fired: 0, last_data: Vec::new() };
        ic.register_handler(vector::TIMER, "Timer", counting_handler());
        ic.enable_interrupts();

        ic.disable_interrupt(vector::TIMER);
        assert!(!ic.is_enabled(vector::TIMER));
        ic.trigger_interrupt(&mut ctx, vector::TIMER, &[]);
        assert_eq!(ctx.fired, 0);

        ic.enable_interrupt(vector::TIMER);
        ic.trigger_interrupt(&mut ctx, vector::TIMER, &[]);
        assert_eq!(ctx.fired, 1);
    }

    #[test]
    fn test_unknown_vector_is_dropped() {
        let mut ic = controller();
        let mut ctx = Counter { fired: 0, last_data: Vec::new() };
        ic.enable_interrupts();
        ic.trigger_interrupt(&mut ctx, vector::NETWORK, &[]);
        assert_eq!(ic.total_interrupts(), 0);
    }

    #[test]
    fn test_trigger_counts_per_descriptor() {
        let mut ic = controller();
        let mut ctx = Counter { fired: 0, last_data: Vec::new() };
        ic.register_handler(vector::TIMER, "Timer", counting_handler());
        ic.register_handler(vector::KEYBOARD, "Keyboard", counting_handler());
        ic.enable_interrupts();

        for _ in 0..3 {
            ic.trigger_interrupt(&mut ctx, vector::TIMER, &[]);
        }
        ic.trigger_interrupt(&mut ctx, vector::KEYBOARD, &[]);

        assert_eq!(ic.total_interrupts(), 4);
        let report = ic.report();
        assert!(report.contains("Timer"));
        assert!(report.contains("Keyboard"));
    }

    #[test]
    fn test_is_enabled_for_unknown_vector() {
        let ic = controller();
        assert!(!ic.is_enabled(vector::DISK));
    }
}
