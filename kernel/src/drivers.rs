//! Simulated device drivers
//!
//! Drivers expose the capability set {init, shutdown, read, write,
//! ioctl} through the [`Driver`] trait; the manager stores owned
//! instances keyed by name. Concrete types are recovered through the
//! standard `Any` downcast hooks when a caller needs device-specific
//! methods.

use logger::Logger;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::io::Write as _;
use std::time::Instant;
use thiserror::Error;

/// Broad device category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Character,
    Block,
    Network,
}

impl DriverKind {
    fn label(&self) -> &'static str {
        match self {
            DriverKind::Character => "Character",
            DriverKind::Block => "Block",
            DriverKind::Network => "Network",
        }
    }
}

/// Errors surfaced by driver operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver is not initialized")]
    NotInitialized,
    #[error("operation not supported")]
    Unsupported,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("invalid ioctl request {0}")]
    InvalidRequest(u32),
}

/// The capability set every simulated device implements
pub trait Driver: Any + Send {
    fn name(&self) -> &str;
    fn kind(&self) -> DriverKind;
    fn is_initialized(&self) -> bool;

    /// Brings the device up; false if already initialized
    fn init(&mut self) -> bool;
    /// Takes the device down; false if not initialized
    fn shutdown(&mut self) -> bool;

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, DriverError>;
    fn write(&mut self, buffer: &[u8]) -> Result<usize, DriverError>;
    fn ioctl(&mut self, command: u32, arg: u32) -> Result<(), DriverError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Simulated keyboard with a bounded input queue and echo
pub struct KeyboardDriver {
    initialized: bool,
    input_buffer: VecDeque<u8>,
    echo_enabled: bool,
    log: Logger,
}

impl KeyboardDriver {
    const BUFFER_SIZE: usize = 256;

    /// Ioctl: set echo on (`arg != 0`) or off
    pub const IOCTL_SET_ECHO: u32 = 0;
    /// Ioctl: discard buffered input
    pub const IOCTL_FLUSH: u32 = 1;

    pub fn new(log: Logger) -> Self {
        Self {
            initialized: false,
            input_buffer: VecDeque::new(),
            echo_enabled: true,
            log,
        }
    }

    /// Feeds one key into the buffer, echoing when enabled
    pub fn simulate_key_press(&mut self, key: u8) {
        if !self.initialized {
            return;
        }
        if self.input_buffer.len() < Self::BUFFER_SIZE {
            self.input_buffer.push_back(key);
            if self.echo_enabled {
                print!("{}", key as char);
                let _ = std::io::stdout().flush();
            }
        }
    }

    /// Feeds a whole string of keys
    pub fn simulate_key_sequence(&mut self, sequence: &str) {
        for key in sequence.bytes() {
            self.simulate_key_press(key);
        }
    }

    /// Returns whether buffered input is waiting
    pub fn has_input(&self) -> bool {
        !self.input_buffer.is_empty()
    }
}

impl Driver for KeyboardDriver {
    fn name(&self) -> &str {
        "keyboard"
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Character
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn init(&mut self) -> bool {
        if self.initialized {
            return false;
        }
        self.input_buffer.clear();
        self.initialized = true;
        self.log.info("KeyboardDriver", "Keyboard driver initialized");
        true
    }

    fn shutdown(&mut self) -> bool {
        if !self.initialized {
            return false;
        }
        self.input_buffer.clear();
        self.initialized = false;
        self.log.info("KeyboardDriver", "Keyboard driver shut down");
        true
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        let mut bytes_read = 0;
        while bytes_read < buffer.len() {
            let Some(key) = self.input_buffer.pop_front() else {
                break;
            };
            buffer[bytes_read] = key;
            bytes_read += 1;
        }
        Ok(bytes_read)
    }

    fn write(&mut self, _buffer: &[u8]) -> Result<usize, DriverError> {
        Err(DriverError::Unsupported)
    }

    fn ioctl(&mut self, command: u32, arg: u32) -> Result<(), DriverError> {
        match command {
            Self::IOCTL_SET_ECHO => {
                self.echo_enabled = arg != 0;
                Ok(())
            }
            Self::IOCTL_FLUSH => {
                self.input_buffer.clear();
                Ok(())
            }
            other => Err(DriverError::InvalidRequest(other)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Simulated periodic timer advanced by the kernel loop
pub struct TimerDriver {
    initialized: bool,
    tick_count: u64,
    frequency_hz: u32,
    start_time: Instant,
    log: Logger,
}

impl TimerDriver {
    /// Ioctl: set frequency to `arg` Hz
    pub const IOCTL_SET_FREQUENCY: u32 = 0;
    /// Ioctl: reset the tick counter
    pub const IOCTL_RESET: u32 = 1;

    pub fn new(log: Logger) -> Self {
        Self {
            initialized: false,
            tick_count: 0,
            frequency_hz: 100,
            start_time: Instant::now(),
            log,
        }
    }

    /// Advances the counter by one tick
    pub fn tick(&mut self) {
        if self.initialized {
            self.tick_count += 1;
        }
    }

    /// Ticks delivered since init
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Wall-clock milliseconds since init
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Sets the nominal frequency; values outside 1..=10000 Hz are ignored
    pub fn set_frequency(&mut self, hz: u32) {
        if (1..=10_000).contains(&hz) {
            self.frequency_hz = hz;
            self.log
                .info("TimerDriver", &format!("Frequency set to {} Hz", hz));
        }
    }

    /// Returns the nominal frequency
    pub fn frequency(&self) -> u32 {
        self.frequency_hz
    }
}

impl Driver for TimerDriver {
    fn name(&self) -> &str {
        "timer"
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Character
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn init(&mut self) -> bool {
        if self.initialized {
            return false;
        }
        self.tick_count = 0;
        self.start_time = Instant::now();
        self.initialized = true;
        self.log.info(
            "TimerDriver",
            &format!("Timer driver initialized at {} Hz", self.frequency_hz),
        );
        true
    }

    fn shutdown(&mut self) -> bool {
        if !self.initialized {
            return false;
        }
        self.initialized = false;
        self.log.info("TimerDriver", "Timer driver shut down");
        true
    }

    /// Copies the tick count into the first eight bytes of `buffer`
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        if buffer.len() < 8 {
            return Err(DriverError::BufferTooSmall);
        }
        buffer[..8].copy_from_slice(&self.tick_count.to_le_bytes());
        Ok(8)
    }

    fn write(&mut self, _buffer: &[u8]) -> Result<usize, DriverError> {
        Err(DriverError::Unsupported)
    }

    fn ioctl(&mut self, command: u32, arg: u32) -> Result<(), DriverError> {
        match command {
            Self::IOCTL_SET_FREQUENCY => {
                self.set_frequency(arg);
                Ok(())
            }
            Self::IOCTL_RESET => {
                self.tick_count = 0;
                self.start_time = Instant::now();
                Ok(())
            }
            other => Err(DriverError::InvalidRequest(other)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Registry of owned drivers keyed by name
pub struct DriverManager {
    drivers: BTreeMap<String, Box<dyn Driver>>,
    log: Logger,
}

impl DriverManager {
    pub fn new(log: Logger) -> Self {
        log.info("DriverManager", "Initialized driver manager");
        Self {
            drivers: BTreeMap::new(),
            log,
        }
    }

    /// Takes ownership of a driver; false if the name is taken
    pub fn register_driver(&mut self, driver: Box<dyn Driver>) -> bool {
        let name = driver.name().to_string();
        if self.drivers.contains_key(&name) {
            self.log
                .warn("DriverManager", &format!("Driver already registered: {}", name));
            return false;
        }
        self.drivers.insert(name.clone(), driver);
        self.log
            .info("DriverManager", &format!("Registered driver: {}", name));
        true
    }

    /// Shuts down (if needed) and drops a driver
    pub fn unregister_driver(&mut self, name: &str) -> bool {
        let Some(mut driver) = self.drivers.remove(name) else {
            return false;
        };
        if driver.is_initialized() {
            driver.shutdown();
        }
        self.log
            .info("DriverManager", &format!("Unregistered driver: {}", name));
        true
    }

    /// Borrows a driver by name
    pub fn get(&self, name: &str) -> Option<&dyn Driver> {
        self.drivers.get(name).map(|driver| driver.as_ref())
    }

    /// Mutably borrows a driver by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Driver>> {
        self.drivers.get_mut(name)
    }

    /// Names of all registered drivers
    pub fn driver_list(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Initializes every uninitialized driver; false if any failed
    pub fn init_all(&mut self) -> bool {
        let mut success = true;
        for (name, driver) in self.drivers.iter_mut() {
            if !driver.is_initialized() && !driver.init() {
                self.log.error(
                    "DriverManager",
                    &format!("Failed to initialize driver: {}", name),
                );
                success = false;
            }
        }
        success
    }

    /// Shuts down every initialized driver; false if any failed
    pub fn shutdown_all(&mut self) -> bool {
        let mut success = true;
        for (name, driver) in self.drivers.iter_mut() {
            if driver.is_initialized() && !driver.shutdown() {
                self.log.error(
                    "DriverManager",
                    &format!("Failed to shut down driver: {}", name),
                );
                success = false;
            }
        }
        success
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Driver Manager Report ===\n");
        let _ = writeln!(out, "Registered Drivers: {}", self.drivers.len());
        out.push('\n');
        let _ = writeln!(out, "{:>15} | {:>10} | Initialized", "Name", "Type");
        out.push_str(&"-".repeat(45));
        out.push('\n');
        for (name, driver) in &self.drivers {
            let _ = writeln!(
                out,
                "{:>15} | {:>10} | {}",
                name,
                driver.kind().label(),
                if driver.is_initialized() { "Yes" } else { "No" }
            );
        }
        out
    }
}
