//! # Osmium Daemon
//!
//! Boots the simulated kernel, walks through one demonstration per
//! subsystem, prints the kernel report, then runs the main loop until
//! SIGINT/SIGTERM or a ten-quantum watchdog stops it. The log history
//! is dumped to `kernel.log` on the way out.

use core_types::{PageNumber, Protection, TaskId, TaskPriority, TIME_QUANTUM_MS};
use ipc::MessageKind;
use kernel::{Driver, Kernel, KeyboardDriver, OpenMode, TimerDriver};
use logger::{LogLevel, Logger};
use serde::{Deserialize, Serialize};
use std::process;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

const BANNER: &str = r#"
   ___                  _
  / _ \  ___  _ __ ___ (_) _   _  _ __ ___
 | | | |/ __|| '_ ` _ \| || | | || '_ ` _ \
 | |_| |\__ \| | | | | | || |_| || | | | | |
  \___/ |___/|_| |_| |_|_| \__,_||_| |_| |_|

    Mini Microkernel Operating System
    Educational Simulation in Rust
"#;

/// How many quanta the watchdog lets the main loop run before stopping.
const DEMO_QUANTA: u64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct DemoMessage {
    kind: i32,
    value: i32,
    text: String,
}

fn main() {
    let log = Logger::new();
    log.set_level(LogLevel::Info);

    println!("{}", BANNER);

    let mut kernel = Kernel::new(log.clone());
    if let Err(error) = kernel.boot() {
        eprintln!("Failed to boot kernel: {}", error);
        process::exit(1);
    }

    demonstrate_scheduler(&mut kernel, &log);
    demonstrate_memory(&mut kernel);
    demonstrate_filesystem(&mut kernel);
    demonstrate_ipc(&mut kernel, &log);
    demonstrate_drivers(&mut kernel, &log);

    println!("{}", kernel.report());

    println!("\n=== Running Main Loop (press Ctrl+C to exit) ===");
    println!("The kernel is now running. Simulating time slices...\n");

    let running = kernel.running_handle();
    let signal_flag = running.clone();
    if let Err(error) = ctrlc::set_handler(move || {
        println!("\nReceived termination signal, initiating shutdown...");
        signal_flag.store(false, Ordering::SeqCst);
    }) {
        log.warn("Main", &format!("Could not install signal handler: {}", error));
    }

    let watchdog_flag = running.clone();
    let watchdog_log = log.clone();
    let watchdog = thread::spawn(move || {
        for i in 0..DEMO_QUANTA {
            if !watchdog_flag.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(TIME_QUANTUM_MS as u64));
            watchdog_log.info("Main", &format!("System running... tick {}", i + 1));
        }
        watchdog_flag.store(false, Ordering::SeqCst);
    });

    if let Err(error) = kernel.run() {
        eprintln!("Kernel loop error: {}", error);
    }
    let _ = watchdog.join();

    kernel.shutdown();

    if let Err(error) = log.dump_to_file("kernel.log") {
        eprintln!("Could not write kernel.log: {}", error);
    }

    println!("\n=== Osmium Terminated ===");
}

fn demonstrate_scheduler(kernel: &mut Kernel, log: &Logger) {
    println!("\n=== Scheduler Demonstration ===");

    let worker_log = log.clone();
    kernel.scheduler_mut().create_task(
        "worker1",
        Box::new(move || worker_log.info("worker1", "Executing work...")),
        TaskPriority::Normal,
    );
    let worker_log = log.clone();
    kernel.scheduler_mut().create_task(
        "worker2",
        Box::new(move || worker_log.info("worker2", "Processing data...")),
        TaskPriority::High,
    );
    let worker_log = log.clone();
    kernel.scheduler_mut().create_task(
        "background",
        Box::new(move || worker_log.info("background", "Background task running...")),
        TaskPriority::Low,
    );

    for _ in 0..5 {
        kernel.scheduler_mut().schedule();
        kernel.scheduler_mut().tick();
    }

    println!("{}", kernel.scheduler().task_table());
}

fn demonstrate_memory(kernel: &mut Kernel) {
    println!("\n=== Memory Management Demonstration ===");

    let demo_task = TaskId::new(100);
    let memory = kernel.memory_mut();
    memory.create_address_space(demo_task);

    for (page, protection) in [
        (0, Protection::READ_WRITE),
        (1, Protection::READ),
        (2, Protection::READ_WRITE),
    ] {
        if memory
            .allocate_page(demo_task, PageNumber::new(page), protection)
            .is_some()
        {
            println!("Allocated page {}", page);
        }
    }

    println!("{}", memory.memory_map(demo_task));
    println!("{}", memory.report());

    memory.free_page(demo_task, PageNumber::new(1));
    memory.destroy_address_space(demo_task);
}

fn demonstrate_filesystem(kernel: &mut Kernel) {
    println!("\n=== File System Demonstration ===");

    let owner = TaskId::new(0);
    let fs = kernel.fs_mut();
    let _ = fs.create_directory("/home", owner);
    let _ = fs.create_directory("/home/user", owner);
    let _ = fs.create_file("/home/user/hello.txt", owner);

    match fs.open(
        "/home/user/hello.txt",
        OpenMode::READ_WRITE | OpenMode::CREATE,
        owner,
    ) {
        Ok(fd) => {
            let message = b"Hello from Osmium!";
            let _ = fs.write(fd, message);
            let _ = fs.seek(fd, 0);

            let mut buffer = [0u8; 256];
            if let Ok(read) = fs.read(fd, &mut buffer) {
                println!(
                    "Read from file: {}",
                    String::from_utf8_lossy(&buffer[..read])
                );
            }
            let _ = fs.close(fd);
        }
        Err(error) => println!("Could not open demo file: {}", error),
    }

    println!("\nDirectory Tree:");
    println!("{}", fs.directory_tree("/"));
    println!("{}", fs.report());
}

fn demonstrate_ipc(kernel: &mut Kernel, log: &Logger) {
    println!("\n=== IPC Demonstration ===");

    let sender = TaskId::new(10);
    let receiver = TaskId::new(11);
    let ipc = kernel.ipc();
    ipc.register_task(sender);
    ipc.register_task(receiver);

    let first = DemoMessage {
        kind: 1,
        value: 42,
        text: "Hello from sender!".to_string(),
    };
    if let Ok(payload) = serde_json::to_vec(&first) {
        ipc.send_message(sender, receiver, &payload, MessageKind::Data, false);
    }

    let second = DemoMessage {
        kind: 2,
        value: 100,
        text: "Second message".to_string(),
    };
    if let Ok(payload) = serde_json::to_vec(&second) {
        ipc.send_async(sender, receiver, &payload, MessageKind::Data);
    }

    log.info(
        "Demo",
        &format!(
            "Messages pending for receiver: {}",
            ipc.message_count(receiver)
        ),
    );

    while let Some(message) = ipc.receive_message(receiver, false) {
        if let Ok(data) = serde_json::from_slice::<DemoMessage>(&message.payload) {
            log.info(
                "Demo",
                &format!(
                    "Received: kind={}, value={}, text={}",
                    data.kind, data.value, data.text
                ),
            );
        }
    }

    println!("{}", ipc.report());
}

fn demonstrate_drivers(kernel: &mut Kernel, log: &Logger) {
    println!("\n=== Driver Demonstration ===");

    if let Some(keyboard) = kernel
        .drivers_mut()
        .get_mut("keyboard")
        .and_then(|driver| driver.as_any_mut().downcast_mut::<KeyboardDriver>())
    {
        keyboard.simulate_key_sequence("Osmium>");
        println!();

        let mut buffer = [0u8; 64];
        if let Ok(read) = keyboard.read(&mut buffer) {
            log.info(
                "Demo",
                &format!("Read from keyboard: {}", String::from_utf8_lossy(&buffer[..read])),
            );
        }
    }

    if let Some(timer) = kernel
        .drivers_mut()
        .get_mut("timer")
        .and_then(|driver| driver.as_any_mut().downcast_mut::<TimerDriver>())
    {
        log.info(
            "Demo",
            &format!("Timer tick count: {}", timer.tick_count()),
        );
        log.info(
            "Demo",
            &format!("Elapsed time: {} ms", timer.elapsed_ms()),
        );
    }

    println!("{}", kernel.drivers().report());
    println!("{}", kernel.interrupts().report());
}
