//! Typed syscall dispatch
//!
//! User requests are expressed as a typed enum rather than raw register
//! words; the kernel resolves them against the current task. This keeps
//! the dispatch façade thin and makes every argument checkable.

use crate::fs::OpenMode;
use crate::{Kernel, KernelError};
use core_types::{
    FileDescriptor, MessageId, PageNumber, PhysicalAddress, Protection, TaskId, TaskPriority,
};
use ipc::{Message, MessageKind};

/// A request from the current task
#[derive(Debug)]
pub enum Syscall {
    Exit { code: i32 },
    Yield,
    GetPid,
    CreateTask { name: String, priority: TaskPriority },
    Allocate { page: PageNumber },
    Free { page: PageNumber },
    Send { receiver: TaskId, payload: Vec<u8> },
    Receive,
    Open { path: String, mode: OpenMode },
    Close { fd: FileDescriptor },
    Read { fd: FileDescriptor, len: usize },
    Write { fd: FileDescriptor, payload: Vec<u8> },
}

/// What a successful syscall produced
#[derive(Debug)]
pub enum SyscallOutcome {
    Completed,
    Pid(TaskId),
    Task(TaskId),
    Address(PhysicalAddress),
    Sent(MessageId),
    Received(Option<Message>),
    Descriptor(FileDescriptor),
    Data(Vec<u8>),
    Written(usize),
}

impl Kernel {
    fn current_task_id(&self) -> Result<TaskId, KernelError> {
        self.services
            .scheduler
            .current_task_id()
            .ok_or(KernelError::NoCurrentTask)
    }

    /// Executes one syscall on behalf of the current task
    pub fn dispatch_syscall(&mut self, call: Syscall) -> Result<SyscallOutcome, KernelError> {
        match call {
            Syscall::Exit { code } => {
                let current = self.current_task_id()?;
                if let Some(tcb) = self.services.scheduler.task_mut(current) {
                    tcb.exit_code = code;
                }
                self.services.scheduler.terminate_task(current);
                Ok(SyscallOutcome::Completed)
            }

            Syscall::Yield => {
                self.services.scheduler.yield_now();
                Ok(SyscallOutcome::Completed)
            }

            Syscall::GetPid => Ok(SyscallOutcome::Pid(self.current_task_id()?)),

            Syscall::CreateTask { name, priority } => {
                let id = self
                    .services
                    .scheduler
                    .create_task(&name, Box::new(|| {}), priority);
                Ok(SyscallOutcome::Task(id))
            }

            Syscall::Allocate { page } => {
                let current = self.current_task_id()?;
                let address = self
                    .services
                    .memory
                    .allocate_page(current, page, Protection::READ_WRITE)
                    .ok_or_else(|| KernelError::AllocationFailed(format!("{}", page)))?;
                if let Some(tcb) = self.services.scheduler.task_mut(current) {
                    tcb.allocated_pages.insert(page);
                    tcb.memory_usage = self.services.memory.task_memory_usage(current);
                }
                Ok(SyscallOutcome::Address(address))
            }

            Syscall::Free { page } => {
                let current = self.current_task_id()?;
                if !self.services.memory.free_page(current, page) {
                    return Err(KernelError::FreeFailed(format!("{}", page)));
                }
                if let Some(tcb) = self.services.scheduler.task_mut(current) {
                    tcb.allocated_pages.remove(&page);
                    tcb.memory_usage = self.services.memory.task_memory_usage(current);
                }
                Ok(SyscallOutcome::Completed)
            }

            Syscall::Send { receiver, payload } => {
                let current = self.current_task_id()?;
                let id = self.services.ipc.send_message(
                    current,
                    receiver,
                    &payload,
                    MessageKind::Data,
                    false,
                );
                if !id.is_valid() {
                    return Err(KernelError::SendFailed(format!("{}", receiver)));
                }
                Ok(SyscallOutcome::Sent(id))
            }

            Syscall::Receive => {
                let current = self.current_task_id()?;
                Ok(SyscallOutcome::Received(
                    self.services.ipc.receive_message(current, false),
                ))
            }

            Syscall::Open { path, mode } => {
                let current = self.current_task_id()?;
                let fd = self.services.fs.open(&path, mode, current)?;
                if let Some(tcb) = self.services.scheduler.task_mut(current) {
                    tcb.open_files.insert(fd);
                }
                Ok(SyscallOutcome::Descriptor(fd))
            }

            Syscall::Close { fd } => {
                let current = self.current_task_id()?;
                self.services.fs.close(fd)?;
                if let Some(tcb) = self.services.scheduler.task_mut(current) {
                    tcb.open_files.remove(&fd);
                }
                Ok(SyscallOutcome::Completed)
            }

            Syscall::Read { fd, len } => {
                let mut buffer = vec![0; len];
                let read = self.services.fs.read(fd, &mut buffer)?;
                buffer.truncate(read);
                Ok(SyscallOutcome::Data(buffer))
            }

            Syscall::Write { fd, payload } => {
                let written = self.services.fs.write(fd, &payload)?;
                Ok(SyscallOutcome::Written(written))
            }
        }
    }
}
