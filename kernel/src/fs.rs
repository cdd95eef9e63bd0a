//! In-memory file system simulation
//!
//! An inode tree over byte vectors plus a descriptor table. The tree is
//! arena-plus-index: inodes live in one map keyed by number, and parent
//! and child relations are stored as numbers, never references. Owners
//! are recorded on inodes and descriptors but not enforced.

use bitflags::bitflags;
use core_types::{FileDescriptor, InodeNumber, Protection, TaskId};
use logger::Logger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::SystemTime;
use thiserror::Error;

const COMPONENT: &str = "FileSystem";

/// The root directory's inode number.
pub const ROOT_INODE: InodeNumber = InodeNumber::new(1);

bitflags! {
    /// How a file is opened
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OpenMode: u32 {
        const READ = 1;
        const WRITE = 2;
        const APPEND = 4;
        const CREATE = 8;
        const TRUNCATE = 16;

        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Kind of node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
    Device,
}

/// Errors surfaced by file-system operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("parent directory not found for {0}")]
    ParentNotFound(String),
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("cannot delete root directory")]
    RootDeletion,
    #[error("bad file descriptor: {0}")]
    BadDescriptor(FileDescriptor),
    #[error("{0} not opened for {1}")]
    ModeViolation(FileDescriptor, &'static str),
}

/// One node in the tree
#[derive(Debug)]
pub struct Inode {
    pub number: InodeNumber,
    pub file_type: FileType,
    pub name: String,
    pub size: usize,
    pub data: Vec<u8>,

    pub parent: InodeNumber,
    pub children: Vec<InodeNumber>,

    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,

    pub permissions: Protection,
    pub owner: TaskId,
}

impl Inode {
    fn new(number: InodeNumber, file_type: FileType, name: &str, owner: TaskId) -> Self {
        let now = SystemTime::now();
        Self {
            number,
            file_type,
            name: name.to_string(),
            size: 0,
            data: Vec::new(),
            parent: ROOT_INODE,
            children: Vec::new(),
            created: now,
            modified: now,
            accessed: now,
            permissions: Protection::READ_WRITE,
            owner,
        }
    }
}

#[derive(Debug)]
struct FdEntry {
    inode: InodeNumber,
    position: usize,
    mode: OpenMode,
    #[allow(dead_code)]
    owner: TaskId,
}

/// Inode tree and open-descriptor table
pub struct FileSystem {
    inodes: BTreeMap<InodeNumber, Inode>,
    fd_table: BTreeMap<FileDescriptor, FdEntry>,
    next_inode: u32,
    next_fd: u32,
    current_directory: String,
    log: Logger,
}

impl FileSystem {
    /// Creates a file system containing only the root directory
    pub fn new(log: Logger) -> Self {
        let mut inodes = BTreeMap::new();
        let mut root = Inode::new(ROOT_INODE, FileType::Directory, "/", TaskId::new(0));
        root.parent = ROOT_INODE;
        inodes.insert(ROOT_INODE, root);

        log.info(COMPONENT, "Initialized in-memory file system");
        Self {
            inodes,
            fd_table: BTreeMap::new(),
            next_inode: ROOT_INODE.as_u32() + 1,
            next_fd: 0,
            current_directory: "/".to_string(),
            log,
        }
    }

    /// Creates an empty regular file
    pub fn create_file(&mut self, path: &str, owner: TaskId) -> Result<(), FsError> {
        self.create_node(path, FileType::Regular, owner)
    }

    /// Creates an empty directory
    pub fn create_directory(&mut self, path: &str, owner: TaskId) -> Result<(), FsError> {
        self.create_node(path, FileType::Directory, owner)
    }

    fn create_node(&mut self, path: &str, file_type: FileType, owner: TaskId) -> Result<(), FsError> {
        let path = self.normalize_path(path);

        if self.exists(&path) {
            self.log
                .warn(COMPONENT, &format!("Already exists: {}", path));
            return Err(FsError::AlreadyExists(path));
        }

        let parent_number = self
            .parent_of(&path)
            .ok_or_else(|| FsError::ParentNotFound(path.clone()))?;
        if self.inodes[&parent_number].file_type != FileType::Directory {
            self.log
                .error(COMPONENT, &format!("Parent directory not found for: {}", path));
            return Err(FsError::ParentNotFound(path));
        }

        let number = InodeNumber::new(self.next_inode);
        self.next_inode += 1;

        let mut node = Inode::new(number, file_type, &Self::file_name(&path), owner);
        node.parent = parent_number;

        if let Some(parent) = self.inodes.get_mut(&parent_number) {
            parent.children.push(number);
        }
        self.inodes.insert(number, node);

        let label = match file_type {
            FileType::Directory => "directory",
            _ => "file",
        };
        self.log
            .info(COMPONENT, &format!("Created {}: {}", label, path));
        Ok(())
    }

    /// Removes a regular file from the tree
    pub fn delete_file(&mut self, path: &str) -> Result<(), FsError> {
        let path = self.normalize_path(path);
        let number = self
            .find_inode(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;

        if self.inodes[&number].file_type != FileType::Regular {
            return Err(FsError::NotAFile(path));
        }

        self.unlink(number);
        self.log.info(COMPONENT, &format!("Deleted file: {}", path));
        Ok(())
    }

    /// Removes an empty directory; the root is never deletable
    pub fn delete_directory(&mut self, path: &str) -> Result<(), FsError> {
        let path = self.normalize_path(path);
        let number = self
            .find_inode(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;

        let node = &self.inodes[&number];
        if node.file_type != FileType::Directory {
            return Err(FsError::NotADirectory(path));
        }
        if !node.children.is_empty() {
            return Err(FsError::DirectoryNotEmpty(path));
        }
        if number == ROOT_INODE {
            return Err(FsError::RootDeletion);
        }

        self.unlink(number);
        self.log
            .info(COMPONENT, &format!("Deleted directory: {}", path));
        Ok(())
    }

    fn unlink(&mut self, number: InodeNumber) {
        let parent_number = self.inodes[&number].parent;
        if let Some(parent) = self.inodes.get_mut(&parent_number) {
            parent.children.retain(|&child| child != number);
        }
        self.inodes.remove(&number);
    }

    /// Opens a regular file and returns a fresh descriptor
    ///
    /// `CREATE` creates a missing file, `TRUNCATE` discards existing
    /// content, `APPEND` positions at end of file.
    pub fn open(&mut self, path: &str, mode: OpenMode, task: TaskId) -> Result<FileDescriptor, FsError> {
        let path = self.normalize_path(path);

        if mode.contains(OpenMode::CREATE) && !self.exists(&path) {
            self.create_file(&path, task)?;
        }

        let number = self.find_inode(&path).ok_or_else(|| {
            self.log.error(COMPONENT, &format!("Cannot open: {}", path));
            FsError::NotFound(path.clone())
        })?;

        let node = self
            .inodes
            .get_mut(&number)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        if node.file_type != FileType::Regular {
            self.log
                .error(COMPONENT, &format!("Cannot open directory as file: {}", path));
            return Err(FsError::NotAFile(path));
        }

        if mode.contains(OpenMode::TRUNCATE) {
            node.data.clear();
            node.size = 0;
        }
        let position = if mode.contains(OpenMode::APPEND) {
            node.size
        } else {
            0
        };

        let fd = FileDescriptor::new(self.next_fd);
        self.next_fd += 1;
        self.fd_table.insert(
            fd,
            FdEntry {
                inode: number,
                position,
                mode,
                owner: task,
            },
        );

        self.log
            .debug(COMPONENT, &format!("Opened file: {} ({})", path, fd));
        Ok(fd)
    }

    /// Releases a descriptor
    pub fn close(&mut self, fd: FileDescriptor) -> Result<(), FsError> {
        if self.fd_table.remove(&fd).is_none() {
            return Err(FsError::BadDescriptor(fd));
        }
        self.log.debug(COMPONENT, &format!("Closed {}", fd));
        Ok(())
    }

    /// Reads from the descriptor's position into `buffer`
    ///
    /// Returns the number of bytes read; zero at or past end of file.
    /// Reading a descriptor opened without the read bit is a misuse:
    /// logged, error, no state change.
    pub fn read(&mut self, fd: FileDescriptor, buffer: &mut [u8]) -> Result<usize, FsError> {
        let entry = self
            .fd_table
            .get_mut(&fd)
            .ok_or(FsError::BadDescriptor(fd))?;

        if !entry.mode.contains(OpenMode::READ) {
            self.log.error(COMPONENT, "File not opened for reading");
            return Err(FsError::ModeViolation(fd, "reading"));
        }

        let node = self
            .inodes
            .get_mut(&entry.inode)
            .ok_or(FsError::BadDescriptor(fd))?;
        node.accessed = SystemTime::now();

        let available = node.size.saturating_sub(entry.position);
        let to_read = buffer.len().min(available);
        if to_read > 0 {
            buffer[..to_read].copy_from_slice(&node.data[entry.position..entry.position + to_read]);
            entry.position += to_read;
        }
        Ok(to_read)
    }

    /// Writes `data` at the descriptor's position, growing the file
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize, FsError> {
        let entry = self
            .fd_table
            .get_mut(&fd)
            .ok_or(FsError::BadDescriptor(fd))?;

        if !entry.mode.contains(OpenMode::WRITE) {
            self.log.error(COMPONENT, "File not opened for writing");
            return Err(FsError::ModeViolation(fd, "writing"));
        }

        let node = self
            .inodes
            .get_mut(&entry.inode)
            .ok_or(FsError::BadDescriptor(fd))?;

        let new_end = entry.position + data.len();
        if new_end > node.data.len() {
            node.data.resize(new_end, 0);
        }
        node.data[entry.position..new_end].copy_from_slice(data);
        entry.position = new_end;
        node.size = node.size.max(new_end);
        node.modified = SystemTime::now();

        Ok(data.len())
    }

    /// Moves a descriptor's position
    pub fn seek(&mut self, fd: FileDescriptor, position: usize) -> Result<(), FsError> {
        let entry = self
            .fd_table
            .get_mut(&fd)
            .ok_or(FsError::BadDescriptor(fd))?;
        entry.position = position;
        Ok(())
    }

    /// Returns whether a path resolves
    pub fn exists(&self, path: &str) -> bool {
        self.find_inode(&self.normalize_path(path)).is_some()
    }

    /// Returns the node type at a path
    pub fn file_type(&self, path: &str) -> Option<FileType> {
        let number = self.find_inode(&self.normalize_path(path))?;
        Some(self.inodes[&number].file_type)
    }

    /// Returns the content size at a path
    pub fn file_size(&self, path: &str) -> Option<usize> {
        let number = self.find_inode(&self.normalize_path(path))?;
        Some(self.inodes[&number].size)
    }

    /// Names of a directory's children; empty for anything else
    pub fn list_directory(&self, path: &str) -> Vec<String> {
        let Some(number) = self.find_inode(&self.normalize_path(path)) else {
            return Vec::new();
        };
        let node = &self.inodes[&number];
        if node.file_type != FileType::Directory {
            return Vec::new();
        }
        node.children
            .iter()
            .filter_map(|child| self.inodes.get(child))
            .map(|child| child.name.clone())
            .collect()
    }

    /// The directory relative paths resolve against
    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    /// Changes the current directory; false if the target is not a directory
    pub fn change_directory(&mut self, path: &str) -> bool {
        let path = self.normalize_path(path);
        let Some(number) = self.find_inode(&path) else {
            return false;
        };
        if self.inodes[&number].file_type != FileType::Directory {
            return false;
        }
        self.current_directory = path;
        true
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== File System Report ===\n");
        let _ = writeln!(out, "Total Inodes: {}", self.inodes.len());
        let _ = writeln!(out, "Open File Descriptors: {}", self.fd_table.len());
        let _ = writeln!(out, "Current Directory: {}", self.current_directory);

        let mut total_size = 0;
        let mut files = 0;
        let mut directories = 0;
        for node in self.inodes.values() {
            match node.file_type {
                FileType::Regular => {
                    files += 1;
                    total_size += node.size;
                }
                FileType::Directory => directories += 1,
                FileType::Device => {}
            }
        }
        let _ = writeln!(out, "Files: {}", files);
        let _ = writeln!(out, "Directories: {}", directories);
        let _ = writeln!(out, "Total Data Size: {} bytes", total_size);
        out
    }

    /// Renders the tree below `path`, one node per line
    pub fn directory_tree(&self, path: &str) -> String {
        let mut out = String::new();
        self.render_tree(&self.normalize_path(path), 0, &mut out);
        out
    }

    fn render_tree(&self, path: &str, indent: usize, out: &mut String) {
        let Some(number) = self.find_inode(path) else {
            return;
        };
        let node = &self.inodes[&number];

        out.push_str(&" ".repeat(indent));
        out.push_str(&node.name);
        if node.file_type == FileType::Directory {
            out.push('/');
        }
        out.push('\n');

        if node.file_type == FileType::Directory {
            for child_number in &node.children {
                if let Some(child) = self.inodes.get(child_number) {
                    let child_path = if path == "/" {
                        format!("/{}", child.name)
                    } else {
                        format!("{}/{}", path, child.name)
                    };
                    self.render_tree(&child_path, indent + 2, out);
                }
            }
        }
    }

    fn parse_path(path: &str) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other.to_string()),
            }
        }
        parts
    }

    fn normalize_path(&self, path: &str) -> String {
        let full = if path.starts_with('/') {
            path.to_string()
        } else if self.current_directory.ends_with('/') {
            format!("{}{}", self.current_directory, path)
        } else {
            format!("{}/{}", self.current_directory, path)
        };

        let parts = Self::parse_path(&full);
        if parts.is_empty() {
            return "/".to_string();
        }
        format!("/{}", parts.join("/"))
    }

    /// Resolves a normalized path to an inode by walking from the root
    fn find_inode(&self, path: &str) -> Option<InodeNumber> {
        if path == "/" {
            return Some(ROOT_INODE);
        }

        let mut current = ROOT_INODE;
        for part in Self::parse_path(path) {
            let node = self.inodes.get(&current)?;
            if node.file_type != FileType::Directory {
                return None;
            }
            current = *node.children.iter().find(|&&child| {
                self.inodes
                    .get(&child)
                    .is_some_and(|candidate| candidate.name == part)
            })?;
        }
        Some(current)
    }

    fn parent_of(&self, path: &str) -> Option<InodeNumber> {
        match path.rfind('/') {
            None | Some(0) => Some(ROOT_INODE),
            Some(last_slash) => self.find_inode(&path[..last_slash]),
        }
    }

    fn file_name(path: &str) -> String {
        match path.rfind('/') {
            Some(last_slash) => path[last_slash + 1..].to_string(),
            None => path.to_string(),
        }
    }
}
