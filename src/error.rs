//! Error types for the paging simulator

use thiserror::Error;

use crate::memory::{Frame, FrameUse};
use crate::page_table::TableLevel;

/// Errors raised by the physical frame arena
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No free frames remain
    #[error("physical memory exhausted ({capacity} frames allocated)")]
    Exhausted { capacity: usize },

    /// Frame index past the end of the arena
    #[error("frame {frame} is outside physical memory ({capacity} frames)")]
    OutOfRange { frame: usize, capacity: usize },

    /// A view was requested for a frame holding something else
    #[error("frame {frame} holds {actual:?}, expected {expected:?}")]
    KindMismatch {
        frame: Frame,
        expected: FrameUse,
        actual: FrameUse,
    },
}

/// Errors raised while walking a page table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A fault could not be serviced
    #[error("out of memory while servicing {level} fault")]
    OutOfMemory {
        level: TableLevel,
        #[source]
        source: MemoryError,
    },

    /// The arena does not hold what the page table points at
    #[error("corrupt page table: {0}")]
    Memory(#[from] MemoryError),
}

/// Errors raised while reading process descriptors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("process {pid}: {count} references exceed the limit of {max}")]
    TooManyReferences { pid: i32, count: usize, max: usize },

    #[error("process {pid}: reference {index} to page {page} is outside the address space")]
    PageOutOfRange { pid: i32, index: usize, page: u8 },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Errors that abort a run before any access is simulated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("cannot load more than {max} processes")]
    TooManyProcesses { max: usize },

    #[error("out of memory allocating page table for process {pid}")]
    OutOfMemory {
        pid: i32,
        #[source]
        source: MemoryError,
    },
}
