use crate::constants::*;
use crate::error::{LoadError, MemoryError};
use crate::memory::PhysicalMemory;
use crate::page_table::{Mapping, PageTable};
use crate::translation::{Translation, VirtualPage};

/// A process descriptor as read from input, with its trace validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessImage {
    pub pid: i32,
    pub references: Vec<VirtualPage>,
}

impl ProcessImage {
    /// Validate raw page numbers against the trace limit and address space
    pub fn new(pid: i32, references: &[u8]) -> Result<Self, LoadError> {
        if references.len() > MAX_REFERENCES {
            return Err(LoadError::TooManyReferences {
                pid,
                count: references.len(),
                max: MAX_REFERENCES,
            });
        }
        let references = references
            .iter()
            .enumerate()
            .map(|(index, &number)| {
                VirtualPage::new(number).ok_or(LoadError::PageOutOfRange {
                    pid,
                    index,
                    page: number,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProcessImage { pid, references })
    }
}

/// Final counters for one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    pub pid: i32,
    pub allocated_frames: usize,
    pub page_faults: u32,
    pub accesses: u32,
}

/// A loaded process: its trace, page-table root and counters
#[derive(Debug, Clone)]
pub struct Process {
    pid: i32,
    references: Vec<VirtualPage>,
    page_table: PageTable,
    page_faults: u32,
    accesses: u32,
}

impl Process {
    pub(crate) fn new(image: ProcessImage, page_table: PageTable) -> Self {
        Process {
            pid: image.pid,
            references: image.references,
            page_table,
            page_faults: 0,
            accesses: 0,
        }
    }

    #[inline]
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn references(&self) -> &[VirtualPage] {
        &self.references
    }

    /// Page referenced at `index` of the trace, if the trace is that long
    #[inline]
    pub fn reference(&self, index: usize) -> Option<VirtualPage> {
        self.references.get(index).copied()
    }

    #[inline]
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    #[inline]
    pub fn page_faults(&self) -> u32 {
        self.page_faults
    }

    #[inline]
    pub fn accesses(&self) -> u32 {
        self.accesses
    }

    pub(crate) fn record(&mut self, translation: &Translation) {
        self.accesses += 1;
        self.page_faults += translation.faults();
    }

    pub fn mappings(&self, memory: &PhysicalMemory) -> Result<Vec<Mapping>, MemoryError> {
        self.page_table.mappings(memory)
    }

    pub fn stats(&self, memory: &PhysicalMemory) -> Result<ProcessStats, MemoryError> {
        Ok(ProcessStats {
            pid: self.pid,
            allocated_frames: self.page_table.allocated_frames(memory)?,
            page_faults: self.page_faults,
            accesses: self.accesses,
        })
    }
}
