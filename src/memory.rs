use std::fmt;
use std::ops::Range;

use log::trace;

use crate::constants::*;
use crate::error::MemoryError;
use crate::page_table::{TableView, TableViewMut};

/// Index of a physical frame
///
/// Always below `NUM_FRAMES`, so it fits the one-byte frame field of a PTE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frame(u8);

impl Frame {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }

    /// Byte offset of the frame inside the arena
    #[inline]
    pub fn to_address(self) -> usize {
        self.index() * FRAME_SIZE
    }
}

impl From<u8> for Frame {
    fn from(number: u8) -> Self {
        Frame(number)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// What an allocated frame currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUse {
    Free,
    PageTable,
    Data,
}

/// Monotonic frame allocator: hands out `0, 1, 2, ...` until `capacity`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAllocator {
    next_free: usize,
    capacity: usize,
}

impl FrameAllocator {
    /// Capacity is clamped to `NUM_FRAMES`.
    pub fn new(capacity: usize) -> Self {
        FrameAllocator {
            next_free: 0,
            capacity: capacity.min(NUM_FRAMES),
        }
    }

    pub fn allocate(&mut self) -> Result<Frame, MemoryError> {
        self.allocate_contiguous(1)
    }

    /// Allocate `count` consecutive frames and return the first one.
    ///
    /// Nothing is consumed when fewer than `count` frames remain.
    pub fn allocate_contiguous(&mut self, count: usize) -> Result<Frame, MemoryError> {
        if count == 0 || self.remaining() < count {
            return Err(MemoryError::Exhausted {
                capacity: self.capacity,
            });
        }
        // next_free < capacity <= NUM_FRAMES <= 256
        let base = Frame(self.next_free as u8);
        self.next_free += count;
        trace!("allocated frames {}..{}", base.index(), self.next_free);
        Ok(base)
    }

    #[inline]
    pub fn allocated(&self) -> usize {
        self.next_free
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.next_free
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new(NUM_FRAMES)
    }
}

/// Simulated physical memory: a byte arena split into frames
///
/// Every allocated frame is tagged with what it holds. Page-table views and
/// data views check the tag, so a table frame is never read as data or the
/// other way round.
pub struct PhysicalMemory {
    data: Box<[u8]>,
    uses: Vec<FrameUse>,
    allocator: FrameAllocator,
}

impl PhysicalMemory {
    /// Full-size memory of `NUM_FRAMES` frames, all zero
    pub fn new() -> Self {
        Self::with_frames(NUM_FRAMES)
    }

    /// Memory limited to `frames` frames (clamped to `NUM_FRAMES`)
    pub fn with_frames(frames: usize) -> Self {
        let allocator = FrameAllocator::new(frames);
        let frames = allocator.capacity();
        PhysicalMemory {
            data: vec![0u8; frames * FRAME_SIZE].into_boxed_slice(),
            uses: vec![FrameUse::Free; frames],
            allocator,
        }
    }

    /// Allocate one zeroed frame for a page table
    pub fn allocate_table(&mut self) -> Result<Frame, MemoryError> {
        self.allocate_tables(1)
    }

    /// Allocate `count` consecutive zeroed frames forming one page table
    pub fn allocate_tables(&mut self, count: usize) -> Result<Frame, MemoryError> {
        let base = self.allocator.allocate_contiguous(count)?;
        self.claim(base, count, FrameUse::PageTable);
        Ok(base)
    }

    /// Allocate a frame backing a virtual page
    pub fn allocate_data(&mut self) -> Result<Frame, MemoryError> {
        let frame = self.allocator.allocate()?;
        self.claim(frame, 1, FrameUse::Data);
        Ok(frame)
    }

    fn claim(&mut self, base: Frame, count: usize, usage: FrameUse) {
        let frames = base.index()..base.index() + count;
        self.data[frames.start * FRAME_SIZE..frames.end * FRAME_SIZE].fill(0);
        self.uses[frames].fill(usage);
    }

    pub fn frame_use(&self, frame: Frame) -> Result<FrameUse, MemoryError> {
        self.uses
            .get(frame.index())
            .copied()
            .ok_or(MemoryError::OutOfRange {
                frame: frame.index(),
                capacity: self.capacity(),
            })
    }

    /// Read-only view of a page table of `entries` PTEs starting at `base`
    pub fn table(&self, base: Frame, entries: usize) -> Result<TableView<'_>, MemoryError> {
        let range = self.span(base, entries * PTE_SIZE, FrameUse::PageTable)?;
        Ok(TableView::new(&self.data[range]))
    }

    /// Mutable view of a page table of `entries` PTEs starting at `base`
    pub fn table_mut(
        &mut self,
        base: Frame,
        entries: usize,
    ) -> Result<TableViewMut<'_>, MemoryError> {
        let range = self.span(base, entries * PTE_SIZE, FrameUse::PageTable)?;
        Ok(TableViewMut::new(&mut self.data[range]))
    }

    /// Contents of a data frame
    pub fn frame_data(&self, frame: Frame) -> Result<&[u8], MemoryError> {
        let range = self.span(frame, FRAME_SIZE, FrameUse::Data)?;
        Ok(&self.data[range])
    }

    #[cfg(test)]
    pub(crate) fn frame_data_mut(&mut self, frame: Frame) -> Result<&mut [u8], MemoryError> {
        let range = self.span(frame, FRAME_SIZE, FrameUse::Data)?;
        Ok(&mut self.data[range])
    }

    /// Byte range of `len` bytes at `base`, checking every covered frame's tag
    fn span(&self, base: Frame, len: usize, expected: FrameUse) -> Result<Range<usize>, MemoryError> {
        let start = base.to_address();
        let end = start + len;
        let last_frame = end.div_ceil(FRAME_SIZE).max(base.index() + 1);

        for index in base.index()..last_frame {
            let actual = *self.uses.get(index).ok_or(MemoryError::OutOfRange {
                frame: index,
                capacity: self.capacity(),
            })?;
            if actual != expected {
                return Err(MemoryError::KindMismatch {
                    frame: Frame(index as u8),
                    expected,
                    actual,
                });
            }
        }
        Ok(start..end)
    }

    #[inline]
    pub fn allocated_frames(&self) -> usize {
        self.allocator.allocated()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    pub fn allocator(&self) -> &FrameAllocator {
        &self.allocator
    }
}

impl Default for PhysicalMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhysicalMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("allocated", &self.allocator.allocated())
            .field("capacity", &self.allocator.capacity())
            .finish()
    }
}
