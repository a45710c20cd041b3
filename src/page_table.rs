use std::fmt;

use crate::constants::*;
use crate::error::MemoryError;
use crate::memory::{Frame, PhysicalMemory};
use crate::translation::VirtualPage;

/// One page-table entry, stored in the arena as `[frame, valid, ref, pad]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    pub frame: Frame,
    pub valid: bool,
    pub ref_count: u8,
}

impl PageTableEntry {
    /// Valid entry pointing at `frame`
    pub fn mapped(frame: Frame, ref_count: u8) -> Self {
        PageTableEntry {
            frame,
            valid: true,
            ref_count,
        }
    }

    pub fn from_bytes(bytes: [u8; PTE_SIZE]) -> Self {
        PageTableEntry {
            frame: Frame::from(bytes[0]),
            valid: bytes[1] == PAGE_VALID,
            ref_count: bytes[2],
        }
    }

    pub fn to_bytes(self) -> [u8; PTE_SIZE] {
        let vflag = if self.valid { PAGE_VALID } else { PAGE_INVALID };
        [self.frame.number(), vflag, self.ref_count, 0]
    }

    /// The mapped frame, if the entry is valid
    #[inline]
    pub fn frame(&self) -> Option<Frame> {
        self.valid.then_some(self.frame)
    }
}

fn entry_at(bytes: &[u8], index: usize) -> PageTableEntry {
    let start = index * PTE_SIZE;
    let mut raw = [0u8; PTE_SIZE];
    raw.copy_from_slice(&bytes[start..start + PTE_SIZE]);
    PageTableEntry::from_bytes(raw)
}

/// Read-only typed view over the frames of one page table
#[derive(Debug)]
pub struct TableView<'a> {
    bytes: &'a [u8],
}

impl<'a> TableView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        TableView { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / PTE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Entry at `index`; panics if `index >= len()`
    pub fn entry(&self, index: usize) -> PageTableEntry {
        entry_at(self.bytes, index)
    }

    pub fn entries(&self) -> impl Iterator<Item = PageTableEntry> + use<'a> {
        let bytes: &'a [u8] = self.bytes;
        (0..bytes.len() / PTE_SIZE).map(move |index| entry_at(bytes, index))
    }
}

/// Mutable typed view over the frames of one page table
#[derive(Debug)]
pub struct TableViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> TableViewMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        TableViewMut { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / PTE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn entry(&self, index: usize) -> PageTableEntry {
        entry_at(self.bytes, index)
    }

    pub fn set(&mut self, index: usize, entry: PageTableEntry) {
        let start = index * PTE_SIZE;
        self.bytes[start..start + PTE_SIZE].copy_from_slice(&entry.to_bytes());
    }
}

/// Level of the table a fault was taken in
///
/// Flat single-level tables only have leaf entries, reported as `Second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLevel {
    First,
    Second,
}

impl fmt::Display for TableLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLevel::First => write!(f, "L1PT"),
            TableLevel::Second => write!(f, "L2PT"),
        }
    }
}

/// Page table layout used for every process of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PagingMode {
    /// 8-entry directory with lazily allocated 8-entry second-level tables
    #[default]
    TwoLevel,
    /// One flat 64-entry table spread over contiguous frames
    SingleLevel,
}

impl PagingMode {
    /// Frames allocated for a process's table when it is loaded
    pub fn root_frames(self) -> usize {
        match self {
            PagingMode::TwoLevel => 1,
            PagingMode::SingleLevel => SINGLE_LEVEL_PT_FRAMES,
        }
    }
}

/// A resident page as seen from the page tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub page: VirtualPage,
    /// Frame of the second-level table holding the entry (two-level only)
    pub table_frame: Option<Frame>,
    pub frame: Frame,
    pub ref_count: u8,
}

/// Root of a process's page table; the frame index is carried explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTable {
    TwoLevel { root: Frame },
    SingleLevel { base: Frame },
}

impl PageTable {
    /// Allocate the zeroed root table for a new process
    pub fn allocate(mode: PagingMode, memory: &mut PhysicalMemory) -> Result<Self, MemoryError> {
        match mode {
            PagingMode::TwoLevel => Ok(PageTable::TwoLevel {
                root: memory.allocate_table()?,
            }),
            PagingMode::SingleLevel => Ok(PageTable::SingleLevel {
                base: memory.allocate_tables(SINGLE_LEVEL_PT_FRAMES)?,
            }),
        }
    }

    pub fn mode(&self) -> PagingMode {
        match self {
            PageTable::TwoLevel { .. } => PagingMode::TwoLevel,
            PageTable::SingleLevel { .. } => PagingMode::SingleLevel,
        }
    }

    /// Valid first-level entries as `(l1 index, second-level table frame)`
    pub fn directory(&self, memory: &PhysicalMemory) -> Result<Vec<(usize, Frame)>, MemoryError> {
        match *self {
            PageTable::TwoLevel { root } => Ok(memory
                .table(root, L1_ENTRIES)?
                .entries()
                .enumerate()
                .filter_map(|(index, entry)| entry.frame().map(|frame| (index, frame)))
                .collect()),
            PageTable::SingleLevel { .. } => Ok(Vec::new()),
        }
    }

    /// Every resident page, in virtual page order
    pub fn mappings(&self, memory: &PhysicalMemory) -> Result<Vec<Mapping>, MemoryError> {
        let mut mappings = Vec::new();
        match *self {
            PageTable::TwoLevel { .. } => {
                for (l1, table) in self.directory(memory)? {
                    let view = memory.table(table, L2_ENTRIES)?;
                    for (l2, entry) in view.entries().enumerate() {
                        let (Some(frame), Some(page)) = (entry.frame(), VirtualPage::from_indices(l1, l2))
                        else {
                            continue;
                        };
                        mappings.push(Mapping {
                            page,
                            table_frame: Some(table),
                            frame,
                            ref_count: entry.ref_count,
                        });
                    }
                }
            }
            PageTable::SingleLevel { base } => {
                let view = memory.table(base, VAS_PAGES)?;
                for (index, entry) in view.entries().enumerate() {
                    let (Some(frame), Some(page)) = (entry.frame(), VirtualPage::from_index(index))
                    else {
                        continue;
                    };
                    mappings.push(Mapping {
                        page,
                        table_frame: None,
                        frame,
                        ref_count: entry.ref_count,
                    });
                }
            }
        }
        Ok(mappings)
    }

    /// Frames owned by this table: root, second-level tables and data frames
    pub fn allocated_frames(&self, memory: &PhysicalMemory) -> Result<usize, MemoryError> {
        let tables = self.directory(memory)?.len();
        let pages = self.mappings(memory)?.len();
        Ok(self.mode().root_frames() + tables + pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_byte_layout() {
        let entry = PageTableEntry::mapped(Frame::from(9), 3);
        assert_eq!(entry.to_bytes(), [9, PAGE_VALID, 3, 0]);
        assert_eq!(PageTableEntry::from_bytes([9, 1, 3, 0]), entry);
    }

    #[test]
    fn test_zeroed_entry_is_invalid() {
        let entry = PageTableEntry::from_bytes([0; PTE_SIZE]);
        assert!(!entry.valid);
        assert_eq!(entry.frame(), None);
        assert_eq!(entry, PageTableEntry::default());
    }

    #[test]
    fn test_level_display() {
        assert_eq!(TableLevel::First.to_string(), "L1PT");
        assert_eq!(TableLevel::Second.to_string(), "L2PT");
    }

    #[test]
    fn test_root_frames() {
        assert_eq!(PagingMode::TwoLevel.root_frames(), 1);
        assert_eq!(PagingMode::SingleLevel.root_frames(), 8);
    }

    #[test]
    fn test_allocate_two_level_root() {
        let mut pm = PhysicalMemory::with_frames(4);
        let table = PageTable::allocate(PagingMode::TwoLevel, &mut pm).unwrap();
        assert_eq!(table, PageTable::TwoLevel { root: Frame::from(0) });
        assert_eq!(pm.allocated_frames(), 1);
        assert!(table.directory(&pm).unwrap().is_empty());
        assert_eq!(table.allocated_frames(&pm).unwrap(), 1);
    }

    #[test]
    fn test_allocate_single_level_needs_contiguous_frames() {
        let mut pm = PhysicalMemory::with_frames(SINGLE_LEVEL_PT_FRAMES - 1);
        assert_eq!(
            PageTable::allocate(PagingMode::SingleLevel, &mut pm),
            Err(MemoryError::Exhausted {
                capacity: SINGLE_LEVEL_PT_FRAMES - 1
            })
        );
        assert_eq!(pm.allocated_frames(), 0);

        let mut pm = PhysicalMemory::with_frames(SINGLE_LEVEL_PT_FRAMES);
        let table = PageTable::allocate(PagingMode::SingleLevel, &mut pm).unwrap();
        assert_eq!(table.mode(), PagingMode::SingleLevel);
        assert_eq!(pm.allocated_frames(), SINGLE_LEVEL_PT_FRAMES);
    }

    #[test]
    fn test_mappings_walk_both_levels() {
        let mut pm = PhysicalMemory::with_frames(8);
        let table = PageTable::allocate(PagingMode::TwoLevel, &mut pm).unwrap();
        let PageTable::TwoLevel { root } = table else {
            unreachable!()
        };

        // page 10 = l1 1, l2 2
        let l2 = pm.allocate_table().unwrap();
        let data = pm.allocate_data().unwrap();
        pm.table_mut(root, L1_ENTRIES)
            .unwrap()
            .set(1, PageTableEntry::mapped(l2, 0));
        pm.table_mut(l2, L2_ENTRIES)
            .unwrap()
            .set(2, PageTableEntry::mapped(data, 4));

        assert_eq!(table.directory(&pm).unwrap(), vec![(1, l2)]);
        assert_eq!(
            table.mappings(&pm).unwrap(),
            vec![Mapping {
                page: VirtualPage::new(10).unwrap(),
                table_frame: Some(l2),
                frame: data,
                ref_count: 4,
            }]
        );
        assert_eq!(table.allocated_frames(&pm).unwrap(), 3);
    }
}
