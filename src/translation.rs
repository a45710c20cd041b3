use std::fmt;

use log::trace;

use crate::constants::*;
use crate::error::TranslateError;
use crate::memory::{Frame, PhysicalMemory};
use crate::page_table::{PageTable, PageTableEntry, TableLevel};

/// A virtual page number inside the 64-page address space
///
/// Construction rejects numbers outside the address space, so every walk
/// starts from a page that both table levels can index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualPage(u8);

impl VirtualPage {
    pub fn new(number: u8) -> Option<Self> {
        ((number as usize) < VAS_PAGES).then_some(VirtualPage(number))
    }

    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().and_then(Self::new)
    }

    /// Page addressed by a first-level and a second-level index
    pub fn from_indices(l1: usize, l2: usize) -> Option<Self> {
        if l1 >= L1_ENTRIES || l2 >= L2_ENTRIES {
            return None;
        }
        Self::from_index(l1 * L2_ENTRIES + l2)
    }

    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn l1_index(self) -> usize {
        (self.0 >> L2_BITS) as usize
    }

    #[inline]
    pub fn l2_index(self) -> usize {
        (self.0 & L2_MASK) as usize
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Result of one successful walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub page: VirtualPage,
    /// A second-level table had to be allocated
    pub fault_at_l1: bool,
    /// A data frame had to be allocated
    pub fault_at_l2: bool,
    /// Frame holding the second-level table (two-level tables only)
    pub table_frame: Option<Frame>,
    pub frame: Frame,
    /// Reference count of the leaf entry after this access
    pub ref_count: u8,
}

impl Translation {
    /// Faults charged to this access; a miss at both levels counts twice
    pub fn faults(&self) -> u32 {
        u32::from(self.fault_at_l1) + u32::from(self.fault_at_l2)
    }

    pub fn is_fault(&self) -> bool {
        self.fault_at_l1 || self.fault_at_l2
    }
}

struct Leaf {
    frame: Frame,
    ref_count: u8,
    fault: bool,
}

/// Resolve `page` through `table`, servicing faults by allocating frames
///
/// A miss in the directory allocates a zeroed second-level table, a miss in
/// the leaf table allocates a data frame with a reference count of one, and
/// a hit only bumps the reference count. Frames allocated before a failed
/// allocation stay mapped.
pub fn translate(
    memory: &mut PhysicalMemory,
    table: &PageTable,
    page: VirtualPage,
) -> Result<Translation, TranslateError> {
    match *table {
        PageTable::TwoLevel { root } => translate_two_level(memory, root, page),
        PageTable::SingleLevel { base } => {
            let leaf = resolve_leaf(memory, base, VAS_PAGES, page.number() as usize)?;
            Ok(Translation {
                page,
                fault_at_l1: false,
                fault_at_l2: leaf.fault,
                table_frame: None,
                frame: leaf.frame,
                ref_count: leaf.ref_count,
            })
        }
    }
}

fn translate_two_level(
    memory: &mut PhysicalMemory,
    root: Frame,
    page: VirtualPage,
) -> Result<Translation, TranslateError> {
    let l1 = page.l1_index();
    let directory_entry = memory.table(root, L1_ENTRIES)?.entry(l1);

    let (table_frame, fault_at_l1) = match directory_entry.frame() {
        Some(frame) => (frame, false),
        None => {
            let frame = memory
                .allocate_table()
                .map_err(|source| TranslateError::OutOfMemory {
                    level: TableLevel::First,
                    source,
                })?;
            memory
                .table_mut(root, L1_ENTRIES)?
                .set(l1, PageTableEntry::mapped(frame, 0));
            trace!("page {}: L1[{}] -> table frame {}", page, l1, frame);
            (frame, true)
        }
    };

    let leaf = resolve_leaf(memory, table_frame, L2_ENTRIES, page.l2_index())?;
    Ok(Translation {
        page,
        fault_at_l1,
        fault_at_l2: leaf.fault,
        table_frame: Some(table_frame),
        frame: leaf.frame,
        ref_count: leaf.ref_count,
    })
}

fn resolve_leaf(
    memory: &mut PhysicalMemory,
    table: Frame,
    entries: usize,
    index: usize,
) -> Result<Leaf, TranslateError> {
    let entry = memory.table(table, entries)?.entry(index);

    if let Some(frame) = entry.frame() {
        // bounded by MAX_REFERENCES accesses per process
        let ref_count = entry.ref_count.saturating_add(1);
        memory
            .table_mut(table, entries)?
            .set(index, PageTableEntry { ref_count, ..entry });
        return Ok(Leaf {
            frame,
            ref_count,
            fault: false,
        });
    }

    let frame = memory
        .allocate_data()
        .map_err(|source| TranslateError::OutOfMemory {
            level: TableLevel::Second,
            source,
        })?;
    memory
        .table_mut(table, entries)?
        .set(index, PageTableEntry::mapped(frame, 1));
    trace!("table {} entry {} -> data frame {}", table, index, frame);
    Ok(Leaf {
        frame,
        ref_count: 1,
        fault: true,
    })
}
