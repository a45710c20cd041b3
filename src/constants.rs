use static_assertions::const_assert;

pub const FRAME_SIZE: usize = 32;
pub const NUM_FRAMES: usize = 256;
pub const PM_SIZE: usize = NUM_FRAMES * FRAME_SIZE;

// on-arena entry layout: [frame, valid, ref, pad]
pub const PTE_SIZE: usize = 4;

pub const L1_BITS: u32 = 3;
pub const L2_BITS: u32 = 3;

pub const L1_ENTRIES: usize = 1 << L1_BITS;
pub const L2_ENTRIES: usize = 1 << L2_BITS;
pub const VAS_PAGES: usize = L1_ENTRIES * L2_ENTRIES;

pub const L2_MASK: u8 = (1 << L2_BITS) - 1;

/// Frames taken by a flat table covering the whole address space.
pub const SINGLE_LEVEL_PT_FRAMES: usize = VAS_PAGES * PTE_SIZE / FRAME_SIZE;

pub const MAX_PROCESSES: usize = 10;
pub const MAX_REFERENCES: usize = 255;

pub const PAGE_INVALID: u8 = 0;
pub const PAGE_VALID: u8 = 1;

// A table of either level fits exactly one frame.
const_assert!(L1_ENTRIES * PTE_SIZE == FRAME_SIZE);
const_assert!(L2_ENTRIES * PTE_SIZE == FRAME_SIZE);
// Frame numbers are stored in a single PTE byte.
const_assert!(NUM_FRAMES <= u8::MAX as usize + 1);
// Reference counters are a single PTE byte too.
const_assert!(MAX_REFERENCES <= u8::MAX as usize);
