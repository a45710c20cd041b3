pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod page_table;
pub mod process;
pub mod report;
pub mod simulation;
pub mod translation;

// Re-export commonly used items for convenience
pub use constants::*;
pub use error::{LoadError, MemoryError, SetupError, TranslateError};
pub use memory::{Frame, FrameAllocator, PhysicalMemory};
pub use page_table::{PageTable, PagingMode};
pub use process::{Process, ProcessImage};
pub use simulation::{AccessRecord, Outcome, Simulation, SimulationConfig};
pub use translation::{translate, Translation, VirtualPage};
