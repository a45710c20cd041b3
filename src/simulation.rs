//! Round-robin simulation driver
//!
//! Traces are replayed index by index: every process makes its `idx`-th
//! access before any process makes its `idx + 1`-th, and within one index
//! processes go in load order. All processes share one [`PhysicalMemory`];
//! once it runs out the run stops for everyone and the counters gathered so
//! far are final.

use log::{debug, info, warn};

use crate::constants::*;
use crate::error::{MemoryError, SetupError, TranslateError};
use crate::memory::{Frame, PhysicalMemory};
use crate::page_table::{Mapping, PageTable, PagingMode, TableLevel};
use crate::process::{Process, ProcessImage, ProcessStats};
use crate::translation::{translate, VirtualPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub mode: PagingMode,
    /// Physical frames available to the run, at most `NUM_FRAMES`
    pub frames: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            mode: PagingMode::TwoLevel,
            frames: NUM_FRAMES,
        }
    }
}

/// One simulated access, emitted in global access order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub pid: i32,
    pub index: usize,
    pub page: VirtualPage,
    pub fault_at_l1: bool,
    pub fault_at_l2: bool,
    pub table_frame: Option<Frame>,
    pub frame: Frame,
    pub ref_count: u8,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every trace was replayed to the end
    Completed,
    /// Memory ran out servicing a fault; the failing access is not counted
    OutOfMemory {
        pid: i32,
        index: usize,
        page: VirtualPage,
        level: TableLevel,
    },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Run-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub allocated_frames: usize,
    pub page_faults: u64,
    pub accesses: u64,
}

/// Per-process statistics with its resident pages, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub stats: ProcessStats,
    pub directory: Vec<(usize, Frame)>,
    pub mappings: Vec<Mapping>,
}

/// A set of processes sharing one physical memory
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    memory: PhysicalMemory,
    processes: Vec<Process>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Simulation {
            config,
            memory: PhysicalMemory::with_frames(config.frames),
            processes: Vec::new(),
        }
    }

    /// Build a simulation and load `images` in order
    pub fn load<I>(config: SimulationConfig, images: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = ProcessImage>,
    {
        let mut simulation = Self::new(config);
        for image in images {
            simulation.add_process(image)?;
        }
        Ok(simulation)
    }

    /// Load one process and allocate its root page table
    ///
    /// Running out of memory here is fatal to the run.
    pub fn add_process(&mut self, image: ProcessImage) -> Result<(), SetupError> {
        if self.processes.len() >= MAX_PROCESSES {
            return Err(SetupError::TooManyProcesses { max: MAX_PROCESSES });
        }
        let pid = image.pid;
        let page_table = PageTable::allocate(self.config.mode, &mut self.memory)
            .map_err(|source| SetupError::OutOfMemory { pid, source })?;
        info!(
            "loaded process {}: {} references, page table at {:?}",
            pid,
            image.references.len(),
            page_table
        );
        self.processes.push(Process::new(image, page_table));
        Ok(())
    }

    /// Replay all traces, discarding the per-access records
    pub fn run(&mut self) -> Result<Outcome, MemoryError> {
        self.run_with(|_| {})
    }

    /// Replay all traces, handing every access record to `observe`
    ///
    /// Out-of-memory ends the run gracefully with [`Outcome::OutOfMemory`].
    /// An `Err` means the arena no longer matches the page tables.
    pub fn run_with<F>(&mut self, mut observe: F) -> Result<Outcome, MemoryError>
    where
        F: FnMut(&AccessRecord),
    {
        let rounds = self
            .processes
            .iter()
            .map(|p| p.references().len())
            .max()
            .unwrap_or(0);
        info!(
            "simulation start: {} processes, {} rounds",
            self.processes.len(),
            rounds
        );

        for index in 0..rounds {
            for process in self.processes.iter_mut() {
                let Some(page) = process.reference(index) else {
                    continue;
                };
                let table = *process.page_table();

                let translation = match translate(&mut self.memory, &table, page) {
                    Ok(translation) => translation,
                    Err(TranslateError::OutOfMemory { level, source }) => {
                        warn!(
                            "out of memory: pid {} index {} page {} ({} fault): {}",
                            process.pid(),
                            index,
                            page,
                            level,
                            source
                        );
                        return Ok(Outcome::OutOfMemory {
                            pid: process.pid(),
                            index,
                            page,
                            level,
                        });
                    }
                    Err(TranslateError::Memory(err)) => return Err(err),
                };

                process.record(&translation);
                let record = AccessRecord {
                    pid: process.pid(),
                    index,
                    page,
                    fault_at_l1: translation.fault_at_l1,
                    fault_at_l2: translation.fault_at_l2,
                    table_frame: translation.table_frame,
                    frame: translation.frame,
                    ref_count: translation.ref_count,
                };
                debug!(
                    "pid {} idx {} page {} -> frame {} (faults {})",
                    record.pid,
                    index,
                    page,
                    record.frame,
                    translation.faults()
                );
                observe(&record);
            }
        }

        info!("simulation end");
        Ok(Outcome::Completed)
    }

    pub fn config(&self) -> SimulationConfig {
        self.config
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn totals(&self) -> Totals {
        Totals {
            allocated_frames: self.memory.allocated_frames(),
            page_faults: self.processes.iter().map(|p| u64::from(p.page_faults())).sum(),
            accesses: self.processes.iter().map(|p| u64::from(p.accesses())).sum(),
        }
    }

    pub fn process_stats(&self) -> Result<Vec<ProcessStats>, MemoryError> {
        self.processes.iter().map(|p| p.stats(&self.memory)).collect()
    }

    pub fn reports(&self) -> Result<Vec<ProcessReport>, MemoryError> {
        self.processes
            .iter()
            .map(|p| {
                Ok(ProcessReport {
                    stats: p.stats(&self.memory)?,
                    directory: p.page_table().directory(&self.memory)?,
                    mappings: p.mappings(&self.memory)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(pid: i32, refs: &[u8]) -> ProcessImage {
        ProcessImage::new(pid, refs).unwrap()
    }

    fn two_level(frames: usize) -> SimulationConfig {
        SimulationConfig {
            mode: PagingMode::TwoLevel,
            frames,
        }
    }

    #[test]
    fn test_scenario_single_process() {
        let mut sim = Simulation::load(two_level(NUM_FRAMES), [image(1, &[0, 0, 8, 0])]).unwrap();
        let mut records = Vec::new();
        let outcome = sim.run_with(|r| records.push(*r)).unwrap();

        assert_eq!(outcome, Outcome::Completed);
        let p = &sim.processes()[0];
        assert_eq!(p.page_faults(), 4);
        assert_eq!(p.accesses(), 4);

        assert!(records[0].fault_at_l1 && records[0].fault_at_l2);
        assert!(!records[1].fault_at_l1 && !records[1].fault_at_l2);
        assert_eq!(records[1].ref_count, 2);
        assert!(records[2].fault_at_l1 && records[2].fault_at_l2);
        assert_eq!(records[3].ref_count, 3);
        assert_eq!(records[3].frame, records[0].frame);

        let totals = sim.totals();
        assert_eq!(totals.allocated_frames, 5);
        assert_eq!(totals.page_faults, 4);
        assert_eq!(totals.accesses, 4);
    }

    #[test]
    fn test_round_robin_order() {
        let mut sim = Simulation::load(
            two_level(NUM_FRAMES),
            [image(10, &[1, 2, 3]), image(20, &[4]), image(30, &[5, 6])],
        )
        .unwrap();
        let mut order = Vec::new();
        sim.run_with(|r| order.push((r.pid, r.index))).unwrap();

        assert_eq!(
            order,
            vec![(10, 0), (20, 0), (30, 0), (10, 1), (30, 1), (10, 2)]
        );
    }

    #[test]
    fn test_frames_follow_global_order() {
        let mut sim =
            Simulation::load(two_level(NUM_FRAMES), [image(1, &[0]), image(2, &[0])]).unwrap();
        let mut records = Vec::new();
        sim.run_with(|r| records.push(*r)).unwrap();

        // roots 0 and 1, then pid 1 takes 2,3 and pid 2 takes 4,5
        assert_eq!(records[0].table_frame, Some(Frame::from(2)));
        assert_eq!(records[0].frame, Frame::from(3));
        assert_eq!(records[1].table_frame, Some(Frame::from(4)));
        assert_eq!(records[1].frame, Frame::from(5));
    }

    #[test]
    fn test_processes_do_not_share_pages() {
        let mut sim =
            Simulation::load(two_level(NUM_FRAMES), [image(1, &[7, 7]), image(2, &[7])]).unwrap();
        sim.run().unwrap();

        let stats = sim.process_stats().unwrap();
        assert_eq!(stats[0].page_faults, 2);
        assert_eq!(stats[1].page_faults, 2);
        assert_eq!(stats[0].allocated_frames, 3);
        assert_eq!(stats[1].allocated_frames, 3);
    }

    #[test]
    fn test_zero_capacity_is_fatal_at_setup() {
        let err = Simulation::load(two_level(0), [image(1, &[0, 1])]).unwrap_err();
        assert_eq!(
            err,
            SetupError::OutOfMemory {
                pid: 1,
                source: MemoryError::Exhausted { capacity: 0 },
            }
        );
    }

    #[test]
    fn test_zero_capacity_without_processes() {
        let mut sim = Simulation::new(two_level(0));
        assert_eq!(sim.run().unwrap(), Outcome::Completed);
        assert_eq!(sim.totals(), Totals::default());
    }

    #[test]
    fn test_add_process_appends_in_load_order() {
        let mut sim = Simulation::new(two_level(NUM_FRAMES));
        sim.add_process(image(7, &[1])).unwrap();
        sim.add_process(image(3, &[2, 2])).unwrap();

        let pids: Vec<i32> = sim.processes().iter().map(Process::pid).collect();
        assert_eq!(pids, vec![7, 3]);
        assert_eq!(
            sim.processes()[1].page_table(),
            &PageTable::TwoLevel { root: Frame::from(1) }
        );
        assert_eq!(sim.memory().allocated_frames(), 2);
    }

    #[test]
    fn test_failed_add_keeps_loaded_processes() {
        let mut sim = Simulation::new(two_level(1));
        sim.add_process(image(1, &[0])).unwrap();
        assert!(sim.add_process(image(2, &[0])).is_err());
        assert_eq!(sim.processes().len(), 1);
    }

    #[test]
    fn test_too_many_processes() {
        let images = (0..=MAX_PROCESSES as i32).map(|pid| image(pid, &[0]));
        let err = Simulation::load(SimulationConfig::default(), images).unwrap_err();
        assert_eq!(err, SetupError::TooManyProcesses { max: MAX_PROCESSES });
    }

    #[test]
    fn test_out_of_memory_stops_all_processes() {
        // 2 roots + 4 frames: pid 1 idx 0 takes 2,3; pid 2 idx 0 takes 4,5;
        // pid 1 idx 1 (page 1) needs a data frame and fails
        let mut sim =
            Simulation::load(two_level(6), [image(1, &[0, 1, 0]), image(2, &[0, 0, 0])]).unwrap();
        let mut records = Vec::new();
        let outcome = sim.run_with(|r| records.push(*r)).unwrap();

        assert_eq!(
            outcome,
            Outcome::OutOfMemory {
                pid: 1,
                index: 1,
                page: VirtualPage::new(1).unwrap(),
                level: TableLevel::Second,
            }
        );
        assert!(!outcome.is_completed());
        assert_eq!(records.len(), 2);

        // pid 2's later hits never run, even though they need no memory
        let stats = sim.process_stats().unwrap();
        assert_eq!((stats[0].accesses, stats[0].page_faults), (1, 2));
        assert_eq!((stats[1].accesses, stats[1].page_faults), (1, 2));
        assert_eq!(sim.totals().accesses, 2);
        assert_eq!(sim.totals().allocated_frames, 6);
    }

    #[test]
    fn test_out_of_memory_on_first_access() {
        let mut sim = Simulation::load(two_level(1), [image(1, &[0])]).unwrap();
        let outcome = sim.run().unwrap();
        assert!(matches!(
            outcome,
            Outcome::OutOfMemory {
                level: TableLevel::First,
                index: 0,
                ..
            }
        ));
        assert_eq!(sim.totals().accesses, 0);
        assert_eq!(sim.totals().page_faults, 0);
    }

    #[test]
    fn test_single_level_mode() {
        let config = SimulationConfig {
            mode: PagingMode::SingleLevel,
            frames: NUM_FRAMES,
        };
        let mut sim = Simulation::load(config, [image(1, &[0, 0, 8, 0])]).unwrap();
        sim.run().unwrap();

        let stats = sim.process_stats().unwrap();
        assert_eq!(stats[0].page_faults, 2);
        assert_eq!(stats[0].accesses, 4);
        assert_eq!(stats[0].allocated_frames, SINGLE_LEVEL_PT_FRAMES + 2);
        assert_eq!(sim.totals().allocated_frames, SINGLE_LEVEL_PT_FRAMES + 2);
    }

    #[test]
    fn test_reports_list_directory_and_pages() {
        let mut sim = Simulation::load(two_level(NUM_FRAMES), [image(4, &[9, 9, 1])]).unwrap();
        sim.run().unwrap();

        let reports = sim.reports().unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.stats.pid, 4);
        // page 9 -> l1 1, page 1 -> l1 0
        assert_eq!(report.directory.len(), 2);
        let pages: Vec<(u8, u8)> = report
            .mappings
            .iter()
            .map(|m| (m.page.number(), m.ref_count))
            .collect();
        assert_eq!(pages, vec![(1, 1), (9, 2)]);
    }

    #[test]
    fn test_empty_traces() {
        let mut sim =
            Simulation::load(two_level(NUM_FRAMES), [image(1, &[]), image(2, &[])]).unwrap();
        assert_eq!(sim.run().unwrap(), Outcome::Completed);
        assert_eq!(sim.totals().allocated_frames, 2);
        assert_eq!(sim.totals().accesses, 0);
        assert_eq!(sim.memory().allocated_frames(), 2);
        assert_eq!(sim.config().mode, PagingMode::TwoLevel);
    }
}
