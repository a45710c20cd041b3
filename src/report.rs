//! Text rendering of access records and end-of-run page tables

use std::io::{self, Write};

use crate::error::SetupError;
use crate::page_table::PagingMode;
use crate::process::ProcessImage;
use crate::simulation::{AccessRecord, Outcome, ProcessReport, Totals};

const OUT_OF_MEMORY: &str = "Out of memory!!";

/// Echo of a loaded descriptor: `pid count` and then the pages
pub fn format_process(image: &ProcessImage) -> String {
    let mut text = format!("{} {}\n", image.pid, image.references.len());
    for page in &image.references {
        text.push_str(&format!("{:02} ", page.number()));
    }
    text
}

/// Line printed when the page tables cannot be set up
pub fn format_setup_error(err: &SetupError) -> String {
    match err {
        SetupError::OutOfMemory { .. } => OUT_OF_MEMORY.to_string(),
        other => other.to_string(),
    }
}

fn fault_or_frame(fault: bool, frame: impl std::fmt::Display) -> String {
    if fault {
        format!("PF,Allocated Frame {}", frame)
    } else {
        format!("Frame {}", frame)
    }
}

/// One line per access, e.g.
/// `[PID 01 IDX:000] Page access 000: (L1PT) PF,Allocated Frame 001 -> (L2PT) PF,Allocated Frame 002`
pub fn format_access(record: &AccessRecord) -> String {
    let mut line = format!(
        "[PID {:02} IDX:{:03}] Page access {}: ",
        record.pid, record.index, record.page
    );

    match record.table_frame {
        Some(table) => {
            line.push_str(&format!(
                "(L1PT) {} -> (L2PT) {}",
                fault_or_frame(record.fault_at_l1, table),
                fault_or_frame(record.fault_at_l2, record.frame)
            ));
        }
        None => {
            line.push_str(&format!("(PT) {}", fault_or_frame(record.fault_at_l2, record.frame)));
        }
    }

    if !record.fault_at_l2 {
        line.push_str(&format!(", REF={:03}", record.ref_count));
    }
    line
}

pub fn format_outcome(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Completed => None,
        Outcome::OutOfMemory {
            pid, index, page, ..
        } => Some(format!(
            "{} [PID {:02} IDX:{:03}] Page access {}",
            OUT_OF_MEMORY, pid, index, page
        )),
    }
}

/// Per-process page tables followed by the run totals
pub fn write_report<W: Write>(
    out: &mut W,
    mode: PagingMode,
    reports: &[ProcessReport],
    totals: &Totals,
) -> io::Result<()> {
    for report in reports {
        let stats = &report.stats;
        writeln!(
            out,
            "** Process {:03}: Allocated Frames={:03} PageFaults/References={:03}/{:03}",
            stats.pid, stats.allocated_frames, stats.page_faults, stats.accesses
        )?;

        match mode {
            PagingMode::TwoLevel => {
                for &(l1, table) in &report.directory {
                    writeln!(out, "(L1PT) Index {:03} -> Frame {}", l1, table)?;
                    for mapping in report.mappings.iter().filter(|m| m.page.l1_index() == l1) {
                        writeln!(
                            out,
                            "  (L2PT) [PAGE] {} -> [FRAME] {}, REF={:03}",
                            mapping.page, mapping.frame, mapping.ref_count
                        )?;
                    }
                }
            }
            PagingMode::SingleLevel => {
                for mapping in &report.mappings {
                    writeln!(
                        out,
                        "(PT) [PAGE] {} -> [FRAME] {}, REF={:03}",
                        mapping.page, mapping.frame, mapping.ref_count
                    )?;
                }
            }
        }
    }

    writeln!(
        out,
        "Total: Allocated Frames={:03} Page Faults/References={:03}/{:03}",
        totals.allocated_frames, totals.page_faults, totals.accesses
    )
}
