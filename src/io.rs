use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;

use log::{info, warn};

use crate::constants::*;
use crate::error::LoadError;
use crate::process::ProcessImage;

/// Encoding of the process descriptor stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputFormat {
    /// `pid: i32 LE, ref_len: i32 LE, ref_len page bytes`, repeated
    #[default]
    Binary,
    /// One process per line: `pid page page ...`, `#` starts a comment
    Text,
}

/// Load descriptors from `path`, or from stdin when `path` is `None`
pub fn read_input(path: Option<&Path>, format: InputFormat) -> Result<Vec<ProcessImage>, LoadError> {
    match path {
        Some(path) => {
            info!("reading {:?} descriptors from {}", format, path.display());
            read_with_format(BufReader::new(File::open(path)?), format)
        }
        None => {
            info!("reading {:?} descriptors from stdin", format);
            read_with_format(io::stdin().lock(), format)
        }
    }
}

fn read_with_format<R: Read>(mut reader: R, format: InputFormat) -> Result<Vec<ProcessImage>, LoadError> {
    match format {
        InputFormat::Binary => read_processes(reader),
        InputFormat::Text => {
            let mut content = String::new();
            reader.read_to_string(&mut content)?;
            parse_text(&content)
        }
    }
}

/// Read binary process records until end of input or `MAX_PROCESSES`
///
/// A record cut short or carrying a bad reference count ends loading; the
/// processes read before it are kept.
pub fn read_processes<R: Read>(mut reader: R) -> Result<Vec<ProcessImage>, LoadError> {
    info!("loading processes");
    let mut images = Vec::new();
    while images.len() < MAX_PROCESSES {
        match read_record(&mut reader)? {
            Some(image) => images.push(image),
            None => break,
        }
    }
    info!("loaded {} processes", images.len());
    Ok(images)
}

fn read_record<R: Read>(reader: &mut R) -> Result<Option<ProcessImage>, LoadError> {
    let mut word = [0u8; 4];

    match read_full(reader, &mut word)? {
        0 => return Ok(None),
        4 => {}
        n => {
            warn!("input truncated: {} of 4 pid bytes", n);
            return Ok(None);
        }
    }
    let pid = i32::from_le_bytes(word);

    let n = read_full(reader, &mut word)?;
    if n < word.len() {
        warn!("input truncated: process {} has no reference count", pid);
        return Ok(None);
    }
    let count = i32::from_le_bytes(word);
    let len = match usize::try_from(count) {
        Ok(len) if len <= MAX_REFERENCES => len,
        _ => {
            warn!("malformed input: process {} has reference count {}", pid, count);
            return Ok(None);
        }
    };

    let mut references = vec![0u8; len];
    let n = read_full(reader, &mut references)?;
    if n < len {
        warn!("input truncated: process {} has {} of {} references", pid, n, len);
        return Ok(None);
    }

    ProcessImage::new(pid, &references).map(Some)
}

/// Fill `buf` as far as the input allows; returns the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write processes in the binary record format
pub fn write_processes<W: Write>(mut writer: W, images: &[ProcessImage]) -> io::Result<()> {
    for image in images {
        writer.write_all(&image.pid.to_le_bytes())?;
        writer.write_all(&(image.references.len() as i32).to_le_bytes())?;
        let pages: Vec<u8> = image.references.iter().map(|p| p.number()).collect();
        writer.write_all(&pages)?;
    }
    writer.flush()
}

/// Parse the text form; at most `MAX_PROCESSES` lines are used
pub fn parse_text(content: &str) -> Result<Vec<ProcessImage>, LoadError> {
    let mut images = Vec::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if images.len() == MAX_PROCESSES {
            warn!("ignoring processes after the first {}", MAX_PROCESSES);
            break;
        }

        let line_no = number + 1;
        let pid: i32 = tokens[0].parse().map_err(|_| LoadError::Parse {
            line: line_no,
            message: format!("Invalid pid: {}", tokens[0]),
        })?;
        let references = tokens[1..]
            .iter()
            .map(|token| {
                token.parse::<u8>().map_err(|_| LoadError::Parse {
                    line: line_no,
                    message: format!("Invalid page number: {}", token),
                })
            })
            .collect::<Result<Vec<u8>, _>>()?;

        images.push(ProcessImage::new(pid, &references)?);
    }

    Ok(images)
}
