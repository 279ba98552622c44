// Trace files are plain comma separated text exported from the acquisition:
//
// time,encoder,laser[,load]
//
// The header line is skipped, blank lines are ignored, and every data line must have the
// same number of columns as the first one.
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use super::error::TraceFileError;
use super::trace::RawTrace;

const ENTRIES_PER_LINE: usize = 3; //time, encoder, laser
const ENTRIES_PER_LOAD_LINE: usize = 4; //time, encoder, laser, load

/// Read a raw trace from a CSV file
pub fn read_trace_file(path: &Path) -> Result<RawTrace, TraceFileError> {
    if !path.exists() {
        return Err(TraceFileError::BadFilePath(path.to_path_buf()));
    }
    let mut contents = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut contents)?;
    parse_trace(&contents)
}

/// Parse the contents of a trace file
pub fn parse_trace(contents: &str) -> Result<RawTrace, TraceFileError> {
    let mut trace = RawTrace::default();
    let mut load: Vec<f64> = Vec::new();
    let mut n_columns: Option<usize> = None;

    // Line numbers are reported 1-based, counting the header
    for (line_number, line) in contents.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entries: Vec<&str> = line.split_terminator(',').map(|e| e.trim()).collect();
        let expected = *n_columns.get_or_insert(entries.len());
        if entries.len() != expected
            || !(expected == ENTRIES_PER_LINE || expected == ENTRIES_PER_LOAD_LINE)
        {
            return Err(TraceFileError::BadFileFormat(line_number + 1));
        }

        trace.time.push(entries[0].parse()?);
        trace.encoder.push(entries[1].parse()?);
        trace.laser.push(entries[2].parse()?);
        if expected == ENTRIES_PER_LOAD_LINE {
            load.push(entries[3].parse()?);
        }
    }

    if n_columns == Some(ENTRIES_PER_LOAD_LINE) {
        trace.load = Some(load);
    }
    Ok(trace)
}

/// Write a raw trace in the format read by `read_trace_file`
pub fn write_trace_file(path: &Path, trace: &RawTrace) -> Result<(), TraceFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    match &trace.load {
        Some(_) => writeln!(writer, "time,encoder,laser,load")?,
        None => writeln!(writer, "time,encoder,laser")?,
    }
    for idx in 0..trace.len() {
        write!(
            writer,
            "{},{},{}",
            trace.time[idx], trace.encoder[idx], trace.laser[idx]
        )?;
        if let Some(load) = &trace.load {
            write!(writer, ",{}", load[idx])?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}
