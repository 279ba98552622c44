use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::{trace_name, Config, WaferConfig};
use super::error::ProcessorError;
use super::filter::Filter;
use super::load::LoadProfile;
use super::scan::Scan;
use super::trace_file::read_trace_file;
use super::wafer::{ScanKind, Wafer};
use super::worker_status::{BarColor, WorkerStatus};
use super::writer::ResultWriter;

/// A trace file and its index in the sorted list of all trace files
pub type TraceJob = (usize, PathBuf);

/// Read a trace file and build its scan
fn build_scan(config: &Config, path: &Path, filter: &Filter) -> Result<Scan, ProcessorError> {
    let raw = read_trace_file(path)?;
    let trace = raw.to_trace(&config.encoder)?;
    Ok(Scan::build(
        &trace,
        config.window,
        config.exclusion.clone(),
        filter,
        config.precision,
    )?)
}

/// The main per trace loop of exfo_scan.
///
/// Reads one trace file, builds its scan and writes the results to the output directory,
/// reporting progress after each stage.
pub fn process_trace(
    config: &Config,
    job: &TraceJob,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let (trace_index, path) = job;
    let name = trace_name(path);
    let writer = ResultWriter::new(config.get_output_directory()?, &name)?;
    let filter = config.filter.build();

    tx.send(WorkerStatus::new(0.0, *trace_index, *worker_id, BarColor::CYAN))?;
    let raw = read_trace_file(path)?;
    tx.send(WorkerStatus::new(0.25, *trace_index, *worker_id, BarColor::CYAN))?;
    let trace = raw.to_trace(&config.encoder)?;
    log::info!("Trace {name} has {} samples", trace.len());
    tx.send(WorkerStatus::new(0.5, *trace_index, *worker_id, BarColor::CYAN))?;

    let scan = Scan::build(
        &trace,
        config.window,
        config.exclusion.clone(),
        &filter,
        config.precision,
    )?;
    if let Some(limit) = config.error_limit {
        for direction in [&scan.forward, &scan.backward] {
            let flagged = direction.errors.flag_passes(limit);
            if !flagged.is_empty() {
                log::warn!(
                    "Trace {name} has {} {} passes above {limit} um: {flagged:?}",
                    flagged.len(),
                    direction.stack.direction
                );
            }
        }
    }
    tx.send(WorkerStatus::new(0.75, *trace_index, *worker_id, BarColor::CYAN))?;

    writer.write_scan(&scan, config.error_limit)?;
    tx.send(WorkerStatus::new(1.0, *trace_index, *worker_id, BarColor::CYAN))?;
    Ok(())
}

/// Process a subset of traces.
///
/// A trace that fails is logged and skipped; only a broken status channel stops the worker.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<TraceJob>,
) -> Result<(), ProcessorError> {
    for job in subset.iter() {
        let name = trace_name(&job.1);
        log::info!("Processing trace {name}...");
        match process_trace(&config, job, &tx, &worker_id) {
            Ok(()) => log::info!("Finished processing trace {name}."),
            Err(ProcessorError::SendError(e)) => return Err(ProcessorError::SendError(e)),
            Err(e) => {
                log::error!("Trace {name} failed: {e}");
                tx.send(WorkerStatus::new(1.0, job.0, worker_id, BarColor::RED))?;
            }
        }
    }
    Ok(())
}

/// Divide the trace files in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config, files: Vec<PathBuf>) -> Vec<Vec<TraceJob>> {
    let n_subsets = config.n_threads.max(1) as usize;
    let mut subsets: Vec<Vec<TraceJob>> = vec![Vec::new(); n_subsets];

    for (idx, file) in files.into_iter().enumerate() {
        subsets[idx % n_subsets].push((idx, file))
    }

    subsets
}

/// Assemble every trace file into one wafer, derive its thickness and stress and write it.
///
/// Scans are assigned a role from the first letter of their file name. Traces that fail
/// to build are logged and left out of the wafer.
pub fn process_wafer(
    config: &Config,
    wafer_config: &WaferConfig,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Wafer, ProcessorError> {
    let files = config.get_trace_files()?;
    let writer = ResultWriter::new(config.get_output_directory()?, &wafer_config.name)?;
    let filter = config.filter.build();
    let mut wafer = Wafer::new(&wafer_config.name);

    let n_files = files.len().max(1) as f32;
    for (idx, path) in files.iter().enumerate() {
        tx.send(WorkerStatus::new(
            idx as f32 / n_files,
            idx,
            worker_id,
            BarColor::MAGENTA,
        ))?;
        let name = trace_name(path);
        let kind = ScanKind::from_file_name(path);
        let result = match kind {
            ScanKind::Load => read_trace_file(path)
                .map_err(ProcessorError::from)
                .and_then(|raw| {
                    Ok(LoadProfile::from_trace(
                        &raw,
                        &wafer_config.load_window,
                        &config.encoder,
                        &filter,
                    )?)
                })
                .map(|load| wafer.set_load(load)),
            _ => build_scan(config, path, &filter).map(|scan| wafer.insert_scan(kind, scan)),
        };
        match result {
            Ok(()) => log::info!("Added {name} to wafer {} as {kind}", wafer.name),
            Err(e) => log::error!("Trace {name} was left out of wafer {}: {e}", wafer.name),
        }
    }

    wafer.sync(wafer_config.direction, wafer_config.resample)?;
    let thickness_filter = wafer_config.thickness_filter.build();
    wafer.make(&wafer_config.geometry, &thickness_filter)?;
    if wafer.scan(ScanKind::Stress).is_some() {
        wafer.get_stress(&wafer_config.stress, &thickness_filter)?;
    } else {
        log::warn!("Wafer {} has no stress scan; stress is not computed", wafer.name);
    }
    if let Some(profile) = wafer.profile() {
        writer.write_wafer(profile)?;
    }
    tx.send(WorkerStatus::new(
        1.0,
        files.len(),
        worker_id,
        BarColor::MAGENTA,
    ))?;
    Ok(wafer)
}
