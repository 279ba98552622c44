use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use libexfo_scan::config::Config;
use libexfo_scan::error::ProcessorError;
use libexfo_scan::process::{create_subsets, process_subset, process_wafer};
use libexfo_scan::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn bar_style(color: BarColor) -> ProgressStyle {
    let template = match color {
        BarColor::CYAN => "{prefix} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        BarColor::MAGENTA => "{prefix} [{bar:40.magenta/blue}] {pos:>3}% {msg}",
        BarColor::RED => "{prefix} [{bar:40.red/blue}] {pos:>3}% {msg}",
    };
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Apply a status message to the bar of its worker
fn update_bar(bars: &[ProgressBar], status: &WorkerStatus, files: &[PathBuf]) {
    if let Some(bar) = bars.get(status.worker_id) {
        bar.set_style(bar_style(status.color));
        bar.set_position(status.percent());
        if let Some(file) = files.get(status.trace_index) {
            bar.set_message(file.file_name().unwrap_or_default().to_string_lossy().to_string());
        }
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("exfo_scan_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Trace Path: {}", config.trace_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Valid Window: [{}, {}] mm",
        config.window.low,
        config.window.high
    );
    log::info!("Number of Workers: {}", config.n_threads);

    let files = match config.get_trace_files() {
        Ok(f) => f,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Found {} trace files.", files.len());

    // Spawn the workers!
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars: Vec<ProgressBar> = Vec::new();
    let mut workers: Vec<JoinHandle<Result<(), ProcessorError>>> = Vec::new();
    for (idx, subset) in create_subsets(&config, files.clone()).into_iter().enumerate() {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(BarColor::CYAN));
        bar.set_prefix(format!("Worker {idx}"));
        bars.push(bar);
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let conf = config.clone();
        let worker_tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, worker_tx, idx, subset)
        }));
    }

    loop {
        // No UI event loop here, so poll the channel at a fixed rate
        std::thread::sleep(std::time::Duration::from_millis(100));
        loop {
            match rx.try_recv() {
                Ok(status) => update_bar(&bars, &status, &files),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::error!("Channels became disconnected!");
                    break;
                }
            }
        }

        if workers.iter().all(|w| w.is_finished()) {
            break;
        }
    }

    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => log::info!("Worker complete"),
            Ok(Err(e)) => log::error!("Processor error: {e}"),
            Err(_) => log::error!("An error occured joining one of the workers!"),
        }
    }
    for bar in bars.iter() {
        bar.finish();
    }

    if let Some(wafer_config) = &config.wafer {
        log::info!("Assembling wafer {}...", wafer_config.name);
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(BarColor::MAGENTA));
        bar.set_prefix(String::from("Wafer"));
        let wafer_bars = vec![bar];
        match process_wafer(&config, wafer_config, &tx, 0) {
            Ok(wafer) => log::info!(
                "Wafer {} assembled from {} scans.",
                wafer.name,
                wafer.kinds().len()
            ),
            Err(e) => log::error!("Wafer failed with error: {e}"),
        }
        for status in rx.try_iter() {
            update_bar(&wafer_bars, &status, &files);
        }
        wafer_bars[0].finish();
    }

    log::info!("Done.");
}
