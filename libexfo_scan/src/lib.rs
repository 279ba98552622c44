//! # exfo_scan
//!
//! exfo_scan turns the raw traces of a reciprocating laser profilometer into statistically
//! characterized per-position profiles. An encoder tracks the position of the laser as it
//! travels back and forth over a wafer and the laser reports a distance. Every trace is
//! cut into passes, the passes of each direction are stacked, and the signal is
//! aggregated by position into mean, standard deviation, sample count and standard error
//! profiles, along with the error of every pass against the aggregate.
//!
//! On top of the scan pipeline the library provides
//!
//! - an integration based reconstruction which recovers a repeatable base signal from two
//! composite measurements of the same disturbance at a known phase offset
//! - wafer assembly: synchronizing the base, nickel, stress and exfoliation scans of one
//! wafer, deriving the nickel and exfoliated film thickness and the film stress from the
//! wafer bow
//! - load planning from an injected regression metamodel, and export of the resulting
//! load program
//!
//! ## Installation
//!
//! To build and install the CLI use `cargo install --path ./exfo_scan_cli` from the top
//! level exfo_scan repository. This installs `exfo_scan_cli` to your cargo install location
//! (typically `~/.cargo/bin/`).
//!
//! ## Configuration
//!
//! The CLI is configured with a YAML file. A template can be generated with
//! `exfo_scan_cli new -p config.yml`. The format is as follows:
//!
//! ```yml
//! trace_path: /path/to/traces
//! output_path: /path/to/output
//! window:
//!   low: 41.0
//!   high: 65.0
//! exclusion:
//!   indices: []
//!   sections: []
//! encoder:
//!   median_kernel: 21
//!   counts_per_mm: 100.0
//!   jump_threshold: 0.005
//! filter: identity
//! precision: 2
//! error_limit: null
//! wafer: null
//! n_threads: 1
//! ```
//!
//! - `window`: positions (mm) outside of `[low, high]` are not valid travel
//! - `exclusion`: runs to drop after detection, by index or as half open `start`/`end`
//! sections; a section without `end` drops every run from `start` on
//! - `filter`: applied to every pass before stacking; one of `identity`, `median`,
//! `moving_average`, `polynomial`, `exfoliation` or a `chain` of them
//! - `precision`: decimals positions are rounded to before bucketing; `null` buckets
//! raw positions
//! - `error_limit`: passes with a median absolute residual above this many um are reported
//! - `wafer`: when set, all traces are additionally assembled into one wafer. The role of
//! each trace is given by the first letter of its file name: `b`ase, `w`afer, `n`ickel,
//! `s`tress, `l`oad, `e`xfo. Unknown letters are base scans.
//! - `n_threads`: number of worker threads the traces are divided amongst
//!
//! ### Trace Format
//!
//! Trace files are CSV files with a header line and the columns
//!
//! ```csv
//! time,encoder,laser[,load]
//! ```
//!
//! Encoder readings are in counts (10 um by default), the laser in mm.
//!
//! ## Output
//!
//! For each trace `<name>.csv` the following files are written to the output directory:
//!
//! ```text
//! <name>_forward_profile.csv - position,mean,std,n,sem
//! <name>_backward_profile.csv - position,mean,std,n,sem
//! <name>_pass_errors.csv - direction,pass,std,mean_abs,median_abs
//! <name>.yml - runs, pass counts and error summaries
//! ```
//!
//! When a wafer is configured `<wafer name>_wafer.csv` holds the columns
//! `position,ni,ex,radius,stress`.
pub mod config;
pub mod curvature;
pub mod error;
pub mod filter;
pub mod load;
pub mod position_key;
pub mod process;
pub mod profile;
pub mod reconstruct;
pub mod runs;
pub mod scan;
pub mod scan_error;
pub mod scan_stack;
pub mod stats;
pub mod sync;
pub mod trace;
pub mod trace_file;
pub mod wafer;
pub mod worker_status;
pub mod writer;
