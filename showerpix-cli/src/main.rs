//! showerpix CLI: reconstruct array events from JSON event files.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde_json::json;
use thiserror::Error;

use showerpix_image::{parameterize_image, ImageConfig};
use showerpix_io::{
    read_cameras, read_config, CameraSet, EventFile, EventLines, OutputFormat, ResultWriter,
};
use showerpix_stereo::{ArrayEvent, DispTable, EventReconstructor, ReconstructionConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    ShowerpixIo(#[from] showerpix_io::Error),

    #[error("Disp backend error: {0}")]
    Disp(#[from] showerpix_stereo::DispError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    Usage(String),
}

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Comma-separated values
    Csv,
    /// One JSON object per line
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => Self::Csv,
            Format::Jsonl => Self::JsonLines,
        }
    }
}

/// Image parameterization and stereo reconstruction for Cherenkov
/// telescope arrays.
#[derive(Parser)]
#[command(name = "showerpix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (defaults to one per core)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct direction, core and energy of every event
    Reconstruct {
        /// Event file (.json, or .jsonl with --cameras)
        input: PathBuf,

        /// Output file path (.csv or .jsonl)
        #[arg(short, long)]
        output: PathBuf,

        /// Disp lookup table (JSON)
        #[arg(short, long)]
        disp_table: PathBuf,

        /// Camera definitions, added to those of the event file
        #[arg(long)]
        cameras: Option<PathBuf>,

        /// Reconstruction config (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (default: from the output extension)
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Minimum image size for the stereo stage
        #[arg(long)]
        min_size: Option<f64>,

        /// Minimum number of image pixels for the stereo stage
        #[arg(long)]
        min_ntubes: Option<usize>,

        /// Maximum edge-charge fraction for the stereo stage
        #[arg(long)]
        max_loss: Option<f64>,

        /// Events per parallel batch when streaming JSON lines
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Fit muon rings to every telescope image
    Muon {
        /// Event file (.json, or .jsonl with --cameras)
        input: PathBuf,

        /// Output JSON-lines file
        #[arg(short, long)]
        output: PathBuf,

        /// Camera definitions, added to those of the event file
        #[arg(long)]
        cameras: Option<PathBuf>,

        /// Write rings that failed the quality checks too
        #[arg(long)]
        all: bool,
    },

    /// Show information about an event file
    Info {
        /// Event file (.json)
        input: PathBuf,
    },

    /// Benchmark sequential against parallel reconstruction
    Benchmark {
        /// Event file (.json)
        input: PathBuf,

        /// Disp lookup table (JSON)
        #[arg(short, long)]
        disp_table: PathBuf,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn is_json_lines(path: &Path) -> bool {
    matches!(
        OutputFormat::from_path(path),
        Some(OutputFormat::JsonLines)
    )
}

/// Loads the camera set and, for JSON files, all events. JSON-lines inputs
/// return no events; they are streamed by the caller.
fn load_input(input: &Path, cameras: Option<&Path>) -> Result<(CameraSet, Vec<ArrayEvent>)> {
    let mut set = CameraSet::new();
    let mut events = Vec::new();
    if is_json_lines(input) {
        if cameras.is_none() {
            return Err(CliError::Usage(format!(
                "{} is a JSON-lines file; camera definitions need --cameras",
                input.display()
            )));
        }
    } else {
        let file = EventFile::open(input)?;
        set = file.cameras;
        events = file.events;
    }
    if let Some(path) = cameras {
        for (telescope_type, camera) in read_cameras(path)? {
            if set.insert(telescope_type, camera).is_some() {
                log::warn!(
                    "camera type {} from {} replaces the event-file definition",
                    telescope_type.0,
                    path.display()
                );
            }
        }
    }
    Ok((set, events))
}

fn build_reconstructor(
    cameras: &CameraSet,
    disp_table: &Path,
    config: ReconstructionConfig,
) -> Result<EventReconstructor> {
    let table = DispTable::load(disp_table)?;
    for telescope_type in table.telescope_types() {
        if !cameras.contains_key(&telescope_type) {
            log::debug!("disp table type {} has no camera", telescope_type.0);
        }
    }
    let mut reco = EventReconstructor::new(Arc::new(table)).with_config(config);
    for (&telescope_type, camera) in cameras {
        reco = reco.with_camera(telescope_type, Arc::clone(camera));
    }
    Ok(reco)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Reconstruct {
            input,
            output,
            disp_table,
            cameras,
            config,
            format,
            min_size,
            min_ntubes,
            max_loss,
            batch_size,
        } => {
            let mut reco_config = match &config {
                Some(path) => read_config(path)?,
                None => ReconstructionConfig::default(),
            };
            let (min_size, min_ntubes, max_loss) = (
                min_size.unwrap_or(reco_config.min_size),
                min_ntubes.unwrap_or(reco_config.min_ntubes),
                max_loss.unwrap_or(reco_config.max_loss),
            );
            reco_config = reco_config.with_image_cuts(min_size, min_ntubes, max_loss);
            log::debug!("reconstruction config: {:?}", reco_config);

            let format = match format {
                Some(format) => format.into(),
                None => OutputFormat::from_path(&output).unwrap_or_else(|| {
                    log::warn!(
                        "unknown extension of {}, defaulting to CSV",
                        output.display()
                    );
                    OutputFormat::Csv
                }),
            };

            let start = Instant::now();
            let (camera_set, events) = load_input(&input, cameras.as_deref())?;
            let reco = build_reconstructor(&camera_set, &disp_table, reco_config)?;
            let mut writer = ResultWriter::create(&output, format)?;
            let mut with_direction = 0usize;

            if is_json_lines(&input) {
                let mut batch = Vec::with_capacity(batch_size.max(1));
                for event in EventLines::open(&input)? {
                    batch.push(event?);
                    if batch.len() >= batch_size.max(1) {
                        let results = reco.reconstruct_batch(&batch);
                        with_direction += results.iter().filter(|r| r.has_direction()).count();
                        writer.write_all(&results)?;
                        batch.clear();
                    }
                }
                let results = reco.reconstruct_batch(&batch);
                with_direction += results.iter().filter(|r| r.has_direction()).count();
                writer.write_all(&results)?;
            } else {
                let results = reco.reconstruct_batch(&events);
                with_direction += results.iter().filter(|r| r.has_direction()).count();
                writer.write_all(&results)?;
            }

            let total = writer.count();
            writer.flush()?;
            log::info!("wrote {} results to {}", total, output.display());
            println!(
                "Reconstructed {} events in {:.2}s",
                total,
                start.elapsed().as_secs_f64()
            );
            println!("Events with direction: {}", with_direction);
        }

        Commands::Muon {
            input,
            output,
            cameras,
            all,
        } => {
            let (camera_set, mut events) = load_input(&input, cameras.as_deref())?;
            if is_json_lines(&input) {
                events = EventLines::open(&input)?.collect::<showerpix_io::Result<_>>()?;
            }
            let config = ImageConfig::default().with_muon(showerpix_image::MuonConfig::default());

            let records: Vec<serde_json::Value> = events
                .par_iter()
                .flat_map_iter(|event| {
                    let camera_set = &camera_set;
                    let config = &config;
                    event.telescopes.iter().filter_map(move |telescope| {
                        let camera = camera_set.get(&telescope.telescope_type)?;
                        let params = match parameterize_image(camera, &telescope.sample, config) {
                            Ok(params) => params,
                            Err(err) => {
                                log::warn!(
                                    "event {} telescope {}: {}",
                                    event.event_id,
                                    telescope.telescope_id,
                                    err
                                );
                                return None;
                            }
                        };
                        let ring = params.muon?;
                        (all || ring.valid).then(|| {
                            json!({
                                "event_id": event.event_id,
                                "telescope_id": telescope.telescope_id,
                                "ring": ring,
                            })
                        })
                    })
                })
                .collect();

            let mut out = std::io::BufWriter::new(std::fs::File::create(&output)?);
            for record in &records {
                serde_json::to_writer(&mut out, record)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            println!("Wrote {} rings to {}", records.len(), output.display());
        }

        Commands::Info { input } => {
            let file = EventFile::open(&input)?;

            println!("File: {}", input.display());
            println!("Events: {}", file.events.len());
            println!("Telescope images: {}", file.n_images());
            if !file.events.is_empty() {
                println!(
                    "Mean multiplicity: {:.2}",
                    file.n_images() as f64 / file.events.len() as f64
                );
                let (min_zen, max_zen) = file
                    .events
                    .iter()
                    .map(|e| e.pointing.zenith)
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), z| {
                        (lo.min(z), hi.max(z))
                    });
                println!("Zenith range: {:.2} - {:.2} deg", min_zen, max_zen);
            }

            for telescope_type in file.telescope_types() {
                match file.cameras.get(&telescope_type) {
                    Some(camera) => {
                        println!("Type {}: {} pixels", telescope_type.0, camera.len());
                    }
                    None => println!("Type {}: no camera definition", telescope_type.0),
                }
            }
        }

        Commands::Benchmark {
            input,
            disp_table,
            iterations,
        } => {
            let file = EventFile::open(&input)?;
            let reco =
                build_reconstructor(&file.cameras, &disp_table, ReconstructionConfig::default())?;

            println!(
                "Benchmarking with {} events, {} iterations",
                file.events.len(),
                iterations
            );
            println!(
                "{:<10} | {:<15} | {:<15} | {:<15}",
                "Mode", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<65}", "");

            for (parallel, name) in [(false, "Sequential"), (true, "Parallel")] {
                let run = || -> usize {
                    if parallel {
                        reco.reconstruct_batch(&file.events)
                            .iter()
                            .filter(|r| r.has_direction())
                            .count()
                    } else {
                        file.events
                            .iter()
                            .filter(|e| reco.reconstruct(e).has_direction())
                            .count()
                    }
                };

                // Warmup
                run();

                let mut times = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let start = Instant::now();
                    run();
                    times.push(start.elapsed().as_secs_f64() * 1000.0);
                }
                if times.is_empty() {
                    continue;
                }

                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len() as f64;

                println!(
                    "{:<10} | {:<15.2} | {:<15.2} | {:<15.2}",
                    name, mean_time, min_time, max_time
                );
            }
        }
    }

    Ok(())
}
