use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use stillcut::{
    ClassifierOptions, ComputeDevice, FfmpegLogLevel, MediaProbe, Pipeline, PipelineOptions,
    PipelineReport, ProgressCallback, ProgressInfo, SeamPolicy, StreamMetadata, VideoCodec,
};
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  stillcut remove lecture.mp4 lecture-cut.mp4 --progress\n  stillcut remove grainy.mp4 out.mp4 --preset denoised --codec h264\n  stillcut probe input.mp4 --json\n  stillcut completions zsh > _stillcut";

#[derive(Debug, Parser)]
#[command(
    name = "stillcut",
    version,
    about = "Remove static frames from videos",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output (RUST_LOG takes precedence).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Args, Clone)]
struct TuningArgs {
    /// Parameter preset to start from (default, denoised).
    #[arg(long, default_value = "default")]
    preset: String,

    /// Gaussian blur kernel size.
    #[arg(long)]
    kernel_size: Option<usize>,

    /// Gaussian blur standard deviation.
    #[arg(long)]
    sigma: Option<f64>,

    /// Side length of the compared blocks, in pixels.
    #[arg(long)]
    block_size: Option<u32>,

    /// Keep a frame if any block's difference exceeds this.
    #[arg(long)]
    hi_threshold: Option<f64>,

    /// Per-block difference counted by the fractional rule.
    #[arg(long)]
    lo_threshold: Option<f64>,

    /// Keep a frame if more than this fraction of blocks exceed --lo-threshold.
    #[arg(long)]
    frac_threshold: Option<f64>,

    /// Batch-initial frames: compare (with the previous batch) or always-keep.
    #[arg(long, default_value = "compare")]
    seam: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Remove static frames from a video.
    #[command(
        about = "Remove static frames",
        after_help = "Examples:\n  stillcut remove input.mp4 output.mp4\n  stillcut remove input.mp4 output.mkv --block-size 32 --hi-threshold 800 --json"
    )]
    Remove {
        /// Input video path.
        input: PathBuf,
        /// Output video path; the container is chosen by extension.
        output: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Frames per batch.
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        /// Batches buffered between decoder and classifier.
        #[arg(long, default_value_t = 1024)]
        input_queue: usize,
        /// Batches buffered between classifier and encoder.
        #[arg(long, default_value_t = 1024)]
        output_queue: usize,
        /// Output codec (mpeg4, h264, h265).
        #[arg(long, default_value = "mpeg4")]
        codec: String,
        /// Analysis threads (0 runs on all cores, 1 runs serially).
        #[arg(long)]
        threads: Option<usize>,
        /// Probe the input with the external ffprobe tool.
        #[arg(long)]
        ffprobe: bool,
        /// Print the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print video stream metadata.
    #[command(
        about = "Print video stream metadata",
        after_help = "Examples:\n  stillcut probe input.mp4\n  stillcut probe input.mp4 --json --ffprobe"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,
        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Probe with the external ffprobe tool.
        #[arg(long)]
        ffprobe: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_preset(value: &str) -> Option<ClassifierOptions> {
    match value.to_ascii_lowercase().as_str() {
        "default" => Some(ClassifierOptions::default()),
        "denoised" => Some(ClassifierOptions::denoised()),
        _ => None,
    }
}

fn classifier_options(
    tuning: &TuningArgs,
) -> Result<ClassifierOptions, Box<dyn std::error::Error>> {
    let mut options = parse_preset(&tuning.preset)
        .ok_or(format!("unsupported --preset: {}", tuning.preset))?
        .with_seam_policy(tuning.seam.parse::<SeamPolicy>()?);

    if let Some(size) = tuning.kernel_size {
        options = options.with_kernel_size(size);
    }
    if let Some(sigma) = tuning.sigma {
        options = options.with_sigma(sigma);
    }
    if let Some(size) = tuning.block_size {
        options = options.with_block_size(size);
    }
    if let Some(threshold) = tuning.hi_threshold {
        options = options.with_hi_threshold(threshold);
    }
    if let Some(threshold) = tuning.lo_threshold {
        options = options.with_lo_threshold(threshold);
    }
    if let Some(fraction) = tuning.frac_threshold {
        options = options.with_frac_threshold(fraction);
    }

    options.validate()?;
    Ok(options)
}

fn device_for(threads: Option<usize>) -> ComputeDevice {
    match threads {
        Some(1) => ComputeDevice::Serial,
        Some(count) => ComputeDevice::with_threads(count),
        None => ComputeDevice::default(),
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);

    let level = match &global.log_level {
        Some(level) => level.parse::<FfmpegLogLevel>()?,
        None => FfmpegLogLevel::default(),
    };
    stillcut::set_ffmpeg_log_level(level);
    Ok(())
}

fn probe(path: &Path, use_ffprobe: bool) -> Result<StreamMetadata, stillcut::StillcutError> {
    if use_ffprobe {
        MediaProbe::probe_with_ffprobe(path)
    } else {
        MediaProbe::probe(path)
    }
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total_frames {
            self.bar.set_length(total.max(info.frames_processed));
        }
        self.bar.set_position(info.frames_processed);
        self.bar.set_message(format!(
            "{} kept, {:.2}s skipped",
            info.frames_kept, info.skipped_duration
        ));
    }
}

fn print_report(
    report: &PipelineReport,
    input: &Path,
    output: &Path,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let payload = json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "original_duration": report.total_duration,
            "skipped_duration": report.skipped_duration,
            "processed_duration": report.kept_duration,
            "frames_read": report.frames_read,
            "frames_written": report.frames_written,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Original duration: {:.2} seconds", report.total_duration);
        println!("Skipped duration: {:.2} seconds", report.skipped_duration);
        println!("Processed duration: {:.2} seconds", report.kept_duration);
        eprintln!(
            "{} {}",
            "success:".green().bold(),
            format!(
                "Kept {} of {} frames in {}",
                report.frames_written,
                report.frames_read,
                output.display()
            )
            .green()
        );
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Remove {
            input,
            output,
            tuning,
            batch_size,
            input_queue,
            output_queue,
            codec,
            threads,
            ffprobe,
            json,
        } => {
            let classifier = classifier_options(&tuning)?;
            let codec = codec.parse::<VideoCodec>()?;
            ensure_writable_path(&output, cli.global.overwrite)?;

            let metadata = probe(&input, ffprobe)?;
            if cli.global.verbose {
                eprintln!(
                    "{}x{} @ {} fps, {} frames",
                    metadata.width, metadata.height, metadata.frame_rate, metadata.frame_count
                );
            }

            let mut options = PipelineOptions::new()
                .with_batch_size(batch_size)
                .with_input_queue(input_queue)
                .with_output_queue(output_queue)
                .with_codec(codec)
                .with_device(device_for(threads))
                .with_progress_interval(batch_size as u64);

            let progress = if cli.global.progress {
                let progress = Arc::new(BarProgress::new(metadata.frame_count)?);
                options = options.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            options.validate()?;
            let report =
                Pipeline::from_metadata(&input, &output, metadata, options).run(&classifier);

            if let Some(progress) = progress {
                progress.bar.finish_with_message("done");
            }
            print_report(&report?, &input, &output, json)?;
        }
        Commands::Probe {
            input,
            json,
            ffprobe,
        } => {
            let metadata = probe(&input, ffprobe)?;
            if json {
                let payload = json!({
                    "width": metadata.width,
                    "height": metadata.height,
                    "frame_rate": metadata.frame_rate.to_string(),
                    "fps": metadata.frame_rate.as_f64(),
                    "frame_count": metadata.frame_count,
                    "duration_seconds": metadata.duration_secs(),
                    "codec": metadata.codec,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Video: {}x{} @ {} fps ({:.3}) [{}]",
                    metadata.width,
                    metadata.height,
                    metadata.frame_rate,
                    metadata.frame_rate.as_f64(),
                    metadata.codec.as_deref().unwrap_or("unknown"),
                );
                println!("Frames: {}", metadata.frame_count);
                println!("Duration: {:.2} seconds", metadata.duration_secs());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "stillcut", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
