mod view;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use gif_core::logging::{init_logging, LogConfig};
use gif_core::orchestrator::display_command;
use gif_core::scale::split_dimensions;
use gif_core::tools::require_tool;
use gif_core::{
    plan, validate, App, ConversionDefaults, ConversionOutcome, ConversionRequest, Dispatch,
    DitherMode, ExifToolReader, FfmpegRunner, RawRequest, ScaleInput, Source, UiEvent,
    WhichLocator, FFMPEG,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "gif-maker")]
#[command(version, about = "Turn a folder of images into an animated GIF with ffmpeg", long_about = None)]
struct Cli {
    /// Debug-level logging, also printed to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for log files (default: system temp dir)
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a GIF from a folder of frames or an explicit list of files
    Create {
        /// A folder, or one or more image files in frame order
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Frame file extension (default: JPG for folders, inferred for files)
        #[arg(short, long, value_name = "EXT")]
        ext: Option<String>,

        /// Frames per second
        #[arg(short = 'r', long, default_value = ConversionDefaults::FRAME_RATE)]
        framerate: String,

        /// Scale factor applied to width and height
        #[arg(short, long, default_value = ConversionDefaults::FACTOR, conflicts_with = "size")]
        scale: String,

        /// Explicit output size, e.g. 640x480
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        size: Option<(String, String)>,

        /// Output file name; `.gif` is appended if missing (default: derived from the first frame)
        #[arg(short, long, value_name = "NAME")]
        output: Option<String>,

        #[arg(long, default_value_t = DitherMode::FloydSteinberg, value_parser = parse_dither)]
        dither: DitherMode,

        /// Encoder binary name or path
        #[arg(long, default_value = FFMPEG)]
        ffmpeg: String,

        /// Mirror ffmpeg's stderr while it runs
        #[arg(long)]
        show_log: bool,

        /// Print the two ffmpeg command lines and exit
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, default_value = "human")]
        format: OutputFormat,
    },

    /// Print the suggested output name for a frame
    SuggestName {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

fn parse_size(text: &str) -> Result<(String, String), String> {
    split_dimensions(text)
        .map(|(w, h)| (w.to_string(), h.to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", text))
}

fn parse_dither(text: &str) -> Result<DitherMode, String> {
    text.parse()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default()
        .with_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_stderr(cli.verbose);
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    if let Err(e) = init_logging("gif_maker", log_config) {
        eprintln!("⚠️ Logging disabled: {:#}", e);
    }

    match cli.command {
        Commands::Create {
            inputs,
            ext,
            framerate,
            scale,
            size,
            output,
            dither,
            ffmpeg,
            show_log,
            dry_run,
            format,
        } => {
            let source = Source::from_paths(inputs);
            let extension = ext.unwrap_or_else(|| match source {
                Some(Source::Folder(_)) => ConversionDefaults::EXTENSION.to_string(),
                _ => String::new(),
            });
            let scale = match size {
                Some((width, height)) => ScaleInput::Pixels { width, height },
                None => ScaleInput::Factor(scale),
            };
            let raw = RawRequest {
                source,
                extension,
                frame_rate: framerate,
                scale,
                output_name: output.unwrap_or_default(),
                dither,
                mirror_diagnostics: show_log,
            };

            if dry_run {
                return print_plan(&raw, &ffmpeg, format);
            }
            let outcome = run_create(raw, &ffmpeg, show_log, format)?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::SuggestName { file } => {
            println!("{}", gif_core::suggest_output_name(&file, &ExifToolReader));
        }
    }

    Ok(())
}

fn run_create(
    raw: RawRequest,
    ffmpeg: &str,
    show_log: bool,
    format: OutputFormat,
) -> anyhow::Result<ConversionOutcome> {
    let binary = encoder_binary(ffmpeg);
    let mut app = App::new(
        ffmpeg,
        Arc::new(FfmpegRunner::new(binary)),
        Box::new(WhichLocator),
        Arc::new(ExifToolReader),
    );

    let start = Instant::now();
    match app.dispatch(UiEvent::Submit(raw)) {
        Dispatch::Started => {}
        Dispatch::Rejected(e) => {
            match format {
                OutputFormat::Human => view::print_error(&e.user_message()),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "status": "rejected",
                        "error": e.to_string(),
                    }))?
                ),
            }
            std::process::exit(2);
        }
        Dispatch::Applied => {}
    }

    let terminal = view::TerminalView::new(show_log, format == OutputFormat::Json);
    app.run_to_completion(|state, event| terminal.render(state, event));

    let outcome = app
        .state()
        .outcome
        .clone()
        .context("Conversion worker stopped without reporting an outcome")?;
    info!(
        success = outcome.is_success(),
        duration_secs = start.elapsed().as_secs_f64(),
        "gif-maker create finished"
    );

    match format {
        OutputFormat::Human => view::print_outcome(&outcome),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(outcome)
}

/// Resolved path of the encoder, or the name itself so that validation
/// reports it as missing.
fn encoder_binary(ffmpeg: &str) -> PathBuf {
    require_tool(&WhichLocator, ffmpeg).unwrap_or_else(|_| PathBuf::from(ffmpeg))
}

/// Dry-run description of a validated request.
fn plan_report(request: &ConversionRequest, output: &Path, ffmpeg: &str) -> serde_json::Value {
    let plan = plan(request, output);
    let program = OsStr::new(ffmpeg);
    serde_json::json!({
        "frames": request.input.files.len(),
        "frame_rate": request.frame_rate,
        "scale": request.scale,
        "dither": request.dither,
        "output": output,
        "palette_command": display_command(program, &plan.palette),
        "render_command": display_command(program, &plan.render),
    })
}

fn print_plan(raw: &RawRequest, ffmpeg: &str, format: OutputFormat) -> anyhow::Result<()> {
    let request = match validate(raw, ffmpeg, &WhichLocator) {
        Ok(request) => request,
        Err(e) => {
            view::print_error(&e.user_message());
            std::process::exit(2);
        }
    };
    // No worker for a dry run, so the suggested name is resolved here.
    let output = request.output_path(&ExifToolReader);
    let report = plan_report(&request, &output, ffmpeg);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => {
            println!("# {} frame(s) → {}", request.input.files.len(), output.display());
            for key in ["palette_command", "render_command"] {
                if let Some(command) = report[key].as_str() {
                    println!("{}", command);
                }
            }
        }
    }
    Ok(())
}
