use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use format::{FormatSpec, DEFAULT_FORMAT};
use normalize::Normalizer;
use process::{Options, Outcome, Processor};
use summary::RunSummary;
use tag::LoftyStore;

mod error;
mod format;
mod normalize;
mod process;
mod scan;
mod summary;
mod tag;

/// Extract mp3 tags from file names and write them to the file's metadata.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Folder containing mp3 files, or a single mp3 file
    path: PathBuf,
    /// File name format, e.g. "%tracknumber%. %artist% - %title%"
    #[arg(short, long, default_value = DEFAULT_FORMAT)]
    format: String,
    /// 1-based index of the first directory entry to process
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    start: u64,
    /// File name normalization applied before matching
    #[arg(short, long, value_enum, default_value_t = Normalizer::default())]
    normalize: Normalizer,
    /// Report renames and tag writes without touching any file
    #[arg(short, long)]
    dry_run: bool,
    /// Keep each file's modification time after writing tags
    #[arg(long)]
    preserve_mtime: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Default log directives. lofty only reports errors so that per-file
/// parsing notes stay out of a batch run.
fn log_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("{},lofty=error", level)
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn progress(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{pos}/{len} {wide_bar} {msg}") {
        bar.set_style(style);
    }
    bar
}

fn run(cli: &Cli) -> error::Result<RunSummary> {
    let format = FormatSpec::compile(&cli.format)?;
    for field in format.unimplemented_fields() {
        warn!("formatter '%{}%' is recognized but not implemented", field);
    }
    let files = scan::targets(&cli.path, cli.start as usize)?;

    if !cli.json {
        println!("Target path: {}", cli.path.display());
        println!("Formatter: {}", format);
    }
    info!("{} files to process, fields {:?}", files.len(), format.fields());

    let options = Options {
        normalizer: cli.normalize,
        dry_run: cli.dry_run,
        preserve_mtime: cli.preserve_mtime,
    };
    let processor = Processor::new(&format, LoftyStore, options);
    let bar = progress(files.len(), cli.quiet || cli.json);
    let mut summary = RunSummary::new();

    for file in &files {
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        bar.set_message(name.into_owned());
        let outcome = processor.process(file);
        match &outcome {
            Outcome::Processed { path } => debug!("{} -> {}", file.display(), path.display()),
            other => debug!("{}: {:?}", file.display(), other),
        }
        summary.record(file, &outcome);
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(summary) => {
            if cli.json {
                match summary.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print!("{}", summary.report());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
