use clap::{Parser, Subcommand};
use gallery_derive::config::{self, GalleryConfig};
use gallery_derive::imaging::{self, RustBackend};
use gallery_derive::output;
use gallery_derive::process::{ProcessEvent, ProcessSummary, Processor};
use gallery_derive::storage::LocalStore;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

fn version_string() -> &'static str {
    let hash = env!("GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{}@{hash}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "gallery-derive")]
#[command(about = "Size-bounded WebP renditions and a URL index for a photo bucket")]
#[command(long_about = "\
Size-bounded WebP renditions and a URL index for a photo bucket

Originals under the source prefix are mirrored, compressed, under the
destination prefix. Each rendition is squeezed below a byte target by
lowering quality first and resolution second:

  public/trips/IMG_0042.JPG  →  public_middle/trips/IMG_0042.webp
                                public_middle/trips/IMG_0042_info.json
                                public_middle/photo_list_tracker.json (index)

The bucket is a local directory tree (--bucket-root); keys are paths
relative to it.

Configuration: stock defaults, then --config, then environment variables
(BUCKET_NAME, TARGET_SIZE_KB, WEBP_QUALITY, ...). Logs go to stderr and
follow RUST_LOG (default: info).

Run 'gallery-derive gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (TOML). Missing files are ignored.
    #[arg(long, default_value = "gallery-derive.toml", global = true)]
    config: PathBuf,

    /// Directory holding the bucket's objects
    #[arg(long, default_value = ".", global = true)]
    bucket_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle a bucket notification document (S3 or SNS-wrapped)
    Handle {
        /// Notification JSON file; reads stdin when omitted or "-"
        event: Option<PathBuf>,
    },
    /// Derive every original under the source prefix and rebuild the index
    Backfill,
    /// Regenerate the index from the derivatives on storage, without encoding anything
    RebuildIndex,
    /// Compress a single file outside any bucket
    Compress {
        input: PathBuf,
        /// Defaults to the input path with the output format's extension
        output: Option<PathBuf>,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(Some(&cli.config))?;
    init_thread_pool(&config.processing);
    let store = LocalStore::new(&cli.bucket_root);
    let backend = RustBackend::new();

    match cli.command {
        Command::Handle { event } => {
            let json = read_event(event.as_deref())?;
            let summary = with_printer(|tx| {
                Processor::new(&store, &backend, &config)
                    .with_events(tx)
                    .handle_notification(&json)
            })?;
            finish(summary)?;
        }
        Command::Backfill => {
            let summary = with_printer(|tx| {
                Processor::new(&store, &backend, &config)
                    .with_events(tx)
                    .backfill()
            })?;
            finish(summary)?;
        }
        Command::RebuildIndex => {
            with_printer(|tx| {
                Processor::new(&store, &backend, &config)
                    .with_events(tx)
                    .rebuild_index()
            })?;
        }
        Command::Compress { input, output } => compress_file(&backend, &config, &input, output)?,
        Command::GenConfig => {}
    }

    Ok(())
}

/// Structured logs on stderr; stdout carries the formatted report.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Run `work` with a channel whose events are printed on a dedicated thread.
/// The sender is dropped when `work` returns, which ends the printer.
fn with_printer<T, E>(
    work: impl FnOnce(Sender<ProcessEvent>) -> Result<T, E>,
) -> Result<T, Box<dyn std::error::Error>>
where
    E: std::error::Error + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = work(tx);
    printer
        .join()
        .map_err(|_| "output thread panicked".to_string())?;
    Ok(result?)
}

/// Print the summary; any failed object makes the command fail.
fn finish(summary: ProcessSummary) -> Result<(), Box<dyn std::error::Error>> {
    output::print_summary(&summary);
    if summary.has_failures() {
        return Err(format!("{} object(s) failed", summary.failed).into());
    }
    Ok(())
}

fn read_event(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p),
        _ => {
            let mut json = String::new();
            std::io::stdin().read_to_string(&mut json)?;
            Ok(json)
        }
    }
}

fn compress_file(
    backend: &RustBackend,
    config: &GalleryConfig,
    input: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let compression = config.compression.to_compression_config();
    let dest = output.unwrap_or_else(|| input.with_extension(compression.format.extension()));
    if dest == input {
        return Err(format!("refusing to overwrite {}", input.display()).into());
    }
    let raw = std::fs::read(input)?;
    let result = imaging::compress(backend, &raw, &compression)?;
    std::fs::write(&dest, &result.bytes)?;
    output::print_compress_output(input, &dest, raw.len(), &result, compression.target_bytes);
    Ok(())
}
