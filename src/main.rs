use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workspace_sync::sync::BandwidthLimit;
use workspace_sync::{ConfigFile, SyncEngine, SyncOptions, SyncPlan, SyncProgress, SyncResult};

#[derive(Parser)]
#[command(name = "wsync")]
#[command(about = "Synchronize a local workspace with an S3 bucket prefix")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/wsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override config file values.
#[derive(Args)]
struct TargetArgs {
    #[arg(short, long, global = true)]
    bucket: Option<String>,

    /// Key prefix inside the bucket
    #[arg(short, long, global = true)]
    prefix: Option<String>,

    /// Local workspace directory
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    #[arg(long, global = true)]
    region: Option<String>,

    /// S3-compatible endpoint (MinIO, R2, ...)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    download_concurrency: Option<usize>,

    #[arg(long, global = true)]
    upload_concurrency: Option<usize>,

    /// Extra ignore pattern (repeatable)
    #[arg(short, long = "ignore", global = true)]
    ignore: Vec<String>,

    /// Bytes per second shared by all transfers
    #[arg(long, global = true)]
    bandwidth_limit: Option<u64>,

    /// Pull removes local files missing from the bucket
    #[arg(long, global = true)]
    delete_local_extras: bool,

    /// Push keeps remote objects missing locally
    #[arg(long, global = true)]
    no_prune: bool,
}

impl TargetArgs {
    fn into_config(self) -> ConfigFile {
        ConfigFile {
            bucket: self.bucket,
            prefix: self.prefix,
            workspace: self.workspace,
            region: self.region,
            endpoint: self.endpoint,
            download_concurrency: self.download_concurrency,
            upload_concurrency: self.upload_concurrency,
            ignore: self.ignore,
            bandwidth_limit: self.bandwidth_limit.map(BandwidthLimit::new),
            delete_local_extras: self.delete_local_extras.then_some(true),
            prune_remote: self.no_prune.then_some(false),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download new and changed files from the bucket
    Pull,
    /// Upload new and changed files and prune orphaned objects
    Push,
    /// Show what a pull or push would do
    Plan {
        #[arg(value_enum)]
        direction: Direction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Pull,
    Push,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        // Completed with per-file errors
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_options(config: Option<&PathBuf>, flags: TargetArgs) -> Result<SyncOptions> {
    let file = match config {
        Some(path) => ConfigFile::load(path)?,
        None => match ConfigFile::default_path().filter(|p| p.is_file()) {
            Some(path) => ConfigFile::load(&path)?,
            None => ConfigFile::default(),
        },
    };

    let options = file
        .merge(flags.into_config())
        .into_options()
        .context("incomplete configuration, pass --bucket and --workspace or use a config file")?;
    Ok(options)
}

/// Returns whether the operation finished without per-file errors.
async fn run(cli: Cli) -> Result<bool> {
    let options = load_options(cli.config.as_ref(), cli.target)?;

    let direction = match cli.command {
        Commands::Plan { direction } => {
            let engine = SyncEngine::new(options)?;
            let plan = match direction {
                Direction::Pull => engine.plan_pull().await?,
                Direction::Push => engine.plan_push().await?,
            };
            print_plan(&plan, cli.json)?;
            return Ok(true);
        }
        Commands::Pull => Direction::Pull,
        Commands::Push => Direction::Push,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let engine = SyncEngine::with_progress(options, tx)?;

    let bar = (!cli.quiet && !cli.json).then(progress_bar);
    let reporter = tokio::spawn(report_progress(rx, bar));

    let result = {
        let operation = async {
            match direction {
                Direction::Pull => engine.pull().await,
                Direction::Push => engine.push().await,
            }
        };
        tokio::pin!(operation);

        tokio::select! {
            result = &mut operation => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{}", "interrupted, finishing in-flight transfers".yellow());
                engine.cancel();
                operation.await
            }
        }
    }?;

    // Closes the progress channel
    drop(engine);
    let _ = reporter.await;

    print_result(&result, cli.json)?;
    Ok(result.success)
}

fn progress_bar() -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {prefix:>8} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {wide_msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let bar = ProgressBar::new(0);
    bar.set_style(style);
    bar
}

async fn report_progress(mut rx: UnboundedReceiver<SyncProgress>, bar: Option<ProgressBar>) {
    while let Some(progress) = rx.recv().await {
        let Some(bar) = &bar else { continue };
        bar.set_prefix(progress.phase.to_string());
        bar.set_length(progress.total as u64);
        bar.set_position(progress.current as u64);
        bar.set_message(progress.current_file.unwrap_or_default());
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn print_result(result: &SyncResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let mut parts = Vec::new();
    if let Some(n) = result.downloaded_files {
        parts.push(format!("{} downloaded", n));
    }
    if let Some(n) = result.uploaded_files {
        parts.push(format!("{} uploaded", n));
    }
    if let Some(n) = result.deleted_files {
        parts.push(format!("{} deleted", n));
    }

    let summary = format!(
        "{} ({}) in {:.1}s",
        parts.join(", "),
        format_size(result.bytes_transferred, BINARY),
        result.duration.as_secs_f64()
    );

    if result.success {
        println!("{} {}", "✓".green().bold(), summary);
    } else {
        println!("{} {}", "✗".red().bold(), summary);
        println!("{} {}", result.errors.len().to_string().red(), "errors:".red());
        for error in &result.errors {
            println!("  {}", error);
        }
    }

    Ok(())
}

fn print_plan(plan: &SyncPlan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    for file in &plan.transfers {
        println!("  {} {} ({})", "+".green(), file.path, format_size(file.size, BINARY));
    }
    for path in &plan.deletions {
        println!("  {} {}", "-".red(), path);
    }

    if plan.is_empty() {
        println!("{} up to date ({} unchanged)", "✓".green().bold(), plan.unchanged);
    } else {
        println!(
            "{} to transfer ({}), {} to delete, {} unchanged",
            plan.transfers.len(),
            format_size(plan.transfer_bytes(), BINARY),
            plan.deletions.len(),
            plan.unchanged
        );
    }

    Ok(())
}
