//! livedu - a streaming disk usage analyzer.
//!
//! Usage:
//!   livedu scan [PATH]       Scan with live progress, then print the tree
//!   livedu expand [PATH]     One-shot scan of a single subtree
//!   livedu --help            Show help

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use livedu_core::Node;
use livedu_scan::{ScanConfig, ScanCoordinator, ScanEvent};

#[derive(Parser)]
#[command(
    name = "livedu",
    version,
    about = "A streaming disk usage analyzer",
    long_about = "livedu shows where your disk space goes while it is still counting.\n\n\
                  Directories past the depth limit are sized with `du` instead of \
                  being expanded, so large trees produce a useful answer quickly."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory, streaming progress to stderr
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Scan a single subtree in one shot
    Expand {
        /// Directory to expand
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Load scan settings from a JSON file; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Depth past which directories are estimated instead of expanded
    #[arg(short, long)]
    depth: Option<u32>,

    /// Maximum filesystem operations in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Depth from which directories are capped
    #[arg(long)]
    cap_depth: Option<u32>,

    /// Children kept per capped directory before folding the rest
    #[arg(long)]
    max_children: Option<usize>,

    /// Milliseconds between progress updates
    #[arg(long, value_name = "MS")]
    tick_ms: Option<u64>,

    /// Include hidden entries
    #[arg(long, overrides_with = "no_hidden")]
    hidden: bool,

    /// Skip entries whose name starts with a dot
    #[arg(long, overrides_with = "hidden")]
    no_hidden: bool,

    /// Skip entries matching this glob (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

#[derive(Args)]
struct OutputArgs {
    /// Number of top entries to show per directory
    #[arg(short = 'n', long, default_value = "10")]
    top: usize,

    /// Print the final tree as JSON
    #[arg(long)]
    json: bool,
}

impl ScanArgs {
    /// Merge the config file, if any, with flag overrides.
    fn to_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(file) => {
                let text = std::fs::read_to_string(file)
                    .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
                serde_json::from_str::<ScanConfig>(&text)
                    .wrap_err_with(|| format!("Invalid config file {}", file.display()))?
            }
            None => ScanConfig::default(),
        };

        if let Some(depth) = self.depth {
            config.max_depth = depth;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(cap_depth) = self.cap_depth {
            config.cap_depth = cap_depth;
        }
        if let Some(max_children) = self.max_children {
            config.max_children = max_children;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval = Duration::from_millis(tick_ms);
        }
        if self.hidden {
            config.include_hidden = true;
        } else if self.no_hidden {
            config.include_hidden = false;
        }
        config.ignore_patterns.extend(self.exclude.iter().cloned());

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan { path, scan, output } => {
            run_scan(&path, scan.to_config()?, &output).await?;
        }
        Command::Expand { path, scan, output } => {
            run_expand(&path, scan.to_config()?, &output).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Stream a scan, then print its final tree.
async fn run_scan(path: &Path, config: ScanConfig, output: &OutputArgs) -> Result<()> {
    let coordinator = ScanCoordinator::new(config)?;
    let handle = coordinator
        .request_scan(path)
        .await
        .wrap_err_with(|| format!("Cannot scan {}", path.display()))?;

    eprintln!("Scanning {}...", handle.path().display());

    let mut events = handle.subscribe();
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Progress {
                tree,
                dirs_found,
                dirs_completed,
            } => {
                let mut stderr = std::io::stderr();
                let _ = write!(
                    stderr,
                    "\r\x1b[2K {dirs_completed}/{dirs_found} directories, {} so far",
                    format_size(tree.size)
                );
                let _ = stderr.flush();
            }
            ScanEvent::Done { tree } => {
                eprint!("\r\x1b[2K");
                return render(&tree, handle.path(), output);
            }
            ScanEvent::Error { message } => {
                eprint!("\r\x1b[2K");
                bail!("Scan failed: {message}");
            }
        }
    }

    bail!("Scan was cancelled")
}

/// Scan one subtree without progress and print it.
async fn run_expand(path: &Path, config: ScanConfig, output: &OutputArgs) -> Result<()> {
    let max_depth = config.max_depth;
    let coordinator = ScanCoordinator::new(config)?;
    let tree = coordinator
        .expand_subtree(path, max_depth)
        .await
        .wrap_err_with(|| format!("Cannot expand {}", path.display()))?;
    let root = tree.path.clone();
    render(&tree, &root, output)
}

fn render(tree: &Node, path: &Path, output: &OutputArgs) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(tree)?);
        return Ok(());
    }

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", path.display(), format_size(tree.size));
    println!(" {} entries", tree.node_count());
    println!("{}", "─".repeat(60));
    println!();

    print_node(tree, path, 0, output.top, tree.size);
    Ok(())
}

/// Print a node and its children.
fn print_node(node: &Node, path: &Path, depth: usize, top_n: usize, root_size: u64) {
    let indent = "  ".repeat(depth);
    let ratio = if root_size > 0 {
        node.size as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let name = if depth == 0 {
        path.display().to_string()
    } else if node.is_dir() {
        format!("{}/", node.name)
    } else {
        node.name.to_string()
    };

    let marker = match (node.is_dir(), node.truncated) {
        (true, true) => "≈ ",
        (true, false) => "▼ ",
        (false, _) => "  ",
    };

    println!(
        "{}{}{:<40} {:>10} {:>5.1}% {}",
        indent,
        marker,
        truncate(&name, 40),
        format_size(node.size),
        ratio,
        make_bar(ratio / 100.0, 10)
    );

    let children = node.children();
    for child in children.iter().take(top_n) {
        print_node(child, &child.path, depth + 1, top_n, root_size);
    }

    let remaining = children.len().saturating_sub(top_n);
    if remaining > 0 {
        println!("{}    ... and {} more", indent, remaining);
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
