//! arbor-du: sum the sizes of the files below a directory.
//!
//! Usage:
//!   arbor-du [PATH]                    # Recursive crawl (default: .)
//!   arbor-du --shallow [PATH]          # Directory and its entries only
//!   arbor-du --pattern '/src/*.rs'     # Only count paths the pattern covers
//!   arbor-du --max-depth 2 [PATH]      # Stop two levels below PATH

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use arbor_crawl::{
    CrawlError, CrawlOptions, CrawlProgress, Crawler, LocalResource, Node, Stat, Visitor,
};
use arbor_path::Path;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    root: PathBuf,
    pattern: Path,
    options: CrawlOptions,
}

enum Command {
    Crawl(Args),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut root = None;
    let mut pattern = Path::root();
    let mut options = CrawlOptions::recursive();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            "--shallow" => options.recursive = false,
            "--pattern" => {
                let text = iter.next().context("--pattern requires a glob argument")?;
                pattern = text
                    .parse()
                    .with_context(|| format!("invalid pattern: {text}"))?;
            }
            "--max-depth" => {
                let depth = iter.next().context("--max-depth requires a number")?;
                let depth = depth
                    .parse()
                    .with_context(|| format!("invalid depth: {depth}"))?;
                options = options.max_depth(depth);
            }
            unknown if unknown.starts_with('-') => bail!("unknown option: {unknown}"),
            path => {
                if root.replace(PathBuf::from(path)).is_some() {
                    bail!("only one PATH may be given");
                }
            }
        }
    }

    Ok(Command::Crawl(Args {
        root: root.unwrap_or_else(|| PathBuf::from(".")),
        pattern,
        options,
    }))
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&args)? {
        Command::Crawl(args) => args,
        Command::Help => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Command::Version => {
            println!("arbor-du {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let crawler = Crawler::new(LocalResource::new(&args.root), SizeTally::default())
        .with_pattern(args.pattern)
        .with_options(args.options);

    match rt.block_on(crawler.run()) {
        Ok(_) => {
            let tally = crawler.visitor();
            println!(
                "Done crawling. Total size: {} bytes in {} files",
                tally.bytes(),
                tally.files()
            );
            if let Some(warning) = incomplete_warning(&crawler.progress()) {
                eprintln!("{warning}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Crawling failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// A note for totals that leave out entries the crawl could not read.
fn incomplete_warning(progress: &CrawlProgress) -> Option<String> {
    if progress.failed == 0 && progress.skipped == 0 {
        return None;
    }
    Some(format!(
        "Warning: total is incomplete: {} entries could not be read, {} skipped for unreadable names",
        progress.failed, progress.skipped
    ))
}

fn print_help() {
    println!(
        r#"arbor-du v{}

Usage:
  arbor-du [OPTIONS] [PATH]

Options:
  --shallow                 Only count PATH and its direct entries
  --pattern <glob>          Only count paths the pattern covers, e.g. '/src/*.rs'
  --max-depth <n>           Do not descend more than n levels below PATH
  -h, --help                Show this help
  -V, --version             Show version

Set RUST_LOG=debug to see each file as it is counted.
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Running totals of file sizes.
#[derive(Debug, Default)]
struct SizeTally {
    bytes: AtomicU64,
    files: AtomicU64,
}

impl SizeTally {
    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    fn files(&self) -> u64 {
        self.files.load(Ordering::SeqCst)
    }
}

impl Visitor<LocalResource> for SizeTally {
    fn visit(&self, node: &Node<LocalResource>, stat: &Stat) {
        if !stat.is_file {
            return;
        }
        let size = stat.size.unwrap_or(0);
        let total = self.bytes.fetch_add(size, Ordering::SeqCst) + size;
        self.files.fetch_add(1, Ordering::SeqCst);
        debug!(path = %node.path, size, total, "counted");
    }

    fn failed(&self, error: &CrawlError) {
        debug!(%error, "crawl aborted");
    }
}
