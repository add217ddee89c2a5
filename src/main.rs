//! wasm-scope command line
//!
//! Loads a WebAssembly module (binary or text) into an analysis worker and
//! runs one query against it.
//!
//! Architecture:
//! - Worker thread: owns the module and runs the parser/printer
//! - Main thread: tokio runtime driving the client side of the bridge

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wasm_scope::{
    dump_module, search_with, AnalysisHandle, Analyzer, Range, SearchOptions, StyledText, TreeNode,
    WasmEngine,
};

#[derive(Parser)]
#[command(name = "wasm-scope", version, about = "Navigate the structure of WebAssembly modules")]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List structural items in load order
    Items(FileArgs),
    /// Show the containment tree of items
    Tree(FileArgs),
    /// Search items by name or hex offset
    Search(SearchArgs),
    /// Print the text format for a byte range
    Print(PrintArgs),
    /// Write the module in binary form
    Source(SourceArgs),
    /// Annotated hex dump of the binary module
    Dump(DumpArgs),
}

#[derive(Args)]
struct FileArgs {
    /// Path to a .wasm or .wat file
    file: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    /// Path to a .wasm or .wat file
    file: PathBuf,
    /// Name fragment or hex offset (0x...)
    query: String,
    /// Maximum number of matches
    #[arg(long, default_value_t = 100)]
    limit: usize,
}

#[derive(Args)]
struct PrintArgs {
    /// Path to a .wasm or .wat file
    file: PathBuf,
    /// Range start (hex 0x... or decimal)
    start: String,
    /// Range end, exclusive (hex 0x... or decimal)
    end: String,
    /// Print without styling information
    #[arg(long)]
    plain: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Path to a .wasm or .wat file
    file: PathBuf,
    /// Output path for the binary module
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct DumpArgs {
    /// Path to a .wasm or .wat file
    file: PathBuf,
    /// Only rows overlapping this start offset (hex 0x... or decimal)
    start: Option<String>,
    /// Exclusive end of the row filter
    #[arg(requires = "start")]
    end: Option<String>,
}

impl Command {
    fn file(&self) -> &Path {
        match self {
            Command::Items(a) | Command::Tree(a) => &a.file,
            Command::Search(a) => &a.file,
            Command::Print(a) => &a.file,
            Command::Source(a) => &a.file,
            Command::Dump(a) => &a.file,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wasm_scope=info")),
        )
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.command.file().to_path_buf();
    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let (analyzer, worker_thread) = Analyzer::spawn(WasmEngine::new()).await?;
    info!(path = %path.display(), len = bytes.len(), "Loading module");
    let handle = analyzer.load(bytes).await?;

    let result = match handle.validation_error() {
        Some(invalid) => Err(anyhow::anyhow!(
            "{} is not a valid module: {}",
            path.display(),
            invalid
        )),
        None => execute(&cli.command, &handle, cli.json).await,
    };

    handle.release().await;
    drop(handle);
    analyzer.shutdown().await?;
    drop(analyzer);
    if worker_thread.join().is_err() {
        error!("Analysis worker panicked");
    }
    result
}

async fn execute(command: &Command, handle: &AnalysisHandle, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Items(_) => {
            if json {
                return print_json(handle.items());
            }
            for item in handle.items() {
                if item.display_name != item.raw_name {
                    println!("{}\t{} ({})", item.range, item.raw_name, item.display_name);
                } else {
                    println!("{}\t{}", item.range, item.raw_name);
                }
            }
        }
        Command::Tree(_) => {
            let tree = handle.tree();
            if json {
                return print_json(&tree);
            }
            for child in &tree.children {
                print_tree(child, 0);
            }
        }
        Command::Search(args) => {
            let tree = handle.tree();
            let options = SearchOptions {
                max_results: args.limit,
                ..SearchOptions::default()
            };
            let matches = search_with(&tree, &args.query, &options);
            if json {
                return print_json(&matches);
            }
            if matches.is_empty() {
                println!("No matches for {:?}", args.query);
            }
            for m in &matches {
                let mut crumbs = m.ancestor_names.join(" > ");
                if !crumbs.is_empty() {
                    crumbs.push_str(" > ");
                }
                println!(
                    "{:.2}\t{}\t{}{}",
                    m.score, m.node.range, crumbs, m.node.display_name
                );
            }
        }
        Command::Print(args) => {
            let (start, end) = (parse_offset(&args.start)?, parse_offset(&args.end)?);
            anyhow::ensure!(start <= end, "range start {start:#x} is past end {end:#x}");
            let range = Range::new(start, end);
            if args.plain {
                let text = handle.print_plain(range).await?;
                if json {
                    return print_json(&*text);
                }
                println!("{}", text.trim_end_matches('\n'));
            } else {
                let parts = handle.print_rich(range).await?;
                let styled = StyledText::from_parts(&parts);
                if json {
                    return print_json(&styled);
                }
                for line in &styled.lines {
                    match line.offset {
                        Some(offset) => println!("{offset:#010x}  {}", line.text()),
                        None => println!("{:10}  {}", "", line.text()),
                    }
                }
            }
        }
        Command::Source(args) => {
            let bytes = handle.source().await?;
            std::fs::write(&args.out, &bytes)
                .with_context(|| format!("failed to write {}", args.out.display()))?;
            info!(path = %args.out.display(), len = bytes.len(), "Wrote binary module");
        }
        Command::Dump(args) => {
            let bytes = handle.source().await?;
            let mut rows = dump_module(&bytes)?;
            if let Some(start) = &args.start {
                let start = parse_offset(start)?;
                let end = match &args.end {
                    Some(end) => parse_offset(end)?,
                    None => u32::MAX,
                };
                anyhow::ensure!(start <= end, "range start {start:#x} is past end {end:#x}");
                let range = Range::new(start, end);
                rows.retain(|row| row.overlaps(&range));
            }
            if json {
                return print_json(&rows);
            }
            for row in &rows {
                println!("{row}");
            }
        }
    }
    Ok(())
}

fn print_tree(node: &TreeNode, depth: usize) {
    let name = if node.display_name != node.raw_name {
        format!("{} ({})", node.raw_name, node.display_name)
    } else {
        node.raw_name.clone()
    };
    println!("{:indent$}{} {}", "", name, node.range, indent = depth * 2);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_offset(s: &str) -> anyhow::Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| anyhow::anyhow!("Invalid offset format: {}", s))
    } else {
        s.parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid offset format: {}", s))
    }
}
