//! CLI layer: argument parsing, command dispatch, and subcommand implementations.

pub mod args;

pub use args::*;

use clap::{Parser, Subcommand};

use pptsearch::error::PptError;
use pptsearch::index::{build_index, BuildOptions, IndexReader};
use pptsearch::search::{search, SearchOptions};
use pptsearch::verify::verify_index;

/// Token-indexed substring search over a C/C++ source corpus.
#[derive(Parser, Debug)]
#[command(name = "pptsearch", version, about, after_help = "\
Run 'pptsearch <COMMAND> --help' for detailed options.")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Walk a corpus, tokenize it, and write a binary index.
    Index(IndexArgs),

    /// Search an index for a substring query.
    Query(QueryArgs),

    /// Check an index's on-disk invariants against its corpus directory.
    Verify(VerifyArgs),

    /// Print an index's header counts without a full verification pass.
    Info(InfoArgs),
}

fn install_logging(log_level: &str) {
    let level = match log_level {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Index(args) => cmd_index(args),
        Commands::Query(args) => cmd_query(args),
        Commands::Verify(args) => cmd_verify(args),
        Commands::Info(args) => cmd_info(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_index(args: IndexArgs) -> Result<(), PptError> {
    install_logging(&args.log_level);

    let opts = BuildOptions {
        max_file_size: args.max_file_size,
        workers: args.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        }),
        skipped_log: args.skipped_log.clone(),
        token_counts: args.token_counts.clone(),
        hidden: args.hidden,
        no_ignore: args.no_ignore,
    };

    let report = build_index(&args.dir, &args.output, &opts)?;

    eprintln!(
        "indexed {} files, {} tokens, {} lines, {} bytes ({} skipped)",
        report.num_files,
        report.num_tokens,
        report.total_lines,
        report.total_bytes,
        report.skipped.len(),
    );
    eprintln!("wrote {}", args.output.display());
    Ok(())
}

fn cmd_query(args: QueryArgs) -> Result<(), PptError> {
    install_logging(&args.log_level);

    let reader = IndexReader::open(&args.index)?;
    let opts = SearchOptions {
        workers: args.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        }),
        block_size: args.block_size,
        samples: args.samples,
        context_lines: args.context,
    };

    let results = search(&reader, &args.dir, &args.query, &opts)?;

    println!("{} matches across {} indexed files", results.num_matches, results.num_files);
    for sample in &results.samples {
        println!();
        println!("{}:{}", sample.file, sample.match_line);
        for (offset, line) in sample.lines.iter().enumerate() {
            let lineno = sample.first_line + offset as u32;
            let marker = if lineno == sample.match_line { ">" } else { " " };
            println!("{marker} {lineno:>6} | {line}");
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> Result<(), PptError> {
    install_logging(&args.log_level);

    let reader = IndexReader::open(&args.index)?;
    let report = verify_index(&reader, &args.dir)?;

    eprintln!(
        "checked {} files, {} tokens",
        report.files_checked, report.tokens_checked
    );
    if report.is_ok() {
        eprintln!("OK");
        Ok(())
    } else {
        for failure in &report.failures {
            eprintln!("FAIL: {}", failure.message);
        }
        Err(PptError::IntegrityViolation(format!(
            "{} invariant violation(s) found",
            report.failures.len()
        )))
    }
}

fn cmd_info(args: InfoArgs) -> Result<(), PptError> {
    let reader = IndexReader::open(&args.index)?;
    let header = reader.header();
    println!("files:              {}", header.num_files);
    println!("tokens:             {}", header.num_tokens);
    println!("total lines:        {}", header.total_lines);
    println!("total source bytes: {}", header.total_bytes);
    println!("code section bytes: {}", header.code_section_length);
    Ok(())
}
