//! Argument structs, one per subcommand.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Corpus directory to walk and index.
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Path to write the binary index to.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Worker thread count for the tokenize/encode passes.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Skip files larger than this many bytes.
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    pub max_file_size: u64,

    /// Write a log of files skipped during the walk (size limit, binary
    /// content, ignored by VCS rules) to this path.
    #[arg(long)]
    pub skipped_log: Option<PathBuf>,

    /// Write a `count spelling_len spelling` dump, sorted by descending
    /// frequency, to this path.
    #[arg(long)]
    pub token_counts: Option<PathBuf>,

    /// Index dotfiles and dot-directories too.
    #[arg(long)]
    pub hidden: bool,

    /// Ignore `.gitignore`/`.ignore` files; walk everything.
    #[arg(long)]
    pub no_ignore: bool,

    /// Log verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Index file to search.
    #[arg(short, long)]
    pub index: PathBuf,

    /// Corpus directory the index was built from (for reading matched
    /// source lines back off disk).
    #[arg(short, long)]
    pub dir: PathBuf,

    /// The query text, tokenized the same way the corpus was.
    pub query: String,

    /// Scanner worker thread count.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Bytes of code section scanned per work unit.
    #[arg(long, default_value_t = pptsearch::search::DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Maximum number of matches to sample and display.
    #[arg(long, default_value_t = pptsearch::search::DEFAULT_SAMPLES)]
    pub samples: usize,

    /// Lines of context to show around each match.
    #[arg(long, default_value_t = pptsearch::search::DEFAULT_CONTEXT_LINES)]
    pub context: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Index file to verify.
    #[arg(short, long)]
    pub index: PathBuf,

    /// Corpus directory the index was built from.
    #[arg(short, long)]
    pub dir: PathBuf,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Index file to inspect.
    #[arg(short, long)]
    pub index: PathBuf,
}
