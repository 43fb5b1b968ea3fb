//! The query pipeline: tokenize the query, encode it against an index's
//! alphabet, scan the code section in parallel fixed-size blocks, sample
//! matches with a shared reservoir, and symbolize the sample back to
//! source text. Correctness rests entirely on the token codec's
//! subsequence property (`crate::codec`): a bytewise match of the
//! encoded query in the encoded corpus is exactly a token-subsequence
//! match.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::codec::encode_token;
use crate::error::PptError;
use crate::index::{IndexReader, LineInfo};
use crate::sampler::ReservoirSampler;
use crate::tokenizer::tokenize;

pub const DEFAULT_BLOCK_SIZE: usize = 100_000;
pub const DEFAULT_SAMPLES: usize = 100;
pub const DEFAULT_CONTEXT_LINES: u64 = 2;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub workers: usize,
    pub block_size: usize,
    pub samples: usize,
    pub context_lines: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            block_size: DEFAULT_BLOCK_SIZE,
            samples: DEFAULT_SAMPLES,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

/// One sampled match, symbolized back to its source location.
#[derive(Debug, Clone)]
pub struct MatchSample {
    pub file: String,
    pub match_line: u32,
    pub first_line: u32,
    pub lines: Vec<String>,
}

/// The full result of one query against one index.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub num_files: u64,
    pub num_matches: u64,
    pub samples: Vec<MatchSample>,
}

/// Tokenizes `query` and encodes it against `reader`'s alphabet. No
/// trailing EOF token is appended — unlike a file's own encoding, the
/// query must match as a strict substring, not a whole encoded file.
pub fn encode_query(reader: &IndexReader, query: &str) -> Result<Vec<u8>, PptError> {
    if query.trim().is_empty() {
        return Err(PptError::EmptyQuery);
    }
    let stream = tokenize("<query>", query.as_bytes())?;
    if stream.tokens.is_empty() {
        return Err(PptError::EmptyQuery);
    }
    let mut encoded = Vec::with_capacity(stream.tokens.len() * 2);
    for token in &stream.tokens {
        let id = reader.token_id(&token.spelling)?;
        if id == 0 {
            return Err(PptError::NoSuchToken { spelling: token.spelling.clone() });
        }
        encode_token(id, &mut encoded)?;
    }
    Ok(encoded)
}

/// Runs the parallel block-striped scan of `code` for `query_bytes`,
/// offering every match's starting offset to `sampler`. Workers claim
/// blocks via a shared monotonic counter; there is no locking inside the
/// comparison loop itself — all work is in-memory byte comparison.
fn scan_parallel(code: &[u8], query_bytes: &[u8], opts: &SearchOptions, sampler: &ReservoirSampler<u64>) {
    if query_bytes.is_empty() || query_bytes.len() > code.len() {
        return;
    }
    let code_len = code.len();
    let last_valid_start = code_len - query_bytes.len();
    let block_size = opts.block_size.max(1);
    let num_blocks = last_valid_start / block_size + 1;
    let next_block = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..opts.workers.max(1) {
            scope.spawn(|| loop {
                let block = next_block.fetch_add(1, Ordering::Relaxed);
                if block >= num_blocks {
                    return;
                }
                let start = block * block_size;
                let end = ((block + 1) * block_size).min(last_valid_start + 1);
                for candidate in start..end {
                    if code[candidate..candidate + query_bytes.len()] == *query_bytes {
                        sampler.offer(candidate as u64);
                    }
                }
            });
        }
    });
}

/// Reads the byte range spanned by `lines` (a line table slice where
/// `lines[i].file_offset .. lines[i+1].file_offset` bounds one rendered
/// line) and splits it using those boundaries, stripping each line's own
/// trailing `\n` rather than splitting the whole range on `\n` — a line's
/// own content may be empty, and the range's closing boundary is itself a
/// line-start offset, so a naive whole-range split would append a
/// spurious trailing empty element.
fn read_source_lines(path: &Path, lines: &[LineInfo]) -> Result<Vec<String>, PptError> {
    use std::io::{Read, Seek, SeekFrom};
    if lines.len() < 2 {
        return Ok(Vec::new());
    }
    let start = lines[0].file_offset as u64;
    let end = lines[lines.len() - 1].file_offset as u64;
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)?;

    let mut out = Vec::with_capacity(lines.len() - 1);
    for pair in lines.windows(2) {
        let rel_start = (pair[0].file_offset as u64 - start) as usize;
        let rel_end = (pair[1].file_offset as u64 - start) as usize;
        let mut line = String::from_utf8_lossy(&buf[rel_start..rel_end]).into_owned();
        if line.ends_with('\n') {
            line.pop();
        }
        out.push(line);
    }
    Ok(out)
}

/// Runs the full query pipeline against an already-open index.
pub fn search(reader: &IndexReader, corpus_dir: &Path, query: &str, opts: &SearchOptions) -> Result<SearchResults, PptError> {
    let query_bytes = encode_query(reader, query)?;

    let code = reader.code_section();
    let sampler: ReservoirSampler<u64> = ReservoirSampler::new(opts.samples);
    scan_parallel(code, &query_bytes, opts, &sampler);

    let num_matches = sampler.count();
    let mut sample_offsets = sampler.into_samples();
    sample_offsets.sort_unstable();

    let mut samples = Vec::with_capacity(sample_offsets.len());
    for offset in sample_offsets {
        let file_lines = reader.symbolize(offset, query_bytes.len() as u64, opts.context_lines)?;
        let rel_path = reader.filename(&file_lines.file_info)?.to_string();
        let abs_path = corpus_dir.join(&rel_path);

        let lines = read_source_lines(&abs_path, &file_lines.lines)?;

        samples.push(MatchSample {
            file: rel_path,
            match_line: file_lines.match_lineno,
            first_line: file_lines.first_lineno,
            lines,
        });
    }

    Ok(SearchResults { num_files: reader.num_files(), num_matches, samples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::builder::{build_index, BuildOptions};
    use std::fs;
    use tempfile::tempdir;

    fn build(files: &[(&str, &str)]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let out = dir.path().join("out.idx");
        build_index(dir.path(), &out, &BuildOptions { workers: 2, ..Default::default() }).unwrap();
        (dir, out)
    }

    #[test]
    fn single_file_single_match() {
        let (dir, out) = build(&[("a.cc", "int main() { return 0; }\n")]);
        let reader = IndexReader::open(&out).unwrap();
        let results = search(&reader, dir.path(), "return 0", &SearchOptions { workers: 2, ..Default::default() }).unwrap();
        assert_eq!(results.num_matches, 1);
        assert_eq!(results.samples.len(), 1);
        assert_eq!(results.samples[0].match_line, 1);
        // A single-line file must yield exactly one rendered line, not a
        // spurious trailing empty one from splitting on the closing '\n'.
        assert_eq!(results.samples[0].lines, vec!["int main() { return 0; }"]);
    }

    #[test]
    fn rendered_lines_have_no_spurious_trailing_blank() {
        let (dir, out) = build(&[("a.cc", "int a;\nint b;\nint c;\n")]);
        let reader = IndexReader::open(&out).unwrap();
        let results = search(
            &reader,
            dir.path(),
            "int c",
            &SearchOptions { workers: 2, context_lines: 0, ..Default::default() },
        )
        .unwrap();
        assert_eq!(results.num_matches, 1);
        let sample = &results.samples[0];
        assert_eq!(sample.lines, vec!["int b;", "int c;"]);
    }

    #[test]
    fn dedup_means_one_file_one_match() {
        let (dir, out) = build(&[
            ("a.cc", "int main() { return 0; }\n"),
            ("b.cc", "int main() { return 0; }\n"),
        ]);
        let reader = IndexReader::open(&out).unwrap();
        assert_eq!(reader.num_files(), 1);
        let results = search(&reader, dir.path(), "main", &SearchOptions { workers: 2, ..Default::default() }).unwrap();
        assert_eq!(results.num_matches, 1);
    }

    #[test]
    fn absent_token_is_an_error() {
        let (dir, out) = build(&[("a.cc", "int main() { return 0; }\n")]);
        let reader = IndexReader::open(&out).unwrap();
        let err = search(&reader, dir.path(), "__never_appears_123", &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, PptError::NoSuchToken { .. }));
        assert!(err.to_string().contains("no such token in dataset"));
    }

    #[test]
    fn empty_query_is_an_error() {
        let (_dir, out) = build(&[("a.cc", "int main() { return 0; }\n")]);
        let reader = IndexReader::open(&out).unwrap();
        let err = encode_query(&reader, "   ").unwrap_err();
        assert!(matches!(err, PptError::EmptyQuery));
    }

    #[test]
    fn multi_token_query_matches_exact_subsequence() {
        let (dir, out) = build(&[("a.cc", "for (int i = 0; i < 10; ++i) { sum += i; }\n")]);
        let reader = IndexReader::open(&out).unwrap();
        let results = search(&reader, dir.path(), "sum += i", &SearchOptions::default()).unwrap();
        assert_eq!(results.num_matches, 1);
    }
}
