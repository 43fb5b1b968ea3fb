//! Builds the binary index in six conceptual passes over a corpus
//! directory: walk-and-size-filter, tokenize-and-count, alphabet
//! assignment, shuffle-encode-and-dedup, and a verified write pass that
//! re-tokenizes every surviving file from disk once more before
//! committing its bytes — catching a corpus mutated out from under the
//! build, which is the one condition this builder treats as fatal rather
//! than as a per-file skip.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ignore::WalkBuilder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha3::{Digest, Sha3_256};
use tracing::{info, warn};

use super::format::{
    FileInfo, IndexHeader, TokenAlphabeticalInfo, TokenIdInfo, FILE_INFO_SIZE, HEADER_SIZE,
    LINE_INFO_SIZE, TOKEN_ALPHABETICAL_INFO_SIZE, TOKEN_ID_INFO_SIZE,
};
use crate::codec::encode_token;
use crate::error::PptError;
use crate::tokenizer::tokenize;

/// Inputs the builder needs beyond the corpus directory and output path.
/// CLI flag parsing lives in `cli::args`; this struct is the parsed,
/// validated shape the library actually consumes.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub max_file_size: u64,
    pub workers: usize,
    pub skipped_log: Option<PathBuf>,
    pub token_counts: Option<PathBuf>,
    pub hidden: bool,
    pub no_ignore: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            max_file_size: 8 * 1024 * 1024,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            skipped_log: None,
            token_counts: None,
            hidden: false,
            no_ignore: false,
        }
    }
}

/// Summary of a completed build, for the CLI to report.
#[derive(Debug)]
pub struct BuildReport {
    pub num_files: u64,
    pub num_tokens: u64,
    pub total_lines: u64,
    pub total_bytes: u64,
    pub code_section_length: u64,
    pub skipped: Vec<(PathBuf, String)>,
}

struct FileComputed {
    rel_path: String,
    source_len: u64,
    encoded: Vec<u8>,
    /// Number of real tokens in this file (excludes the trailing EOF marker).
    num_tokens: u64,
    /// (file_offset, code_offset) boundaries, including the synthetic
    /// (0, 0) first entry but not yet the closing sentinel.
    lines: Vec<(u32, u32)>,
}

fn walk_corpus(corpus_dir: &Path, opts: &BuildOptions, skipped: &mut Vec<(PathBuf, String)>) -> Vec<PathBuf> {
    let mut walker = WalkBuilder::new(corpus_dir);
    walker.hidden(!opts.hidden).git_ignore(!opts.no_ignore).ignore(!opts.no_ignore);
    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walk error");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.into_path();
        match fs::metadata(&path) {
            Ok(meta) if meta.len() <= opts.max_file_size => files.push(path),
            Ok(_) => skipped.push((path, "file exceeds maximum source size".to_string())),
            Err(e) => skipped.push((path, format!("metadata error: {e}"))),
        }
    }
    files
}

/// Tokenizes `path`'s current on-disk contents. Returns `Ok(None)` for an
/// empty token stream (an expected, skippable outcome), `Err` for a
/// tokenizer grammar violation or I/O failure.
fn compute_file(path: &Path, rel_path: &str, spelling_to_id: &HashMap<String, u32>) -> Result<Option<FileComputed>, PptError> {
    let bytes = fs::read(path)?;
    let stream = tokenize(rel_path, &bytes)?;
    if stream.tokens.is_empty() {
        return Ok(None);
    }

    let mut encoded = Vec::with_capacity(stream.tokens.len() * 2 + 1);
    let mut token_offsets = Vec::with_capacity(stream.tokens.len() + 1);
    for token in &stream.tokens {
        token_offsets.push(encoded.len() as u32);
        let id = *spelling_to_id
            .get(&token.spelling)
            .expect("every spelling tokenized here was seen during frequency counting");
        encode_token(id, &mut encoded)?;
    }
    token_offsets.push(encoded.len() as u32);
    encode_token(0, &mut encoded)?;

    let mut lines = vec![(0u32, 0u32)];
    let file_len = bytes.len() as u32;
    for nl in &stream.newlines {
        let next_line_start = nl.file_offset + 1;
        if next_line_start >= file_len {
            continue;
        }
        let code_offset = token_offsets[nl.token_index as usize];
        lines.push((next_line_start, code_offset));
    }

    Ok(Some(FileComputed {
        rel_path: rel_path.to_string(),
        source_len: bytes.len() as u64,
        encoded,
        num_tokens: stream.tokens.len() as u64,
        lines,
    }))
}

fn relative_path(corpus_dir: &Path, path: &Path) -> String {
    path.strip_prefix(corpus_dir).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

/// Runs `work(i)` for `i` in `0..len`, striped across `workers` threads by
/// `i % workers`. Matches the builder's modular stripe-assignment
/// concurrency model.
fn parallel_for(len: usize, workers: usize, work: impl Fn(usize) + Sync) {
    let workers = workers.max(1);
    std::thread::scope(|scope| {
        for worker_id in 0..workers {
            let work = &work;
            scope.spawn(move || {
                let mut i = worker_id;
                while i < len {
                    work(i);
                    i += workers;
                }
            });
        }
    });
}

/// Builds a binary index for every file under `corpus_dir` and writes it
/// to `output_path`.
pub fn build_index(corpus_dir: &Path, output_path: &Path, opts: &BuildOptions) -> Result<BuildReport, PptError> {
    let mut skipped: Vec<(PathBuf, String)> = Vec::new();

    info!(dir = %corpus_dir.display(), "pass 1: walking corpus");
    let candidates = walk_corpus(corpus_dir, opts, &mut skipped);
    info!(count = candidates.len(), "pass 1 complete");

    info!("pass 2: tokenizing and counting spelling frequency");
    let freq: Mutex<HashMap<String, u64>> = Mutex::new(HashMap::new());
    let survivors: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
    let pass2_skipped: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());
    parallel_for(candidates.len(), opts.workers, |i| {
        let path = &candidates[i];
        let rel = relative_path(corpus_dir, path);
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                pass2_skipped.lock().unwrap().push((path.clone(), format!("read error: {e}")));
                return;
            }
        };
        match tokenize(&rel, &bytes) {
            Ok(stream) if stream.tokens.is_empty() => {
                pass2_skipped.lock().unwrap().push((path.clone(), "no tokens".to_string()));
            }
            Ok(stream) => {
                {
                    let mut freq = freq.lock().unwrap();
                    for tok in &stream.tokens {
                        *freq.entry(tok.spelling.clone()).or_insert(0) += 1;
                    }
                }
                survivors.lock().unwrap().push(path.clone());
            }
            Err(e) => {
                pass2_skipped.lock().unwrap().push((path.clone(), e.to_string()));
            }
        }
    });
    skipped.extend(pass2_skipped.into_inner().unwrap());
    let freq = freq.into_inner().unwrap();
    let mut survivors = survivors.into_inner().unwrap();
    info!(survivors = survivors.len(), distinct_spellings = freq.len(), "pass 2 complete");

    info!("assigning token alphabet by descending frequency");
    let mut by_freq: Vec<(String, u64)> = freq.into_iter().collect();
    by_freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(path) = &opts.token_counts {
        let mut out = String::new();
        for (spelling, count) in &by_freq {
            out.push_str(&format!("{count} {} {spelling}\n", spelling.len()));
        }
        fs::write(path, out)?;
    }
    let mut spelling_to_id: HashMap<String, u32> = HashMap::with_capacity(by_freq.len());
    for (i, (spelling, _count)) in by_freq.iter().enumerate() {
        spelling_to_id.insert(spelling.clone(), (i + 1) as u32);
    }
    let num_tokens = spelling_to_id.len() as u64;
    drop(by_freq);

    info!("pass 3: shuffling survivors and encoding with the final alphabet");
    let mut rng = StdRng::seed_from_u64(0);
    survivors.shuffle(&mut rng);

    let computed: Mutex<Vec<Option<FileComputed>>> = Mutex::new((0..survivors.len()).map(|_| None).collect());
    let hashes: Mutex<Vec<Option<[u8; 32]>>> = Mutex::new((0..survivors.len()).map(|_| None).collect());
    let pass3_skipped: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());
    parallel_for(survivors.len(), opts.workers, |i| {
        let path = &survivors[i];
        let rel = relative_path(corpus_dir, path);
        match compute_file(path, &rel, &spelling_to_id) {
            Ok(Some(file)) => {
                let hash: [u8; 32] = Sha3_256::digest(&file.encoded).into();
                computed.lock().unwrap()[i] = Some(file);
                hashes.lock().unwrap()[i] = Some(hash);
            }
            Ok(None) => {
                pass3_skipped.lock().unwrap().push((path.clone(), "no tokens".to_string()));
            }
            Err(e) => {
                pass3_skipped.lock().unwrap().push((path.clone(), e.to_string()));
            }
        }
    });
    skipped.extend(pass3_skipped.into_inner().unwrap());
    let mut computed = computed.into_inner().unwrap();
    let hashes = hashes.into_inner().unwrap();

    info!("deduplicating by content hash in shuffled file order");
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut final_files: Vec<FileComputed> = Vec::new();
    for (i, entry) in computed.iter_mut().enumerate() {
        let Some(file) = entry.take() else { continue };
        let Some(hash) = hashes[i] else { continue };
        if !seen.insert(hash) {
            skipped.push((survivors[i].clone(), "duplicate content hash".to_string()));
            continue;
        }
        final_files.push(file);
    }
    info!(final_files = final_files.len(), "pass 3 complete");

    info!("verify pass: re-tokenizing surviving files to detect corpus mutation");
    let verify_errors: Mutex<Vec<PptError>> = Mutex::new(Vec::new());
    parallel_for(final_files.len(), opts.workers, |i| {
        let file = &final_files[i];
        let abs_path = corpus_dir.join(&file.rel_path);
        match compute_file(&abs_path, &file.rel_path, &spelling_to_id) {
            Ok(Some(recomputed)) => {
                if recomputed.encoded.len() != file.encoded.len() || recomputed.lines.len() != file.lines.len() {
                    verify_errors.lock().unwrap().push(PptError::CorpusMutated {
                        path: file.rel_path.clone(),
                        expected: file.source_len,
                        actual: recomputed.source_len,
                    });
                }
            }
            Ok(None) => {
                verify_errors.lock().unwrap().push(PptError::CorpusMutated {
                    path: file.rel_path.clone(),
                    expected: file.source_len,
                    actual: 0,
                });
            }
            Err(e) => {
                verify_errors.lock().unwrap().push(e);
            }
        }
    });
    if let Some(err) = verify_errors.into_inner().unwrap().into_iter().next() {
        return Err(err);
    }

    write_index(output_path, &final_files, num_tokens, &spelling_to_id)?;

    let total_bytes: u64 = final_files.iter().map(|f| f.source_len).sum();
    let total_lines: u64 = final_files.iter().map(|f| f.lines.len() as u64 + 1).sum();
    let code_section_length: u64 = final_files.iter().map(|f| f.encoded.len() as u64).sum();

    if let Some(path) = &opts.skipped_log {
        let mut out = String::new();
        for (path_, reason) in &skipped {
            out.push_str(&format!("{}\t{reason}\n", path_.display()));
        }
        fs::write(path, out)?;
    }

    Ok(BuildReport {
        num_files: final_files.len() as u64,
        num_tokens,
        total_lines,
        total_bytes,
        code_section_length,
        skipped,
    })
}

fn write_index(
    output_path: &Path,
    files: &[FileComputed],
    num_tokens: u64,
    spelling_to_id: &HashMap<String, u32>,
) -> Result<(), PptError> {
    let num_files = files.len() as u64;
    let file_section_offset = HEADER_SIZE as u64;
    let file_section_size = num_files * FILE_INFO_SIZE as u64;
    let token_id_section_offset = file_section_offset + file_section_size;
    let token_id_section_size = num_tokens * TOKEN_ID_INFO_SIZE as u64;
    let token_alphabetical_section_offset = token_id_section_offset + token_id_section_size;
    let token_alphabetical_section_size = num_tokens * TOKEN_ALPHABETICAL_INFO_SIZE as u64;

    let total_lines: u64 = files.iter().map(|f| f.lines.len() as u64 + 1).sum();
    let lineinfo_offset = token_alphabetical_section_offset + token_alphabetical_section_size;
    let lineinfo_section_size = total_lines * LINE_INFO_SIZE as u64;

    let code_section_offset = lineinfo_offset + lineinfo_section_size;
    let code_section_length: u64 = files.iter().map(|f| f.encoded.len() as u64).sum();

    let string_pool_offset = code_section_offset + code_section_length;

    // id -> spelling, for the token-id-ordered section and string pool.
    let mut id_to_spelling: Vec<&str> = vec![""; num_tokens as usize];
    for (spelling, &id) in spelling_to_id {
        id_to_spelling[(id - 1) as usize] = spelling.as_str();
    }

    let filenames_size: u64 = files.iter().map(|f| f.rel_path.len() as u64 + 1).sum();
    let spellings_size: u64 = id_to_spelling.iter().map(|s| s.len() as u64 + 1).sum();
    let total_size = string_pool_offset + filenames_size + spellings_size;

    let mut buf = vec![0u8; total_size as usize];

    // informational counter only; not used for any offset arithmetic.
    let total_tokens: u64 = files.iter().map(|f| f.num_tokens).sum();

    let header = IndexHeader {
        code_section_offset,
        code_section_length,
        file_section_offset,
        num_files,
        total_tokens,
        total_lines,
        total_bytes: files.iter().map(|f| f.source_len).sum(),
        token_id_section_offset,
        token_alphabetical_section_offset,
        num_tokens,
    };
    header.write_to(&mut buf[0..HEADER_SIZE]);

    let mut filename_cstr_offset = string_pool_offset;
    let mut code_offset_cursor = 0u64;
    let mut lineinfo_cursor = lineinfo_offset;
    for (i, file) in files.iter().enumerate() {
        let entry = FileInfo {
            filename_cstr: filename_cstr_offset,
            file_length: file.source_len,
            code_offset: code_offset_cursor,
            code_length: file.encoded.len() as u64,
            num_lines: file.lines.len() as u64 + 1,
            lineinfo_offset: lineinfo_cursor,
        };
        let start = (file_section_offset + i as u64 * FILE_INFO_SIZE as u64) as usize;
        entry.write_to(&mut buf[start..start + FILE_INFO_SIZE]);

        // code section bytes
        let code_start = (code_section_offset + code_offset_cursor) as usize;
        buf[code_start..code_start + file.encoded.len()].copy_from_slice(&file.encoded);

        // line info, including the closing sentinel
        let mut cursor = lineinfo_cursor as usize;
        for &(file_offset, code_off) in &file.lines {
            let li = super::format::LineInfo { file_offset, code_offset: code_off };
            li.write_to(&mut buf[cursor..cursor + LINE_INFO_SIZE]);
            cursor += LINE_INFO_SIZE;
        }
        let sentinel = super::format::LineInfo {
            file_offset: file.source_len as u32,
            code_offset: (file.encoded.len() as u32).saturating_sub(1),
        };
        sentinel.write_to(&mut buf[cursor..cursor + LINE_INFO_SIZE]);

        // filename in the string pool
        let name_bytes = file.rel_path.as_bytes();
        let fn_start = filename_cstr_offset as usize;
        buf[fn_start..fn_start + name_bytes.len()].copy_from_slice(name_bytes);
        buf[fn_start + name_bytes.len()] = 0;

        filename_cstr_offset += name_bytes.len() as u64 + 1;
        code_offset_cursor += file.encoded.len() as u64;
        lineinfo_cursor += (file.lines.len() as u64 + 1) * LINE_INFO_SIZE as u64;
    }

    // token id table + spelling string pool
    let mut spelling_cstr_offset = filename_cstr_offset;
    for (i, spelling) in id_to_spelling.iter().enumerate() {
        let info = TokenIdInfo { spelling_cstr: spelling_cstr_offset };
        let start = (token_id_section_offset + i as u64 * TOKEN_ID_INFO_SIZE as u64) as usize;
        info.write_to(&mut buf[start..start + TOKEN_ID_INFO_SIZE]);

        let bytes = spelling.as_bytes();
        let s = spelling_cstr_offset as usize;
        buf[s..s + bytes.len()].copy_from_slice(bytes);
        buf[s + bytes.len()] = 0;
        spelling_cstr_offset += bytes.len() as u64 + 1;
    }

    // alphabetical token table
    let mut alphabetical: Vec<(&str, u32)> =
        spelling_to_id.iter().map(|(s, &id)| (s.as_str(), id)).collect();
    alphabetical.sort_by(|a, b| a.0.cmp(b.0));
    for (i, (_, id)) in alphabetical.iter().enumerate() {
        let info = TokenAlphabeticalInfo { token_id: *id };
        let start = (token_alphabetical_section_offset + i as u64 * TOKEN_ALPHABETICAL_INFO_SIZE as u64) as usize;
        info.write_to(&mut buf[start..start + TOKEN_ALPHABETICAL_INFO_SIZE]);
    }

    fs::write(output_path, &buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builds_a_minimal_index_and_header_is_sane() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cc"), "int main() { return 0; }\n").unwrap();
        let out = dir.path().join("out.idx");
        let opts = BuildOptions { workers: 2, ..Default::default() };
        let report = build_index(dir.path(), &out, &opts).unwrap();
        assert_eq!(report.num_files, 1);
        assert!(report.num_tokens > 0);

        let bytes = fs::read(&out).unwrap();
        let header = IndexHeader::read_from(&bytes[0..HEADER_SIZE]).unwrap();
        assert_eq!(header.num_files, 1);
        assert_eq!(header.code_section_offset as usize + header.code_section_length as usize, bytes.len() - filenames_and_spellings_len(&bytes, &header));
    }

    fn filenames_and_spellings_len(bytes: &[u8], header: &IndexHeader) -> usize {
        bytes.len() - (header.code_section_offset + header.code_section_length) as usize
    }

    #[test]
    fn deduplicates_identical_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cc"), "int main() { return 0; }\n").unwrap();
        fs::write(dir.path().join("b.cc"), "int main() { return 0; }\n").unwrap();
        let out = dir.path().join("out.idx");
        let opts = BuildOptions { workers: 2, ..Default::default() };
        let report = build_index(dir.path(), &out, &opts).unwrap();
        assert_eq!(report.num_files, 1);
        assert!(report.skipped.iter().any(|(_, reason)| reason == "duplicate content hash"));
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.cc"), "x".repeat(100)).unwrap();
        let out = dir.path().join("out.idx");
        let opts = BuildOptions { workers: 1, max_file_size: 10, ..Default::default() };
        let report = build_index(dir.path(), &out, &opts).unwrap();
        assert_eq!(report.num_files, 0);
        assert!(report.skipped.iter().any(|(_, reason)| reason.contains("exceeds maximum")));
    }

    #[test]
    fn deterministic_across_repeated_builds() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.cc")), format!("int f{i}() {{ return {i}; }}\n")).unwrap();
        }
        let out1 = dir.path().join("out1.idx");
        let out2 = dir.path().join("out2.idx");
        let opts = BuildOptions { workers: 3, ..Default::default() };
        build_index(dir.path(), &out1, &opts).unwrap();
        build_index(dir.path(), &out2, &opts).unwrap();
        assert_eq!(fs::read(&out1).unwrap(), fs::read(&out2).unwrap());
    }
}
