//! Integrity verification for an on-disk index: re-checks every
//! invariant the builder is supposed to have established, without
//! trusting anything the builder wrote.

use std::path::Path;

use crate::error::PptError;
use crate::index::IndexReader;

/// One failed invariant. `verify_index` collects as many of these as it
/// can rather than stopping at the first failure, so a single run
/// surfaces the full extent of any corruption.
#[derive(Debug, Clone)]
pub struct VerifyFailure {
    pub message: String,
}

/// The outcome of a full verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub files_checked: u64,
    pub tokens_checked: u64,
    pub failures: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(VerifyFailure { message: message.into() });
    }
}

/// Runs every integrity check against an open index, resolving file
/// paths relative to `corpus_dir`. Returns a report rather than an
/// error: a failed check is data about the index, not a reason to abort
/// the process that asked for it.
pub fn verify_index(reader: &IndexReader, corpus_dir: &Path) -> Result<VerifyReport, PptError> {
    let mut report = VerifyReport::default();

    let mut expected_code_cursor = 0u64;
    for i in 0..reader.num_files() {
        let file_info = reader.file_info(i);
        let filename = match reader.filename(&file_info) {
            Ok(name) => name,
            Err(e) => {
                report.fail(format!("file table entry {i}: unreadable filename: {e}"));
                continue;
            }
        };
        report.files_checked += 1;

        let abs_path = corpus_dir.join(filename);
        match std::fs::metadata(&abs_path) {
            Ok(meta) => {
                if meta.len() != file_info.file_length {
                    report.fail(format!(
                        "{filename}: on-disk length {} does not match indexed length {}",
                        meta.len(),
                        file_info.file_length
                    ));
                }
            }
            Err(_) => report.fail(format!("{filename}: no longer exists on disk")),
        }

        if file_info.code_offset != expected_code_cursor {
            report.fail(format!(
                "{filename}: code_offset {} does not chain from the previous file's end ({})",
                file_info.code_offset, expected_code_cursor
            ));
        }
        expected_code_cursor = file_info.code_offset + file_info.code_length;

        let mut prev: Option<crate::index::LineInfo> = None;
        for j in 0..file_info.num_lines {
            let line = reader.line_info(&file_info, j);
            if line.file_offset as u64 > file_info.file_length {
                report.fail(format!(
                    "{filename}: line {j} file_offset {} exceeds file length {}",
                    line.file_offset, file_info.file_length
                ));
            }
            if line.code_offset as u64 >= file_info.code_length {
                report.fail(format!(
                    "{filename}: line {j} code_offset {} is not less than code_length {}",
                    line.code_offset, file_info.code_length
                ));
            }
            if let Some(prev) = prev {
                if prev.file_offset >= line.file_offset {
                    report.fail(format!(
                        "{filename}: line table file_offset is not strictly increasing at line {j}"
                    ));
                }
                if prev.code_offset > line.code_offset {
                    report.fail(format!(
                        "{filename}: line table code_offset is not monotonically non-decreasing at line {j}"
                    ));
                }
            }
            prev = Some(line);
        }
    }

    if expected_code_cursor != reader.header().code_section_length {
        report.fail(format!(
            "file code ranges cover {expected_code_cursor} bytes but the code section is {} bytes",
            reader.header().code_section_length
        ));
    }

    report.tokens_checked = reader.num_tokens();
    for id in 0..=reader.num_tokens() as u32 {
        let spelling = match reader.spelling(id) {
            Ok(s) => s,
            Err(e) => {
                report.fail(format!("token id {id}: spelling lookup failed: {e}"));
                continue;
            }
        };
        match reader.token_id(spelling) {
            Ok(round_tripped) if round_tripped == id => {}
            Ok(round_tripped) => report.fail(format!(
                "token id {id} (spelling {spelling:?}) round-trips to {round_tripped} instead"
            )),
            Err(e) => report.fail(format!("token id {id}: token_id lookup failed: {e}")),
        }
    }

    match reader.token_id("\u{0}unlikely-to-ever-be-a-real-token\u{0}") {
        Ok(0) => {}
        Ok(other) => report.fail(format!("an unknown spelling resolved to token id {other} instead of 0")),
        Err(e) => report.fail(format!("unknown-spelling lookup failed: {e}")),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::builder::{build_index, BuildOptions};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn freshly_built_index_verifies_clean() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cc"), "int main() { return 0; }\n").unwrap();
        fs::write(dir.path().join("b.cc"), "int f(int x) { return x + 1; }\n").unwrap();
        let out = dir.path().join("out.idx");
        build_index(dir.path(), &out, &BuildOptions { workers: 2, ..Default::default() }).unwrap();

        let reader = IndexReader::open(&out).unwrap();
        let report = verify_index(&reader, dir.path()).unwrap();
        assert!(report.is_ok(), "unexpected failures: {:?}", report.failures);
        assert_eq!(report.files_checked, 2);
    }

    #[test]
    fn detects_a_file_removed_after_indexing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cc"), "int main() { return 0; }\n").unwrap();
        let out = dir.path().join("out.idx");
        build_index(dir.path(), &out, &BuildOptions { workers: 1, ..Default::default() }).unwrap();

        fs::remove_file(dir.path().join("a.cc")).unwrap();

        let reader = IndexReader::open(&out).unwrap();
        let report = verify_index(&reader, dir.path()).unwrap();
        assert!(!report.is_ok());
        assert!(report.failures.iter().any(|f| f.message.contains("no longer exists")));
    }

    #[test]
    fn detects_a_file_shrunk_after_indexing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cc"), "int main() { return 0; }\n").unwrap();
        let out = dir.path().join("out.idx");
        build_index(dir.path(), &out, &BuildOptions { workers: 1, ..Default::default() }).unwrap();

        fs::write(dir.path().join("a.cc"), "int main() {}\n").unwrap();

        let reader = IndexReader::open(&out).unwrap();
        let report = verify_index(&reader, dir.path()).unwrap();
        assert!(!report.is_ok());
        assert!(report.failures.iter().any(|f| f.message.contains("does not match indexed length")));
    }
}
