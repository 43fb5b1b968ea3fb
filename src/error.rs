//! Unified error type for the indexer and search engine.

use thiserror::Error;

/// All errors that can occur while tokenizing, building, reading or
/// searching an index.
#[derive(Error, Debug)]
pub enum PptError {
    /// I/O error (file read/write, directory access, mmap).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source file could not be decoded as UTF-8.
    #[error("{path}: not valid UTF-8 at byte {offset}")]
    InvalidUtf8 { path: String, offset: usize },

    /// A raw string literal was never closed before EOF.
    #[error("{path}: unterminated raw string literal starting at byte {offset}")]
    UnterminatedRawString { path: String, offset: usize },

    /// A block comment was never closed before EOF.
    #[error("{path}: unterminated comment starting at byte {offset}")]
    UnterminatedComment { path: String, offset: usize },

    /// A character or string literal was never closed before end of line.
    #[error("{path}: unterminated literal starting at byte {offset}")]
    UnterminatedLiteral { path: String, offset: usize },

    /// The tokenizer reached a byte sequence with no valid transition.
    #[error("{path}: invalid token at byte {offset}: {message}")]
    InvalidToken {
        path: String,
        offset: usize,
        message: String,
    },

    /// A token's encoded id exceeded the codec's representable range.
    #[error("token id {id} exceeds the codec's maximum representable id")]
    TokenIdOverflow { id: u32 },

    /// The corpus produced more distinct tokens than the alphabet format
    /// can address, or more files/bytes than the header's counters permit.
    #[error("corpus exceeds index format limits: {0}")]
    CorpusTooLarge(String),

    /// A source file changed size between the sizing pass and the
    /// encoding pass of the builder.
    #[error("{path}: changed during indexing (was {expected} bytes, now {actual})")]
    CorpusMutated {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The on-disk index failed a structural or semantic integrity check.
    #[error("index integrity violation: {0}")]
    IntegrityViolation(String),

    /// The index file's magic number or version did not match what this
    /// reader supports.
    #[error("not a recognized index file (bad magic or version): {0}")]
    BadMagic(String),

    /// The index file is smaller than its own header claims, or a
    /// section offset points past the end of the file.
    #[error("truncated or malformed index file: {0}")]
    Truncated(String),

    /// A query contained no tokens once whitespace/comments were stripped.
    #[error("query has no indexable tokens")]
    EmptyQuery,

    /// A query token has no entry in the index's token alphabet, so the
    /// corpus cannot possibly contain the query.
    #[error("no such token in dataset: {spelling:?}")]
    NoSuchToken { spelling: String },

    /// Mutually exclusive flags or other argument validation error.
    #[error("{0}")]
    InvalidArgs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = PptError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_invalid_utf8_display() {
        let err = PptError::InvalidUtf8 {
            path: "foo.cc".to_string(),
            offset: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("foo.cc"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_corpus_mutated_display() {
        let err = PptError::CorpusMutated {
            path: "a.h".to_string(),
            expected: 10,
            actual: 11,
        };
        let msg = err.to_string();
        assert!(msg.contains("a.h"));
        assert!(msg.contains("10"));
        assert!(msg.contains("11"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let ppt_err: PptError = io_err.into();
        assert!(matches!(ppt_err, PptError::Io(_)));
    }

    #[test]
    fn test_empty_query_display() {
        let err = PptError::EmptyQuery;
        assert!(err.to_string().contains("no indexable tokens"));
    }
}
