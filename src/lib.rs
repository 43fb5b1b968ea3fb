//! # pptsearch — token-indexed substring search over a C/C++ source corpus
//!
//! A C/C++ preprocessing tokenizer paired with a binary, memory-mapped
//! index format and a parallel substring scanner. The index stores every
//! corpus file as a sequence of variable-length token ids rather than raw
//! bytes; searching tokenizes the query the same way and looks for it as a
//! byte-level substring of the encoded corpus, which (by the codec's
//! construction) is exactly a token-subsequence match.
//!
//! ## Library usage
//!
//! This crate is primarily a CLI tool, but its pipeline stages —
//! tokenizer, codec, index builder/reader, search engine, integrity
//! verifier — are exposed here for benchmarking and integration testing.

pub mod codec;
pub mod decoders;
pub mod error;
pub mod index;
pub mod mmap;
pub mod sampler;
pub mod search;
pub mod text;
pub mod tokenizer;
pub mod verify;

pub use error::PptError;
pub use tokenizer::{tokenize, Token, TokenKind, VectorTokenStream};
