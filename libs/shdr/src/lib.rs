//! The SHDR decoder (C6): tokenizer, timestamp extractor, and
//! token-to-data-item mapper, each a [`pipeline::Transform<pipeline::Frame>`].

pub mod error;
pub mod timestamp;
pub mod token_mapper;
pub mod tokenizer;

pub use error::ShdrError;
pub use timestamp::{TimestampExtractor, TimestampMode};
pub use token_mapper::{ShdrVersion, TokenMapper};
pub use tokenizer::{detokenize, tokenize, Tokenizer};
