//! Parsers for content documents and the facts they reference

pub mod document;
pub mod facts;

pub use document::{load_document, parse_document};
pub use facts::{extract_facts, ExtractedFacts, FactOccurrence};
