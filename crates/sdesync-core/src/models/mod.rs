//! Data models for documents, caches and projects

pub mod cache;
pub mod document;
pub mod project;
pub mod status;

pub use cache::{CacheEntry, FactCache};
pub use document::{
    ContentDocument, ContentNode, Document, FactSource, Footnote, FootnoteCollection,
    LanguageScope, LanguageSection, NodeFlags,
};
pub use project::{Project, ProjectConfig, PROJECT_FILE};
pub use status::SyncStatus;
