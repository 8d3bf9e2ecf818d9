//! Synchronization with the remote value service

pub mod engine;
pub mod http;
pub mod remote;

pub use engine::BulkSyncEngine;
pub use http::HttpRemote;
pub use remote::{
    BulkLookupRequest, BulkLookupResponse, InMemoryValueService, RemoteFact, ValueService,
};
