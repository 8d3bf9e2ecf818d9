//! Bulk lookup contract with the remote value service

use crate::error::{Result, SdeError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One request per bulk run, ids comma-joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLookupRequest {
    pub project_id: String,
    pub fact_ids: String,
}

impl BulkLookupRequest {
    pub fn new<'a>(project_id: impl Into<String>, ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            project_id: project_id.into(),
            fact_ids: ids.into_iter().collect::<Vec<_>>().join(","),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.fact_ids.split(',').map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn len(&self) -> usize {
        self.ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().next().is_none()
    }
}

/// Resolution for one fact: a status code and values per language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFact {
    pub code: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl RemoteFact {
    pub fn ok<I, L, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (L, V)>,
        L: Into<String>,
        V: Into<String>,
    {
        Self {
            code: "200".to_string(),
            values: values.into_iter().map(|(l, v)| (l.into(), v.into())).collect(),
        }
    }

    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            values: BTreeMap::new(),
        }
    }
}

/// Items keyed by fact id; ids the service does not know are simply absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLookupResponse {
    #[serde(default)]
    pub items: HashMap<String, RemoteFact>,
}

/// Remote source of authoritative fact values
#[async_trait]
pub trait ValueService: Send + Sync {
    /// Resolve every requested id in one round trip
    async fn bulk_lookup(&self, request: &BulkLookupRequest) -> Result<BulkLookupResponse>;
}

/// In-process value service for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryValueService {
    facts: RwLock<HashMap<String, RemoteFact>>,
    delay: RwLock<Option<Duration>>,
    unreachable: RwLock<Option<String>>,
    calls: AtomicUsize,
}

impl InMemoryValueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `200` with `value` for `lang`, keeping other languages
    pub fn set_value(&self, fact_id: &str, lang: &str, value: &str) {
        let mut facts = self.facts.write();
        let fact = facts
            .entry(fact_id.to_string())
            .or_insert_with(|| RemoteFact::with_code("200"));
        fact.code = "200".to_string();
        fact.values.insert(lang.to_string(), value.to_string());
    }

    pub fn set_fact(&self, fact_id: &str, fact: RemoteFact) {
        self.facts.write().insert(fact_id.to_string(), fact);
    }

    pub fn remove(&self, fact_id: &str) {
        self.facts.write().remove(fact_id);
    }

    /// Sleep this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Fail every lookup with an upstream error
    pub fn set_unreachable(&self, message: Option<String>) {
        *self.unreachable.write() = message;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValueService for InMemoryValueService {
    async fn bulk_lookup(&self, request: &BulkLookupRequest) -> Result<BulkLookupResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let unreachable = self.unreachable.read().clone();
        if let Some(message) = unreachable {
            return Err(SdeError::Upstream {
                operation: "bulk lookup".to_string(),
                message,
            });
        }

        let facts = self.facts.read();
        let items = request
            .ids()
            .filter_map(|id| facts.get(id).map(|f| (id.to_string(), f.clone())))
            .collect();
        Ok(BulkLookupResponse { items })
    }
}
