// Document store adapter
// Generic CRUD over named collections with equality queries; no transactions, no batch writes

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::error::StoreError;

pub type Fields = Map<String, Value>;

// Logical collections persisted by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Hotel,
    Stats,
    Favorites,
    History,
    PaymentMethods,
    Cart,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Hotel => "Hotel",
            Collection::Stats => "Stats",
            Collection::Favorites => "Favorites",
            Collection::History => "History",
            Collection::PaymentMethods => "PaymentMethods",
            Collection::Cart => "Cart",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// A stored record: store-assigned identifier plus its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    // Field lookup where `id` resolves to the store identifier
    pub fn field_matches(&self, field: &str, value: &Value) -> bool {
        if field == "id" {
            return value.as_str() == Some(self.id.as_str());
        }
        self.fields.get(field) == Some(value)
    }

    // Deserialize into an entity, exposing the identifier as its `id` field
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

// Equality predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

// Serialize an entity into storable fields, dropping any `id` it carries
pub fn encode<T: Serialize>(entity: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(entity)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(StoreError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Result<Vec<T>, StoreError> {
    docs.iter().map(Document::decode).collect()
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    // All documents of the collection matching every filter; an empty filter list returns everything
    async fn query_equals(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StoreError>;

    // Store a new document and return its generated identifier
    async fn insert(&self, collection: Collection, fields: Fields) -> Result<String, StoreError>;

    // Merge `fields` into an existing document
    async fn update(&self, collection: Collection, id: &str, fields: Fields)
        -> Result<(), StoreError>;

    // Remove a document; removing a missing one is not an error
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn get_by_id(&self, collection: Collection, id: &str)
        -> Result<Option<Document>, StoreError>;
}

// Operation kinds, used for call accounting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Query,
    Insert,
    Update,
    Delete,
    Get,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub queries: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub gets: usize,
    pub failures: usize,
}

#[derive(Debug)]
struct ScheduledFailure {
    op: StoreOp,
    skip: usize,
}

// In-memory document store.
// Keeps documents in insertion order per collection. Failures can be
// scheduled to exercise the error paths of callers: `fail_next_requests`
// fails the next N calls of any kind, `fail_operation` fails one call of a
// given kind after letting `skip` of them succeed.
pub struct InMemoryStore {
    collections: DashMap<Collection, Vec<Document>>,
    fail_next_requests: AtomicUsize,
    scheduled: Mutex<Vec<ScheduledFailure>>,
    queries: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    gets: AtomicUsize,
    failures: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            fail_next_requests: AtomicUsize::new(0),
            scheduled: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    // Seed a document under a caller-chosen identifier, replacing any existing one
    pub fn put(&self, collection: Collection, id: &str, fields: Fields) {
        let mut docs = self.collections.entry(collection).or_default();
        docs.retain(|d| d.id != id);
        docs.push(Document {
            id: id.to_string(),
            fields,
        });
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, |d| d.len())
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .get(&collection)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn fail_operation(&self, op: StoreOp, skip: usize) {
        self.scheduled.lock().push(ScheduledFailure { op, skip });
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            queries: self.queries.load(Ordering::SeqCst),
            inserts: self.inserts.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            gets: self.gets.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }

    fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect()
    }

    fn enter(&self, op: StoreOp, collection: Collection) -> Result<(), StoreError> {
        let counter = match op {
            StoreOp::Query => &self.queries,
            StoreOp::Insert => &self.inserts,
            StoreOp::Update => &self.updates,
            StoreOp::Delete => &self.deletes,
            StoreOp::Get => &self.gets,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let pending = self.fail_next_requests.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_requests.store(pending - 1, Ordering::SeqCst);
            return Err(self.injected(op, collection));
        }

        let mut scheduled = self.scheduled.lock();
        if let Some(pos) = scheduled.iter().position(|f| f.op == op) {
            if scheduled[pos].skip == 0 {
                scheduled.remove(pos);
                drop(scheduled);
                return Err(self.injected(op, collection));
            }
            scheduled[pos].skip -= 1;
        }
        Ok(())
    }

    fn injected(&self, op: StoreOp, collection: Collection) -> StoreError {
        self.failures.fetch_add(1, Ordering::SeqCst);
        warn!(?op, %collection, "injected store failure");
        StoreError::Unavailable(format!("{:?} on {} failed", op, collection))
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn query_equals(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StoreError> {
        self.enter(StoreOp::Query, collection)?;
        let found: Vec<Document> = self
            .collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filters.iter().all(|f| d.field_matches(&f.field, &f.value)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!(%collection, matched = found.len(), "query");
        Ok(found)
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<String, StoreError> {
        self.enter(StoreOp::Insert, collection)?;
        let id = Self::generate_id();
        self.collections
            .entry(collection)
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        debug!(%collection, %id, "insert");
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::Update, collection)?;
        let mut docs = self.collections.entry(collection).or_default();
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.name().to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            doc.fields.insert(key, value);
        }
        debug!(%collection, %id, "update");
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete, collection)?;
        if let Some(mut docs) = self.collections.get_mut(&collection) {
            docs.retain(|d| d.id != id);
        }
        debug!(%collection, %id, "delete");
        Ok(())
    }

    async fn get_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.enter(StoreOp::Get, collection)?;
        Ok(self
            .collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }
}
