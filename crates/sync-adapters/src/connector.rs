//! Contrato de conector externo y registro por nombre.
//!
//! El core sólo depende de este contrato: `fetch` paginado con filtro
//! incremental opcional, `write` por lotes y `test_connection`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use sync_core::locks;
use sync_domain::ChangeRecord;

use crate::errors::ConnectorError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub query: Option<String>,
    /// Igualdad exacta sobre campos del payload.
    pub filters: Map<String, Value>,
    pub limit: usize,
    pub offset: usize,
    pub incremental_field: Option<String>,
    /// Sólo registros con `incremental_field` estrictamente mayor.
    pub incremental_value: Option<Value>,
}

impl FetchRequest {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self { limit,
               offset,
               ..Self::default() }
    }

    pub fn incremental(mut self, field: impl Into<String>, after: Option<Value>) -> Self {
        self.incremental_field = Some(field.into());
        self.incremental_value = after;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.insert(field.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub records: Vec<ChangeRecord>,
    pub total_count: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Insert,
    #[default]
    Upsert,
    Replace,
}

impl WriteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "upsert" => Some(Self::Upsert),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub records_processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub failed: u64,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, request: &FetchRequest) -> Result<Batch, ConnectorError>;
    async fn write(&self, batch: &[ChangeRecord], mode: WriteMode) -> Result<SyncResult, ConnectorError>;
    async fn test_connection(&self) -> bool;
}

#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connector: Arc<dyn Connector>) {
        locks::write(&self.connectors).insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        locks::read(&self.connectors).get(name)
                                     .cloned()
                                     .ok_or_else(|| ConnectorError::UnknownConnector(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = locks::read(&self.connectors).keys().cloned().collect();
        names.sort();
        names
    }
}
