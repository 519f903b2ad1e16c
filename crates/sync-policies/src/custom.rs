//! Resolutores personalizados por tabla y validadores de candidatos.
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::conflict::{Conflict, ResolvedValue};

/// Resolutor registrado por el llamador para una tabla.
#[async_trait]
pub trait CustomResolver: Send + Sync {
    async fn resolve(&self, conflict: &Conflict) -> Result<ResolvedValue, String>;
}

struct SyncFn<F>(F);

#[async_trait]
impl<F> CustomResolver for SyncFn<F> where F: Fn(&Conflict) -> Result<ResolvedValue, String> + Send + Sync
{
    async fn resolve(&self, conflict: &Conflict) -> Result<ResolvedValue, String> {
        (self.0)(conflict)
    }
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> CustomResolver for AsyncFn<F>
    where F: Fn(Conflict) -> Fut + Send + Sync,
          Fut: Future<Output = Result<ResolvedValue, String>> + Send
{
    async fn resolve(&self, conflict: &Conflict) -> Result<ResolvedValue, String> {
        (self.0)(conflict.clone()).await
    }
}

pub fn sync_resolver<F>(f: F) -> Arc<dyn CustomResolver>
    where F: Fn(&Conflict) -> Result<ResolvedValue, String> + Send + Sync + 'static
{
    Arc::new(SyncFn(f))
}

pub fn async_resolver<F, Fut>(f: F) -> Arc<dyn CustomResolver>
    where F: Fn(Conflict) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = Result<ResolvedValue, String>> + Send + 'static
{
    Arc::new(AsyncFn(f))
}

/// Validador de un valor candidato. Todos deben aceptar para aplicar.
pub trait ResolutionValidator: Send + Sync {
    fn validate(&self, conflict: &Conflict, candidate: &ResolvedValue) -> Result<(), String>;
}

impl<F> ResolutionValidator for F where F: Fn(&Conflict, &ResolvedValue) -> Result<(), String> + Send + Sync
{
    fn validate(&self, conflict: &Conflict, candidate: &ResolvedValue) -> Result<(), String> {
        self(conflict, candidate)
    }
}
