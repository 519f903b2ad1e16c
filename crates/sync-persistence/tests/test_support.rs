#![allow(dead_code)]
use once_cell::sync::Lazy;
use sync_persistence::{build_pool, DbConfig, PgCheckpointStore, PgPool, PoolProvider};

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    match build_pool(&cfg.url, 1, 2) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

/// Store sobre el pool compartido; `None` (test se salta) sin DATABASE_URL.
pub fn store() -> Option<PgCheckpointStore<PoolProvider>> {
    match TEST_POOL.as_ref() {
        Some(pool) => Some(PgCheckpointStore::new(PoolProvider::new(pool.clone()))),
        None => {
            eprintln!("skip (no DATABASE_URL)");
            None
        }
    }
}
