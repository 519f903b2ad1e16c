//! Configuración central del runtime de sincronización.
//! Carga variables de entorno (.env) y expone `SyncConfig` más una instancia
//! global perezosa (`CONFIG`) pensada para binarios. Las librerías reciben la
//! configuración por inyección.
use chrono::Utc;
use dotenvy::dotenv;
use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use sync_core::{retention_cutoff, OrchestratorConfig, RecoveryConfig};
use sync_domain::DetectorConfig;
use sync_persistence::DbConfig;
use sync_policies::ResolutionPolicy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Instancia global, evaluada una sola vez.
pub static CONFIG: Lazy<SyncConfig> = Lazy::new(SyncConfig::from_env);

/// Parámetros de conexión a Postgres (opcional: sin `DATABASE_URL` el
/// runtime usa el Checkpoint Store en memoria).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl From<&DatabaseConfig> for DbConfig {
    fn from(c: &DatabaseConfig) -> Self {
        DbConfig { url: c.url.clone(),
                   min_connections: c.min_connections,
                   max_connections: c.max_connections }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub orchestrator: OrchestratorConfig,
    pub recovery: RecoveryConfig,
    pub detector: DetectorConfig,
    pub resolution: ResolutionPolicy,
    pub database: Option<DatabaseConfig>,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                                          warn!("{key}='{raw}' no es válido; se usa el valor por defecto");
                                          default
                                      }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl SyncConfig {
    /// Lee la configuración del entorno (cargando `.env` una vez). Valores mal
    /// formados caen al valor por defecto.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        let o = &mut cfg.orchestrator;
        o.max_concurrency = parse_or(&lookup, "SYNC_MAX_CONCURRENCY", o.max_concurrency).max(1);
        o.default_step_timeout =
            Duration::from_secs(parse_or(&lookup, "SYNC_STEP_TIMEOUT_SECS", o.default_step_timeout.as_secs()));
        o.checkpoint_every = parse_or(&lookup, "SYNC_CHECKPOINT_EVERY", o.checkpoint_every);
        o.execution_retention =
            Duration::from_secs(parse_or(&lookup, "SYNC_EXECUTION_RETENTION_SECS", o.execution_retention.as_secs()));

        let r = &mut cfg.recovery;
        let days = parse_or(&lookup, "SYNC_CHECKPOINT_RETENTION_DAYS", r.checkpoint_retention_days);
        if retention_cutoff(Utc::now(), days).is_some() {
            r.checkpoint_retention_days = days;
        } else {
            warn!("SYNC_CHECKPOINT_RETENTION_DAYS={days} fuera de rango; se usa {}", r.checkpoint_retention_days);
        }
        r.history_retention =
            Duration::from_secs(parse_or(&lookup, "SYNC_HISTORY_RETENTION_SECS", r.history_retention.as_secs()));
        r.circuit.threshold = parse_or(&lookup, "SYNC_CIRCUIT_THRESHOLD", r.circuit.threshold);
        r.circuit.window = Duration::from_secs(parse_or(&lookup, "SYNC_CIRCUIT_WINDOW_SECS", r.circuit.window.as_secs()));
        r.circuit.timeout = Duration::from_secs(parse_or(&lookup, "SYNC_CIRCUIT_TIMEOUT_SECS", r.circuit.timeout.as_secs()));
        if let Some(raw) = lookup("SYNC_CRITICAL_ERROR_TYPES") {
            let types: Vec<String> = raw.split(',')
                                        .map(|s| s.trim().to_string())
                                        .filter(|s| !s.is_empty())
                                        .collect();
            if !types.is_empty() {
                r.critical_error_types = types;
            }
        }
        if let Some(b) = lookup("SYNC_PARALLEL_RECOVERY").as_deref().and_then(parse_bool) {
            r.parallel_recovery = b;
        }
        r.recovery_workers = parse_or(&lookup, "SYNC_RECOVERY_WORKERS", r.recovery_workers).max(1);

        let d = &mut cfg.detector;
        d.cache_capacity = parse_or(&lookup, "SYNC_COMPARISON_CACHE_SIZE", d.cache_capacity);
        d.detection_workers = parse_or(&lookup, "SYNC_DETECTION_WORKERS", d.detection_workers).max(1);

        cfg.database = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()).map(|url| {
                                                  DatabaseConfig { url,
                                                                   min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 2),
                                                                   max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 16) }
                                              });
        cfg
    }
}
