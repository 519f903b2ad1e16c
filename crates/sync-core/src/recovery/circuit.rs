//! Circuit breakers por clase de error.
//!
//! Cada clase (`connection`, `timeout`, ...) tiene su propia ventana de
//! fallos. Con umbral `T`, los primeros `T` fallos dentro de la ventana se
//! cuentan normalmente; a partir del siguiente el breaker queda abierto hasta
//! que pasa `timeout`, momento en que se semi-abre y el contador vuelve a 0.
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::locks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub window: Duration,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { threshold: 5,
               window: Duration::from_secs(60),
               timeout: Duration::from_secs(30) }
    }
}

#[derive(Debug)]
struct Breaker {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open: bool,
}

impl Breaker {
    fn new() -> Self {
        Self { failures: VecDeque::new(),
               opened_at: None,
               half_open: false }
    }

    fn refresh(&mut self, cfg: &CircuitBreakerConfig, now: Instant) {
        if let Some(opened) = self.opened_at {
            if now.duration_since(opened) >= cfg.timeout {
                self.opened_at = None;
                self.half_open = true;
                self.failures.clear();
            }
        }
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > cfg.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn state(&self) -> CircuitState {
        if self.opened_at.is_some() {
            CircuitState::Open
        } else if self.half_open {
            CircuitState::HalfOpen
        } else {
            CircuitState::Closed
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    inner: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config,
               inner: Mutex::new(HashMap::new()) }
    }

    /// Registra un fallo de `error_type`. Devuelve `true` si el breaker está
    /// abierto y el error debe enrutarse a `circuitBreaker`.
    pub fn record_failure(&self, error_type: &str) -> bool {
        let now = Instant::now();
        let mut guard = locks::lock(&self.inner);
        let breaker = guard.entry(error_type.to_string()).or_insert_with(Breaker::new);
        breaker.refresh(&self.config, now);
        if breaker.opened_at.is_some() {
            return true;
        }
        if breaker.failures.len() as u32 >= self.config.threshold {
            warn!("circuit opened for '{error_type}' after {} failures", breaker.failures.len());
            breaker.opened_at = Some(now);
            breaker.half_open = false;
            return true;
        }
        breaker.failures.push_back(now);
        breaker.half_open = false;
        false
    }

    /// Un éxito cierra el breaker y limpia su contador.
    pub fn record_success(&self, error_type: &str) {
        let mut guard = locks::lock(&self.inner);
        if let Some(b) = guard.get_mut(error_type) {
            if b.opened_at.is_some() || b.half_open {
                info!("circuit closed for '{error_type}'");
            }
            *b = Breaker::new();
        }
    }

    pub fn state(&self, error_type: &str) -> CircuitState {
        let mut guard = locks::lock(&self.inner);
        match guard.get_mut(error_type) {
            Some(b) => {
                b.refresh(&self.config, Instant::now());
                b.state()
            }
            None => CircuitState::Closed,
        }
    }

    /// Estado de todos los breakers conocidos.
    pub fn snapshot(&self) -> BTreeMap<String, CircuitState> {
        let now = Instant::now();
        let mut guard = locks::lock(&self.inner);
        guard.iter_mut()
             .map(|(k, b)| {
                 b.refresh(&self.config, now);
                 (k.clone(), b.state())
             })
             .collect()
    }
}
