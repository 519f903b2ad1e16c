use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Milisegundos de `d`, saturando en `u64::MAX`.
pub fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Forma de la curva de reintentos configurada en el step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Sin reintentos: el primer fallo es terminal.
    None,
    /// Retraso constante (`initial_delay_ms`).
    Fixed,
    /// `initial * (attempt + 1)`, acotado por `max_delay_ms`.
    Linear,
    /// `initial * multiplier^attempt`, acotado por `max_delay_ms`.
    Exponential,
}

/// Política de reintentos de un step. Los tiempos se guardan en milisegundos
/// para que la definición sea serializable sin ambigüedad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl RetryConfig {
    pub fn none() -> Self {
        Self { strategy: RetryStrategy::None,
               max_retries: 0,
               ..Self::default() }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        let ms = saturating_millis(delay);
        Self { strategy: RetryStrategy::Fixed,
               max_retries,
               initial_delay_ms: ms,
               max_delay_ms: ms,
               multiplier: 1.0 }
    }

    pub fn exponential(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self { strategy: RetryStrategy::Exponential,
               max_retries,
               initial_delay_ms: saturating_millis(initial),
               max_delay_ms: saturating_millis(max),
               multiplier: 2.0 }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn allows_retry(&self) -> bool {
        self.strategy != RetryStrategy::None && self.max_retries > 0
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { strategy: RetryStrategy::Exponential,
               max_retries: 3,
               initial_delay_ms: 100,
               max_delay_ms: 30_000,
               multiplier: 2.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_delays_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
        let cfg = RetryConfig::exponential(2, Duration::from_millis(10), Duration::MAX);
        assert_eq!(cfg.initial_delay_ms, 10);
        assert_eq!(cfg.max_delay_ms, u64::MAX);
        assert_eq!(RetryConfig::fixed(1, Duration::MAX).initial_delay_ms, u64::MAX);
    }
}
