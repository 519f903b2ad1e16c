//! Cálculo de retrasos de reintento.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::RecoveryError;
use crate::step::{RetryConfig, RetryStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Curva de reintentos concreta. `attempt` es el número de reintentos ya
/// realizados (0 para el primer fallo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(kind: BackoffKind, retry: &RetryConfig) -> Self {
        Self { kind,
               max_retries: retry.max_retries,
               initial: retry.initial_delay(),
               max: retry.max_delay(),
               multiplier: retry.multiplier }
    }

    /// Política para un step según la estrategia elegida por el Recovery
    /// System. Un step con `RetryStrategy::None` nunca se reintenta y uno
    /// `Fixed` conserva su retraso constante.
    pub fn for_step(requested: BackoffKind, retry: &RetryConfig) -> Option<Self> {
        let kind = match retry.strategy {
            RetryStrategy::None => return None,
            RetryStrategy::Fixed => BackoffKind::Fixed,
            RetryStrategy::Linear | RetryStrategy::Exponential => requested,
        };
        Some(Self::new(kind, retry))
    }

    /// Retraso antes del reintento número `attempt + 1`, o
    /// `RetriesExhausted` si ya no quedan reintentos.
    pub fn delay_for(&self, attempt: u32) -> Result<Duration, RecoveryError> {
        if attempt >= self.max_retries {
            return Err(RecoveryError::RetriesExhausted { attempt,
                                                         max_retries: self.max_retries });
        }
        let delay = match self.kind {
            BackoffKind::Fixed => self.initial,
            BackoffKind::Linear => self.initial.saturating_mul(attempt.saturating_add(1)),
            BackoffKind::Exponential => {
                let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
                let secs = self.initial.as_secs_f64() * factor;
                if secs.is_finite() && secs < self.max.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max
                }
            }
        };
        Ok(delay.min(self.max.max(self.initial)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(kind: BackoffKind) -> BackoffPolicy {
        BackoffPolicy { kind,
                        max_retries: 4,
                        initial: Duration::from_millis(100),
                        max: Duration::from_millis(350),
                        multiplier: 2.0 }
    }

    #[test]
    fn curves_are_capped() {
        let lin = policy(BackoffKind::Linear);
        assert_eq!(lin.delay_for(0).unwrap(), Duration::from_millis(100));
        assert_eq!(lin.delay_for(2).unwrap(), Duration::from_millis(300));
        assert_eq!(lin.delay_for(3).unwrap(), Duration::from_millis(350));

        let exp = policy(BackoffKind::Exponential);
        assert_eq!(exp.delay_for(0).unwrap(), Duration::from_millis(100));
        assert_eq!(exp.delay_for(1).unwrap(), Duration::from_millis(200));
        assert_eq!(exp.delay_for(2).unwrap(), Duration::from_millis(350));

        let fixed = policy(BackoffKind::Fixed);
        assert_eq!(fixed.delay_for(3).unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn exhaustion_at_max_retries() {
        let p = policy(BackoffKind::Exponential);
        assert!(p.delay_for(3).is_ok());
        assert_eq!(p.delay_for(4),
                   Err(RecoveryError::RetriesExhausted { attempt: 4,
                                                         max_retries: 4 }));
    }

    #[test]
    fn step_retry_config_overrides_kind() {
        assert!(BackoffPolicy::for_step(BackoffKind::Exponential, &RetryConfig::none()).is_none());
        let fixed = RetryConfig::fixed(2, Duration::from_millis(10));
        let p = BackoffPolicy::for_step(BackoffKind::Linear, &fixed).unwrap();
        assert_eq!(p.kind, BackoffKind::Fixed);
        let p = BackoffPolicy::for_step(BackoffKind::Linear, &RetryConfig::default()).unwrap();
        assert_eq!(p.kind, BackoffKind::Linear);
    }
}
