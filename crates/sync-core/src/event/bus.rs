//! Bus de eventos en proceso con aislamiento de fallos por listener.
//!
//! Entrega: cada `emit` invoca a todos los listeners registrados en orden de
//! suscripción. Un listener que devuelve error o entra en pánico se registra
//! en el log y no impide la entrega al resto.

use log::warn;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::locks;

/// Evento con nombre estable (`workflow.started`, `conflict.resolved`...).
pub trait NamedEvent {
    fn name(&self) -> &'static str;
}

/// Suscriptor de eventos.
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E) -> Result<(), String>;
}

impl<E, F> EventListener<E> for F where F: Fn(&E) -> Result<(), String> + Send + Sync
{
    fn on_event(&self, event: &E) -> Result<(), String> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct EventBus<E> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn EventListener<E>>)>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self { listeners: RwLock::new(Vec::new()),
               next_id: AtomicU64::new(0) }
    }
}

impl<E: NamedEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        locks::write(&self.listeners).push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = locks::write(&self.listeners);
        let before = guard.len();
        guard.retain(|(lid, _)| *lid != id);
        guard.len() != before
    }

    pub fn listener_count(&self) -> usize {
        locks::read(&self.listeners).len()
    }

    /// Entrega `event` a todos los listeners; devuelve cuántos lo aceptaron.
    pub fn emit(&self, event: &E) -> usize {
        // Copia de la lista para no invocar callbacks con el lock tomado.
        let snapshot: Vec<Arc<dyn EventListener<E>>> =
            locks::read(&self.listeners).iter().map(|(_, l)| Arc::clone(l)).collect();
        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("listener failed on '{}': {e}", event.name()),
                Err(_) => warn!("listener panicked on '{}'", event.name()),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Ping;
    impl NamedEvent for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }
    }

    #[test]
    fn failing_listeners_do_not_block_others() {
        let bus: EventBus<Ping> = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        bus.subscribe(Arc::new(|_: &Ping| Err::<(), String>("boom".to_string())));
        bus.subscribe(Arc::new(|_: &Ping| -> Result<(), String> { panic!("listener panic") }));
        let s = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |_: &Ping| {
                          *s.lock().unwrap() += 1;
                          Ok(())
                      }));
        assert_eq!(bus.emit(&Ping), 1);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let bus: EventBus<Ping> = EventBus::new();
        let id = bus.subscribe(Arc::new(|_: &Ping| Ok(())));
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.emit(&Ping), 0);
    }
}
