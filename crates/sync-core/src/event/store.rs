use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{FlowEvent, FlowEventKind};

/// Almacenamiento de eventos append-only.
pub trait EventStore: Send + Sync {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con
    /// seq y ts).
    fn append_kind(&self, flow_id: Uuid, kind: FlowEventKind) -> FlowEvent;
    /// Lista eventos de una ejecución (orden ascendente por seq).
    fn list(&self, flow_id: Uuid) -> Vec<FlowEvent>;
    /// Descarta el historial de una ejecución desalojada.
    fn forget(&self, flow_id: Uuid);
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: DashMap<Uuid, Vec<FlowEvent>>,
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&self, flow_id: Uuid, kind: FlowEventKind) -> FlowEvent {
        let mut events = self.inner.entry(flow_id).or_default();
        let ev = FlowEvent { seq: events.len() as u64,
                             flow_id,
                             kind,
                             ts: Utc::now() };
        events.push(ev.clone());
        ev
    }

    fn list(&self, flow_id: Uuid) -> Vec<FlowEvent> {
        self.inner.get(&flow_id).map(|v| v.clone()).unwrap_or_default()
    }

    fn forget(&self, flow_id: Uuid) {
        self.inner.remove(&flow_id);
    }
}
