//! Eventos de ciclo de vida: tipos, log append-only por ejecución y bus de
//! listeners.

mod bus;
mod store;
mod types;

pub use bus::{EventBus, EventListener, ListenerId, NamedEvent};
pub use store::{EventStore, InMemoryEventStore};
pub use types::{FlowEvent, FlowEventKind};
