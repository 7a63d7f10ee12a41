//! Trigger bus: table-change notifications.
//!
//! The bus provides:
//! - Intersection-based routing of "tables changed" events to listeners
//! - One private, unbounded queue per listener so publishers never wait
//! - A lossy broadcast tap for monitoring
//!
//! # Architecture
//!
//! Events flow from a committed write → `TriggerBus` → `TriggerListener`:
//! - `TriggerBus`: listener table plus the monitoring tap
//! - `TriggerListener`: one registration; unregisters on drop
//! - `TriggerMonitor`: logs tap traffic in 100ms/50 event windows

mod event_bus;
mod event_types;
mod monitor;

pub(crate) use event_bus::TAP_CAPACITY;
pub use event_bus::{ListenerId, TriggerBus, TriggerListener};
pub use event_types::{TableSet, TriggerEvent};
pub use monitor::{TriggerMonitor, TriggerSummary};
