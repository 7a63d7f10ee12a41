use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use super::TriggerEvent;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BATCH: usize = 50;

/// Per-table counts for one flushed window of trigger events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriggerSummary {
    pub events: usize,
    pub first_seq: Option<u64>,
    pub last_seq: Option<u64>,
    pub per_table: BTreeMap<String, usize>,
}

impl TriggerSummary {
    fn record(&mut self, event: &TriggerEvent) {
        self.events += 1;
        self.first_seq.get_or_insert(event.seq);
        self.last_seq = Some(event.seq);
        for table in event.tables.iter() {
            *self.per_table.entry(table.clone()).or_default() += 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.events == 0
    }
}

pub struct TriggerMonitor;

impl TriggerMonitor {
    /// Spawn a background task that logs trigger activity from the bus tap.
    ///
    /// Events are summarized and flushed every 100ms or once 50 events have
    /// accumulated. The task exits when the bus is dropped.
    pub fn start(rx: broadcast::Receiver<TriggerEvent>) -> JoinHandle<()> {
        Self::start_with(rx, |summary| {
            tracing::info!(
                events = summary.events,
                first_seq = ?summary.first_seq,
                last_seq = ?summary.last_seq,
                tables = ?summary.per_table,
                "table triggers"
            );
        })
    }

    /// Like [`TriggerMonitor::start`] but hands every flushed summary to `sink`.
    pub fn start_with<F>(mut rx: broadcast::Receiver<TriggerEvent>, mut sink: F) -> JoinHandle<()>
    where
        F: FnMut(&TriggerSummary) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut summary = TriggerSummary::default();
            let mut interval = time::interval(DEFAULT_FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => {
                                summary.record(&event);
                                if summary.events >= DEFAULT_MAX_BATCH {
                                    flush(&mut sink, &mut summary);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!("trigger monitor lagged, dropped {n} events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                flush(&mut sink, &mut summary);
                                break;
                            }
                        }
                    }
                    _ = interval.tick() => {
                        flush(&mut sink, &mut summary);
                    }
                }
            }
        })
    }
}

fn flush<F: FnMut(&TriggerSummary)>(sink: &mut F, summary: &mut TriggerSummary) {
    if summary.is_empty() {
        return;
    }
    sink(summary);
    *summary = TriggerSummary::default();
}
