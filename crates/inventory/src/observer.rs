//! Observers for stock mutation outcomes.
//!
//! The mutator receives its observer at construction; nothing is reachable
//! through a global. Observers run on the mutating thread after the product
//! lock has been released, so they may take their own locks freely.

use std::sync::atomic::{AtomicU64, Ordering};

use stockroom_core::EventId;
use stockroom_events::{Event, EventBus, EventEnvelope};

use crate::events::StockEvent;

pub trait StockObserver: Send + Sync {
    fn on_stock_event(&self, event: &StockEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StockObserver for NoopObserver {
    fn on_stock_event(&self, _event: &StockEvent) {}
}

impl<F> StockObserver for F
where
    F: Fn(&StockEvent) + Send + Sync,
{
    fn on_stock_event(&self, event: &StockEvent) {
        self(event)
    }
}

/// Publishes every stock event, wrapped in an envelope, to an event bus.
#[derive(Debug)]
pub struct BusObserver<B> {
    bus: B,
    source: String,
    sequence: AtomicU64,
}

impl<B> BusObserver<B> {
    pub fn new(bus: B, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Sequence number that will be assigned to the next published event.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed) + 1
    }
}

impl<B> StockObserver for BusObserver<B>
where
    B: EventBus<EventEnvelope<StockEvent>>,
{
    fn on_stock_event(&self, event: &StockEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope =
            EventEnvelope::new(EventId::new(), self.source.clone(), sequence, event.clone());

        match self.bus.publish(envelope) {
            Ok(()) => tracing::trace!(
                source = %self.source,
                sequence,
                event_type = event.event_type(),
                "stock event published"
            ),
            Err(err) => tracing::warn!(
                source = %self.source,
                event_type = event.event_type(),
                error = ?err,
                "failed to publish stock event"
            ),
        }
    }
}
