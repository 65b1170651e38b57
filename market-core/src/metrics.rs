//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `market_events_total` - Events committed to the log
//! - `market_tickets_minted_total` - Tickets minted
//! - `market_orders_filled_total` - Resale orders filled
//! - `market_projects_settled_total` - Projects settled
//! - `market_commit_duration_seconds` - Histogram of commit latencies

use crate::events::{EventKind, MarketEvent};
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events committed
    pub events_total: IntCounter,

    /// Tickets minted
    pub tickets_minted_total: IntCounter,

    /// Orders filled
    pub orders_filled_total: IntCounter,

    /// Projects settled
    pub projects_settled_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounter::with_opts(Opts::new(
            "market_events_total",
            "Events committed to the log",
        ))?;
        registry.register(Box::new(events_total.clone()))?;

        let tickets_minted_total = IntCounter::with_opts(Opts::new(
            "market_tickets_minted_total",
            "Tickets minted",
        ))?;
        registry.register(Box::new(tickets_minted_total.clone()))?;

        let orders_filled_total = IntCounter::with_opts(Opts::new(
            "market_orders_filled_total",
            "Resale orders filled",
        ))?;
        registry.register(Box::new(orders_filled_total.clone()))?;

        let projects_settled_total = IntCounter::with_opts(Opts::new(
            "market_projects_settled_total",
            "Projects settled",
        ))?;
        registry.register(Box::new(projects_settled_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "market_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            events_total,
            tickets_minted_total,
            orders_filled_total,
            projects_settled_total,
            commit_duration,
            registry,
        })
    }

    /// Record a committed event
    pub fn record_event(&self, event: &MarketEvent) {
        self.events_total.inc();
        match event.kind {
            EventKind::TicketPurchased { .. } => self.tickets_minted_total.inc(),
            EventKind::OrderFilled { .. } => self.orders_filled_total.inc(),
            EventKind::ProjectSettled { .. } => self.projects_settled_total.inc(),
            _ => {}
        }
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("events_total", &self.events_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, OrderId, TicketId};
    use chrono::Utc;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.events_total.get(), 0);
        assert_eq!(metrics.orders_filled_total.get(), 0);
    }

    #[test]
    fn test_record_event_updates_kind_counters() {
        let metrics = Metrics::new().unwrap();
        let event = MarketEvent {
            sequence: 0,
            at: Utc::now(),
            kind: EventKind::OrderFilled {
                order_id: OrderId::new(1),
                ticket_id: TicketId::new(1),
                buyer: AccountId::new("bob"),
                seller: AccountId::new("alice"),
                price: 2,
            },
        };

        metrics.record_event(&event);
        assert_eq!(metrics.events_total.get(), 1);
        assert_eq!(metrics.orders_filled_total.get(), 1);
        assert_eq!(metrics.tickets_minted_total.get(), 0);
    }
}
