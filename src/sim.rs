//! The `Simulator`: central state for one simulation run.
//!
//! Owns the strategy, the latency pipeline, the participant's active
//! orders, the running P&L aggregates, and the output trace writer. The
//! matching kernel lives in `kernel.rs` and the event loop in `engine.rs`,
//! both as further `impl Simulator` blocks.

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::latency::{LatencyConfig, LatencyStats};
use crate::order::ActiveOrder;
use crate::report::SimulationReport;
use crate::strategy::Strategy;
use crate::types::{Nanos, OrderId, Price, SymbolId};
use crate::wire::{BookTop, TraceWriter};

/// Event-driven fill simulator for a single instrument.
///
/// Strictly single-threaded and deterministic: identical inputs and
/// configuration produce a byte-identical output trace.
pub struct Simulator<W: Write> {
    pub(crate) strategy: Box<dyn Strategy>,
    pub(crate) latency: LatencyConfig,
    pub(crate) lat_stats: LatencyStats,
    pub(crate) trace: TraceWriter<W>,

    pub(crate) symbol_id: SymbolId,
    /// The participant's open orders.
    pub(crate) orders: FxHashMap<OrderId, ActiveOrder>,
    /// Order ids in arrival order; the sweep walks this so rerun order is
    /// never at the mercy of hash iteration.
    pub(crate) arrival_order: Vec<OrderId>,

    /// Latest accepted top snapshot.
    pub(crate) last_top: Option<BookTop>,
    pub(crate) last_valid_mid: Price,
    /// Timestamp of the last top that made it past the throttle.
    pub(crate) last_processed_top_ts: Nanos,

    // Monotone aggregates, exact integer nanos throughout.
    pub(crate) position: i64,
    pub(crate) cash_flow_nanos: i128,
    pub(crate) orders_placed: u64,
    pub(crate) orders_filled: u64,
    pub(crate) buy_volume: u64,
    pub(crate) sell_volume: u64,
    pub(crate) buy_cost_nanos: i128,
    pub(crate) sell_proceeds_nanos: i128,

    // Absorbed-anomaly counters.
    pub(crate) state_warnings: u64,
    pub(crate) invalid_tops: u64,
    pub(crate) skipped_tops: u64,
    pub(crate) tops_processed: u64,
    pub(crate) fill_events_processed: u64,
}

impl<W: Write> Simulator<W> {
    /// Create a simulator writing its trace to `sink`.
    pub fn new(strategy: Box<dyn Strategy>, latency: LatencyConfig, sink: W) -> Self {
        Simulator {
            strategy,
            latency,
            lat_stats: LatencyStats::default(),
            trace: TraceWriter::new(sink),
            symbol_id: 0,
            orders: FxHashMap::default(),
            arrival_order: Vec::new(),
            last_top: None,
            last_valid_mid: Price(0),
            last_processed_top_ts: 0,
            position: 0,
            cash_flow_nanos: 0,
            orders_placed: 0,
            orders_filled: 0,
            buy_volume: 0,
            sell_volume: 0,
            buy_cost_nanos: 0,
            sell_proceeds_nanos: 0,
            state_warnings: 0,
            invalid_tops: 0,
            skipped_tops: 0,
            tops_processed: 0,
            fill_events_processed: 0,
        }
    }

    /// Set the instrument id and forward it to the strategy.
    ///
    /// Called once, from the input file header, before the first event.
    pub fn set_symbol_id(&mut self, symbol_id: SymbolId) {
        self.symbol_id = symbol_id;
        self.strategy.set_symbol(symbol_id);
    }

    // === Inspection ===

    /// Net position in shares (buys positive).
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Cumulative signed cash flow in nanos (sales positive).
    pub fn cash_flow_nanos(&self) -> i128 {
        self.cash_flow_nanos
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed
    }

    pub fn orders_filled(&self) -> u64 {
        self.orders_filled
    }

    /// Number of currently open simulated orders.
    pub fn active_order_count(&self) -> usize {
        self.orders.len()
    }

    /// An open order by id.
    pub fn active_order(&self, order_id: OrderId) -> Option<&ActiveOrder> {
        self.orders.get(&order_id)
    }

    /// Latest accepted top snapshot.
    pub fn last_top(&self) -> Option<&BookTop> {
        self.last_top.as_ref()
    }

    pub fn latency_stats(&self) -> &LatencyStats {
        &self.lat_stats
    }

    /// Count of absorbed per-record anomalies (unknown ids, invalid fills).
    pub fn state_warnings(&self) -> u64 {
        self.state_warnings
    }

    /// Build the end-of-run results summary.
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            strategy_name: self.strategy.name().to_string(),
            orders_placed: self.orders_placed,
            orders_filled: self.orders_filled,
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
            buy_cost_nanos: self.buy_cost_nanos,
            sell_proceeds_nanos: self.sell_proceeds_nanos,
            position: self.position,
            final_mid: self.last_valid_mid,
            cash_flow_nanos: self.cash_flow_nanos,
            latency: self.lat_stats,
            trace_records: self.trace.records_written(),
        }
    }

    /// Flush the trace and hand back the sink.
    pub fn finish(self) -> crate::error::Result<W> {
        Ok(self.trace.into_sink()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Action;
    use crate::side::Side;
    use crate::types::Quantity;
    use crate::wire::FillSnapshot;

    /// Strategy that never acts; aggregates must stay at zero.
    struct Inert;

    impl Strategy for Inert {
        fn name(&self) -> &'static str {
            "Inert"
        }
        fn set_symbol(&mut self, _symbol_id: SymbolId) {}
        fn on_book_top(&mut self, _top: &BookTop) -> Vec<Action> {
            Vec::new()
        }
        fn on_fill(&mut self, _fill: &FillSnapshot) -> Vec<Action> {
            Vec::new()
        }
        fn on_order_filled(
            &mut self,
            _order_id: OrderId,
            _price: Price,
            _qty: Quantity,
            _side: Side,
        ) -> Vec<Action> {
            Vec::new()
        }
    }

    #[test]
    fn new_simulator_is_flat() {
        let sim = Simulator::new(Box::new(Inert), LatencyConfig::default(), Vec::new());
        assert_eq!(sim.position(), 0);
        assert_eq!(sim.cash_flow_nanos(), 0);
        assert_eq!(sim.orders_placed(), 0);
        assert_eq!(sim.active_order_count(), 0);
        assert!(sim.last_top().is_none());
    }

    #[test]
    fn report_carries_strategy_name() {
        let sim = Simulator::new(Box::new(Inert), LatencyConfig::default(), Vec::new());
        let report = sim.report();
        assert_eq!(report.strategy_name, "Inert");
        assert_eq!(report.orders_placed, 0);
        assert_eq!(report.trace_records, 0);
    }

    #[test]
    fn finish_returns_sink() {
        let sim = Simulator::new(Box::new(Inert), LatencyConfig::default(), Vec::new());
        let sink = sim.finish().unwrap();
        assert!(sink.is_empty());
    }
}
