//! End-of-run results: P&L, volumes, and latency averages.

use std::fmt;

use crate::latency::LatencyStats;
use crate::types::{Price, NANOS_PER_UNIT};

/// Summary of a completed simulation, built by `Simulator::report`.
///
/// All currency amounts are exact integer nanos; conversion to floating
/// point happens only in accessors and `Display`.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub strategy_name: String,
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub buy_cost_nanos: i128,
    pub sell_proceeds_nanos: i128,
    pub position: i64,
    pub final_mid: Price,
    pub cash_flow_nanos: i128,
    pub latency: LatencyStats,
    pub trace_records: u64,
}

impl SimulationReport {
    /// Fills as a percentage of orders placed.
    pub fn fill_rate_percent(&self) -> f64 {
        if self.orders_placed == 0 {
            0.0
        } else {
            100.0 * self.orders_filled as f64 / self.orders_placed as f64
        }
    }

    /// Mark-to-mid value of the open position, in nanos.
    pub fn closing_value_nanos(&self) -> i128 {
        self.position as i128 * self.final_mid.0 as i128
    }

    /// Cash flow plus position marked at the final mid, in nanos.
    pub fn total_pnl_nanos(&self) -> i128 {
        self.cash_flow_nanos + self.closing_value_nanos()
    }

    /// Average buy price in quote-currency units, if anything was bought.
    pub fn avg_buy_price(&self) -> Option<f64> {
        if self.buy_volume == 0 {
            return None;
        }
        Some(nanos_to_units(self.buy_cost_nanos) / self.buy_volume as f64)
    }

    /// Average sell price in quote-currency units, if anything was sold.
    pub fn avg_sell_price(&self) -> Option<f64> {
        if self.sell_volume == 0 {
            return None;
        }
        Some(nanos_to_units(self.sell_proceeds_nanos) / self.sell_volume as f64)
    }

    /// Average sell price minus average buy price, when both sides traded.
    pub fn avg_spread_captured(&self) -> Option<f64> {
        Some(self.avg_sell_price()? - self.avg_buy_price()?)
    }
}

fn nanos_to_units(nanos: i128) -> f64 {
    nanos as f64 / NANOS_PER_UNIT as f64
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========= SIMULATION RESULTS =========")?;
        writeln!(f, "Strategy: {}", self.strategy_name)?;
        writeln!(f, "Total Orders Placed: {}", self.orders_placed)?;
        writeln!(f, "Total Orders Filled: {}", self.orders_filled)?;
        writeln!(f, "Fill Rate: {:.2}%", self.fill_rate_percent())?;
        writeln!(
            f,
            "Total Buy Volume: {} shares for ${:.2}",
            self.buy_volume,
            nanos_to_units(self.buy_cost_nanos)
        )?;
        writeln!(
            f,
            "Total Sell Volume: {} shares for ${:.2}",
            self.sell_volume,
            nanos_to_units(self.sell_proceeds_nanos)
        )?;
        writeln!(f, "Final Position: {} shares", self.position)?;
        writeln!(f, "Final Mid Price: {}", self.final_mid)?;
        if self.position != 0 {
            writeln!(
                f,
                "Closing Value: ${:.2}",
                nanos_to_units(self.closing_value_nanos())
            )?;
        }
        let pnl = nanos_to_units(self.total_pnl_nanos());
        writeln!(f, "Final P&L: ${pnl:.2}")?;
        let verdict = if pnl > 0.0 {
            "PROFIT"
        } else if pnl < 0.0 {
            "LOSS"
        } else {
            "BREAKEVEN"
        };
        writeln!(f, "Trading result: {verdict}")?;

        if let (Some(buy), Some(sell)) = (self.avg_buy_price(), self.avg_sell_price()) {
            writeln!(f, "Average Buy Price: ${buy:.4}")?;
            writeln!(f, "Average Sell Price: ${sell:.4}")?;
            writeln!(f, "Average Spread Captured: ${:.4}", sell - buy)?;
        }

        writeln!(
            f,
            "Latency (avg ns): md->strategy {:.0}, strategy->exchange {:.0}, exchange->notify {:.0}",
            self.latency.avg_md_to_strategy_ns(),
            self.latency.avg_strategy_to_exchange_ns(),
            self.latency.avg_exchange_to_notification_ns()
        )?;
        writeln!(
            f,
            "Market data events: {}; trace records written: {}",
            self.latency.md_events, self.trace_records
        )?;
        write!(f, "======================================")
    }
}
