//! Simulated network latency: timestamp stamping and running statistics.
//!
//! Latency is pure bookkeeping on timestamps — nothing ever sleeps. Every
//! message crossing an interface boundary is re-stamped:
//!
//! - market data reaches the strategy `strategy_md_latency_ns` after the
//!   exchange published it;
//! - a strategy action reaches the exchange `exchange_latency_ns` after the
//!   strategy emitted it;
//! - a fill notification reaches the strategy `exchange_latency_ns` after
//!   the fill occurred.

use serde::Deserialize;

use crate::types::Nanos;

fn default_md_latency() -> Nanos {
    1_000
}

fn default_exchange_latency() -> Nanos {
    10_000
}

/// Configured one-way delays, in nanoseconds.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LatencyConfig {
    /// Exchange publish → strategy receive.
    #[serde(default = "default_md_latency")]
    pub strategy_md_latency_ns: Nanos,
    /// Strategy emit → exchange receive, and exchange ack → strategy receive.
    #[serde(default = "default_exchange_latency")]
    pub exchange_latency_ns: Nanos,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        LatencyConfig {
            strategy_md_latency_ns: default_md_latency(),
            exchange_latency_ns: default_exchange_latency(),
        }
    }
}

impl LatencyConfig {
    /// When the strategy sees a market-data record published at `source_ts`.
    #[inline]
    pub fn strategy_receive(&self, source_ts: Nanos) -> Nanos {
        source_ts + self.strategy_md_latency_ns
    }

    /// When the exchange receives an action the strategy emitted at
    /// `strategy_ts`.
    #[inline]
    pub fn exchange_receive(&self, strategy_ts: Nanos) -> Nanos {
        strategy_ts + self.exchange_latency_ns
    }

    /// When the strategy hears about a fill that occurred at `fill_ts`.
    #[inline]
    pub fn notification(&self, fill_ts: Nanos) -> Nanos {
        fill_ts + self.exchange_latency_ns
    }
}

/// Running latency totals, averaged at end of run.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatencyStats {
    pub md_events: u64,
    pub md_to_strategy_ns: u64,
    pub actions_sent: u64,
    pub strategy_to_exchange_ns: u64,
    pub fill_notifications: u64,
    pub exchange_to_notification_ns: u64,
}

impl LatencyStats {
    pub fn record_md_event(&mut self, delay_ns: Nanos) {
        self.md_events += 1;
        self.md_to_strategy_ns += delay_ns;
    }

    pub fn record_action(&mut self, delay_ns: Nanos) {
        self.actions_sent += 1;
        self.strategy_to_exchange_ns += delay_ns;
    }

    pub fn record_notification(&mut self, delay_ns: Nanos) {
        self.fill_notifications += 1;
        self.exchange_to_notification_ns += delay_ns;
    }

    pub fn avg_md_to_strategy_ns(&self) -> f64 {
        average(self.md_to_strategy_ns, self.md_events)
    }

    pub fn avg_strategy_to_exchange_ns(&self) -> f64 {
        average(self.strategy_to_exchange_ns, self.actions_sent)
    }

    pub fn avg_exchange_to_notification_ns(&self) -> f64 {
        average(self.exchange_to_notification_ns, self.fill_notifications)
    }
}

fn average(sum: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
