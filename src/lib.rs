//! # fillsim
//!
//! An event-driven market-making fill simulator: replay captured exchange
//! market data for one instrument against a pluggable quoting strategy,
//! matching the strategy's simulated orders against the reconstructed book
//! under configurable network latencies.
//!
//! ## Features
//!
//! - **Two replay modes**: pre-computed top/fill snapshots, or raw book
//!   events rebuilt into full price-level queues (queue mode)
//! - **Latency pipeline**: every message crossing an interface boundary is
//!   re-stamped with simulated one-way delays
//! - **Post-only semantics**: quotes that would cross are rejected the way
//!   an exchange would reject them
//! - **Binary order trace**: every simulated order lifecycle event is
//!   written as a packed record for downstream analysis
//! - **Deterministic**: identical inputs and config produce byte-identical
//!   traces
//! - **Fixed-point prices**: signed 64-bit nanos of the quote currency,
//!   with 128-bit accumulation for cash flow
//!
//! ## Quick start
//!
//! ```
//! use fillsim::{CyclingQuoter, LatencyConfig, Price, Simulator};
//! use fillsim::wire::{BookTop, TopLevel};
//!
//! let strategy = Box::new(CyclingQuoter::new(0, 1));
//! let mut sim = Simulator::new(strategy, LatencyConfig::default(), Vec::new());
//! sim.set_symbol_id(1);
//!
//! let top = BookTop {
//!     ts: 1_000_000,
//!     seqno: 1,
//!     levels: [
//!         TopLevel {
//!             bid: Price::from_units(99),
//!             ask: Price::from_units(100),
//!             bid_qty: 10,
//!             ask_qty: 10,
//!         },
//!         TopLevel::default(),
//!         TopLevel::default(),
//!     ],
//! };
//! sim.process_book_top(&top).unwrap();
//!
//! // The cycling quoter bought at the ask and filled immediately.
//! assert_eq!(sim.position(), 1);
//! ```
//!
//! ## Price representation
//!
//! Prices are [`Price`] — `i64` in units of 10⁻⁹ of the quote currency:
//!
//! ```
//! use fillsim::Price;
//!
//! let price = Price::from_units(100);
//! assert_eq!(price.0, 100_000_000_000);
//! assert_eq!(format!("{price}"), "$100.00");
//! ```
//!
//! `Price::NO_BID` (0) and `Price::NO_ASK` (`i64::MAX`) mark empty book
//! sides and never match anything.

pub mod book;
pub mod config;
mod engine;
pub mod error;
mod kernel;
pub mod latency;
mod order;
pub mod report;
mod side;
mod sim;
pub mod strategy;
mod types;
pub mod wire;

// Re-export the public API.
pub use book::{Applied, BookLevel, QueueBook, RestingOrder};
pub use config::{Config, SimulationConfig};
pub use engine::TOP_THROTTLE_NS;
pub use error::{Error, Result};
pub use latency::{LatencyConfig, LatencyStats};
pub use order::{Action, ActiveOrder};
pub use report::SimulationReport;
pub use side::Side;
pub use sim::Simulator;
pub use strategy::{CyclingQuoter, Strategy, TheoQuoter};
pub use types::{Nanos, OrderId, Price, Quantity, SymbolId, NANOS_PER_UNIT};
pub use wire::{BookTop, FillSnapshot, TopLevel, TraceKind, TraceRecord, WireError};
