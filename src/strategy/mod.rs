//! Strategy contract and the bundled quoting strategies.
//!
//! A strategy is a pure collaborator of the event loop: it receives
//! immutable market-data snapshots and fill notifications, and returns
//! owned lists of [`Action`]s. It holds no references into simulator state,
//! and all callbacks are synchronous.

use crate::config::Config;
use crate::error::Result;
use crate::order::Action;
use crate::side::Side;
use crate::types::{Price, Quantity, SymbolId};
use crate::wire::{BookTop, FillSnapshot};

mod cycling;
mod theo;

pub use cycling::CyclingQuoter;
pub use theo::TheoQuoter;

/// Callbacks the event loop drives. Each returns the actions to submit,
/// dispatched in list order.
pub trait Strategy {
    /// Human-readable strategy name for the results report.
    fn name(&self) -> &'static str;

    /// Called once with the instrument id before the first event.
    fn set_symbol(&mut self, symbol_id: SymbolId);

    /// A new top-of-book snapshot was accepted.
    fn on_book_top(&mut self, top: &BookTop) -> Vec<Action>;

    /// A trade printed on the external tape.
    fn on_fill(&mut self, fill: &FillSnapshot) -> Vec<Action>;

    /// One of this strategy's own orders (partially) filled.
    fn on_order_filled(
        &mut self,
        order_id: crate::types::OrderId,
        price: Price,
        qty: Quantity,
        side: Side,
    ) -> Vec<Action>;
}

/// Menu entries for interactive selection, 1-based.
pub fn available() -> &'static [(&'static str, &'static str)] {
    &[
        (
            "Cycling Quoter",
            "alternates aggressive buys and sells at the opposite touch",
        ),
        (
            "Theoretical Value Quoter",
            "quotes both sides around an EMA-blended theoretical value",
        ),
    ]
}

/// Build the strategy for a 1-based menu choice, reading its parameters
/// from the opaque `[strategy]` config table.
pub fn build(choice: usize, config: &Config) -> Result<Option<Box<dyn Strategy>>> {
    let strategy: Box<dyn Strategy> = match choice {
        1 => Box::new(CyclingQuoter::from_config(config)?),
        2 => Box::new(TheoQuoter::from_config(config)?),
        _ => return Ok(None),
    };
    Ok(Some(strategy))
}
