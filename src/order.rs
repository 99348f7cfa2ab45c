//! Participant-side orders and the actions strategies emit.

use crate::side::Side;
use crate::types::{Nanos, OrderId, Price, Quantity, SymbolId};

/// A simulated order resting in the matching kernel.
///
/// Created on an `Add` action, mutated only by `Replace` or fills, and
/// removed on full fill, `Cancel`, or post-only rejection.
/// `filled_qty <= total_qty` holds at all times; equality removes the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveOrder {
    pub order_id: OrderId,
    pub symbol_id: SymbolId,
    /// When the strategy emitted the Add.
    pub sent_ts: Nanos,
    /// When the exchange received it (or the latest Replace).
    pub md_ts: Nanos,
    pub price: Price,
    pub total_qty: Quantity,
    pub filled_qty: Quantity,
    pub side: Side,
    pub post_only: bool,
}

impl ActiveOrder {
    /// Quantity still open.
    #[inline]
    pub fn remaining(&self) -> Quantity {
        self.total_qty.saturating_sub(self.filled_qty)
    }

    /// True once the whole quantity has traded.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled_qty >= self.total_qty
    }
}

/// An instruction from the strategy to the matching kernel.
///
/// Actions are value-semantic: the strategy returns an owned list per
/// callback and holds no references into kernel state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Place a new order.
    Add {
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Quantity,
        post_only: bool,
    },
    /// Remove an order.
    Cancel { order_id: OrderId },
    /// Atomically re-price/re-size an order in place (not cancel+new:
    /// the order keeps its id, side, and post-only flag).
    Replace {
        order_id: OrderId,
        new_price: Price,
        new_qty: Quantity,
    },
}

impl Action {
    /// Create an Add action.
    pub fn add(order_id: OrderId, side: Side, price: Price, qty: Quantity, post_only: bool) -> Self {
        Action::Add {
            order_id,
            side,
            price,
            qty,
            post_only,
        }
    }

    /// Create a Cancel action.
    pub fn cancel(order_id: OrderId) -> Self {
        Action::Cancel { order_id }
    }

    /// Create a Replace action.
    pub fn replace(order_id: OrderId, new_price: Price, new_qty: Quantity) -> Self {
        Action::Replace {
            order_id,
            new_price,
            new_qty,
        }
    }

    /// The order this action refers to.
    pub fn order_id(&self) -> OrderId {
        match *self {
            Action::Add { order_id, .. }
            | Action::Cancel { order_id }
            | Action::Replace { order_id, .. } => order_id,
        }
    }
}
