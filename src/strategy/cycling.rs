//! Cycling quoter: alternates aggressive buys and sells at the touch.
//!
//! On each accepted top it places one order at the opposite touch (a buy at
//! the ask, then a sell at the bid, alternating), cancelling its previous
//! order on that side first. Orders are not post-only, so each one is
//! expected to cross immediately. Mostly useful as a fill-pipeline exerciser
//! and as a baseline that pays the spread on every round trip.

use crate::config::Config;
use crate::error::Result;
use crate::order::Action;
use crate::side::Side;
use crate::types::{Nanos, OrderId, Price, Quantity, SymbolId};
use crate::wire::{BookTop, FillSnapshot};

use super::Strategy;

/// Minimum spacing between orders unless configured otherwise.
const DEFAULT_ORDER_INTERVAL_NS: Nanos = 10_000;

pub struct CyclingQuoter {
    symbol_id: SymbolId,
    next_order_id: u64,
    live_bid: Option<OrderId>,
    live_ask: Option<OrderId>,
    place_buy_next: bool,
    last_order_ts: Nanos,
    order_interval_ns: Nanos,
    quantity: Quantity,
}

impl CyclingQuoter {
    pub fn new(order_interval_ns: Nanos, quantity: Quantity) -> Self {
        CyclingQuoter {
            symbol_id: 0,
            next_order_id: 1,
            live_bid: None,
            live_ask: None,
            place_buy_next: true,
            last_order_ts: 0,
            order_interval_ns,
            quantity,
        }
    }

    /// Read `strategy.order_interval_ns` and `strategy.quantity`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(CyclingQuoter::new(
            config.strategy_u64("order_interval_ns", DEFAULT_ORDER_INTERVAL_NS)?,
            config.strategy_u32("quantity", 1)?,
        ))
    }

    fn next_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }
}

impl Strategy for CyclingQuoter {
    fn name(&self) -> &'static str {
        "Cycling Quoter"
    }

    fn set_symbol(&mut self, symbol_id: SymbolId) {
        self.symbol_id = symbol_id;
    }

    fn on_book_top(&mut self, top: &BookTop) -> Vec<Action> {
        if !top.is_plausible() {
            return Vec::new();
        }
        if top.ts.saturating_sub(self.last_order_ts) < self.order_interval_ns {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.place_buy_next {
            if let Some(id) = self.live_bid.take() {
                actions.push(Action::cancel(id));
            }
            let id = self.next_id();
            actions.push(Action::add(
                id,
                Side::Bid,
                top.best_ask(),
                self.quantity,
                false,
            ));
            self.live_bid = Some(id);
        } else {
            if let Some(id) = self.live_ask.take() {
                actions.push(Action::cancel(id));
            }
            let id = self.next_id();
            actions.push(Action::add(
                id,
                Side::Ask,
                top.best_bid(),
                self.quantity,
                false,
            ));
            self.live_ask = Some(id);
        }

        self.place_buy_next = !self.place_buy_next;
        self.last_order_ts = top.ts;
        actions
    }

    fn on_fill(&mut self, _fill: &FillSnapshot) -> Vec<Action> {
        Vec::new()
    }

    fn on_order_filled(
        &mut self,
        order_id: OrderId,
        _price: Price,
        _qty: Quantity,
        side: Side,
    ) -> Vec<Action> {
        match side {
            Side::Bid if self.live_bid == Some(order_id) => self.live_bid = None,
            Side::Ask if self.live_ask == Some(order_id) => self.live_ask = None,
            _ => {}
        }
        Vec::new()
    }
}
