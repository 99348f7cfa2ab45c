//! Theoretical-value quoter.
//!
//! Maintains a theoretical value as a blend of the book mid and an
//! exponentially weighted average of recent trade prices, then rests
//! post-only quotes a configured edge away from theo on both sides.
//! Resting quotes are cancelled when theo moves through them or when they
//! go stale (ten minutes of simulated time).

use std::collections::VecDeque;

use crate::config::Config;
use crate::error::Result;
use crate::order::Action;
use crate::side::Side;
use crate::types::{Nanos, OrderId, Price, Quantity, SymbolId};
use crate::wire::{BookTop, FillSnapshot};

use super::Strategy;

const MAX_TRADE_HISTORY: usize = 100;
const STALE_AFTER_NS: Nanos = 10 * 60 * 1_000_000_000;
/// Re-quote only when the target moves by more than this fraction of theo.
const REQUOTE_TOLERANCE: f64 = 0.001;

#[derive(Clone, Copy, Debug)]
struct LiveOrder {
    id: OrderId,
    created_ts: Nanos,
    price: Price,
    side: Side,
}

pub struct TheoQuoter {
    symbol_id: SymbolId,
    next_order_id: u64,
    live_orders: Vec<LiveOrder>,
    live_bid: Option<(OrderId, Price)>,
    live_ask: Option<(OrderId, Price)>,
    theo: Price,
    place_edge_percent: f64,
    cancel_edge_percent: f64,
    trade_weight: f64,
    ema_decay: f64,
    quantity: Quantity,
    recent_trades: VecDeque<(Price, Nanos)>,
}

impl TheoQuoter {
    pub fn new(
        place_edge_percent: f64,
        cancel_edge_percent: f64,
        trade_weight: f64,
        ema_decay: f64,
        quantity: Quantity,
    ) -> Self {
        TheoQuoter {
            symbol_id: 0,
            next_order_id: 1,
            live_orders: Vec::new(),
            live_bid: None,
            live_ask: None,
            theo: Price(0),
            place_edge_percent,
            cancel_edge_percent,
            trade_weight,
            ema_decay,
            quantity,
            recent_trades: VecDeque::with_capacity(MAX_TRADE_HISTORY),
        }
    }

    /// Read the `strategy.*` keys, defaulting to the classic parameters.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(TheoQuoter::new(
            config.strategy_f64("place_edge_percent", 0.01)?,
            config.strategy_f64("cancel_edge_percent", 0.005)?,
            config.strategy_f64("trade_weight", 0.7)?,
            config.strategy_f64("ema_decay", 0.05)?,
            config.strategy_u32("quantity", 1)?,
        ))
    }

    fn next_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn forget(&mut self, id: OrderId) {
        self.live_orders.retain(|o| o.id != id);
        if self.live_bid.map(|(b, _)| b) == Some(id) {
            self.live_bid = None;
        }
        if self.live_ask.map(|(a, _)| a) == Some(id) {
            self.live_ask = None;
        }
    }

    fn record_trade(&mut self, price: Price, ts: Nanos) {
        if price.0 <= 0 {
            return;
        }
        self.recent_trades.push_back((price, ts));
        if self.recent_trades.len() > MAX_TRADE_HISTORY {
            self.recent_trades.pop_front();
        }
    }

    /// Exponentially weighted average of recent trade prices, newest first.
    fn trade_average(&self) -> Price {
        let Some(&(latest, _)) = self.recent_trades.back() else {
            return Price(0);
        };
        if self.recent_trades.len() == 1 {
            return latest;
        }

        let mut price_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut weight = 1.0;
        for (price, _) in self.recent_trades.iter().rev() {
            price_sum += weight * price.0 as f64;
            weight_sum += weight;
            weight *= 1.0 - self.ema_decay;
        }
        Price((price_sum / weight_sum) as i64)
    }

    fn compute_theo(&self, top: &BookTop) -> Price {
        let mid = Price((top.best_bid().0 + top.best_ask().0) / 2);
        let trade_avg = self.trade_average();
        if trade_avg.0 <= 0 {
            return mid;
        }
        Price(
            (self.trade_weight * trade_avg.0 as f64
                + (1.0 - self.trade_weight) * mid.0 as f64) as i64,
        )
    }

    fn target_bid(&self) -> Price {
        Price((self.theo.0 as f64 * (1.0 - self.place_edge_percent / 100.0)) as i64)
    }

    fn target_ask(&self) -> Price {
        Price((self.theo.0 as f64 * (1.0 + self.place_edge_percent / 100.0)) as i64)
    }

    /// Remaining edge of a resting quote against the current theo, percent.
    fn edge_percent(&self, order: &LiveOrder) -> f64 {
        let theo = self.theo.0 as f64;
        match order.side {
            Side::Bid => (theo - order.price.0 as f64) / theo * 100.0,
            Side::Ask => (order.price.0 as f64 - theo) / theo * 100.0,
        }
    }

    /// Cancel quotes whose edge collapsed below the cancel threshold.
    fn cancel_through_theo(&mut self) -> Vec<Action> {
        if self.theo.0 <= 0 {
            return Vec::new();
        }
        let doomed: Vec<OrderId> = self
            .live_orders
            .iter()
            .filter(|o| self.edge_percent(o) < self.cancel_edge_percent)
            .map(|o| o.id)
            .collect();
        doomed
            .iter()
            .map(|&id| {
                self.forget(id);
                Action::cancel(id)
            })
            .collect()
    }

    /// Cancel quotes older than the stale horizon.
    fn cancel_stale(&mut self, now: Nanos) -> Vec<Action> {
        let doomed: Vec<OrderId> = self
            .live_orders
            .iter()
            .filter(|o| now.saturating_sub(o.created_ts) >= STALE_AFTER_NS)
            .map(|o| o.id)
            .collect();
        doomed
            .iter()
            .map(|&id| {
                self.forget(id);
                Action::cancel(id)
            })
            .collect()
    }

    fn requote(&mut self, top: &BookTop) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.theo.0 <= 0 {
            return actions;
        }
        let tolerance = (self.theo.0 as f64 * REQUOTE_TOLERANCE) as i64;

        let bid_target = self.target_bid();
        if bid_target.0 > 0 && bid_target < top.best_ask() {
            let needs_move = match self.live_bid {
                None => true,
                Some((_, current)) => (bid_target.0 - current.0).abs() > tolerance,
            };
            if needs_move {
                if let Some((id, _)) = self.live_bid {
                    actions.push(Action::cancel(id));
                    self.forget(id);
                }
                let id = self.next_id();
                actions.push(Action::add(id, Side::Bid, bid_target, self.quantity, true));
                self.live_bid = Some((id, bid_target));
                self.live_orders.push(LiveOrder {
                    id,
                    created_ts: top.ts,
                    price: bid_target,
                    side: Side::Bid,
                });
                log::debug!("quoting bid {bid_target} against theo {}", self.theo);
            }
        }

        let ask_target = self.target_ask();
        if ask_target.0 > 0 && ask_target > top.best_bid() {
            let needs_move = match self.live_ask {
                None => true,
                Some((_, current)) => (ask_target.0 - current.0).abs() > tolerance,
            };
            if needs_move {
                if let Some((id, _)) = self.live_ask {
                    actions.push(Action::cancel(id));
                    self.forget(id);
                }
                let id = self.next_id();
                actions.push(Action::add(id, Side::Ask, ask_target, self.quantity, true));
                self.live_ask = Some((id, ask_target));
                self.live_orders.push(LiveOrder {
                    id,
                    created_ts: top.ts,
                    price: ask_target,
                    side: Side::Ask,
                });
                log::debug!("quoting ask {ask_target} against theo {}", self.theo);
            }
        }

        actions
    }
}

impl Strategy for TheoQuoter {
    fn name(&self) -> &'static str {
        "Theoretical Value Quoter"
    }

    fn set_symbol(&mut self, symbol_id: SymbolId) {
        self.symbol_id = symbol_id;
    }

    fn on_book_top(&mut self, top: &BookTop) -> Vec<Action> {
        if !top.is_plausible() {
            return Vec::new();
        }

        self.theo = self.compute_theo(top);

        let mut actions = self.cancel_through_theo();
        actions.extend(self.cancel_stale(top.ts));
        actions.extend(self.requote(top));
        actions
    }

    fn on_fill(&mut self, fill: &FillSnapshot) -> Vec<Action> {
        self.record_trade(fill.trade_price, fill.ts);
        Vec::new()
    }

    fn on_order_filled(
        &mut self,
        order_id: OrderId,
        price: Price,
        _qty: Quantity,
        _side: Side,
    ) -> Vec<Action> {
        self.record_trade(price, 0);
        self.forget(order_id);
        Vec::new()
    }
}
