//! Matching kernel: decides whether simulated orders fill against the
//! reconstructed external book.
//!
//! Continues `impl Simulator`. The kernel owns the action dispatch path
//! (Add / Cancel / Replace with post-only rejection), the post-top sweep
//! over resting orders, and `process_fill`, which does all position and
//! cash accounting in exact integer nanos with 128-bit accumulation.

use std::io::Write;

use crate::error::{Error, Result};
use crate::order::{Action, ActiveOrder};
use crate::side::Side;
use crate::sim::Simulator;
use crate::types::{Nanos, OrderId, Price, Quantity};
use crate::wire::{TraceKind, TraceRecord};

impl<W: Write> Simulator<W> {
    /// Would an order at `(side, price)` trade against the latest top?
    ///
    /// Sentinel and empty opposite sides never fill.
    pub(crate) fn would_fill(&self, side: Side, price: Price, qty: Quantity) -> bool {
        if price.0 <= 0 || qty == 0 {
            return false;
        }
        let Some(top) = self.last_top else {
            return false;
        };
        match side {
            Side::Bid => {
                let ask = top.best_ask();
                ask.is_fillable() && price >= ask
            }
            Side::Ask => {
                let bid = top.best_bid();
                bid.is_fillable() && price <= bid
            }
        }
    }

    /// Price a crossing order executes at: the opposite touch.
    fn crossing_price(&self, side: Side) -> Price {
        let Some(top) = self.last_top else {
            return Price(0);
        };
        match side {
            Side::Bid => top.best_ask(),
            Side::Ask => top.best_bid(),
        }
    }

    /// Route a strategy's action list through the latency pipeline and
    /// apply each action in list order.
    pub(crate) fn dispatch_actions(&mut self, actions: Vec<Action>, strategy_ts: Nanos) -> Result<()> {
        for action in actions {
            self.apply_action(action, strategy_ts)?;
        }
        Ok(())
    }

    fn apply_action(&mut self, action: Action, strategy_ts: Nanos) -> Result<()> {
        self.lat_stats.record_action(self.latency.exchange_latency_ns);
        let exchange_ts = self.latency.exchange_receive(strategy_ts);

        match action {
            Action::Add {
                order_id,
                side,
                price,
                qty,
                post_only,
            } => {
                if self.orders.contains_key(&order_id) {
                    log::warn!("add with duplicate order id {order_id}; ignored");
                    self.state_warnings += 1;
                    return Ok(());
                }
                self.orders.insert(
                    order_id,
                    ActiveOrder {
                        order_id,
                        symbol_id: self.symbol_id,
                        sent_ts: strategy_ts,
                        md_ts: exchange_ts,
                        price,
                        total_qty: qty,
                        filled_qty: 0,
                        side,
                        post_only,
                    },
                );
                self.arrival_order.push(order_id);
                self.orders_placed += 1;
                self.write_trace(exchange_ts, TraceKind::Add, order_id, price, Price(0), qty, 0, side)?;

                if self.would_fill(side, price, qty) {
                    if post_only {
                        log::debug!("post-only {side} {order_id} at {price} would cross; rejected");
                        self.orders.remove(&order_id);
                        self.write_trace(
                            exchange_ts,
                            TraceKind::Cancel,
                            order_id,
                            price,
                            Price(0),
                            qty,
                            0,
                            side,
                        )?;
                    } else {
                        let fill_price = self.crossing_price(side);
                        let notification_ts = self.latency.notification(exchange_ts);
                        self.process_fill(order_id, fill_price, qty, side, notification_ts)?;
                    }
                }
            }

            Action::Cancel { order_id } => match self.orders.remove(&order_id) {
                Some(order) => {
                    self.write_trace(
                        exchange_ts,
                        TraceKind::Cancel,
                        order_id,
                        order.price,
                        Price(0),
                        order.remaining(),
                        0,
                        order.side,
                    )?;
                }
                None => {
                    // Strategies legitimately cancel orders already gone
                    // (filled in flight), so this is a warning, not an error.
                    log::warn!("cancel for unknown order {order_id}; ignored");
                    self.state_warnings += 1;
                }
            },

            Action::Replace {
                order_id,
                new_price,
                new_qty,
            } => {
                let Some(order) = self.orders.get_mut(&order_id) else {
                    log::warn!("replace for unknown order {order_id}; ignored");
                    self.state_warnings += 1;
                    return Ok(());
                };
                let old_price = order.price;
                let old_qty = order.total_qty;
                order.price = new_price;
                order.total_qty = new_qty;
                order.md_ts = exchange_ts;
                let side = order.side;
                let post_only = order.post_only;
                let remaining = order.remaining();
                let nothing_left = order.is_filled();

                self.write_trace(
                    exchange_ts,
                    TraceKind::Replace,
                    order_id,
                    new_price,
                    old_price,
                    new_qty,
                    old_qty,
                    side,
                )?;

                if nothing_left {
                    // Re-sized at or below the quantity already executed.
                    self.orders.remove(&order_id);
                    return Ok(());
                }

                if self.would_fill(side, new_price, remaining) {
                    if post_only {
                        log::debug!(
                            "post-only {side} {order_id} re-priced to {new_price} would cross; rejected"
                        );
                        self.orders.remove(&order_id);
                        self.write_trace(
                            exchange_ts,
                            TraceKind::Cancel,
                            order_id,
                            new_price,
                            Price(0),
                            remaining,
                            0,
                            side,
                        )?;
                    } else {
                        let fill_price = self.crossing_price(side);
                        let notification_ts = self.latency.notification(exchange_ts);
                        self.process_fill(order_id, fill_price, remaining, side, notification_ts)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// After a new top is latched: fill every resting order the new prices
    /// cross, in arrival order.
    ///
    /// Candidates are collected before the first `process_fill` call;
    /// nested strategy callbacks may add or remove orders mid-sweep, so
    /// each candidate is re-validated just before it fills.
    pub(crate) fn sweep_active_orders(&mut self) -> Result<()> {
        let candidates: Vec<OrderId> = self
            .arrival_order
            .iter()
            .copied()
            .filter(|id| {
                self.orders
                    .get(id)
                    .is_some_and(|o| self.would_fill(o.side, o.price, o.remaining()))
            })
            .collect();

        for order_id in candidates {
            let Some(order) = self.orders.get(&order_id).copied() else {
                continue;
            };
            let remaining = order.remaining();
            if !self.would_fill(order.side, order.price, remaining) {
                continue;
            }
            let fill_price = self.crossing_price(order.side);
            self.process_fill(order_id, fill_price, remaining, order.side, 0)?;
        }

        // Shed ids of long-gone orders once they dominate the scan list.
        if self.arrival_order.len() > 2 * self.orders.len() + 16 {
            let orders = &self.orders;
            self.arrival_order.retain(|id| orders.contains_key(id));
        }
        Ok(())
    }

    /// Execute `fill_qty` of an order at `fill_price`.
    ///
    /// A `notification_ts` of zero means "derive from the latched top":
    /// the fill is assumed to occur at the top's timestamp and the strategy
    /// hears about it one exchange latency later.
    pub(crate) fn process_fill(
        &mut self,
        order_id: OrderId,
        fill_price: Price,
        fill_qty: Quantity,
        side: Side,
        notification_ts: Nanos,
    ) -> Result<()> {
        if !fill_price.is_fillable() || fill_qty == 0 {
            log::warn!("skipping invalid fill for {order_id}: price {fill_price}, qty {fill_qty}");
            self.state_warnings += 1;
            return Ok(());
        }
        let notification_ts = if notification_ts == 0 {
            let fill_ts = self.last_top.map_or(0, |t| t.ts);
            self.latency.notification(fill_ts)
        } else {
            notification_ts
        };

        let Some(order) = self.orders.get_mut(&order_id) else {
            log::warn!("fill for unknown order {order_id}; ignored");
            self.state_warnings += 1;
            return Ok(());
        };
        order.filled_qty = order.filled_qty.saturating_add(fill_qty);
        if order.filled_qty > order.total_qty {
            return Err(Error::Invariant(format!(
                "order {order_id}: filled {} exceeds total {}",
                order.filled_qty, order.total_qty
            )));
        }
        let fully_filled = order.is_filled();

        self.write_trace(
            notification_ts,
            TraceKind::Fill,
            order_id,
            fill_price,
            Price(0),
            fill_qty,
            0,
            side,
        )?;

        let notional = fill_price.0 as i128 * fill_qty as i128;
        match side {
            Side::Bid => {
                self.position += fill_qty as i64;
                self.cash_flow_nanos -= notional;
                self.buy_volume += fill_qty as u64;
                self.buy_cost_nanos += notional;
            }
            Side::Ask => {
                self.position -= fill_qty as i64;
                self.cash_flow_nanos += notional;
                self.sell_volume += fill_qty as u64;
                self.sell_proceeds_nanos += notional;
            }
        }
        self.orders_filled += 1;
        self.lat_stats
            .record_notification(self.latency.exchange_latency_ns);

        if fully_filled {
            self.orders.remove(&order_id);
        }

        // The fill notification is the event-time basis for whatever the
        // strategy does in response.
        let actions = self.strategy.on_order_filled(order_id, fill_price, fill_qty, side);
        self.dispatch_actions(actions, notification_ts)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_trace(
        &mut self,
        ts: Nanos,
        kind: TraceKind,
        order_id: OrderId,
        price: Price,
        old_price: Price,
        qty: Quantity,
        old_qty: Quantity,
        side: Side,
    ) -> Result<()> {
        self.trace.write(&TraceRecord {
            ts,
            kind,
            order_id: order_id.0,
            symbol_id: self.symbol_id,
            price,
            old_price,
            qty,
            old_qty,
            is_bid: side.is_bid(),
        })?;
        Ok(())
    }
}
