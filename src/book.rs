//! Queue-mode book reconstructor.
//!
//! Rebuilds full price-level queues from raw add/modify/delete/execute
//! events so the matching kernel can reason about queue position. Each side
//! is a `BTreeMap` of price levels; each level is a FIFO queue of resting
//! external orders with a cached quantity total; an id index gives O(1)
//! level lookup for deletes and amends.
//!
//! After every mutation the reconstructor compares the top three levels per
//! side against what it last emitted and hands back a fresh [`BookTop`] iff
//! anything changed. `Execute`/`ExecuteAtPrice` events additionally
//! synthesize [`FillSnapshot`]s for the downstream `on_fill` path.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;

use crate::side::Side;
use crate::types::{Nanos, Price, Quantity};
use crate::wire::{BookEvent, BookTop, FillSnapshot, TimedEvent, TopLevel};

/// A resting external order within a price level's FIFO queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestingOrder {
    pub id: u64,
    pub qty: Quantity,
    pub last_update_ts: Nanos,
}

/// One price level: FIFO order queue plus a cached quantity total.
///
/// `total_qty == Σ queue qty` holds after every event; an empty level is
/// removed from its side immediately.
#[derive(Clone, Debug, Default)]
pub struct BookLevel {
    total_qty: u64,
    queue: VecDeque<RestingOrder>,
}

impl BookLevel {
    /// Sum of resting quantity at this price.
    #[inline]
    pub fn total_qty(&self) -> u64 {
        self.total_qty
    }

    /// Number of resting orders at this price.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Resting orders in FIFO (arrival) order.
    pub fn orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.queue.iter()
    }

    /// Queue rank of an order (0 = front), if present.
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.queue.iter().position(|o| o.id == id)
    }

    fn push_back(&mut self, order: RestingOrder) {
        self.total_qty += order.qty as u64;
        self.queue.push_back(order);
    }

    fn remove(&mut self, id: u64) -> Option<RestingOrder> {
        let pos = self.position_of(id)?;
        let order = self.queue.remove(pos)?;
        self.total_qty -= order.qty as u64;
        Some(order)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut RestingOrder> {
        self.queue.iter_mut().find(|o| o.id == id)
    }
}

#[derive(Clone, Copy, Debug)]
struct OrderRef {
    side: Side,
    price: Price,
}

/// What applying one event produced for the downstream pipeline.
#[derive(Clone, Debug, Default)]
pub struct Applied {
    /// New top snapshot, present iff any of the top three levels changed.
    pub top: Option<BookTop>,
    /// Fills synthesized from `Execute`/`ExecuteAtPrice`.
    pub fills: Vec<FillSnapshot>,
}

/// The reconstructed external book.
#[derive(Clone, Debug, Default)]
pub struct QueueBook {
    bids: BTreeMap<Price, BookLevel>,
    asks: BTreeMap<Price, BookLevel>,
    index: FxHashMap<u64, OrderRef>,
    last_emitted: Option<[TopLevel; 3]>,
    feed_warnings: u64,
}

impl QueueBook {
    pub fn new() -> Self {
        Self::default()
    }

    // === Inspection ===

    /// Best (highest) bid price, if any bid level survives the sanity cap.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids
            .keys()
            .rev()
            .find(|p| p.is_plausible())
            .copied()
    }

    /// Best (lowest) ask price, if any ask level survives the sanity cap.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().find(|p| p.is_plausible()).copied()
    }

    /// All bid levels, keyed by price ascending.
    pub fn bid_levels(&self) -> &BTreeMap<Price, BookLevel> {
        &self.bids
    }

    /// All ask levels, keyed by price ascending.
    pub fn ask_levels(&self) -> &BTreeMap<Price, BookLevel> {
        &self.asks
    }

    /// The level at `(side, price)`, if present.
    pub fn level(&self, side: Side, price: Price) -> Option<&BookLevel> {
        self.side_levels(side).get(&price)
    }

    /// Number of external orders currently in the book.
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// True if the external order id is somewhere in the book.
    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    /// Count of anomalous events absorbed (unknown ids, duplicates).
    pub fn feed_warnings(&self) -> u64 {
        self.feed_warnings
    }

    fn side_levels(&self, side: Side) -> &BTreeMap<Price, BookLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_levels_mut(&mut self, side: Side) -> &mut BTreeMap<Price, BookLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    // === Event application ===

    /// Apply one raw book event and report any downstream output.
    pub fn apply(&mut self, ev: &TimedEvent) -> Applied {
        let mut fills = Vec::new();
        match ev.body {
            BookEvent::Add {
                order_id,
                side,
                price,
                qty,
            } => self.add_order(ev.ts, order_id, side, price, qty),
            BookEvent::Delete { order_id } => {
                self.delete_order(order_id);
            }
            BookEvent::Replace {
                old_order_id,
                new_order_id,
                price,
                qty,
            } => self.replace_order(ev.ts, old_order_id, new_order_id, price, qty),
            BookEvent::Amend { order_id, new_qty } => self.amend_order(ev.ts, order_id, new_qty),
            BookEvent::Reduce {
                order_id,
                cancelled_qty,
            } => self.reduce_order(order_id, cancelled_qty),
            BookEvent::Execute {
                order_id,
                qty,
                execution_id,
            } => {
                if let Some(fill) = self.execute_order(ev, order_id, qty, execution_id, None) {
                    fills.push(fill);
                }
            }
            BookEvent::ExecuteAtPrice {
                order_id,
                qty,
                execution_id,
                price,
            } => {
                if let Some(fill) = self.execute_order(ev, order_id, qty, execution_id, Some(price))
                {
                    fills.push(fill);
                }
            }
            BookEvent::Clear => {
                self.bids.clear();
                self.asks.clear();
                self.index.clear();
            }
            // Session and hidden-trade records carry no book state.
            BookEvent::Session { .. } | BookEvent::HiddenTrade { .. } => {
                return Applied {
                    top: None,
                    fills,
                }
            }
        }

        Applied {
            top: self.emit_top_if_changed(ev.ts, ev.seq_no),
            fills,
        }
    }

    fn add_order(&mut self, ts: Nanos, id: u64, side: Side, price: Price, qty: Quantity) {
        if self.index.contains_key(&id) {
            log::warn!("add for external order {id} already in the book; ignored");
            self.feed_warnings += 1;
            return;
        }
        self.side_levels_mut(side)
            .entry(price)
            .or_default()
            .push_back(RestingOrder {
                id,
                qty,
                last_update_ts: ts,
            });
        self.index.insert(id, OrderRef { side, price });
    }

    fn delete_order(&mut self, id: u64) -> Option<RestingOrder> {
        let Some(order_ref) = self.index.remove(&id) else {
            log::warn!("delete for unknown external order {id}; ignored");
            self.feed_warnings += 1;
            return None;
        };
        let levels = self.side_levels_mut(order_ref.side);
        let mut removed = None;
        if let Some(level) = levels.get_mut(&order_ref.price) {
            removed = level.remove(id);
            if level.is_empty() {
                levels.remove(&order_ref.price);
            }
        }
        removed
    }

    fn replace_order(&mut self, ts: Nanos, old_id: u64, new_id: u64, price: Price, qty: Quantity) {
        // Side carries over from the replaced order.
        let Some(order_ref) = self.index.get(&old_id).copied() else {
            log::warn!("replace for unknown external order {old_id}; ignored");
            self.feed_warnings += 1;
            return;
        };
        self.delete_order(old_id);
        self.add_order(ts, new_id, order_ref.side, price, qty);
    }

    fn amend_order(&mut self, ts: Nanos, id: u64, new_qty: Quantity) {
        if new_qty == 0 {
            self.delete_order(id);
            return;
        }
        let Some(order_ref) = self.index.get(&id).copied() else {
            log::warn!("amend for unknown external order {id}; ignored");
            self.feed_warnings += 1;
            return;
        };
        if let Some(level) = self.side_levels_mut(order_ref.side).get_mut(&order_ref.price) {
            if let Some(entry) = level.get_mut(id) {
                let old_qty = entry.qty;
                entry.qty = new_qty;
                entry.last_update_ts = ts;
                // Queue position is intentionally untouched.
                level.total_qty = level.total_qty - old_qty as u64 + new_qty as u64;
            }
        }
    }

    fn reduce_order(&mut self, id: u64, cancelled_qty: Quantity) {
        let Some(order_ref) = self.index.get(&id).copied() else {
            log::warn!("reduce for unknown external order {id}; ignored");
            self.feed_warnings += 1;
            return;
        };
        let mut now_empty = false;
        if let Some(level) = self.side_levels_mut(order_ref.side).get_mut(&order_ref.price) {
            if let Some(entry) = level.get_mut(id) {
                let taken = cancelled_qty.min(entry.qty);
                entry.qty -= taken;
                now_empty = entry.qty == 0;
                level.total_qty -= taken as u64;
            }
        }
        if now_empty {
            self.delete_order(id);
        }
    }

    fn execute_order(
        &mut self,
        ev: &TimedEvent,
        id: u64,
        traded_qty: Quantity,
        execution_id: u64,
        exec_price: Option<Price>,
    ) -> Option<FillSnapshot> {
        let Some(order_ref) = self.index.get(&id).copied() else {
            log::warn!("execute for unknown external order {id}; ignored");
            self.feed_warnings += 1;
            return None;
        };

        let (trade_qty, qty_before, last_update_ts) = {
            let level = self.side_levels_mut(order_ref.side).get_mut(&order_ref.price)?;
            let entry = level.get_mut(id)?;
            let qty_before = entry.qty;
            let trade_qty = traded_qty.min(entry.qty);
            let last_update_ts = entry.last_update_ts;
            entry.qty -= trade_qty;
            entry.last_update_ts = ev.ts;
            level.total_qty -= trade_qty as u64;
            (trade_qty, qty_before, last_update_ts)
        };

        let remaining = qty_before - trade_qty;
        if remaining == 0 {
            self.delete_order(id);
        }

        let (resting_side_qty, resting_side_order_count) = self
            .level(order_ref.side, order_ref.price)
            .map_or((0, 0), |l| (l.total_qty(), l.order_count() as u32));
        let (opposing_side_price, opposing_side_qty) = match order_ref.side {
            Side::Bid => {
                let price = self.best_ask().unwrap_or(Price::NO_ASK);
                let qty = self.level(Side::Ask, price).map_or(0, |l| l.total_qty());
                (price, qty)
            }
            Side::Ask => {
                let price = self.best_bid().unwrap_or(Price::NO_BID);
                let qty = self.level(Side::Bid, price).map_or(0, |l| l.total_qty());
                (price, qty)
            }
        };

        Some(FillSnapshot {
            ts: ev.ts,
            seq_no: ev.seq_no,
            resting_order_id: id,
            was_hidden: false,
            trade_price: exec_price.unwrap_or(order_ref.price),
            trade_qty,
            execution_id,
            resting_original_qty: qty_before,
            resting_remaining_qty: remaining,
            resting_last_update_ts: last_update_ts,
            resting_side_is_bid: order_ref.side.is_bid(),
            resting_side_price: order_ref.price,
            resting_side_qty: resting_side_qty.min(u32::MAX as u64) as u32,
            opposing_side_price,
            opposing_side_qty: opposing_side_qty.min(u32::MAX as u64) as u32,
            resting_side_order_count,
        })
    }

    // === Top-change detection ===

    /// Current top three levels per side, with implausible prices clamped
    /// to the empty sentinels.
    fn current_levels(&self) -> [TopLevel; 3] {
        let mut levels = [TopLevel::default(); 3];
        for (i, (price, level)) in self
            .bids
            .iter()
            .rev()
            .filter(|(p, _)| p.is_plausible())
            .take(3)
            .enumerate()
        {
            levels[i].bid = *price;
            levels[i].bid_qty = level.total_qty().min(u32::MAX as u64) as u32;
        }
        for (i, (price, level)) in self
            .asks
            .iter()
            .filter(|(p, _)| p.is_plausible())
            .take(3)
            .enumerate()
        {
            levels[i].ask = *price;
            levels[i].ask_qty = level.total_qty().min(u32::MAX as u64) as u32;
        }
        levels
    }

    fn emit_top_if_changed(&mut self, ts: Nanos, seqno: u64) -> Option<BookTop> {
        let levels = self.current_levels();
        if self.last_emitted == Some(levels) {
            return None;
        }
        self.last_emitted = Some(levels);
        Some(BookTop { ts, seqno, levels })
    }
}
