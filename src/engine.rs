//! Event loop: merges input streams in timestamp order and drives the
//! strategy and matching kernel.
//!
//! Continues `impl Simulator`. Two operating modes:
//!
//! - **snapshot mode** replays pre-computed top and fill snapshots from two
//!   files, preferring tops on timestamp ties;
//! - **queue mode** replays raw book events from one file through the
//!   [`QueueBook`] reconstructor, which emits derived tops and synthesized
//!   fills.
//!
//! Each record is processed to completion (strategy callback, action
//! dispatch, sweep, trace writes) before the next is read.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use crate::book::QueueBook;
use crate::error::{Error, Result};
use crate::sim::Simulator;
use crate::wire::{read_event, BookTop, FileHeader, FillSnapshot, WireError};

/// Tops closer together than this are coalesced: the later one is skipped
/// without a strategy callback.
pub const TOP_THROTTLE_NS: u64 = 100_000;

/// Progress is logged every this many input records.
const PROGRESS_INTERVAL: u64 = 100_000;

/// Implausible tops are logged individually up to this count, then muted.
const INVALID_TOP_WARN_LIMIT: u64 = 10;

impl<W: Write> Simulator<W> {
    /// Process one top-of-book snapshot: throttle, validate, latch, drive
    /// the strategy, dispatch its actions, then sweep resting orders.
    pub fn process_book_top(&mut self, top: &BookTop) -> Result<()> {
        if self.last_processed_top_ts > 0
            && top.ts.saturating_sub(self.last_processed_top_ts) < TOP_THROTTLE_NS
        {
            self.skipped_tops += 1;
            return Ok(());
        }
        if !top.is_plausible() {
            self.invalid_tops += 1;
            if self.invalid_tops <= INVALID_TOP_WARN_LIMIT {
                log::warn!(
                    "implausible book top at {} (bid {}, ask {}); skipped",
                    top.ts,
                    top.best_bid().0,
                    top.best_ask().0
                );
            } else if self.invalid_tops == INVALID_TOP_WARN_LIMIT + 1 {
                log::warn!("further implausible book top warnings suppressed");
            }
            return Ok(());
        }

        self.last_processed_top_ts = top.ts;
        self.last_top = Some(*top);
        if let Some(mid) = top.mid() {
            self.last_valid_mid = mid;
        }

        self.lat_stats
            .record_md_event(self.latency.strategy_md_latency_ns);
        let strategy_ts = self.latency.strategy_receive(top.ts);

        let actions = self.strategy.on_book_top(top);
        self.dispatch_actions(actions, strategy_ts)?;
        self.sweep_active_orders()?;

        self.tops_processed += 1;
        Ok(())
    }

    /// Process one external fill snapshot: deliver to the strategy and
    /// dispatch whatever it returns.
    pub fn process_book_fill(&mut self, fill: &FillSnapshot) -> Result<()> {
        self.lat_stats
            .record_md_event(self.latency.strategy_md_latency_ns);
        let strategy_ts = self.latency.strategy_receive(fill.ts);

        let actions = self.strategy.on_fill(fill);
        self.dispatch_actions(actions, strategy_ts)?;

        self.fill_events_processed += 1;
        Ok(())
    }

    /// Snapshot mode: merge the tops and fills streams by timestamp
    /// (ties prefer tops) and run to EOF on both.
    pub fn run_snapshot(&mut self, tops_path: &Path, fills_path: &Path) -> Result<()> {
        let mut tops = open_input(tops_path)?;
        let mut fills = open_input(fills_path)?;

        let tops_header = FileHeader::read_from(&mut tops)?;
        let fills_header = FileHeader::read_from(&mut fills)?;
        if tops_header.symbol_idx != fills_header.symbol_idx {
            log::warn!(
                "tops file is symbol {} but fills file is symbol {}",
                tops_header.symbol_idx,
                fills_header.symbol_idx
            );
        }
        self.set_symbol_id(tops_header.symbol_id());

        let mut next_top = BookTop::read_from(&mut tops)?;
        let mut next_fill = FillSnapshot::read_from(&mut fills)?;
        let mut records: u64 = 0;

        loop {
            let take_top = match (&next_top, &next_fill) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(top), Some(fill)) => top.ts <= fill.ts,
            };

            if take_top {
                // Unwrap-free: take_top guarantees presence.
                if let Some(top) = next_top {
                    self.process_book_top(&top)?;
                }
                next_top = BookTop::read_from(&mut tops)?;
            } else {
                if let Some(fill) = next_fill {
                    self.process_book_fill(&fill)?;
                }
                next_fill = FillSnapshot::read_from(&mut fills)?;
            }

            records += 1;
            if records % PROGRESS_INTERVAL == 0 {
                self.log_progress(records);
            }
        }

        log::info!(
            "snapshot replay complete: {} tops and {} fill events processed",
            self.tops_processed,
            self.fill_events_processed
        );
        Ok(())
    }

    /// Queue mode: rebuild the book from raw events; every top change runs
    /// the top path and every execution's synthesized fill runs `on_fill`.
    pub fn run_queue(&mut self, events_path: &Path) -> Result<()> {
        let mut events = open_input(events_path)?;

        let header = FileHeader::read_from(&mut events)?;
        self.set_symbol_id(header.symbol_id());

        let mut book = QueueBook::new();
        let mut records: u64 = 0;

        loop {
            let event = match read_event(&mut events) {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(WireError::UnknownEventType(kind)) => {
                    // The event header carries no body length, so an unknown
                    // type makes the remainder of the stream undecodable.
                    log::warn!(
                        "unknown book event type {kind} after {records} events; \
                         abandoning the rest of the stream"
                    );
                    self.state_warnings += 1;
                    break;
                }
                Err(err) => return Err(err.into()),
            };

            let applied = book.apply(&event);
            if let Some(top) = applied.top {
                self.process_book_top(&top)?;
            }
            for fill in &applied.fills {
                self.process_book_fill(fill)?;
            }

            records += 1;
            if records % PROGRESS_INTERVAL == 0 {
                self.log_progress(records);
            }
        }

        log::info!(
            "queue replay complete: {} events ({} tops accepted, {} fill events, {} feed warnings)",
            records,
            self.tops_processed,
            self.fill_events_processed,
            book.feed_warnings()
        );
        Ok(())
    }

    fn log_progress(&self, records: u64) {
        log::info!(
            "processed {} records: {} tops, {} fill events; {} of {} orders filled, position {}",
            records,
            self.tops_processed,
            self.fill_events_processed,
            self.orders_filled,
            self.orders_placed,
            self.position
        );
    }
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| Error::InputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}
