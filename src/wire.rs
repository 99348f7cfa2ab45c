//! Packed little-endian codec for capture files and the output trace.
//!
//! The input files are bit-for-bit historical captures, so every layout here
//! is load-bearing: headers are 24 bytes, book tops 88, fill snapshots 90,
//! book events a 17-byte header followed by a body whose size is keyed off
//! the type byte. The codec decodes and encodes; it interprets nothing.
//!
//! All multi-byte fields are little-endian with no padding. Decoding is
//! hand-rolled over `std::io::Read` — a short read mid-record is
//! [`WireError::Truncated`], a clean EOF at a record boundary is `Ok(None)`.

use std::io::{self, Read, Write};

use crate::side::Side;
use crate::types::{Nanos, Price, Quantity, SymbolId};

/// Size of every capture file header.
pub const FILE_HEADER_BYTES: usize = 24;
/// Size of one top-of-book level on the wire.
pub const TOP_LEVEL_BYTES: usize = 24;
/// Size of a three-level book top record.
pub const BOOK_TOP_BYTES: usize = 88;
/// Size of a fill snapshot record.
pub const FILL_SNAPSHOT_BYTES: usize = 90;
/// Size of the header preceding every book event body.
pub const EVENT_HEADER_BYTES: usize = 17;
/// Size of one output trace record.
pub const TRACE_RECORD_BYTES: usize = 46;

/// Errors produced while decoding capture streams.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated record: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("unknown book event type {0}")]
    UnknownEventType(u8),
}

/// Fill `buf` entirely, or report how the stream ended.
///
/// Returns `Ok(false)` on a clean EOF before the first byte,
/// `Err(Truncated)` on EOF partway through.
fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> Result<bool, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(WireError::Truncated {
                expected: buf.len(),
                got: filled,
            });
        }
        filled += n;
    }
    Ok(true)
}

// Fixed-offset field accessors. The surrounding reads guarantee the buffer
// lengths, so the `try_into` conversions cannot fail.
#[inline]
fn u64_at(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

#[inline]
fn i64_at(buf: &[u8], off: usize) -> i64 {
    i64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

#[inline]
fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

#[inline]
fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_i64(buf: &mut [u8], off: usize, v: i64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

// === File header ===

/// Common header of the tops, fills, and events capture files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub feed_id: u64,
    pub dateint: u32,
    pub record_count: u32,
    pub symbol_idx: u64,
}

impl FileHeader {
    /// Read the header at the front of a capture stream.
    ///
    /// A file too short to hold a header is truncated, never "empty".
    pub fn read_from(r: &mut impl Read) -> Result<FileHeader, WireError> {
        let mut buf = [0u8; FILE_HEADER_BYTES];
        if !read_exact_or_eof(r, &mut buf)? {
            return Err(WireError::Truncated {
                expected: FILE_HEADER_BYTES,
                got: 0,
            });
        }
        Ok(FileHeader {
            feed_id: u64_at(&buf, 0),
            dateint: u32_at(&buf, 8),
            record_count: u32_at(&buf, 12),
            symbol_idx: u64_at(&buf, 16),
        })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let mut buf = [0u8; FILE_HEADER_BYTES];
        put_u64(&mut buf, 0, self.feed_id);
        put_u32(&mut buf, 8, self.dateint);
        put_u32(&mut buf, 12, self.record_count);
        put_u64(&mut buf, 16, self.symbol_idx);
        w.write_all(&buf)
    }

    /// The instrument id, narrowed to the width orders and trace records use.
    pub fn symbol_id(&self) -> SymbolId {
        self.symbol_idx as SymbolId
    }
}

// === Book tops ===

/// One price level of a top-of-book snapshot.
///
/// Empty slots hold the sentinels: `Price::NO_BID` / `Price::NO_ASK`
/// with zero quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopLevel {
    pub bid: Price,
    pub ask: Price,
    pub bid_qty: Quantity,
    pub ask_qty: Quantity,
}

impl Default for TopLevel {
    fn default() -> Self {
        TopLevel {
            bid: Price::NO_BID,
            ask: Price::NO_ASK,
            bid_qty: 0,
            ask_qty: 0,
        }
    }
}

impl TopLevel {
    fn decode(buf: &[u8]) -> TopLevel {
        TopLevel {
            bid: Price(i64_at(buf, 0)),
            ask: Price(i64_at(buf, 8)),
            bid_qty: u32_at(buf, 16),
            ask_qty: u32_at(buf, 20),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        put_i64(buf, 0, self.bid.0);
        put_i64(buf, 8, self.ask.0);
        put_u32(buf, 16, self.bid_qty);
        put_u32(buf, 20, self.ask_qty);
    }
}

/// A three-level top-of-book snapshot: the read model strategies consume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BookTop {
    pub ts: Nanos,
    pub seqno: u64,
    pub levels: [TopLevel; 3],
}

impl BookTop {
    /// The innermost level (best bid / best ask).
    #[inline]
    pub fn best(&self) -> &TopLevel {
        &self.levels[0]
    }

    #[inline]
    pub fn best_bid(&self) -> Price {
        self.levels[0].bid
    }

    #[inline]
    pub fn best_ask(&self) -> Price {
        self.levels[0].ask
    }

    /// Mid price of the best level, if both sides are real.
    pub fn mid(&self) -> Option<Price> {
        let best = self.best();
        if best.bid.is_fillable() && best.ask.is_fillable() {
            Some(Price((best.bid.0 + best.ask.0) / 2))
        } else {
            None
        }
    }

    /// True if the best level carries a believable, uncrossed market.
    pub fn is_plausible(&self) -> bool {
        let best = self.best();
        best.bid.is_plausible() && best.ask.is_plausible() && best.bid < best.ask
    }

    /// Read one record; `Ok(None)` at clean EOF.
    pub fn read_from(r: &mut impl Read) -> Result<Option<BookTop>, WireError> {
        let mut buf = [0u8; BOOK_TOP_BYTES];
        if !read_exact_or_eof(r, &mut buf)? {
            return Ok(None);
        }
        let mut levels = [TopLevel::default(); 3];
        for (i, level) in levels.iter_mut().enumerate() {
            let off = 16 + i * TOP_LEVEL_BYTES;
            *level = TopLevel::decode(&buf[off..off + TOP_LEVEL_BYTES]);
        }
        Ok(Some(BookTop {
            ts: u64_at(&buf, 0),
            seqno: u64_at(&buf, 8),
            levels,
        }))
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let mut buf = [0u8; BOOK_TOP_BYTES];
        put_u64(&mut buf, 0, self.ts);
        put_u64(&mut buf, 8, self.seqno);
        for (i, level) in self.levels.iter().enumerate() {
            let off = 16 + i * TOP_LEVEL_BYTES;
            level.encode(&mut buf[off..off + TOP_LEVEL_BYTES]);
        }
        w.write_all(&buf)
    }
}

// === Fill snapshots ===

/// A trade against a resting external order, as captured on the tape.
///
/// In queue mode the book reconstructor synthesizes these from
/// `Execute`/`ExecuteAtPrice` events; in snapshot mode they are read
/// straight from the fills file. Field order matches the capture layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillSnapshot {
    pub ts: Nanos,
    pub seq_no: u64,
    pub resting_order_id: u64,
    pub was_hidden: bool,
    pub trade_price: Price,
    pub trade_qty: Quantity,
    pub execution_id: u64,
    pub resting_original_qty: Quantity,
    pub resting_remaining_qty: Quantity,
    pub resting_last_update_ts: Nanos,
    pub resting_side_is_bid: bool,
    pub resting_side_price: Price,
    pub resting_side_qty: Quantity,
    pub opposing_side_price: Price,
    pub opposing_side_qty: Quantity,
    pub resting_side_order_count: u32,
}

impl FillSnapshot {
    /// Read one record; `Ok(None)` at clean EOF.
    pub fn read_from(r: &mut impl Read) -> Result<Option<FillSnapshot>, WireError> {
        let mut buf = [0u8; FILL_SNAPSHOT_BYTES];
        if !read_exact_or_eof(r, &mut buf)? {
            return Ok(None);
        }
        Ok(Some(FillSnapshot {
            ts: u64_at(&buf, 0),
            seq_no: u64_at(&buf, 8),
            resting_order_id: u64_at(&buf, 16),
            was_hidden: buf[24] != 0,
            trade_price: Price(i64_at(&buf, 25)),
            trade_qty: u32_at(&buf, 33),
            execution_id: u64_at(&buf, 37),
            resting_original_qty: u32_at(&buf, 45),
            resting_remaining_qty: u32_at(&buf, 49),
            resting_last_update_ts: u64_at(&buf, 53),
            resting_side_is_bid: buf[61] != 0,
            resting_side_price: Price(i64_at(&buf, 62)),
            resting_side_qty: u32_at(&buf, 70),
            opposing_side_price: Price(i64_at(&buf, 74)),
            opposing_side_qty: u32_at(&buf, 82),
            resting_side_order_count: u32_at(&buf, 86),
        }))
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let mut buf = [0u8; FILL_SNAPSHOT_BYTES];
        put_u64(&mut buf, 0, self.ts);
        put_u64(&mut buf, 8, self.seq_no);
        put_u64(&mut buf, 16, self.resting_order_id);
        buf[24] = self.was_hidden as u8;
        put_i64(&mut buf, 25, self.trade_price.0);
        put_u32(&mut buf, 33, self.trade_qty);
        put_u64(&mut buf, 37, self.execution_id);
        put_u32(&mut buf, 45, self.resting_original_qty);
        put_u32(&mut buf, 49, self.resting_remaining_qty);
        put_u64(&mut buf, 53, self.resting_last_update_ts);
        buf[61] = self.resting_side_is_bid as u8;
        put_i64(&mut buf, 62, self.resting_side_price.0);
        put_u32(&mut buf, 70, self.resting_side_qty);
        put_i64(&mut buf, 74, self.opposing_side_price.0);
        put_u32(&mut buf, 82, self.opposing_side_qty);
        put_u32(&mut buf, 86, self.resting_side_order_count);
        w.write_all(&buf)
    }
}

// === Book events ===

/// A raw book event body. The type byte in the event header selects the
/// variant and the body size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookEvent {
    Add {
        order_id: u64,
        side: Side,
        price: Price,
        qty: Quantity,
    },
    Delete {
        order_id: u64,
    },
    Replace {
        old_order_id: u64,
        new_order_id: u64,
        price: Price,
        qty: Quantity,
    },
    Amend {
        order_id: u64,
        new_qty: Quantity,
    },
    Reduce {
        order_id: u64,
        cancelled_qty: Quantity,
    },
    Execute {
        order_id: u64,
        qty: Quantity,
        execution_id: u64,
    },
    ExecuteAtPrice {
        order_id: u64,
        qty: Quantity,
        execution_id: u64,
        price: Price,
    },
    Clear,
    Session {
        code: u8,
    },
    HiddenTrade {
        execution_id: u64,
        price: Price,
        qty: Quantity,
        aggressor_is_bid: bool,
        match_id: u64,
    },
}

impl BookEvent {
    /// Wire type byte for this variant.
    pub fn kind(&self) -> u8 {
        match self {
            BookEvent::Add { .. } => 1,
            BookEvent::Delete { .. } => 2,
            BookEvent::Replace { .. } => 3,
            BookEvent::Amend { .. } => 4,
            BookEvent::Reduce { .. } => 5,
            BookEvent::Execute { .. } => 6,
            BookEvent::ExecuteAtPrice { .. } => 7,
            BookEvent::Clear => 8,
            BookEvent::Session { .. } => 9,
            BookEvent::HiddenTrade { .. } => 10,
        }
    }

    /// Body size for a type byte, `None` for unrecognized types.
    pub fn body_len(kind: u8) -> Option<usize> {
        match kind {
            1 => Some(21),
            2 => Some(8),
            3 => Some(28),
            4 => Some(12),
            5 => Some(12),
            6 => Some(20),
            7 => Some(28),
            8 => Some(0),
            9 => Some(1),
            10 => Some(29),
            _ => None,
        }
    }

    fn decode(kind: u8, buf: &[u8]) -> Result<BookEvent, WireError> {
        let event = match kind {
            1 => BookEvent::Add {
                order_id: u64_at(buf, 0),
                price: Price(i64_at(buf, 8)),
                qty: u32_at(buf, 16),
                side: Side::from_is_bid(buf[20] != 0),
            },
            2 => BookEvent::Delete {
                order_id: u64_at(buf, 0),
            },
            3 => BookEvent::Replace {
                old_order_id: u64_at(buf, 0),
                new_order_id: u64_at(buf, 8),
                price: Price(i64_at(buf, 16)),
                qty: u32_at(buf, 24),
            },
            4 => BookEvent::Amend {
                order_id: u64_at(buf, 0),
                new_qty: u32_at(buf, 8),
            },
            5 => BookEvent::Reduce {
                order_id: u64_at(buf, 0),
                cancelled_qty: u32_at(buf, 8),
            },
            6 => BookEvent::Execute {
                order_id: u64_at(buf, 0),
                qty: u32_at(buf, 8),
                execution_id: u64_at(buf, 12),
            },
            7 => BookEvent::ExecuteAtPrice {
                order_id: u64_at(buf, 0),
                qty: u32_at(buf, 8),
                execution_id: u64_at(buf, 12),
                price: Price(i64_at(buf, 20)),
            },
            8 => BookEvent::Clear,
            9 => BookEvent::Session { code: buf[0] },
            10 => BookEvent::HiddenTrade {
                execution_id: u64_at(buf, 0),
                price: Price(i64_at(buf, 8)),
                qty: u32_at(buf, 16),
                aggressor_is_bid: buf[20] != 0,
                match_id: u64_at(buf, 21),
            },
            other => return Err(WireError::UnknownEventType(other)),
        };
        Ok(event)
    }

    fn encode(&self, buf: &mut [u8]) {
        match *self {
            BookEvent::Add {
                order_id,
                side,
                price,
                qty,
            } => {
                put_u64(buf, 0, order_id);
                put_i64(buf, 8, price.0);
                put_u32(buf, 16, qty);
                buf[20] = side.is_bid() as u8;
            }
            BookEvent::Delete { order_id } => put_u64(buf, 0, order_id),
            BookEvent::Replace {
                old_order_id,
                new_order_id,
                price,
                qty,
            } => {
                put_u64(buf, 0, old_order_id);
                put_u64(buf, 8, new_order_id);
                put_i64(buf, 16, price.0);
                put_u32(buf, 24, qty);
            }
            BookEvent::Amend { order_id, new_qty } => {
                put_u64(buf, 0, order_id);
                put_u32(buf, 8, new_qty);
            }
            BookEvent::Reduce {
                order_id,
                cancelled_qty,
            } => {
                put_u64(buf, 0, order_id);
                put_u32(buf, 8, cancelled_qty);
            }
            BookEvent::Execute {
                order_id,
                qty,
                execution_id,
            } => {
                put_u64(buf, 0, order_id);
                put_u32(buf, 8, qty);
                put_u64(buf, 12, execution_id);
            }
            BookEvent::ExecuteAtPrice {
                order_id,
                qty,
                execution_id,
                price,
            } => {
                put_u64(buf, 0, order_id);
                put_u32(buf, 8, qty);
                put_u64(buf, 12, execution_id);
                put_i64(buf, 20, price.0);
            }
            BookEvent::Clear => {}
            BookEvent::Session { code } => buf[0] = code,
            BookEvent::HiddenTrade {
                execution_id,
                price,
                qty,
                aggressor_is_bid,
                match_id,
            } => {
                put_u64(buf, 0, execution_id);
                put_i64(buf, 8, price.0);
                put_u32(buf, 16, qty);
                buf[20] = aggressor_is_bid as u8;
                put_u64(buf, 21, match_id);
            }
        }
    }
}

/// A book event with its header timestamp and sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    pub ts: Nanos,
    pub seq_no: u64,
    pub body: BookEvent,
}

impl TimedEvent {
    pub fn new(ts: Nanos, seq_no: u64, body: BookEvent) -> Self {
        TimedEvent { ts, seq_no, body }
    }
}

/// Read the next book event; `Ok(None)` at clean EOF.
///
/// An unrecognized type byte yields [`WireError::UnknownEventType`] after
/// consuming only the 17-byte header — the caller decides whether to skip
/// the rest of the stream or abort.
pub fn read_event(r: &mut impl Read) -> Result<Option<TimedEvent>, WireError> {
    let mut hdr = [0u8; EVENT_HEADER_BYTES];
    if !read_exact_or_eof(r, &mut hdr)? {
        return Ok(None);
    }
    let ts = u64_at(&hdr, 0);
    let seq_no = u64_at(&hdr, 8);
    let kind = hdr[16];

    let body_len = BookEvent::body_len(kind).ok_or(WireError::UnknownEventType(kind))?;
    let mut body = [0u8; 32];
    let body = &mut body[..body_len];
    if body_len > 0 && !read_exact_or_eof(r, body)? {
        return Err(WireError::Truncated {
            expected: body_len,
            got: 0,
        });
    }

    Ok(Some(TimedEvent {
        ts,
        seq_no,
        body: BookEvent::decode(kind, body)?,
    }))
}

/// Append one book event (header + body) to a stream.
pub fn write_event(w: &mut impl Write, event: &TimedEvent) -> io::Result<()> {
    let mut hdr = [0u8; EVENT_HEADER_BYTES];
    put_u64(&mut hdr, 0, event.ts);
    put_u64(&mut hdr, 8, event.seq_no);
    hdr[16] = event.body.kind();
    w.write_all(&hdr)?;

    let body_len = BookEvent::body_len(event.body.kind()).unwrap_or(0);
    let mut body = [0u8; 32];
    event.body.encode(&mut body[..body_len]);
    w.write_all(&body[..body_len])
}

// === Output trace ===

/// Lifecycle event type of an output trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TraceKind {
    Add = 1,
    Cancel = 2,
    Fill = 3,
    Replace = 4,
}

impl TraceKind {
    pub fn from_u8(v: u8) -> Option<TraceKind> {
        match v {
            1 => Some(TraceKind::Add),
            2 => Some(TraceKind::Cancel),
            3 => Some(TraceKind::Fill),
            4 => Some(TraceKind::Replace),
            _ => None,
        }
    }
}

/// One record of the binary order-lifecycle trace.
///
/// Replace records populate both the old and new price/qty; all other
/// kinds leave the `old_*` fields zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub ts: Nanos,
    pub kind: TraceKind,
    pub order_id: u64,
    pub symbol_id: SymbolId,
    pub price: Price,
    pub old_price: Price,
    pub qty: Quantity,
    pub old_qty: Quantity,
    pub is_bid: bool,
}

impl TraceRecord {
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let mut buf = [0u8; TRACE_RECORD_BYTES];
        put_u64(&mut buf, 0, self.ts);
        buf[8] = self.kind as u8;
        put_u64(&mut buf, 9, self.order_id);
        put_u32(&mut buf, 17, self.symbol_id);
        put_i64(&mut buf, 21, self.price.0);
        put_i64(&mut buf, 29, self.old_price.0);
        put_u32(&mut buf, 37, self.qty);
        put_u32(&mut buf, 41, self.old_qty);
        buf[45] = self.is_bid as u8;
        w.write_all(&buf)
    }

    /// Read one trace record back; `Ok(None)` at clean EOF.
    ///
    /// Used by tests and downstream analysis tooling; an unknown kind byte
    /// means the stream is not a trace and is reported as such.
    pub fn read_from(r: &mut impl Read) -> Result<Option<TraceRecord>, WireError> {
        let mut buf = [0u8; TRACE_RECORD_BYTES];
        if !read_exact_or_eof(r, &mut buf)? {
            return Ok(None);
        }
        let kind = TraceKind::from_u8(buf[8]).ok_or(WireError::UnknownEventType(buf[8]))?;
        Ok(Some(TraceRecord {
            ts: u64_at(&buf, 0),
            kind,
            order_id: u64_at(&buf, 9),
            symbol_id: u32_at(&buf, 17),
            price: Price(i64_at(&buf, 21)),
            old_price: Price(i64_at(&buf, 29)),
            qty: u32_at(&buf, 37),
            old_qty: u32_at(&buf, 41),
            is_bid: buf[45] != 0,
        }))
    }
}

/// Appends fixed-width trace records to a sink.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    sink: W,
    records_written: u64,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(sink: W) -> Self {
        TraceWriter {
            sink,
            records_written: 0,
        }
    }

    pub fn write(&mut self, record: &TraceRecord) -> io::Result<()> {
        record.write_to(&mut self.sink)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush and hand back the sink.
    pub fn into_sink(mut self) -> io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Read an entire trace stream into memory (test/analysis helper).
pub fn read_trace(r: &mut impl Read) -> Result<Vec<TraceRecord>, WireError> {
    let mut records = Vec::new();
    while let Some(record) = TraceRecord::read_from(r)? {
        records.push(record);
    }
    Ok(records)
}
