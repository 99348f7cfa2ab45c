//! End-to-end scenarios: literal inputs through the full pipeline,
//! checked against the exact trace bytes and final aggregates.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use fillsim::wire::{
    read_trace, write_event, BookEvent, BookTop, FileHeader, FillSnapshot, TimedEvent, TopLevel,
    TraceKind, TraceRecord,
};
use fillsim::{
    Action, CyclingQuoter, LatencyConfig, Nanos, OrderId, Price, Quantity, Side, Simulator,
    Strategy, SymbolId, NANOS_PER_UNIT,
};

// ============================================================================
// Helpers
// ============================================================================

/// Plays back pre-written action lists, one per `on_book_top` /
/// `on_fill` call.
#[derive(Default)]
struct Scripted {
    on_top: VecDeque<Vec<Action>>,
    on_fill: VecDeque<Vec<Action>>,
}

impl Scripted {
    fn with_top_scripts(scripts: Vec<Vec<Action>>) -> Self {
        Scripted {
            on_top: scripts.into(),
            ..Scripted::default()
        }
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &'static str {
        "Scripted"
    }
    fn set_symbol(&mut self, _symbol_id: SymbolId) {}
    fn on_book_top(&mut self, _top: &BookTop) -> Vec<Action> {
        self.on_top.pop_front().unwrap_or_default()
    }
    fn on_fill(&mut self, _fill: &FillSnapshot) -> Vec<Action> {
        self.on_fill.pop_front().unwrap_or_default()
    }
    fn on_order_filled(
        &mut self,
        _order_id: OrderId,
        _price: Price,
        _qty: Quantity,
        _side: Side,
    ) -> Vec<Action> {
        Vec::new()
    }
}

fn top(ts: Nanos, bid_units: i64, ask_units: i64) -> BookTop {
    BookTop {
        ts,
        seqno: ts,
        levels: [
            TopLevel {
                bid: Price::from_units(bid_units),
                ask: Price::from_units(ask_units),
                bid_qty: 10,
                ask_qty: 10,
            },
            TopLevel::default(),
            TopLevel::default(),
        ],
    }
}

fn scripted_sim(scripts: Vec<Vec<Action>>) -> Simulator<Vec<u8>> {
    let mut sim = Simulator::new(
        Box::new(Scripted::with_top_scripts(scripts)),
        LatencyConfig::default(),
        Vec::new(),
    );
    sim.set_symbol_id(1);
    sim
}

fn trace_of(sim: Simulator<Vec<u8>>) -> Vec<TraceRecord> {
    let bytes = sim.finish().unwrap();
    read_trace(&mut Cursor::new(bytes)).unwrap()
}

fn units(n: i64) -> i128 {
    n as i128 * NANOS_PER_UNIT as i128
}

// ============================================================================
// Literal kernel scenarios
// ============================================================================

#[test]
fn immediate_cross_non_post_only_buy() {
    let mut sim = scripted_sim(vec![vec![Action::add(
        OrderId(1),
        Side::Bid,
        Price::from_units(100),
        5,
        false,
    )]]);

    sim.process_book_top(&top(1_000, 99, 100)).unwrap();

    assert_eq!(sim.position(), 5);
    assert_eq!(sim.cash_flow_nanos(), -units(500));
    assert_eq!(sim.orders_placed(), 1);
    assert_eq!(sim.active_order_count(), 0);

    let records = trace_of(sim);
    assert_eq!(records.len(), 2);

    // Add lands at top ts + md latency + exchange latency.
    assert_eq!(records[0].kind, TraceKind::Add);
    assert_eq!(records[0].ts, 12_000);
    assert_eq!(records[0].order_id, 1);
    assert!(records[0].is_bid);

    // Fill notification one exchange latency later, at the ask.
    assert_eq!(records[1].kind, TraceKind::Fill);
    assert_eq!(records[1].ts, 22_000);
    assert_eq!(records[1].price, Price::from_units(100));
    assert_eq!(records[1].qty, 5);
}

#[test]
fn post_only_cross_rejection() {
    let mut sim = scripted_sim(vec![vec![Action::add(
        OrderId(2),
        Side::Bid,
        Price::from_units(100),
        5,
        true,
    )]]);

    sim.process_book_top(&top(1_000, 99, 100)).unwrap();

    assert_eq!(sim.position(), 0);
    assert_eq!(sim.cash_flow_nanos(), 0);
    assert_eq!(sim.active_order_count(), 0);

    let records = trace_of(sim);
    let kinds: Vec<TraceKind> = records.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![TraceKind::Add, TraceKind::Cancel]);
}

#[test]
fn sweep_fills_resting_order() {
    let mut sim = scripted_sim(vec![
        vec![Action::add(
            OrderId(3),
            Side::Ask,
            Price::from_units(105),
            4,
            false,
        )],
        vec![],
        vec![],
    ]);

    sim.process_book_top(&top(1_000_000, 99, 100)).unwrap();
    assert_eq!(sim.active_order_count(), 1);

    // No cross yet.
    sim.process_book_top(&top(1_200_000, 104, 106)).unwrap();
    assert_eq!(sim.position(), 0);

    // Bid moves to 105: the resting ask crosses.
    sim.process_book_top(&top(1_400_000, 105, 107)).unwrap();
    assert_eq!(sim.position(), -4);
    assert_eq!(sim.active_order_count(), 0);

    let records = trace_of(sim);
    let fill = records.last().unwrap();
    assert_eq!(fill.kind, TraceKind::Fill);
    assert_eq!(fill.price, Price::from_units(105));
    assert_eq!(fill.qty, 4);
    assert_eq!(fill.ts, 1_410_000); // triggering top ts + exchange latency
}

#[test]
fn replace_without_cross() {
    let mut sim = scripted_sim(vec![
        vec![Action::add(
            OrderId(4),
            Side::Bid,
            Price::from_units(95),
            3,
            false,
        )],
        vec![Action::replace(OrderId(4), Price::from_units(96), 5)],
    ]);

    sim.process_book_top(&top(1_000_000, 99, 100)).unwrap();
    sim.process_book_top(&top(1_200_000, 99, 100)).unwrap();

    let order = sim.active_order(OrderId(4)).unwrap();
    assert_eq!(order.price, Price::from_units(96));
    assert_eq!(order.total_qty, 5);

    let records = trace_of(sim);
    assert_eq!(records.len(), 2);
    let replace = &records[1];
    assert_eq!(replace.kind, TraceKind::Replace);
    assert_eq!(replace.price, Price::from_units(96));
    assert_eq!(replace.old_price, Price::from_units(95));
    assert_eq!(replace.qty, 5);
    assert_eq!(replace.old_qty, 3);
    assert!(replace.is_bid);
}

// ============================================================================
// Literal queue-mode scenarios
// ============================================================================

#[test]
fn queue_amend_preserves_position() {
    use fillsim::QueueBook;

    let mut book = QueueBook::new();
    book.apply(&TimedEvent::new(
        1,
        1,
        BookEvent::Add {
            order_id: 0xA,
            side: Side::Bid,
            price: Price::from_units(100),
            qty: 10,
        },
    ));
    book.apply(&TimedEvent::new(
        2,
        2,
        BookEvent::Add {
            order_id: 0xB,
            side: Side::Bid,
            price: Price::from_units(100),
            qty: 5,
        },
    ));
    book.apply(&TimedEvent::new(
        3,
        3,
        BookEvent::Amend {
            order_id: 0xA,
            new_qty: 7,
        },
    ));

    let level = book.level(Side::Bid, Price::from_units(100)).unwrap();
    let queue: Vec<(u64, Quantity)> = level.orders().map(|o| (o.id, o.qty)).collect();
    assert_eq!(queue, vec![(0xA, 7), (0xB, 5)]);
    assert_eq!(level.total_qty(), 12);
}

#[test]
fn queue_execute_at_price_synthesizes_fill() {
    use fillsim::QueueBook;

    let mut book = QueueBook::new();
    book.apply(&TimedEvent::new(
        1,
        1,
        BookEvent::Add {
            order_id: 0x11,
            side: Side::Bid,
            price: Price::from_units(100),
            qty: 10,
        },
    ));

    let applied = book.apply(&TimedEvent::new(
        2,
        2,
        BookEvent::ExecuteAtPrice {
            order_id: 0x11,
            qty: 3,
            execution_id: 7,
            price: Price::from_units(101),
        },
    ));

    assert_eq!(applied.fills.len(), 1);
    let fill = &applied.fills[0];
    assert_eq!(fill.trade_price, Price::from_units(101));
    assert_eq!(fill.trade_qty, 3);
    assert_eq!(fill.resting_remaining_qty, 7);
    assert_eq!(
        book.level(Side::Bid, Price::from_units(100)).unwrap().total_qty(),
        7
    );
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn throttled_top_has_no_strategy_callback() {
    // A crossing order on the second top would fill -- if the strategy
    // ever heard about it. The top arrives inside the coalescing window,
    // so the script must never run.
    let strategy = Scripted::with_top_scripts(vec![
        vec![],
        vec![Action::add(OrderId(1), Side::Bid, Price::from_units(99), 1, false)],
    ]);
    let mut sim = Simulator::new(Box::new(strategy), LatencyConfig::default(), Vec::new());
    sim.set_symbol_id(1);

    sim.process_book_top(&top(1_000_000, 99, 100)).unwrap();
    sim.process_book_top(&top(1_050_000, 98, 99)).unwrap(); // 50 µs later: coalesced

    // The coalesced top never reached the strategy or the latched market.
    assert_eq!(sim.last_top().unwrap().best_bid(), Price::from_units(99));
    assert_eq!(sim.orders_placed(), 0);

    // One full window later, tops flow again and the script resumes.
    sim.process_book_top(&top(1_100_000, 98, 99)).unwrap();
    assert_eq!(sim.orders_placed(), 1);
    assert_eq!(sim.last_top().unwrap().best_bid(), Price::from_units(98));
}

#[test]
fn one_sided_book_never_triggers_callbacks_or_fills() {
    // Bids only: the derived top has a sentinel ask and is never forwarded.
    let strategy = Scripted::with_top_scripts(vec![vec![Action::add(
        OrderId(1),
        Side::Ask,
        Price(1),
        1,
        false,
    )]]);
    let mut sim = Simulator::new(Box::new(strategy), LatencyConfig::default(), Vec::new());
    sim.set_symbol_id(1);

    use fillsim::QueueBook;
    let mut book = QueueBook::new();
    for i in 0..3u64 {
        let applied = book.apply(&TimedEvent::new(
            1_000_000 * (i + 1),
            i,
            BookEvent::Add {
                order_id: i,
                side: Side::Bid,
                price: Price::from_units(100 - i as i64),
                qty: 10,
            },
        ));
        if let Some(t) = applied.top {
            sim.process_book_top(&t).unwrap();
        }
    }

    assert_eq!(sim.orders_placed(), 0);
    assert!(trace_of(sim).is_empty());
}

// ============================================================================
// File-driven runs
// ============================================================================

fn write_tops_file(path: &Path, symbol_idx: u64, tops: &[BookTop]) {
    let mut w = BufWriter::new(File::create(path).unwrap());
    FileHeader {
        feed_id: 1,
        dateint: 20240115,
        record_count: tops.len() as u32,
        symbol_idx,
    }
    .write_to(&mut w)
    .unwrap();
    for t in tops {
        t.write_to(&mut w).unwrap();
    }
    w.flush().unwrap();
}

fn write_fills_file(path: &Path, symbol_idx: u64, fills: &[FillSnapshot]) {
    let mut w = BufWriter::new(File::create(path).unwrap());
    FileHeader {
        feed_id: 1,
        dateint: 20240115,
        record_count: fills.len() as u32,
        symbol_idx,
    }
    .write_to(&mut w)
    .unwrap();
    for f in fills {
        f.write_to(&mut w).unwrap();
    }
    w.flush().unwrap();
}

fn write_events_file(path: &Path, symbol_idx: u64, events: &[TimedEvent]) {
    let mut w = BufWriter::new(File::create(path).unwrap());
    FileHeader {
        feed_id: 1,
        dateint: 20240115,
        record_count: events.len() as u32,
        symbol_idx,
    }
    .write_to(&mut w)
    .unwrap();
    for e in events {
        write_event(&mut w, e).unwrap();
    }
    w.flush().unwrap();
}

/// A spread that widens and tightens so the cycling quoter trades at
/// varying prices.
fn market_tops(count: usize) -> Vec<BookTop> {
    (0..count)
        .map(|i| {
            let drift = (i as i64 % 7) - 3;
            top(1_000_000 * (i as u64 + 1), 99 + drift, 101 + drift)
        })
        .collect()
}

#[test]
fn snapshot_mode_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    let out_path = dir.path().join("orders.bin");

    write_tops_file(&tops_path, 7, &market_tops(20));
    write_fills_file(&fills_path, 7, &[]);

    let output = BufWriter::new(File::create(&out_path).unwrap());
    let mut sim = Simulator::new(
        Box::new(CyclingQuoter::new(0, 1)),
        LatencyConfig::default(),
        output,
    );
    sim.run_snapshot(&tops_path, &fills_path).unwrap();

    // Every cycling order crosses: as many fills as orders.
    assert_eq!(sim.orders_placed(), 20);
    assert_eq!(sim.orders_filled(), 20);
    let position = sim.position();
    let cash = sim.cash_flow_nanos();
    sim.finish().unwrap();

    // Alternating 1-lot buys and sells go home flat.
    assert_eq!(position, 0);
    assert!(cash != 0);

    let records = read_trace(&mut File::open(&out_path).unwrap()).unwrap();
    assert_eq!(records.len(), 40); // Add + Fill per order
    assert!(records.iter().all(|r| r.symbol_id == 7));
}

#[test]
fn snapshot_mode_dispatches_on_fill_actions_and_prefers_tops_on_ties() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");

    // The second top tightens the ask to 99 at exactly the fill's
    // timestamp. On a tie the top must be processed first, so the on_fill
    // action below crosses at 99; were the fill processed first, a 99 bid
    // against the stale 100 ask would rest instead.
    let tops = vec![top(1_000_000, 99, 100), top(2_000_000, 98, 99)];
    let fills = vec![FillSnapshot {
        ts: 2_000_000,
        seq_no: 5,
        trade_price: Price::from_units(99),
        trade_qty: 2,
        ..FillSnapshot::default()
    }];
    write_tops_file(&tops_path, 1, &tops);
    write_fills_file(&fills_path, 1, &fills);

    let strategy = Scripted {
        on_fill: VecDeque::from(vec![vec![Action::add(
            OrderId(9),
            Side::Bid,
            Price::from_units(99),
            1,
            false,
        )]]),
        ..Scripted::default()
    };
    let mut sim = Simulator::new(Box::new(strategy), LatencyConfig::default(), Vec::new());
    sim.run_snapshot(&tops_path, &fills_path).unwrap();

    // The on_fill action was dispatched and crossed the fresh top.
    assert_eq!(sim.position(), 1);

    let records = trace_of(sim);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, TraceKind::Add);
    // Fill event ts + md latency + exchange latency.
    assert_eq!(records[0].ts, 2_011_000);
    assert_eq!(records[1].kind, TraceKind::Fill);
    assert_eq!(records[1].price, Price::from_units(99));
}

#[test]
fn queue_mode_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.bin");

    let events = vec![
        TimedEvent::new(
            1_000_000,
            1,
            BookEvent::Add {
                order_id: 100,
                side: Side::Bid,
                price: Price::from_units(99),
                qty: 10,
            },
        ),
        TimedEvent::new(
            1_200_000,
            2,
            BookEvent::Add {
                order_id: 101,
                side: Side::Ask,
                price: Price::from_units(100),
                qty: 10,
            },
        ),
        // External trade: consumes half the ask, prints on the tape.
        TimedEvent::new(
            1_400_000,
            3,
            BookEvent::Execute {
                order_id: 101,
                qty: 5,
                execution_id: 900,
            },
        ),
    ];
    write_events_file(&events_path, 3, &events);

    // Strategy sells into the bid on the first two-sided top.
    let strategy = Scripted::with_top_scripts(vec![vec![Action::add(
        OrderId(1),
        Side::Ask,
        Price::from_units(99),
        2,
        false,
    )]]);
    let mut sim = Simulator::new(Box::new(strategy), LatencyConfig::default(), Vec::new());
    sim.run_queue(&events_path).unwrap();

    assert_eq!(sim.position(), -2);
    assert_eq!(sim.cash_flow_nanos(), units(198));

    let records = trace_of(sim);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, TraceKind::Add);
    // First two-sided top appears at ts 1 200 000.
    assert_eq!(records[0].ts, 1_211_000);
    assert_eq!(records[1].kind, TraceKind::Fill);
    assert_eq!(records[1].price, Price::from_units(99));
    assert!(records.iter().all(|r| r.symbol_id == 3));
}

#[test]
fn queue_mode_feeds_tape_fills_to_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.bin");

    write_events_file(
        &events_path,
        1,
        &[
            TimedEvent::new(
                1_000_000,
                1,
                BookEvent::Add {
                    order_id: 100,
                    side: Side::Bid,
                    price: Price::from_units(99),
                    qty: 10,
                },
            ),
            TimedEvent::new(
                1_200_000,
                2,
                BookEvent::ExecuteAtPrice {
                    order_id: 100,
                    qty: 4,
                    execution_id: 77,
                    price: Price::from_units(98),
                },
            ),
        ],
    );

    let mut sim = Simulator::new(
        Box::new(Scripted::default()),
        LatencyConfig::default(),
        Vec::new(),
    );
    sim.run_queue(&events_path).unwrap();

    // One-sided book: no top callbacks, but the tape fill still flowed.
    let stats = sim.latency_stats();
    assert_eq!(stats.md_events, 1);
}

// ============================================================================
// Determinism and trace recovery
// ============================================================================

fn run_cycling(tops_path: &Path, fills_path: &Path) -> (Vec<u8>, i64, i128) {
    let mut sim = Simulator::new(
        Box::new(CyclingQuoter::new(0, 1)),
        LatencyConfig::default(),
        Vec::new(),
    );
    sim.run_snapshot(tops_path, fills_path).unwrap();
    let position = sim.position();
    let cash = sim.cash_flow_nanos();
    (sim.finish().unwrap(), position, cash)
}

#[test]
fn identical_inputs_produce_identical_traces() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    write_tops_file(&tops_path, 1, &market_tops(50));
    write_fills_file(&fills_path, 1, &[]);

    let (first, pos_a, cash_a) = run_cycling(&tops_path, &fills_path);
    let (second, pos_b, cash_b) = run_cycling(&tops_path, &fills_path);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(pos_a, pos_b);
    assert_eq!(cash_a, cash_b);
}

#[test]
fn trace_recovers_position_and_cash() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    write_tops_file(&tops_path, 1, &market_tops(31));
    write_fills_file(&fills_path, 1, &[]);

    let (bytes, position, cash) = run_cycling(&tops_path, &fills_path);
    let records = read_trace(&mut Cursor::new(bytes)).unwrap();

    let mut recovered_position = 0i64;
    let mut recovered_cash = 0i128;
    for record in &records {
        if record.kind != TraceKind::Fill {
            continue;
        }
        let notional = record.price.0 as i128 * record.qty as i128;
        if record.is_bid {
            recovered_position += record.qty as i64;
            recovered_cash -= notional;
        } else {
            recovered_position -= record.qty as i64;
            recovered_cash += notional;
        }
    }

    assert_eq!(recovered_position, position);
    assert_eq!(recovered_cash, cash);
}

#[test]
fn trace_timestamps_non_decreasing_per_order() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    write_tops_file(&tops_path, 1, &market_tops(40));
    write_fills_file(&fills_path, 1, &[]);

    let (bytes, _, _) = run_cycling(&tops_path, &fills_path);
    let records = read_trace(&mut Cursor::new(bytes)).unwrap();

    use std::collections::HashMap;
    let mut last_ts: HashMap<u64, Nanos> = HashMap::new();
    for record in &records {
        if let Some(&prev) = last_ts.get(&record.order_id) {
            assert!(
                record.ts >= prev,
                "order {} went back in time: {} then {}",
                record.order_id,
                prev,
                record.ts
            );
        }
        last_ts.insert(record.order_id, record.ts);
    }
}

#[test]
fn inert_strategy_trades_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    write_tops_file(&tops_path, 1, &market_tops(25));
    write_fills_file(
        &fills_path,
        1,
        &[FillSnapshot {
            ts: 1_500_000,
            trade_price: Price::from_units(100),
            trade_qty: 1,
            ..FillSnapshot::default()
        }],
    );

    let mut sim = Simulator::new(
        Box::new(Scripted::default()), // no scripts: never acts
        LatencyConfig::default(),
        Vec::new(),
    );
    sim.run_snapshot(&tops_path, &fills_path).unwrap();

    assert_eq!(sim.orders_placed(), 0);
    assert_eq!(sim.cash_flow_nanos(), 0);
    assert_eq!(sim.position(), 0);
    assert!(trace_of(sim).is_empty());
}

#[test]
fn missing_input_file_is_a_clean_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing: PathBuf = dir.path().join("nope.bin");
    let fills_path = dir.path().join("fills.bin");
    write_fills_file(&fills_path, 1, &[]);

    let mut sim = Simulator::new(
        Box::new(Scripted::default()),
        LatencyConfig::default(),
        Vec::new(),
    );
    assert!(sim.run_snapshot(&missing, &fills_path).is_err());
}

#[test]
fn truncated_tops_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let tops_path = dir.path().join("tops.bin");
    let fills_path = dir.path().join("fills.bin");
    write_tops_file(&tops_path, 1, &market_tops(3));
    write_fills_file(&fills_path, 1, &[]);

    // Chop the last top record in half.
    let bytes = std::fs::read(&tops_path).unwrap();
    std::fs::write(&tops_path, &bytes[..bytes.len() - 40]).unwrap();

    let mut sim = Simulator::new(
        Box::new(Scripted::default()),
        LatencyConfig::default(),
        Vec::new(),
    );
    assert!(sim.run_snapshot(&tops_path, &fills_path).is_err());
}
