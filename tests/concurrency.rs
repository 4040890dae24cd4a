//! Readers snapshot books while writers apply executions on disjoint orders.
//!
//! A torn read would show a quantity that no sequence of whole executions produces, an
//! empty level, or a traded total outside what the writers had completed.

use dire_order_book::{
    AuctionBook, AuctionId, AuctionOrderIdPair, AuctionOrderbook, BookRegistry, LimitBook,
    LimitExecution, LimitOrderIdPair, LimitOrderbook, MarketId, OrderId, PublicKey, Side,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const WRITERS: u64 = 4;
const ORDERS_PER_WRITER: u64 = 10;
const QTY: u64 = 20;
const READERS: usize = 4;

fn order_id(writer: u64, n: u64) -> OrderId {
    OrderId(writer * 1_000 + n + 1)
}

fn seeded_book() -> Arc<LimitBook> {
    let book = Arc::new(LimitBook::new(MarketId(1)));
    for w in 0..WRITERS {
        for n in 0..ORDERS_PER_WRITER {
            book.update_book_place(&LimitOrderIdPair {
                order_id: order_id(w, n),
                pubkey: PublicKey::new([w as u8 + 1; 33]),
                side: if n % 2 == 0 { Side::Buy } else { Side::Sell },
                price: Decimal::from(100 + n % 3),
                quantity: Decimal::from(QTY),
                timestamp: n,
            })
            .unwrap();
        }
    }
    book
}

#[test]
fn readers_never_observe_partial_execs() {
    let book = seeded_book();
    let initial = Decimal::from(WRITERS * ORDERS_PER_WRITER * QTY);
    let completed = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let book = Arc::clone(&book);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                for n in 0..ORDERS_PER_WRITER {
                    let id = order_id(w, n);
                    let price = Decimal::from(100 + n % 3);
                    for left in (0..QTY).rev() {
                        book.update_book_exec(&LimitExecution {
                            order_id: id,
                            executed_qty: Decimal::ONE,
                            exec_price: price,
                            remaining_qty: Decimal::from(left),
                        })
                        .unwrap();
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let book = Arc::clone(&book);
            let completed = Arc::clone(&completed);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut snapshots = 0usize;
                while !done.load(Ordering::SeqCst) || snapshots == 0 {
                    let before = completed.load(Ordering::SeqCst);
                    let view = book.view_limit_order_book().unwrap();
                    let after = completed.load(Ordering::SeqCst);

                    let mut resting = Decimal::ZERO;
                    for (price, orders) in &view {
                        assert!(!orders.is_empty(), "empty level at {}", price);
                        for order in orders {
                            assert_eq!(order.price, *price);
                            assert!(order.quantity > Decimal::ZERO);
                            assert!(order.quantity <= Decimal::from(QTY));
                            assert_eq!(order.quantity.fract(), Decimal::ZERO);
                            resting += order.quantity;
                        }
                    }
                    let traded = initial - resting;
                    assert!(traded >= Decimal::from(before), "snapshot older than completed execs");
                    assert!(
                        traded <= Decimal::from(after + WRITERS),
                        "snapshot ahead of in-flight execs"
                    );
                    snapshots += 1;
                }
                snapshots
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
    assert!(book.is_empty());
    assert!(book.is_consistent());
    assert_eq!(completed.load(Ordering::SeqCst), WRITERS * ORDERS_PER_WRITER * QTY);
}

#[test]
fn writers_on_different_markets_do_not_interfere() {
    let registry = Arc::new(BookRegistry::new());
    let handles: Vec<_> = (1..=4u64)
        .map(|m| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let book = registry.limit_book(MarketId(m));
                for id in 1..=50u64 {
                    book.update_book_place(&LimitOrderIdPair {
                        order_id: OrderId(id),
                        pubkey: PublicKey::new([m as u8; 33]),
                        side: Side::Buy,
                        price: Decimal::from(m * 10),
                        quantity: Decimal::from(2),
                        timestamp: id,
                    })
                    .unwrap();
                    book.update_book_exec(&LimitExecution {
                        order_id: OrderId(id),
                        executed_qty: Decimal::ONE,
                        exec_price: Decimal::from(m * 10),
                        remaining_qty: Decimal::ONE,
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(
        registry.limit_markets(),
        vec![MarketId(1), MarketId(2), MarketId(3), MarketId(4)]
    );
    for m in 1..=4u64 {
        let book = registry.get_limit_book(MarketId(m)).unwrap();
        assert_eq!(book.len(), 50);
        assert_eq!(book.calculate_price().unwrap(), Decimal::from(m * 10));
        assert!(book.is_consistent());
    }
}

#[test]
fn auction_views_stay_consistent_while_rounds_fill() {
    let book = Arc::new(AuctionBook::new(MarketId(1)));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let book = Arc::clone(&book);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let view = book.view_auction_order_book().unwrap();
                for (price, orders) in &view {
                    assert!(!orders.is_empty());
                    for order in orders {
                        assert_eq!(order.price, *price);
                        assert!(order.quantity > Decimal::ZERO);
                    }
                }
            }
        })
    };

    let writers: Vec<_> = (1..=4u64)
        .map(|a| {
            let book = Arc::clone(&book);
            thread::spawn(move || {
                for id in 1..=25u64 {
                    book.update_book_place(&AuctionOrderIdPair {
                        auction_id: AuctionId(a),
                        order_id: OrderId(id),
                        pubkey: PublicKey::new([id as u8; 33]),
                        side: if id % 2 == 0 { Side::Buy } else { Side::Sell },
                        price: Decimal::from(40 + id % 5),
                        quantity: Decimal::from(id),
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    assert_eq!(book.auction_ids().len(), 4);
    let total: usize = book
        .view_auction_order_book()
        .unwrap()
        .values()
        .map(Vec::len)
        .sum();
    assert_eq!(total, 100);
    assert!(book.is_consistent());
}
