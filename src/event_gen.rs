//! Synthetic matching-engine event streams.
//!
//! Deterministic, configurable place/exec/cancel streams for replay tests, property
//! tests and benches. The generator tracks a shadow book so every event it emits is
//! valid against a book that has applied the events before it. Same seed, same stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::LimitOrderbook;
use crate::error::BookResult;
use crate::order::{CancelReason, LimitCancel, LimitExecution, LimitOrderIdPair};
use crate::types::{OrderId, PublicKey, Side, PUBKEY_LEN};

/// One event from the matching engine to a limit book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookEvent {
    Place(LimitOrderIdPair),
    Exec(LimitExecution),
    Cancel(LimitCancel),
}

impl BookEvent {
    pub fn apply_to<B: LimitOrderbook + ?Sized>(&self, book: &B) -> BookResult<()> {
        match self {
            BookEvent::Place(pair) => book.update_book_place(pair),
            BookEvent::Exec(exec) => book.update_book_exec(exec),
            BookEvent::Cancel(cancel) => book.update_book_cancel(cancel),
        }
    }
}

/// Configuration for the event generator. Ranges are inclusive.
#[derive(Clone, Debug)]
pub struct EventGeneratorConfig {
    pub seed: u64,
    /// Number of events returned by [`EventGenerator::all_events`].
    pub num_events: usize,
    /// Probability of a placement when orders are resting (0.0..=1.0).
    pub place_ratio: f64,
    /// Probability of a cancellation; executions take the rest.
    pub cancel_ratio: f64,
    pub price_min: i64,
    pub price_max: i64,
    pub quantity_min: u64,
    pub quantity_max: u64,
    /// Number of distinct owning keys.
    pub num_pubkeys: u8,
    /// First order id handed out. Lets several generators share a book without collisions.
    pub first_order_id: u64,
}

impl Default for EventGeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_events: 1000,
            place_ratio: 0.5,
            cancel_ratio: 0.2,
            price_min: 95,
            price_max: 105,
            quantity_min: 1,
            quantity_max: 100,
            num_pubkeys: 5,
            first_order_id: 1,
        }
    }
}

#[derive(Clone, Debug)]
struct ShadowOrder {
    order_id: OrderId,
    price: Decimal,
    remaining: u64,
}

/// Deterministic event stream. Create with [`EventGenerator::new`].
pub struct EventGenerator {
    rng: StdRng,
    config: EventGeneratorConfig,
    next_order_id: u64,
    next_timestamp: u64,
    live: Vec<ShadowOrder>,
}

impl EventGenerator {
    pub fn new(config: EventGeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            rng,
            next_order_id: config.first_order_id,
            config,
            next_timestamp: 1,
            live: Vec::new(),
        }
    }

    /// Generates the next event and advances the shadow book.
    pub fn next_event(&mut self) -> BookEvent {
        let roll = self.rng.gen::<f64>();
        if self.live.is_empty() || roll < self.config.place_ratio {
            return self.next_place();
        }
        let idx = self.rng.gen_range(0..self.live.len());
        if roll < self.config.place_ratio + self.config.cancel_ratio {
            let order = self.live.swap_remove(idx);
            return BookEvent::Cancel(LimitCancel {
                order_id: order.order_id,
                reason: CancelReason::Requested,
                timestamp: self.tick(),
            });
        }
        let order = &mut self.live[idx];
        let executed = self.rng.gen_range(1..=order.remaining);
        order.remaining -= executed;
        let event = BookEvent::Exec(LimitExecution {
            order_id: order.order_id,
            executed_qty: Decimal::from(executed),
            exec_price: order.price,
            remaining_qty: Decimal::from(order.remaining),
        });
        if order.remaining == 0 {
            self.live.swap_remove(idx);
        }
        event
    }

    pub fn take_events(&mut self, n: usize) -> Vec<BookEvent> {
        (0..n).map(|_| self.next_event()).collect()
    }

    /// The full stream as defined by `config.num_events`.
    pub fn all_events(&mut self) -> Vec<BookEvent> {
        self.take_events(self.config.num_events)
    }

    /// Number of orders resting in the shadow book.
    pub fn live_orders(&self) -> usize {
        self.live.len()
    }

    fn next_place(&mut self) -> BookEvent {
        let order_id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let side = if self.rng.gen::<bool>() {
            Side::Buy
        } else {
            Side::Sell
        };
        let price = Decimal::from(
            self.rng
                .gen_range(self.config.price_min..=self.config.price_max),
        );
        let quantity = self
            .rng
            .gen_range(self.config.quantity_min.max(1)..=self.config.quantity_max.max(1));
        let owner = self.rng.gen_range(1..=self.config.num_pubkeys.max(1));
        self.live.push(ShadowOrder {
            order_id,
            price,
            remaining: quantity,
        });
        BookEvent::Place(LimitOrderIdPair {
            order_id,
            pubkey: PublicKey::new([owner; PUBKEY_LEN]),
            side,
            price,
            quantity: Decimal::from(quantity),
            timestamp: self.tick(),
        })
    }

    fn tick(&mut self) -> u64 {
        let t = self.next_timestamp;
        self.next_timestamp += 1;
        t
    }
}

/// Applies events in order. Returns the number applied, or the first error.
pub fn replay_into_book<B: LimitOrderbook + ?Sized>(
    book: &B,
    events: impl IntoIterator<Item = BookEvent>,
) -> BookResult<usize> {
    let mut applied = 0usize;
    for event in events {
        event.apply_to(book)?;
        applied += 1;
    }
    Ok(applied)
}
