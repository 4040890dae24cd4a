//! Price oracle: the two price-discovery rules.
//!
//! Continuous books report the price of the last accepted execution
//! ([`LastTradePrice`]). Auction rounds report a uniform clearing price
//! ([`compute_clearing_price`]): the level price that maximizes executable volume.

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BookError, BookResult};
use crate::order::BookRecord;
use crate::order_book::BookView;
use crate::types::Side;

/// Continuous-book price rule: last traded price, no fabricated midpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct LastTradePrice {
    last: Option<Decimal>,
}

impl LastTradePrice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, price: Decimal) {
        self.last = Some(price);
    }

    pub fn price(&self) -> BookResult<Decimal> {
        self.last.ok_or(BookError::NoPriceAvailable)
    }
}

/// Outcome of a clearing computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearingResult {
    pub price: Decimal,
    /// Quantity that trades on each side at `price`.
    pub matched_volume: Decimal,
    /// Buy quantity willing to trade at `price`.
    pub demand: Decimal,
    /// Sell quantity willing to trade at `price`.
    pub supply: Decimal,
}

impl ClearingResult {
    pub fn imbalance(&self) -> Decimal {
        (self.demand - self.supply).abs()
    }
}

/// Uniform clearing price over the resting orders in `view`.
///
/// Every level price is a candidate. At price `p`, demand is the buy quantity priced at
/// or above `p` and supply the sell quantity priced at or below `p`; matched volume is
/// their minimum. The highest matched volume wins. Ties go to the candidate closest to
/// `prior` (the previous auction's clearing price), then to the smallest imbalance,
/// then to the lowest price. Returns `None` when nothing crosses. Cumulative
/// quantities saturate at `Decimal::MAX`.
pub fn compute_clearing_price<R: BookRecord>(
    view: &BookView<R>,
    prior: Option<Decimal>,
) -> Option<ClearingResult> {
    let mut buys_at: Vec<(Decimal, Decimal)> = Vec::with_capacity(view.len());
    let mut sells_at: Vec<(Decimal, Decimal)> = Vec::with_capacity(view.len());
    for (price, records) in view {
        let (mut buy, mut sell) = (Decimal::ZERO, Decimal::ZERO);
        for r in records {
            match r.side() {
                Side::Buy => buy = buy.saturating_add(r.quantity()),
                Side::Sell => sell = sell.saturating_add(r.quantity()),
            }
        }
        buys_at.push((*price, buy));
        sells_at.push((*price, sell));
    }

    // demand[i]: buys priced >= level i; supply[i]: sells priced <= level i.
    let n = buys_at.len();
    let mut demand = vec![Decimal::ZERO; n];
    let mut running = Decimal::ZERO;
    for i in (0..n).rev() {
        running = running.saturating_add(buys_at[i].1);
        demand[i] = running;
    }
    let mut supply = vec![Decimal::ZERO; n];
    running = Decimal::ZERO;
    for i in 0..n {
        running = running.saturating_add(sells_at[i].1);
        supply[i] = running;
    }

    let mut best: Option<ClearingResult> = None;
    for i in 0..n {
        let candidate = ClearingResult {
            price: buys_at[i].0,
            matched_volume: demand[i].min(supply[i]),
            demand: demand[i],
            supply: supply[i],
        };
        if candidate.matched_volume <= Decimal::ZERO {
            continue;
        }
        best = match best {
            Some(current) if !prefer(&candidate, &current, prior) => Some(current),
            _ => Some(candidate),
        };
    }
    debug!("clearing computed levels={} result={:?}", n, best);
    best
}

/// True if `a` beats `b`.
fn prefer(a: &ClearingResult, b: &ClearingResult, prior: Option<Decimal>) -> bool {
    if a.matched_volume != b.matched_volume {
        return a.matched_volume > b.matched_volume;
    }
    if let Some(p) = prior {
        let (da, db) = ((a.price - p).abs(), (b.price - p).abs());
        if da != db {
            return da < db;
        }
    }
    if a.imbalance() != b.imbalance() {
        return a.imbalance() < b.imbalance();
    }
    a.price < b.price
}
