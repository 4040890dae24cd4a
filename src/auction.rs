//! Auction book engine: one independent shard per auction round.
//!
//! A round moves `Open -> Closed -> Settled`. While open it accepts placements and
//! cancellations. Closing (an external scheduler signal) freezes a clearing result from
//! the resting orders; from then on only executions are accepted. The round settles when
//! the executed buy and sell quantities both reach the frozen matched volume.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::{journal_append, rejected, validate_cancel, validate_exec, validate_place};
use crate::error::{BookError, BookResult};
use crate::journal::{BookMutation, MutationJournal, NoopJournal};
use crate::order::{AuctionCancel, AuctionExecution, AuctionOrderIdPair};
use crate::order_book::{BookStore, BookView};
use crate::price::{compute_clearing_price, ClearingResult};
use crate::types::{AuctionId, AuctionOrderId, MarketId, PublicKey, Side};

/// Discrete auction order book contract. Orders are scoped by [`AuctionId`].
pub trait AuctionOrderbook: Send + Sync {
    /// Applies an execution. Only accepted while the round is closed.
    fn update_book_exec(&self, exec: &AuctionExecution) -> BookResult<()>;
    /// Removes a cancelled order. Only accepted while the round is open.
    fn update_book_cancel(&self, cancel: &AuctionCancel) -> BookResult<()>;
    /// Adds an order to its round, opening the round on first use.
    fn update_book_place(&self, pair: &AuctionOrderIdPair) -> BookResult<()>;
    fn get_order(&self, order_id: &AuctionOrderId) -> BookResult<AuctionOrderIdPair>;
    /// Clearing price of a settled round.
    fn calculate_price(&self, auction_id: &AuctionId) -> BookResult<Decimal>;
    fn get_orders_for_pubkey(&self, pubkey: &PublicKey) -> BookResult<BookView<AuctionOrderIdPair>>;
    fn view_auction_order_book(&self) -> BookResult<BookView<AuctionOrderIdPair>>;
}

/// Lifecycle of one auction round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionState {
    #[default]
    Open,
    Closed,
    Settled,
}

#[derive(Debug, Default)]
struct AuctionRound {
    state: AuctionState,
    store: BookStore<AuctionOrderIdPair>,
    /// Frozen at close. `None` means nothing crossed.
    clearing: Option<ClearingResult>,
    buy_executed: Decimal,
    sell_executed: Decimal,
    /// Resting quantity per side while open; placements that would overflow are rejected.
    buy_total: Decimal,
    sell_total: Decimal,
}

impl AuctionRound {
    fn side_total(&mut self, side: Side) -> &mut Decimal {
        match side {
            Side::Buy => &mut self.buy_total,
            Side::Sell => &mut self.sell_total,
        }
    }
}

type RoundRef = Arc<RwLock<AuctionRound>>;

fn read_round(round: &RoundRef) -> RwLockReadGuard<'_, AuctionRound> {
    round.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_round(round: &RoundRef) -> RwLockWriteGuard<'_, AuctionRound> {
    round.write().unwrap_or_else(PoisonError::into_inner)
}

/// Auction order book for one market.
pub struct AuctionBook {
    market_id: MarketId,
    rounds: DashMap<AuctionId, RoundRef>,
    /// Clearing price of the most recently settled round; tie-break anchor.
    last_clearing: RwLock<Option<Decimal>>,
    journal: Arc<dyn MutationJournal>,
}

impl AuctionBook {
    pub fn new(market_id: MarketId) -> Self {
        Self::with_journal(market_id, Arc::new(NoopJournal::new()))
    }

    pub fn with_journal(market_id: MarketId, journal: Arc<dyn MutationJournal>) -> Self {
        Self {
            market_id,
            rounds: DashMap::new(),
            last_clearing: RwLock::new(None),
            journal,
        }
    }

    pub fn market_id(&self) -> MarketId {
        self.market_id
    }

    /// Auction ids known to this market, ascending.
    pub fn auction_ids(&self) -> Vec<AuctionId> {
        let mut ids: Vec<AuctionId> = self.rounds.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn auction_state(&self, auction_id: &AuctionId) -> BookResult<AuctionState> {
        let round = self.round(auction_id).ok_or(BookError::UnknownAuction(*auction_id))?;
        let state = read_round(&round).state;
        Ok(state)
    }

    /// Clearing result frozen at close (`None` while open or when nothing crossed).
    pub fn clearing(&self, auction_id: &AuctionId) -> BookResult<Option<ClearingResult>> {
        let round = self.round(auction_id).ok_or(BookError::UnknownAuction(*auction_id))?;
        let clearing = read_round(&round).clearing;
        Ok(clearing)
    }

    /// Clearing price the round's current resting orders would produce, in any state.
    pub fn indicative_price(&self, auction_id: &AuctionId) -> BookResult<Decimal> {
        let round = self
            .round(auction_id)
            .ok_or(BookError::AuctionNotReady(*auction_id))?;
        let view = read_round(&round).store.snapshot();
        compute_clearing_price(&view, self.prior_clearing())
            .map(|c| c.price)
            .ok_or(BookError::AuctionNotReady(*auction_id))
    }

    /// Copy of one round's price levels.
    pub fn view_auction(&self, auction_id: &AuctionId) -> BookResult<BookView<AuctionOrderIdPair>> {
        let round = self.round(auction_id).ok_or(BookError::UnknownAuction(*auction_id))?;
        let view = read_round(&round).store.snapshot();
        Ok(view)
    }

    /// True if every round's indices agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.sorted_rounds()
            .iter()
            .all(|round| read_round(round).store.is_consistent())
    }

    /// Scheduler signal: stop accepting orders and freeze the clearing result.
    ///
    /// A round where nothing crosses settles immediately.
    pub fn close_auction(&self, auction_id: &AuctionId) -> BookResult<Option<ClearingResult>> {
        self.close_with(auction_id, Some(self.journal.as_ref()))
    }

    pub(crate) fn close_with(
        &self,
        auction_id: &AuctionId,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<Option<ClearingResult>> {
        let round = self
            .round(auction_id)
            .ok_or(BookError::UnknownAuction(*auction_id))
            .map_err(|e| rejected("close", self.market_id, e))?;
        let mut round = write_round(&round);
        if round.state != AuctionState::Open {
            return Err(rejected(
                "close",
                self.market_id,
                BookError::AuctionNotOpen(*auction_id),
            ));
        }
        let clearing = compute_clearing_price(&round.store.snapshot(), self.prior_clearing());
        journal_append(journal, || BookMutation::AuctionClose {
            market_id: self.market_id,
            auction_id: *auction_id,
        })?;
        round.clearing = clearing;
        round.state = match clearing {
            Some(_) => AuctionState::Closed,
            None => AuctionState::Settled,
        };
        info!(
            "auction closed market={} auction_id={} state={:?} clearing={:?}",
            self.market_id, auction_id, round.state, clearing
        );
        Ok(clearing)
    }

    pub(crate) fn place_with(
        &self,
        pair: &AuctionOrderIdPair,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let round = match self.rounds.entry(pair.auction_id) {
            Entry::Occupied(slot) => Arc::clone(slot.get()),
            Entry::Vacant(slot) => {
                // A new round is only published once its first order is accepted.
                let mut round = AuctionRound::default();
                self.accept_place(&mut round, pair, journal)?;
                slot.insert(Arc::new(RwLock::new(round)));
                return Ok(());
            }
        };
        let mut round = write_round(&round);
        if round.state != AuctionState::Open {
            return Err(rejected(
                "place",
                self.market_id,
                BookError::AuctionNotOpen(pair.auction_id),
            ));
        }
        self.accept_place(&mut round, pair, journal)
    }

    fn accept_place(
        &self,
        round: &mut AuctionRound,
        pair: &AuctionOrderIdPair,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        validate_place(&round.store, pair).map_err(|e| rejected("place", self.market_id, e))?;
        let total = round
            .side_total(pair.side)
            .checked_add(pair.quantity)
            .ok_or_else(|| {
                rejected(
                    "place",
                    self.market_id,
                    BookError::InvalidOrderTerms(format!(
                        "{:?} quantity in auction {} would overflow",
                        pair.side, pair.auction_id
                    )),
                )
            })?;
        journal_append(journal, || BookMutation::AuctionPlace {
            market_id: self.market_id,
            order: pair.clone(),
        })?;
        round.store.insert(pair.clone())?;
        *round.side_total(pair.side) = total;
        info!(
            "auction order placed market={} auction_id={} order_id={} side={:?} price={} quantity={}",
            self.market_id, pair.auction_id, pair.order_id, pair.side, pair.price, pair.quantity
        );
        Ok(())
    }

    pub(crate) fn cancel_with(
        &self,
        cancel: &AuctionCancel,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let auction_id = cancel.order_id.auction_id;
        let round = self
            .round(&auction_id)
            .ok_or_else(|| BookError::UnknownOrder(cancel.order_id.to_string()))
            .map_err(|e| rejected("cancel", self.market_id, e))?;
        let mut round = write_round(&round);
        if round.state != AuctionState::Open {
            return Err(rejected(
                "cancel",
                self.market_id,
                BookError::AuctionNotOpen(auction_id),
            ));
        }
        validate_cancel(&round.store, cancel).map_err(|e| rejected("cancel", self.market_id, e))?;
        journal_append(journal, || BookMutation::AuctionCancel {
            market_id: self.market_id,
            cancel: cancel.clone(),
        })?;
        let removed = round.store.remove(cancel.order_id)?;
        let total = round.side_total(removed.side);
        *total -= removed.quantity;
        info!(
            "auction order canceled market={} order={} reason={:?}",
            self.market_id, cancel.order_id, cancel.reason
        );
        Ok(())
    }

    pub(crate) fn exec_with(
        &self,
        exec: &AuctionExecution,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let auction_id = exec.order_id.auction_id;
        let round = self
            .round(&auction_id)
            .ok_or_else(|| BookError::UnknownOrder(exec.order_id.to_string()))
            .map_err(|e| rejected("exec", self.market_id, e))?;
        let mut round = write_round(&round);
        match round.state {
            AuctionState::Open => {
                return Err(rejected(
                    "exec",
                    self.market_id,
                    BookError::AuctionStillOpen(auction_id),
                ))
            }
            AuctionState::Settled => {
                return Err(rejected(
                    "exec",
                    self.market_id,
                    BookError::AuctionSettled(auction_id),
                ))
            }
            AuctionState::Closed => {}
        }
        let remaining =
            validate_exec(&round.store, exec).map_err(|e| rejected("exec", self.market_id, e))?;
        let side = round
            .store
            .get(&exec.order_id)
            .map(|r| r.side)
            .ok_or_else(|| BookError::UnknownOrder(exec.order_id.to_string()))?;
        let matched = round
            .clearing
            .map(|c| c.matched_volume)
            .unwrap_or(Decimal::ZERO);
        let side_executed = match side {
            Side::Buy => round.buy_executed,
            Side::Sell => round.sell_executed,
        };
        let overfill = side_executed
            .checked_add(exec.executed_qty)
            .map_or(true, |total| total > matched);
        if overfill {
            return Err(rejected(
                "exec",
                self.market_id,
                BookError::OverfillExecution {
                    order: exec.order_id.to_string(),
                    executed: exec.executed_qty,
                    remaining: matched - side_executed,
                },
            ));
        }
        journal_append(journal, || BookMutation::AuctionExec {
            market_id: self.market_id,
            exec: exec.clone(),
        })?;
        round
            .store
            .apply_fill(exec.order_id, exec.executed_qty, remaining)?;
        match side {
            Side::Buy => round.buy_executed += exec.executed_qty,
            Side::Sell => round.sell_executed += exec.executed_qty,
        }
        info!(
            "auction order executed market={} order={} executed={} price={} remaining={}",
            self.market_id, exec.order_id, exec.executed_qty, exec.exec_price, remaining
        );
        if round.buy_executed == matched && round.sell_executed == matched {
            round.state = AuctionState::Settled;
            if let Some(clearing) = round.clearing {
                *self
                    .last_clearing
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(clearing.price);
            }
            info!(
                "auction settled market={} auction_id={} volume={}",
                self.market_id, auction_id, matched
            );
        }
        Ok(())
    }

    fn round(&self, auction_id: &AuctionId) -> Option<RoundRef> {
        self.rounds.get(auction_id).map(|r| Arc::clone(r.value()))
    }

    fn prior_clearing(&self) -> Option<Decimal> {
        *self
            .last_clearing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// All rounds in ascending auction id order. Readers lock in this order.
    fn sorted_rounds(&self) -> Vec<RoundRef> {
        let mut rounds: Vec<(AuctionId, RoundRef)> = self
            .rounds
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        rounds.sort_by_key(|(id, _)| *id);
        rounds.into_iter().map(|(_, r)| r).collect()
    }
}

impl AuctionOrderbook for AuctionBook {
    fn update_book_exec(&self, exec: &AuctionExecution) -> BookResult<()> {
        self.exec_with(exec, Some(self.journal.as_ref()))
    }

    fn update_book_cancel(&self, cancel: &AuctionCancel) -> BookResult<()> {
        self.cancel_with(cancel, Some(self.journal.as_ref()))
    }

    fn update_book_place(&self, pair: &AuctionOrderIdPair) -> BookResult<()> {
        self.place_with(pair, Some(self.journal.as_ref()))
    }

    fn get_order(&self, order_id: &AuctionOrderId) -> BookResult<AuctionOrderIdPair> {
        let round = self
            .round(&order_id.auction_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
        let record = read_round(&round).store.lookup(*order_id);
        record
    }

    fn calculate_price(&self, auction_id: &AuctionId) -> BookResult<Decimal> {
        let round = self
            .round(auction_id)
            .ok_or(BookError::AuctionNotReady(*auction_id))?;
        let round = read_round(&round);
        match (round.state, round.clearing) {
            (AuctionState::Settled, Some(clearing)) => Ok(clearing.price),
            _ => Err(BookError::AuctionNotReady(*auction_id)),
        }
    }

    fn get_orders_for_pubkey(&self, pubkey: &PublicKey) -> BookResult<BookView<AuctionOrderIdPair>> {
        let rounds = self.sorted_rounds();
        let guards: Vec<_> = rounds.iter().map(read_round).collect();
        let mut out: BookView<AuctionOrderIdPair> = BookView::new();
        for round in &guards {
            round.store.extend_pubkey_view(pubkey, &mut out);
        }
        Ok(out)
    }

    fn view_auction_order_book(&self) -> BookResult<BookView<AuctionOrderIdPair>> {
        let rounds = self.sorted_rounds();
        // Hold every round's read guard at once so the merged copy is one instant.
        let guards: Vec<_> = rounds.iter().map(read_round).collect();
        let mut out: BookView<AuctionOrderIdPair> = BookView::new();
        for round in &guards {
            round.store.extend_view(&mut out);
        }
        debug!(
            "auction book viewed market={} rounds={} levels={}",
            self.market_id,
            guards.len(),
            out.len()
        );
        Ok(out)
    }
}
