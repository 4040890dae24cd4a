//! Limit book engine and the validation core shared with the auction variant.
//!
//! The matching engine is the single writer: it sends place, cancel and exec events,
//! which are validated against the [`BookStore`], appended to the journal and then
//! applied, all under one write guard. Readers take a read guard just long enough to
//! copy what they return.

use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BookError, BookResult};
use crate::journal::{BookMutation, MutationJournal, NoopJournal};
use crate::order::{BookRecord, CancelledOrder, LimitCancel, LimitExecution, LimitOrderIdPair, OrderExecution};
use crate::order_book::{BookStore, BookView};
use crate::price::LastTradePrice;
use crate::types::{MarketId, OrderId, PublicKey};

/// Continuous limit order book contract.
///
/// Mutations come only from the matching engine; every rejected mutation leaves the
/// book unchanged.
pub trait LimitOrderbook: Send + Sync {
    /// Applies an execution. A fill to zero removes the order.
    fn update_book_exec(&self, exec: &LimitExecution) -> BookResult<()>;
    /// Removes a cancelled order.
    fn update_book_cancel(&self, cancel: &LimitCancel) -> BookResult<()>;
    /// Adds a new resting order.
    fn update_book_place(&self, pair: &LimitOrderIdPair) -> BookResult<()>;
    fn get_order(&self, order_id: &OrderId) -> BookResult<LimitOrderIdPair>;
    /// Last traded price.
    fn calculate_price(&self) -> BookResult<Decimal>;
    fn get_orders_for_pubkey(&self, pubkey: &PublicKey) -> BookResult<BookView<LimitOrderIdPair>>;
    fn view_limit_order_book(&self) -> BookResult<BookView<LimitOrderIdPair>>;
}

/// Checks a placement: positive terms and an id never used in this store.
pub(crate) fn validate_place<R: BookRecord>(store: &BookStore<R>, record: &R) -> BookResult<()> {
    if record.price() <= Decimal::ZERO {
        return Err(BookError::InvalidOrderTerms(format!(
            "price must be positive, got {}",
            record.price()
        )));
    }
    if record.quantity() <= Decimal::ZERO {
        return Err(BookError::InvalidOrderTerms(format!(
            "quantity must be positive, got {}",
            record.quantity()
        )));
    }
    if store.is_used(&record.key()) {
        return Err(BookError::DuplicateOrder(record.key().to_string()));
    }
    Ok(())
}

/// Checks an execution and returns the order's remaining quantity after it.
pub(crate) fn validate_exec<R: BookRecord>(
    store: &BookStore<R>,
    exec: &OrderExecution<R::Key>,
) -> BookResult<Decimal> {
    let record = store
        .get(&exec.order_id)
        .ok_or_else(|| BookError::UnknownOrder(exec.order_id.to_string()))?;
    if exec.executed_qty <= Decimal::ZERO {
        return Err(BookError::InvalidOrderTerms(format!(
            "executed quantity must be positive, got {}",
            exec.executed_qty
        )));
    }
    if exec.exec_price <= Decimal::ZERO {
        return Err(BookError::InvalidOrderTerms(format!(
            "execution price must be positive, got {}",
            exec.exec_price
        )));
    }
    if exec.executed_qty > record.quantity() {
        return Err(BookError::OverfillExecution {
            order: exec.order_id.to_string(),
            executed: exec.executed_qty,
            remaining: record.quantity(),
        });
    }
    let remaining = record.quantity() - exec.executed_qty;
    if exec.remaining_qty != remaining {
        return Err(BookError::RemainingMismatch {
            order: exec.order_id.to_string(),
            expected: remaining,
            reported: exec.remaining_qty,
        });
    }
    Ok(remaining)
}

pub(crate) fn validate_cancel<R: BookRecord>(
    store: &BookStore<R>,
    cancel: &CancelledOrder<R::Key>,
) -> BookResult<()> {
    if store.contains(&cancel.order_id) {
        Ok(())
    } else {
        Err(BookError::UnknownOrder(cancel.order_id.to_string()))
    }
}

/// Appends to `journal` if there is one. Nothing is applied when this fails.
pub(crate) fn journal_append(
    journal: Option<&dyn MutationJournal>,
    mutation: impl FnOnce() -> BookMutation,
) -> BookResult<()> {
    let Some(journal) = journal else {
        return Ok(());
    };
    let mutation = mutation();
    match journal.append(&mutation) {
        Ok(sequence) => {
            debug!(
                "journal appended market={} sequence={}",
                mutation.market_id(),
                sequence
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "journal append failed market={} err={}",
                mutation.market_id(),
                e
            );
            Err(e.into())
        }
    }
}

pub(crate) fn rejected(op: &str, market_id: MarketId, err: BookError) -> BookError {
    warn!("{} rejected market={} err={}", op, market_id, err);
    err
}

#[derive(Debug, Default)]
struct LimitState {
    store: BookStore<LimitOrderIdPair>,
    last_trade: LastTradePrice,
}

/// Continuous limit order book for one market.
pub struct LimitBook {
    market_id: MarketId,
    state: RwLock<LimitState>,
    journal: Arc<dyn MutationJournal>,
}

impl LimitBook {
    /// Creates an empty book without durability.
    pub fn new(market_id: MarketId) -> Self {
        Self::with_journal(market_id, Arc::new(NoopJournal::new()))
    }

    /// Creates an empty book that appends every accepted mutation to `journal` first.
    pub fn with_journal(market_id: MarketId, journal: Arc<dyn MutationJournal>) -> Self {
        Self {
            market_id,
            state: RwLock::new(LimitState::default()),
            journal,
        }
    }

    pub fn market_id(&self) -> MarketId {
        self.market_id
    }

    pub fn len(&self) -> usize {
        self.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().store.is_empty()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.read().store.best_bid()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.read().store.best_ask()
    }

    /// True if the store's indices agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.read().store.is_consistent()
    }

    pub(crate) fn place_with(
        &self,
        pair: &LimitOrderIdPair,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let mut state = self.write();
        validate_place(&state.store, pair).map_err(|e| rejected("place", self.market_id, e))?;
        journal_append(journal, || BookMutation::LimitPlace {
            market_id: self.market_id,
            order: pair.clone(),
        })?;
        state.store.insert(pair.clone())?;
        info!(
            "order placed market={} order_id={} side={:?} price={} quantity={}",
            self.market_id, pair.order_id, pair.side, pair.price, pair.quantity
        );
        Ok(())
    }

    pub(crate) fn cancel_with(
        &self,
        cancel: &LimitCancel,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let mut state = self.write();
        validate_cancel(&state.store, cancel).map_err(|e| rejected("cancel", self.market_id, e))?;
        journal_append(journal, || BookMutation::LimitCancel {
            market_id: self.market_id,
            cancel: cancel.clone(),
        })?;
        state.store.remove(cancel.order_id)?;
        info!(
            "order canceled market={} order_id={} reason={:?}",
            self.market_id, cancel.order_id, cancel.reason
        );
        Ok(())
    }

    pub(crate) fn exec_with(
        &self,
        exec: &LimitExecution,
        journal: Option<&dyn MutationJournal>,
    ) -> BookResult<()> {
        let mut state = self.write();
        let remaining =
            validate_exec(&state.store, exec).map_err(|e| rejected("exec", self.market_id, e))?;
        journal_append(journal, || BookMutation::LimitExec {
            market_id: self.market_id,
            exec: exec.clone(),
        })?;
        state
            .store
            .apply_fill(exec.order_id, exec.executed_qty, remaining)?;
        state.last_trade.record(exec.exec_price);
        info!(
            "order executed market={} order_id={} executed={} price={} remaining={}",
            self.market_id, exec.order_id, exec.executed_qty, exec.exec_price, remaining
        );
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, LimitState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LimitState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LimitOrderbook for LimitBook {
    fn update_book_exec(&self, exec: &LimitExecution) -> BookResult<()> {
        self.exec_with(exec, Some(self.journal.as_ref()))
    }

    fn update_book_cancel(&self, cancel: &LimitCancel) -> BookResult<()> {
        self.cancel_with(cancel, Some(self.journal.as_ref()))
    }

    fn update_book_place(&self, pair: &LimitOrderIdPair) -> BookResult<()> {
        self.place_with(pair, Some(self.journal.as_ref()))
    }

    fn get_order(&self, order_id: &OrderId) -> BookResult<LimitOrderIdPair> {
        self.read().store.lookup(*order_id)
    }

    fn calculate_price(&self) -> BookResult<Decimal> {
        self.read().last_trade.price()
    }

    fn get_orders_for_pubkey(&self, pubkey: &PublicKey) -> BookResult<BookView<LimitOrderIdPair>> {
        Ok(self.read().store.by_public_key(pubkey))
    }

    fn view_limit_order_book(&self) -> BookResult<BookView<LimitOrderIdPair>> {
        let view = self.read().store.snapshot();
        debug!("book viewed market={} levels={}", self.market_id, view.len());
        Ok(view)
    }
}
