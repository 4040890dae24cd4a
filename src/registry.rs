//! Market registry: market id -> independent book.
//!
//! Each market has its own lock, so a writer on one market never blocks readers or
//! writers of another. Limit and auction markets are separate id spaces.

use dashmap::DashMap;
use log::info;
use std::sync::Arc;

use crate::auction::AuctionBook;
use crate::engine::LimitBook;
use crate::error::{BookError, BookResult};
use crate::journal::{BookMutation, JournalEntry, MutationJournal, NoopJournal};
use crate::types::MarketId;

/// All books served by one process.
pub struct BookRegistry {
    limit_books: DashMap<MarketId, Arc<LimitBook>>,
    auction_books: DashMap<MarketId, Arc<AuctionBook>>,
    journal: Arc<dyn MutationJournal>,
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BookRegistry {
    pub fn new() -> Self {
        Self::with_journal(Arc::new(NoopJournal::new()))
    }

    /// Every book created by this registry appends to `journal`.
    pub fn with_journal(journal: Arc<dyn MutationJournal>) -> Self {
        Self {
            limit_books: DashMap::new(),
            auction_books: DashMap::new(),
            journal,
        }
    }

    /// Limit book for `market_id`, created empty on first use.
    pub fn limit_book(&self, market_id: MarketId) -> Arc<LimitBook> {
        let entry = self.limit_books.entry(market_id).or_insert_with(|| {
            info!("limit market created market={}", market_id);
            Arc::new(LimitBook::with_journal(market_id, Arc::clone(&self.journal)))
        });
        Arc::clone(entry.value())
    }

    /// Auction book for `market_id`, created empty on first use.
    pub fn auction_book(&self, market_id: MarketId) -> Arc<AuctionBook> {
        let entry = self.auction_books.entry(market_id).or_insert_with(|| {
            info!("auction market created market={}", market_id);
            Arc::new(AuctionBook::with_journal(market_id, Arc::clone(&self.journal)))
        });
        Arc::clone(entry.value())
    }

    /// Existing limit book, or `UnknownMarket`.
    pub fn get_limit_book(&self, market_id: MarketId) -> BookResult<Arc<LimitBook>> {
        self.limit_books
            .get(&market_id)
            .map(|b| Arc::clone(b.value()))
            .ok_or(BookError::UnknownMarket(market_id))
    }

    /// Existing auction book, or `UnknownMarket`.
    pub fn get_auction_book(&self, market_id: MarketId) -> BookResult<Arc<AuctionBook>> {
        self.auction_books
            .get(&market_id)
            .map(|b| Arc::clone(b.value()))
            .ok_or(BookError::UnknownMarket(market_id))
    }

    pub fn limit_markets(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.limit_books.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn auction_markets(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.auction_books.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Replays journal entries in order without appending them again.
    ///
    /// Stops at the first entry the books reject. Returns the number applied.
    pub fn recover(&self, entries: &[JournalEntry]) -> BookResult<usize> {
        for entry in entries {
            self.replay(&entry.mutation).map_err(|e| {
                BookError::Journal(format!(
                    "replay failed at sequence {}: {}",
                    entry.sequence, e
                ))
            })?;
        }
        info!(
            "journal recovered entries={} limit_markets={} auction_markets={}",
            entries.len(),
            self.limit_books.len(),
            self.auction_books.len()
        );
        Ok(entries.len())
    }

    fn replay(&self, mutation: &BookMutation) -> BookResult<()> {
        match mutation {
            BookMutation::LimitPlace { market_id, order } => {
                self.limit_book(*market_id).place_with(order, None)
            }
            BookMutation::LimitCancel { market_id, cancel } => {
                self.get_limit_book(*market_id)?.cancel_with(cancel, None)
            }
            BookMutation::LimitExec { market_id, exec } => {
                self.get_limit_book(*market_id)?.exec_with(exec, None)
            }
            BookMutation::AuctionPlace { market_id, order } => {
                self.auction_book(*market_id).place_with(order, None)
            }
            BookMutation::AuctionCancel { market_id, cancel } => {
                self.get_auction_book(*market_id)?.cancel_with(cancel, None)
            }
            BookMutation::AuctionExec { market_id, exec } => {
                self.get_auction_book(*market_id)?.exec_with(exec, None)
            }
            BookMutation::AuctionClose {
                market_id,
                auction_id,
            } => self
                .get_auction_book(*market_id)?
                .close_with(auction_id, None)
                .map(|_| ()),
        }
    }
}
