//! Errors reported by the book stores and engines.
//!
//! Every kind is returned synchronously to the caller. Nothing is retried here: a
//! retried place or exec could violate order id uniqueness, so retry policy belongs to
//! the matching engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{AuctionId, MarketId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),

    #[error("Execution of {executed} exceeds remaining {remaining} for order {order}")]
    OverfillExecution {
        order: String,
        executed: Decimal,
        remaining: Decimal,
    },

    #[error("Reported remaining {reported} for order {order} does not match book remaining {expected}")]
    RemainingMismatch {
        order: String,
        expected: Decimal,
        reported: Decimal,
    },

    #[error("Invalid order terms: {0}")]
    InvalidOrderTerms(String),

    #[error("Auction {0} has no clearing price yet")]
    AuctionNotReady(AuctionId),

    #[error("Auction {0} is settled")]
    AuctionSettled(AuctionId),

    #[error("Auction {0} is not open")]
    AuctionNotOpen(AuctionId),

    #[error("Auction {0} is still open")]
    AuctionStillOpen(AuctionId),

    #[error("Unknown auction: {0}")]
    UnknownAuction(AuctionId),

    #[error("No trades yet, price unavailable")]
    NoPriceAvailable,

    #[error("Unknown market: {0}")]
    UnknownMarket(MarketId),

    #[error("Journal append failed: {0}")]
    Journal(String),
}

pub type BookResult<T> = std::result::Result<T, BookError>;

impl From<crate::journal::JournalError> for BookError {
    fn from(err: crate::journal::JournalError) -> Self {
        BookError::Journal(err.to_string())
    }
}
