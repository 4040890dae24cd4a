//! # Dire Order Book
//!
//! Authoritative order book for an external matching engine. The engine decides what
//! trades; this crate records the resulting place, cancel and execution events and
//! answers queries about resting orders and prices.
//!
//! Two variants share one store and validation core:
//!
//! - [`LimitBook`] ([`LimitOrderbook`]): continuous book, price is the last trade.
//! - [`AuctionBook`] ([`AuctionOrderbook`]): orders grouped into auction rounds that
//!   close and settle at a uniform clearing price.
//!
//! [`BookRegistry`] holds one book per market, and [`journal`] makes accepted
//! mutations durable and replayable.
//!
//! ## Example
//!
//! ```rust
//! use dire_order_book::{LimitBook, LimitOrderbook, LimitOrderIdPair, LimitExecution, MarketId, OrderId, PublicKey, Side};
//! use rust_decimal::Decimal;
//!
//! let book = LimitBook::new(MarketId(1));
//! book.update_book_place(&LimitOrderIdPair {
//!     order_id: OrderId(1),
//!     pubkey: PublicKey::new([2; 33]),
//!     side: Side::Sell,
//!     price: Decimal::from(100),
//!     quantity: Decimal::from(10),
//!     timestamp: 1,
//! })
//! .unwrap();
//! book.update_book_exec(&LimitExecution {
//!     order_id: OrderId(1),
//!     executed_qty: Decimal::from(4),
//!     exec_price: Decimal::from(100),
//!     remaining_qty: Decimal::from(6),
//! })
//! .unwrap();
//! assert_eq!(book.get_order(&OrderId(1)).unwrap().quantity, Decimal::from(6));
//! assert_eq!(book.calculate_price().unwrap(), Decimal::from(100));
//! ```

pub mod api;
pub mod auction;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_gen;
pub mod journal;
pub mod order;
pub mod order_book;
pub mod price;
pub mod registry;
pub mod types;

pub use auction::{AuctionBook, AuctionOrderbook, AuctionState};
pub use engine::{LimitBook, LimitOrderbook};
pub use error::{BookError, BookResult};
pub use event_gen::{replay_into_book, BookEvent, EventGenerator, EventGeneratorConfig};
pub use journal::{BookMutation, FileJournal, InMemoryJournal, JournalEntry, JournalError, MutationJournal, NoopJournal};
pub use order::{
    AuctionCancel, AuctionExecution, AuctionOrderIdPair, BookRecord, CancelReason, CancelledOrder,
    LimitCancel, LimitExecution, LimitOrderIdPair, OrderExecution,
};
pub use order_book::{BookStore, BookView};
pub use price::{compute_clearing_price, ClearingResult, LastTradePrice};
pub use registry::BookRegistry;
pub use types::{AuctionId, AuctionOrderId, MarketId, OrderId, PublicKey, PublicKeyError, Side, PUBKEY_LEN};
