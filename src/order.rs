//! Order records and the mutation payloads produced by the matching engine.
//!
//! [`LimitOrderIdPair`] and [`AuctionOrderIdPair`] are the stored records. Both implement
//! [`BookRecord`], which carries the identity scope (`Key`) so the store and the shared
//! validation core work for either variant.
//! [`OrderExecution`] and [`CancelledOrder`] are the inbound facts, generic over that key.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::types::{AuctionId, AuctionOrderId, OrderId, PublicKey, Side};

/// A record the book store can index.
pub trait BookRecord: Clone + Send + Sync + 'static {
    /// Identity within the record's scope (global for limit, per auction for auction orders).
    type Key: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
    fn pubkey(&self) -> &PublicKey;
    fn side(&self) -> Side;
    fn price(&self) -> Decimal;
    /// Remaining (unfilled) quantity.
    fn quantity(&self) -> Decimal;
    fn set_quantity(&mut self, quantity: Decimal);
}

/// Resting order in a continuous limit book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderIdPair {
    pub order_id: OrderId,
    pub pubkey: PublicKey,
    pub side: Side,
    pub price: Decimal,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// Placement time.
    pub timestamp: u64,
}

/// Resting order in one auction round. No timestamp: a round's orders are simultaneous.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionOrderIdPair {
    pub auction_id: AuctionId,
    pub order_id: OrderId,
    pub pubkey: PublicKey,
    pub side: Side,
    pub price: Decimal,
    /// Remaining quantity.
    pub quantity: Decimal,
}

impl AuctionOrderIdPair {
    pub fn id(&self) -> AuctionOrderId {
        AuctionOrderId::new(self.auction_id, self.order_id)
    }
}

impl BookRecord for LimitOrderIdPair {
    type Key = OrderId;

    fn key(&self) -> OrderId {
        self.order_id
    }

    fn pubkey(&self) -> &PublicKey {
        &self.pubkey
    }

    fn side(&self) -> Side {
        self.side
    }

    fn price(&self) -> Decimal {
        self.price
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
    }
}

impl BookRecord for AuctionOrderIdPair {
    type Key = AuctionOrderId;

    fn key(&self) -> AuctionOrderId {
        self.id()
    }

    fn pubkey(&self) -> &PublicKey {
        &self.pubkey
    }

    fn side(&self) -> Side {
        self.side
    }

    fn price(&self) -> Decimal {
        self.price
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
    }
}

/// Some quantity of an order traded at a price.
///
/// `remaining_qty` is the matching engine's view of the order after the fill; the book
/// rejects the execution if it disagrees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecution<K> {
    pub order_id: K,
    pub executed_qty: Decimal,
    pub exec_price: Decimal,
    pub remaining_qty: Decimal,
}

/// Why an order was withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Requested,
    Expired,
    SelfTrade,
    Administrative,
}

/// An order was withdrawn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledOrder<K> {
    pub order_id: K,
    pub reason: CancelReason,
    pub timestamp: u64,
}

pub type LimitExecution = OrderExecution<OrderId>;
pub type AuctionExecution = OrderExecution<AuctionOrderId>;
pub type LimitCancel = CancelledOrder<OrderId>;
pub type AuctionCancel = CancelledOrder<AuctionOrderId>;
