//! Book store: the canonical in-memory indices for one book shard.
//!
//! Three indices are kept in lockstep: price level -> arrival-ordered order keys,
//! order key -> record, and public key -> (price level -> order keys). The record
//! itself lives only in the order index, so a remaining quantity can never disagree
//! between indices. The store has no policy: validation lives in [`crate::engine`].

use log::debug;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{BookError, BookResult};
use crate::order::BookRecord;
use crate::types::{PublicKey, Side};

/// Price level -> records at that price, in arrival order. Returned by value.
pub type BookView<R> = BTreeMap<Decimal, Vec<R>>;

type Levels<K> = BTreeMap<Decimal, Vec<K>>;

/// Indices for one book shard (a limit market or a single auction round).
#[derive(Debug)]
pub struct BookStore<R: BookRecord> {
    levels: Levels<R::Key>,
    orders: HashMap<R::Key, R>,
    by_pubkey: HashMap<PublicKey, Levels<R::Key>>,
    /// Keys that were filled or cancelled. Never accepted again.
    retired: HashSet<R::Key>,
}

impl<R: BookRecord> Default for BookStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BookRecord> BookStore<R> {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
            orders: HashMap::new(),
            by_pubkey: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    /// Adds a record at the back of its price level.
    pub fn insert(&mut self, record: R) -> BookResult<()> {
        let key = record.key();
        if self.orders.contains_key(&key) || self.retired.contains(&key) {
            return Err(BookError::DuplicateOrder(key.to_string()));
        }
        let price = record.price();
        self.levels.entry(price).or_default().push(key);
        self.by_pubkey
            .entry(*record.pubkey())
            .or_default()
            .entry(price)
            .or_default()
            .push(key);
        self.orders.insert(key, record);
        Ok(())
    }

    /// Sets the remaining quantity. At zero the record leaves every index.
    /// Returns the record as it stands after the fill.
    pub fn apply_fill(
        &mut self,
        key: R::Key,
        executed_qty: Decimal,
        new_remaining: Decimal,
    ) -> BookResult<R> {
        let record = self
            .orders
            .get_mut(&key)
            .ok_or_else(|| BookError::UnknownOrder(key.to_string()))?;
        record.set_quantity(new_remaining);
        let updated = record.clone();
        debug!(
            "fill applied order={} executed={} remaining={}",
            key, executed_qty, new_remaining
        );
        if new_remaining <= Decimal::ZERO {
            self.unlink(&key);
        }
        Ok(updated)
    }

    /// Removes a record from every index and retires its key.
    pub fn remove(&mut self, key: R::Key) -> BookResult<R> {
        self.unlink(&key)
            .ok_or_else(|| BookError::UnknownOrder(key.to_string()))
    }

    pub fn lookup(&self, key: R::Key) -> BookResult<R> {
        self.orders
            .get(&key)
            .cloned()
            .ok_or_else(|| BookError::UnknownOrder(key.to_string()))
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.orders.get(key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.orders.contains_key(key)
    }

    /// True if the key is live or was used before.
    pub fn is_used(&self, key: &R::Key) -> bool {
        self.orders.contains_key(key) || self.retired.contains(key)
    }

    /// Copy of the whole price-level index.
    pub fn snapshot(&self) -> BookView<R> {
        self.materialize(&self.levels)
    }

    /// Copy of the live orders owned by `pubkey`, by price level. Empty if none.
    pub fn by_public_key(&self, pubkey: &PublicKey) -> BookView<R> {
        match self.by_pubkey.get(pubkey) {
            Some(levels) => self.materialize(levels),
            None => BTreeMap::new(),
        }
    }

    /// Appends this store's levels into `out` (used to merge auction rounds).
    pub fn extend_view(&self, out: &mut BookView<R>) {
        for (price, records) in self.snapshot() {
            out.entry(price).or_default().extend(records);
        }
    }

    /// Appends this store's orders for `pubkey` into `out`.
    pub fn extend_pubkey_view(&self, pubkey: &PublicKey, out: &mut BookView<R>) {
        for (price, records) in self.by_public_key(pubkey) {
            out.entry(price).or_default().extend(records);
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Highest price with a resting buy.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.levels
            .iter()
            .rev()
            .find(|(_, keys)| self.any_on_side(keys, Side::Buy))
            .map(|(price, _)| *price)
    }

    /// Lowest price with a resting sell.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.levels
            .iter()
            .find(|(_, keys)| self.any_on_side(keys, Side::Sell))
            .map(|(price, _)| *price)
    }

    /// Cross-checks the three indices. Used by tests and invariant checks.
    pub fn is_consistent(&self) -> bool {
        let mut listed = 0usize;
        for (price, keys) in &self.levels {
            if keys.is_empty() {
                return false;
            }
            for key in keys {
                match self.orders.get(key) {
                    Some(r) if r.price() == *price && r.quantity() > Decimal::ZERO => listed += 1,
                    _ => return false,
                }
            }
        }
        if listed != self.orders.len() {
            return false;
        }

        let mut owned = 0usize;
        for (pubkey, levels) in &self.by_pubkey {
            if levels.is_empty() {
                return false;
            }
            for (price, keys) in levels {
                if keys.is_empty() {
                    return false;
                }
                for key in keys {
                    match self.orders.get(key) {
                        Some(r) if r.pubkey() == pubkey && r.price() == *price => owned += 1,
                        _ => return false,
                    }
                }
            }
        }
        if owned != self.orders.len() {
            return false;
        }

        self.orders.keys().all(|k| !self.retired.contains(k))
    }

    fn any_on_side(&self, keys: &[R::Key], side: Side) -> bool {
        keys.iter()
            .filter_map(|k| self.orders.get(k))
            .any(|r| r.side() == side)
    }

    fn materialize(&self, levels: &Levels<R::Key>) -> BookView<R> {
        levels
            .iter()
            .map(|(price, keys)| {
                let records = keys
                    .iter()
                    .filter_map(|k| self.orders.get(k).cloned())
                    .collect();
                (*price, records)
            })
            .collect()
    }

    /// Drops `key` from all indices, deleting emptied levels, and retires it.
    fn unlink(&mut self, key: &R::Key) -> Option<R> {
        let record = self.orders.remove(key)?;
        let price = record.price();
        remove_from_level(&mut self.levels, price, key);
        let pubkey = *record.pubkey();
        if let Some(levels) = self.by_pubkey.get_mut(&pubkey) {
            remove_from_level(levels, price, key);
            if levels.is_empty() {
                self.by_pubkey.remove(&pubkey);
            }
        }
        self.retired.insert(*key);
        Some(record)
    }
}

fn remove_from_level<K: PartialEq>(levels: &mut Levels<K>, price: Decimal, key: &K) {
    if let Some(queue) = levels.get_mut(&price) {
        if let Some(pos) = queue.iter().position(|k| k == key) {
            queue.remove(pos);
        }
        if queue.is_empty() {
            levels.remove(&price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{AuctionOrderIdPair, LimitOrderIdPair};
    use crate::types::{AuctionId, AuctionOrderId, OrderId, PUBKEY_LEN};
    use rust_decimal_macros::dec;

    fn key(n: u8) -> PublicKey {
        PublicKey::new([n; PUBKEY_LEN])
    }

    fn order(id: u64, side: Side, qty: Decimal, price: Decimal, owner: u8) -> LimitOrderIdPair {
        LimitOrderIdPair {
            order_id: OrderId(id),
            pubkey: key(owner),
            side,
            price,
            quantity: qty,
            timestamp: id,
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap();
        let got = store.lookup(OrderId(1)).unwrap();
        assert_eq!(got.quantity, dec!(5));
        assert_eq!(got.price, dec!(100));
        assert!(store.is_consistent());
    }

    #[test]
    fn insert_duplicate_rejected_and_state_unchanged() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap();
        let err = store.insert(order(1, Side::Sell, dec!(7), dec!(90), 2)).unwrap_err();
        assert_eq!(err, BookError::DuplicateOrder("1".into()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.level_count(), 1);
        assert!(store.by_public_key(&key(2)).is_empty());
        assert!(store.is_consistent());
    }

    #[test]
    fn retired_key_cannot_be_reinserted() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap();
        store.remove(OrderId(1)).unwrap();
        assert!(store.is_used(&OrderId(1)));
        let err = store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap_err();
        assert!(matches!(err, BookError::DuplicateOrder(_)));
    }

    #[test]
    fn partial_fill_updates_every_view() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Sell, dec!(10), dec!(101), 1)).unwrap();
        let updated = store.apply_fill(OrderId(1), dec!(4), dec!(6)).unwrap();
        assert_eq!(updated.quantity, dec!(6));
        assert_eq!(store.snapshot()[&dec!(101)][0].quantity, dec!(6));
        assert_eq!(store.by_public_key(&key(1))[&dec!(101)][0].quantity, dec!(6));
        assert!(store.is_consistent());
    }

    #[test]
    fn full_fill_removes_order_and_empty_level() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap();
        store.apply_fill(OrderId(1), dec!(5), Decimal::ZERO).unwrap();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
        assert!(store.by_public_key(&key(1)).is_empty());
        assert!(matches!(
            store.lookup(OrderId(1)),
            Err(BookError::UnknownOrder(_))
        ));
        assert!(store.is_consistent());
    }

    #[test]
    fn fill_unknown_order_fails() {
        let mut store: BookStore<LimitOrderIdPair> = BookStore::new();
        let err = store.apply_fill(OrderId(9), dec!(1), dec!(0)).unwrap_err();
        assert_eq!(err, BookError::UnknownOrder("9".into()));
    }

    #[test]
    fn remove_keeps_other_orders_at_level_in_arrival_order() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(1), dec!(100), 1)).unwrap();
        store.insert(order(2, Side::Buy, dec!(2), dec!(100), 2)).unwrap();
        store.insert(order(3, Side::Buy, dec!(3), dec!(100), 1)).unwrap();
        store.remove(OrderId(2)).unwrap();
        let ids: Vec<_> = store.snapshot()[&dec!(100)]
            .iter()
            .map(|o| o.order_id)
            .collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(3)]);
        assert!(store.by_public_key(&key(2)).is_empty());
        assert!(store.is_consistent());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(5), dec!(100), 1)).unwrap();
        let view = store.snapshot();
        store.remove(OrderId(1)).unwrap();
        assert_eq!(view[&dec!(100)].len(), 1);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn by_public_key_partitions_by_price() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(1), dec!(99), 1)).unwrap();
        store.insert(order(2, Side::Sell, dec!(1), dec!(101), 1)).unwrap();
        store.insert(order(3, Side::Sell, dec!(1), dec!(101), 2)).unwrap();
        let mine = store.by_public_key(&key(1));
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[&dec!(99)][0].order_id, OrderId(1));
        assert_eq!(mine[&dec!(101)].len(), 1);
    }

    #[test]
    fn best_bid_and_ask_skip_levels_of_other_side() {
        let mut store = BookStore::new();
        store.insert(order(1, Side::Buy, dec!(1), dec!(99), 1)).unwrap();
        store.insert(order(2, Side::Sell, dec!(1), dec!(101), 1)).unwrap();
        store.insert(order(3, Side::Sell, dec!(1), dec!(102), 1)).unwrap();
        assert_eq!(store.best_bid(), Some(dec!(99)));
        assert_eq!(store.best_ask(), Some(dec!(101)));
    }

    #[test]
    fn auction_keys_are_scoped_by_auction() {
        let mut store = BookStore::new();
        let a = AuctionOrderIdPair {
            auction_id: AuctionId(1),
            order_id: OrderId(1),
            pubkey: key(1),
            side: Side::Buy,
            price: dec!(50),
            quantity: dec!(3),
        };
        let mut b = a.clone();
        b.auction_id = AuctionId(2);
        store.insert(a).unwrap();
        store.insert(b).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains(&AuctionOrderId::new(AuctionId(2), OrderId(1))));
    }
}
