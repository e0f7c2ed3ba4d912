//! Per-currency-pair order book (spec §3 OrderBookSide, §4.1 "Book sort &
//! tie-breaks"). Only ids and the ordering keys live here; the Order Manager
//! owns the actual `Order` records in its index, keeping this structure
//! small enough to hold under one `parking_lot::Mutex` per pair (spec §5:
//! "the in-process order book is guarded by a per-pair mutex").

use crate::core::ids::OrderId;
use crate::core::order::Side;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: OrderId,
    pub is_market: bool,
    pub price: Option<Decimal>,
    pub created_at: SystemTime,
}

/// Comparator producing the book's iteration order for one side: market
/// orders first, then strict price priority, then FIFO by `created_at`,
/// then lexicographic `order_id` as the final, fully-deterministic tie
/// break (spec §4.1).
fn compare_entries(side: Side, a: &BookEntry, b: &BookEntry) -> Ordering {
    match (a.is_market, b.is_market) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    if !a.is_market {
        let price_order = match side {
            Side::Buy => b.price.cmp(&a.price), // descending
            Side::Sell => a.price.cmp(&b.price), // ascending
        };
        if price_order != Ordering::Equal {
            return price_order;
        }
    }
    let time_order = a.created_at.cmp(&b.created_at);
    if time_order != Ordering::Equal {
        return time_order;
    }
    a.order_id.cmp(&b.order_id)
}

#[derive(Debug, Default)]
pub struct OrderBookSide {
    side: Option<Side>,
    entries: Vec<BookEntry>,
}

impl OrderBookSide {
    fn new(side: Side) -> Self {
        Self {
            side: Some(side),
            entries: Vec::new(),
        }
    }

    fn side(&self) -> Side {
        self.side.expect("side is set on construction")
    }

    pub fn insert(&mut self, entry: BookEntry) {
        let side = self.side();
        let pos = self
            .entries
            .partition_point(|existing| compare_entries(side, existing, &entry) != Ordering::Greater);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, order_id: OrderId) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.order_id == order_id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn depth(&self, levels: usize) -> Vec<BookEntry> {
        self.entries.iter().take(levels).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct OrderBook {
    pub buy: OrderBookSide,
    pub sell: OrderBookSide,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            buy: OrderBookSide::new(Side::Buy),
            sell: OrderBookSide::new(Side::Sell),
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn entry(id: u128, is_market: bool, price: Option<Decimal>, offset_ms: u64) -> BookEntry {
        BookEntry {
            order_id: OrderId::from_raw(id),
            is_market,
            price,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_millis(offset_ms),
        }
    }

    #[test]
    fn market_orders_precede_limits_on_buy_side() {
        let mut side = OrderBookSide::new(Side::Buy);
        side.insert(entry(1, false, Some(dec!(1.10)), 0));
        side.insert(entry(2, true, None, 1));
        let depth = side.depth(10);
        assert_eq!(depth[0].order_id, OrderId::from_raw(2));
    }

    #[test]
    fn buy_side_orders_by_descending_price_then_fifo() {
        let mut side = OrderBookSide::new(Side::Buy);
        side.insert(entry(1, false, Some(dec!(1.10)), 0));
        side.insert(entry(2, false, Some(dec!(1.12)), 1));
        side.insert(entry(3, false, Some(dec!(1.10)), 2));
        let depth = side.depth(10);
        let ids: Vec<u128> = depth.iter().map(|e| e.order_id.as_u128()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn sell_side_orders_by_ascending_price() {
        let mut side = OrderBookSide::new(Side::Sell);
        side.insert(entry(1, false, Some(dec!(1.12)), 0));
        side.insert(entry(2, false, Some(dec!(1.10)), 1));
        let depth = side.depth(10);
        assert_eq!(depth[0].order_id, OrderId::from_raw(2));
    }

    #[test]
    fn remove_drops_the_matching_entry_only() {
        let mut side = OrderBookSide::new(Side::Buy);
        side.insert(entry(1, false, Some(dec!(1.10)), 0));
        side.insert(entry(2, false, Some(dec!(1.12)), 1));
        assert!(side.remove(OrderId::from_raw(1)));
        assert_eq!(side.len(), 1);
        assert_eq!(side.depth(10)[0].order_id, OrderId::from_raw(2));
    }
}
