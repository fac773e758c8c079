use serde::{Deserialize, Serialize};

/// Exchange order flag bitset
///
/// The exchange encodes order attributes (hidden, post-only, ...) as a
/// single integer bitmask on order submission and echoes it back on
/// acknowledgements -- when it echoes it at all. Flag values follow the
/// exchange's wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderFlags(u32);

impl OrderFlags {
    pub const NONE: OrderFlags = OrderFlags(0);
    /// Order is not visible in the public book
    pub const HIDDEN: OrderFlags = OrderFlags(64);
    /// Order may only close an existing position
    pub const CLOSE: OrderFlags = OrderFlags(512);
    /// Order may only reduce an existing position
    pub const REDUCE_ONLY: OrderFlags = OrderFlags(1024);
    /// Order must rest on the book or be canceled
    pub const POST_ONLY: OrderFlags = OrderFlags(4096);
    /// One-cancels-other order pair
    pub const OCO: OrderFlags = OrderFlags(16384);

    pub fn new(bits: u32) -> Self {
        OrderFlags(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: OrderFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: OrderFlags) {
        self.0 |= other.0;
    }

    pub fn union(&self, other: OrderFlags) -> OrderFlags {
        OrderFlags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut flags = OrderFlags::NONE;
        assert!(flags.is_empty());

        flags.insert(OrderFlags::HIDDEN);
        flags.insert(OrderFlags::POST_ONLY);

        assert!(flags.contains(OrderFlags::HIDDEN));
        assert!(flags.contains(OrderFlags::POST_ONLY));
        assert!(!flags.contains(OrderFlags::REDUCE_ONLY));
        assert_eq!(flags.bits(), 64 + 4096);
    }

    #[test]
    fn test_union() {
        let flags = OrderFlags::HIDDEN.union(OrderFlags::OCO);
        assert!(flags.contains(OrderFlags::HIDDEN));
        assert!(flags.contains(OrderFlags::OCO));
    }
}
