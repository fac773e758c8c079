/// Source of monotonically increasing, process-unique values
///
/// Every outbound authenticated exchange request carries a nonce. The
/// generator is injected rather than kept as module-level state so tests
/// can supply deterministic sequences.
pub trait NonceProvider: Send + Sync {
    /// Next nonce; strictly greater than every previously returned value
    fn next(&self) -> u64;
}
