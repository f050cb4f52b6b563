//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules. They provide
//! semantic meaning and enable future type evolution without touching
//! every call site.

/// User id - globally unique, issued by the authentication collaborator.
pub type UserId = u64;

/// Order id - unique within the exchange, monotonically assigned.
pub type OrderId = u64;

/// Trade id - unique within the exchange, monotonically assigned.
pub type TradeId = u64;

/// Identifies one incoming order's batch of fills as it flows from the
/// matching engine to the candle builder.
pub type BatchId = u64;

/// Sequence number for ordering (order creation tiebreak, job ordering).
pub type SeqNum = u64;

/// Ticker symbol. The core trades exactly one, but the type stays a
/// `String` (not a fixed enum) so tests can exercise more than one.
pub type Symbol = String;
