/// Fixture documents and the name index derived from snapshots.
pub mod fixture;
pub mod name_index;

pub use fixture::{EpochChangeReason, Fixture, Market, MatchStatus, ResourceSummary, Selection};
pub use name_index::{MarketNames, MarketRecord, NameIndex};
