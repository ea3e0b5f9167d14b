//! Team-balanced combination search
//!
//! Given one bucket's entries and a playlist layout, finds the best seat-exact,
//! compatible combination and assigns its teams and seats.

pub mod finder;

pub use finder::{MatchFinder, MatchProposal, SeatedEntry, TeamPartition};
