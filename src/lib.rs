//! Competitor catalog sync
//!
//! Pulls a vendor's full product search result set within per-credential rate
//! limits, normalizes it, and merges it into a store that keeps an
//! append-only price and inventory history per part number.

pub mod application;
pub mod domain;
pub mod infrastructure;

#[doc(hidden)]
pub mod test_utils;
