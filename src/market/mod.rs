//! Shared market state written by feeds and read by the detector.

mod store;

pub use store::QuoteStore;
