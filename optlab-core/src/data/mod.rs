//! Price and signal tables.

pub mod frame;

pub use frame::{DateFrame, FrameError, PriceTable, SignalMatrix};
