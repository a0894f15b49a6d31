//! Signal detection: EMA crossover on the last closed candle, order-book
//! confirmation, and per-symbol de-duplication of alerts.

pub mod alert;
pub mod confirm;
pub mod indicators;
pub mod tracker;

pub use alert::Alert;
pub use confirm::confirm;
pub use indicators::EmaCrossIndicator;
pub use tracker::{EvaluationOutcome, SignalTracker, SymbolState};
