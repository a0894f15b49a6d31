pub mod ema;

pub use ema::EmaCrossIndicator;
