pub mod config;
pub mod error;
pub mod market;
pub mod notifier;
pub mod types;

pub use config::{Config, SignalParams, SymbolSet};
pub use error::{Error, Result};
pub use market::MarketDataProvider;
pub use notifier::{escape_html, Notifier};
pub use types::*;
