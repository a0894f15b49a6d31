pub mod bybit;
pub mod scheduler;

pub use bybit::BybitClient;
pub use scheduler::{
    resolve_symbols, CycleReport, ScanScheduler, SchedulerHandle, Sleeper, TokioSleeper,
};
