use common::{Direction, OrderBookSnapshot};

/// Decide whether the order book confirms a crossover.
///
/// Books with `|delta| < min_abs_delta` never confirm. Past the deadband the
/// policy is contrarian on `delta = ask_qty - bid_qty`: a bullish cross needs
/// `delta <= 0` and a bearish cross needs `delta >= 0`, so a perfectly
/// balanced book confirms either direction.
pub fn confirm(direction: Direction, book: &OrderBookSnapshot, min_abs_delta: f64) -> bool {
    let delta = book.delta();
    if delta.abs() < min_abs_delta {
        return false;
    }
    match direction {
        Direction::Bullish => delta <= 0.0,
        Direction::Bearish => delta >= 0.0,
    }
}
