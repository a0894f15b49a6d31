use common::{Candle, Crossover, EmaCross, EmaPoint};

/// Fast/slow EMA crossover indicator.
///
/// EMA recurrence: `ema[0] = close[0]`, `ema[i] = close[i]·α + ema[i-1]·(1−α)`
/// with `α = 2 / (length + 1)`. No warm-up bias correction is applied.
/// The crossover is read from the last two points only, which must be the
/// two most recently closed candles.
#[derive(Debug, Clone)]
pub struct EmaCrossIndicator {
    pub fast: usize,
    pub slow: usize,
}

impl EmaCrossIndicator {
    /// Fewer candles than this is "no signal", not an error.
    pub const MIN_CANDLES: usize = 3;

    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast > 0 && slow > 0, "EMA lengths must be greater than zero");
        Self { fast, slow }
    }

    /// Fast and slow EMA per candle, aligned with `candles`.
    pub fn series(&self, candles: &[Candle]) -> Vec<EmaPoint> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        ema(&closes, self.fast)
            .into_iter()
            .zip(ema(&closes, self.slow))
            .map(|(fast, slow)| EmaPoint { fast, slow })
            .collect()
    }

    /// Classify the crossover on the last closed candle.
    /// Returns `Crossover::None` if there are fewer than `MIN_CANDLES` candles.
    pub fn compute(&self, candles: &[Candle]) -> Crossover {
        if candles.len() < Self::MIN_CANDLES {
            return Crossover::None;
        }
        let points = self.series(candles);
        let n = points.len();
        classify(points[n - 2], points[n - 1])
    }
}

/// EMA series over `values` (oldest first), seeded with the first value.
pub fn ema(values: &[f64], length: usize) -> Vec<f64> {
    let alpha = 2.0 / (length as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => v * alpha + p * (1.0 - alpha),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Bullish when fast moves from `<=` slow to `>` slow, bearish for the mirror
/// case. Equal at both points is no crossover.
pub fn classify(prev: EmaPoint, now: EmaPoint) -> Crossover {
    let values = EmaCross {
        fast_now: now.fast,
        slow_now: now.slow,
        fast_prev: prev.fast,
        slow_prev: prev.slow,
    };

    if prev.fast <= prev.slow && now.fast > now.slow {
        Crossover::Bullish(values)
    } else if prev.fast >= prev.slow && now.fast < now.slow {
        Crossover::Bearish(values)
    } else {
        Crossover::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::Direction;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn point(fast: f64, slow: f64) -> EmaPoint {
        EmaPoint { fast, slow }
    }

    #[test]
    fn ema_seeds_with_first_value() {
        // alpha = 2/(3+1) = 0.5
        let out = ema(&[10.0, 11.0, 12.0, 13.0], 3);
        let expected = [10.0, 10.5, 11.25, 12.125];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-10, "got {got}, want {want}");
        }
    }

    #[test]
    fn ema_of_empty_input_is_empty() {
        assert!(ema(&[], 9).is_empty());
    }

    #[test]
    fn fewer_than_three_candles_is_no_signal() {
        let ind = EmaCrossIndicator::new(1, 3);
        assert_eq!(ind.compute(&[]), Crossover::None);
        assert_eq!(ind.compute(&candles(&[10.0])), Crossover::None);
        assert_eq!(ind.compute(&candles(&[10.0, 50.0])), Crossover::None);
    }

    #[test]
    fn bullish_cross_from_equal_emas() {
        // fast (len 1) tracks the close; slow (len 3) has alpha 0.5.
        // index 1: fast 10, slow 10. index 2: fast 12, slow 11.
        let ind = EmaCrossIndicator::new(1, 3);
        let result = ind.compute(&candles(&[10.0, 10.0, 12.0]));
        assert_eq!(
            result,
            Crossover::Bullish(EmaCross {
                fast_now: 12.0,
                slow_now: 11.0,
                fast_prev: 10.0,
                slow_prev: 10.0,
            })
        );
    }

    #[test]
    fn bearish_cross_after_uptrend_drop() {
        let ind = EmaCrossIndicator::new(3, 8);
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        closes.push(60.0);
        let result = ind.compute(&candles(&closes));
        assert_eq!(result.direction(), Some(Direction::Bearish));
        let v = result.values().unwrap();
        assert!(v.fast_prev > v.slow_prev);
        assert!(v.fast_now < v.slow_now);
    }

    #[test]
    fn steady_trend_has_no_crossover() {
        let ind = EmaCrossIndicator::new(3, 8);
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(ind.compute(&candles(&closes)), Crossover::None);
    }

    #[test]
    fn flat_series_has_no_crossover() {
        let ind = EmaCrossIndicator::new(9, 21);
        assert_eq!(ind.compute(&candles(&[5.0; 50])), Crossover::None);
    }

    #[test]
    fn classify_boundaries() {
        // Equal at prev resolves by direction at now.
        assert!(matches!(classify(point(1.0, 1.0), point(2.0, 1.5)), Crossover::Bullish(_)));
        assert!(matches!(classify(point(1.0, 1.0), point(1.0, 1.5)), Crossover::Bearish(_)));
        // Equal at both points is not a crossover.
        assert_eq!(classify(point(1.0, 1.0), point(1.0, 1.0)), Crossover::None);
        // Touching from below without crossing is not a crossover.
        assert_eq!(classify(point(0.5, 1.0), point(1.0, 1.0)), Crossover::None);
        // Staying above is not a crossover.
        assert_eq!(classify(point(2.0, 1.0), point(3.0, 1.0)), Crossover::None);
    }

    #[test]
    fn series_is_aligned_with_candles() {
        let ind = EmaCrossIndicator::new(2, 5);
        let cs = candles(&[1.0, 2.0, 3.0, 4.0]);
        let points = ind.series(&cs);
        assert_eq!(points.len(), cs.len());
        assert_eq!(points[0], point(1.0, 1.0));
    }

    #[test]
    #[should_panic(expected = "greater than zero")]
    fn zero_length_panics() {
        EmaCrossIndicator::new(0, 21);
    }
}
