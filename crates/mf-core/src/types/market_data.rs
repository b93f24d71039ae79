//! Market data structures. Quotes in, statistics out.
//!
//! # Timestamp convention
//!
//! A [`Quote`] is stamped with the moment it was decoded (sources do not
//! send timestamps). An [`AggregatedStat`] is stamped with the tick time at
//! which its window was reduced.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::key::WindowKey;

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// One decoded price observation from a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub source: String,
    pub symbol: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn key(&self) -> WindowKey {
        WindowKey::new(&self.source, &self.symbol)
    }
}

/// A price is usable when it is finite and not negative.
#[inline]
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

// ---------------------------------------------------------------------------
// WindowStats
// ---------------------------------------------------------------------------

/// Summary of the valid samples in one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl WindowStats {
    /// Reduce a set of samples. Returns `None` for an empty window.
    ///
    /// The average is a running mean, so it stays finite for any finite
    /// samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let (&first, rest) = samples.split_first()?;
        let mut average = first;
        let mut minimum = first;
        let mut maximum = first;
        for (i, &p) in rest.iter().enumerate() {
            average += (p - average) / (i + 2) as f64;
            minimum = minimum.min(p);
            maximum = maximum.max(p);
        }
        Some(Self {
            count: samples.len(),
            average,
            minimum,
            maximum,
        })
    }
}

impl std::fmt::Display for WindowStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} avg={:.8} min={:.8} max={:.8}",
            self.count, self.average, self.minimum, self.maximum
        )
    }
}

// ---------------------------------------------------------------------------
// AggregatedStat
// ---------------------------------------------------------------------------

/// The per-tick reduction of one window, handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedStat {
    pub source: String,
    pub symbol: String,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    /// Logged, not persisted.
    pub sample_count: usize,
    pub computed_at: DateTime<Utc>,
}

impl AggregatedStat {
    pub fn new(key: &WindowKey, stats: WindowStats, computed_at: DateTime<Utc>) -> Self {
        Self {
            source: key.source().to_string(),
            symbol: key.symbol().to_string(),
            average: stats.average,
            minimum: stats.minimum,
            maximum: stats.maximum,
            sample_count: stats.count,
            computed_at,
        }
    }

    pub fn key(&self) -> WindowKey {
        WindowKey::new(&self.source, &self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_three_samples() {
        let stats = WindowStats::from_samples(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.average, 20.0);
        assert_eq!(stats.minimum, 10.0);
        assert_eq!(stats.maximum, 30.0);
    }

    #[test]
    fn empty_window_has_no_stats() {
        assert!(WindowStats::from_samples(&[]).is_none());
    }

    #[test]
    fn single_sample_window() {
        let stats = WindowStats::from_samples(&[42.5]).unwrap();
        assert_eq!((stats.average, stats.minimum, stats.maximum), (42.5, 42.5, 42.5));
    }

    #[test]
    fn huge_prices_keep_a_finite_average() {
        let stats = WindowStats::from_samples(&[1e308, 1e308]).unwrap();
        assert_eq!(stats.average, 1e308);

        let stats = WindowStats::from_samples(&[f64::MAX, f64::MAX, 0.0]).unwrap();
        assert!(stats.average.is_finite());
        assert_eq!(stats.maximum, f64::MAX);
    }

    #[test]
    fn price_validity() {
        assert!(is_valid_price(0.0));
        assert!(is_valid_price(42000.5));
        assert!(!is_valid_price(-1.0));
        assert!(!is_valid_price(f64::NAN));
        assert!(!is_valid_price(f64::INFINITY));
    }

    #[test]
    fn stat_carries_key_halves() {
        let key = WindowKey::new("ex1", "ETHUSD");
        let stats = WindowStats::from_samples(&[1.0, 3.0]).unwrap();
        let stat = AggregatedStat::new(&key, stats, Utc::now());
        assert_eq!(stat.source, "ex1");
        assert_eq!(stat.symbol, "ETHUSD");
        assert_eq!(stat.average, 2.0);
        assert_eq!(stat.key(), key);
    }
}
