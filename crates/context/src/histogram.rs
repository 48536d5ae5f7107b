//! Histogram of returns.
//!
//! Counts values in fixed-width buckets keyed by the bucket's lower edge.

use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// Bucketed counts of return values.
#[derive(Debug, Clone)]
pub struct ReturnHistogram {
    /// Bucket width (e.g., 0.01 for 1%).
    bucket_width: f64,
    /// Count by bucket lower edge.
    bins: BTreeMap<OrderedFloat<f64>, usize>,
    /// Total values added.
    total: usize,
}

impl ReturnHistogram {
    /// Create an empty histogram.
    pub fn new(bucket_width: f64) -> Self {
        Self {
            bucket_width,
            bins: BTreeMap::new(),
            total: 0,
        }
    }

    /// Get the bucket key for a value.
    fn bin_key(&self, value: f64) -> OrderedFloat<f64> {
        OrderedFloat((value / self.bucket_width).floor() * self.bucket_width)
    }

    /// Add a value. Non-finite values are ignored.
    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let key = self.bin_key(value);
        *self.bins.entry(key).or_insert(0) += 1;
        self.total += 1;
    }

    /// Counts by bucket lower edge.
    pub fn bins(&self) -> &BTreeMap<OrderedFloat<f64>, usize> {
        &self.bins
    }

    /// Bucket width.
    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    /// Lower edge of the most populated bucket (lowest on ties).
    pub fn mode(&self) -> Option<f64> {
        let mut best: Option<(OrderedFloat<f64>, usize)> = None;
        for (&key, &count) in &self.bins {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((key, count));
            }
        }
        best.map(|(key, _)| key.0)
    }

    /// Fraction of values bucketed below `threshold`.
    ///
    /// `threshold` is expected on a bucket edge.
    pub fn fraction_below(&self, threshold: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let below: usize = self
            .bins
            .range(..OrderedFloat(threshold - self.bucket_width / 2.0))
            .map(|(_, &c)| c)
            .sum();
        below as f64 / self.total as f64
    }

    /// Total values added.
    pub fn total_count(&self) -> usize {
        self.total
    }

    /// Number of non-empty buckets.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }
}
