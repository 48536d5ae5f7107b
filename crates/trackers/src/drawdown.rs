//! Peak-to-trough drawdown scan.
//!
//! Recomputed from scratch on every call; no incremental state.

use crate::daily_return::price_return;
use pricestats_core::{DrawdownEpisode, PriceBasis, PricePoint};

/// Drawdown calculator over one price basis.
#[derive(Debug, Clone, Copy)]
pub struct DrawdownCalculator {
    basis: PriceBasis,
}

impl DrawdownCalculator {
    /// Create a calculator reading `basis` prices.
    pub fn new(basis: PriceBasis) -> Self {
        Self { basis }
    }

    /// Every episode found by a single pass over `points`.
    ///
    /// A new high resets peak and trough; each new trough below the running
    /// one records an episode against the current peak.
    pub fn episodes(&self, points: &[PricePoint]) -> Vec<DrawdownEpisode> {
        let mut episodes = Vec::new();
        let Some((&first, rest)) = points.split_first() else {
            return episodes;
        };

        let mut peak = first;
        let mut trough = first;
        for &point in rest {
            let price = point.price_for(self.basis);
            if price > peak.price_for(self.basis) {
                peak = point;
                trough = point;
            } else if price < trough.price_for(self.basis) {
                trough = point;
                episodes.push(DrawdownEpisode {
                    peak,
                    trough,
                    drawdown_return: price_return(peak.price_for(self.basis), price),
                });
            }
        }
        episodes
    }

    /// Episode with the most negative return.
    ///
    /// `None` for fewer than two points or a series that never declines.
    pub fn max_drawdown(&self, points: &[PricePoint]) -> Option<DrawdownEpisode> {
        if points.len() < 2 {
            return None;
        }
        self.episodes(points).into_iter().fold(None, |worst, episode| match worst {
            Some(w) if w.drawdown_return <= episode.drawdown_return => Some(w),
            _ => Some(episode),
        })
    }
}
