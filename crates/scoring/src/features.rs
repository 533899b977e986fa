use common::{FeatureSet, PriceBar};

use crate::config::ScoringConfig;
use crate::indicators::{
    distance_to_breakout_pct, prior_move_pct, Consolidation, Sma, TrendSlope,
};

/// Compute the feature set as of the last bar of `window`.
///
/// Callers pass `&bars[..=i]` to evaluate day `i`, so nothing after the
/// as-of day can influence the result. An empty window yields defaults.
pub fn extract_features(window: &[PriceBar], cfg: &ScoringConfig) -> FeatureSet {
    let Some(last) = window.last() else {
        return FeatureSet::default();
    };
    let close = last.close;
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();

    let fast = Sma::new(cfg.sma_fast);
    let slow = Sma::new(cfg.sma_slow);
    let slope = TrendSlope::new(cfg.slope_period);

    let consolidation =
        Consolidation::new(cfg.consolidation_lookback, cfg.min_consolidation_bars).analyze(window);

    FeatureSet {
        prior_move_pct: prior_move_pct(&closes, cfg.prior_move_lookback),
        sma_fast_slope: slope.compute(&fast.series(&closes, cfg.slope_period)),
        sma_slow_slope: slope.compute(&slow.series(&closes, cfg.slope_period)),
        pullback_pct: consolidation.pullback_pct,
        volume_decline_pct: consolidation.volume_decline_pct,
        range_tightening: consolidation.range_tightening,
        distance_to_breakout_pct: distance_to_breakout_pct(window, cfg.consolidation_lookback),
        above_sma_fast: fast.compute(&closes).is_some_and(|avg| close > avg),
        above_sma_slow: slow.compute(&closes).is_some_and(|avg| close > avg),
    }
}
