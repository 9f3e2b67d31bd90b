//! Humus value → fertilization multiplier, area-weighted.
//!
//! Both distributors work on the distinct humus values of a map, never on
//! cells: cells sharing a value share a multiplier. Quantisation is by
//! cumulative *area*, so each tier covers a predictable share of the field
//! whatever the shape of the humus histogram.
//!
//! Key `0` is the no-data value. It is never quantised and always maps to
//! [`NO_DATA_FACTOR`].
use std::collections::BTreeMap;

/// Distinct humus value → total area (m²) of the cells carrying it.
pub type HumusAreaMap = BTreeMap<i64, f64>;

/// Distinct humus value → fertilization multiplier.
pub type FertilizerRateMap = BTreeMap<i64, f64>;

/// Multiplier of the no-data key: apply nothing unless interpolating.
pub const NO_DATA_FACTOR: f64 = -1.0;

/// Slack on band-boundary comparisons for accumulated rounding in area shares.
const BAND_EPSILON: f64 = 1e-9;

fn sentinel() -> FertilizerRateMap {
    FertilizerRateMap::from([(0, NO_DATA_FACTOR)])
}

/// Factor for `key`; keys the map does not know look up as `0`.
pub fn factor_for(rates: &FertilizerRateMap, key: i64) -> f64 {
    rates.get(&key).copied().unwrap_or(0.0)
}

/// Sum the areas of features per distinct humus value.
pub fn humus_area_map<I>(entries: I) -> HumusAreaMap
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut map = HumusAreaMap::new();
    for (humus, area) in entries {
        *map.entry(humus).or_insert(0.0) += area;
    }
    map
}

/// Valid (non-zero key) entries in ascending humus order with their total area.
fn quantisable(map: &HumusAreaMap) -> (Vec<(i64, f64)>, f64) {
    let entries: Vec<(i64, f64)> = map.iter().filter(|(&k, _)| k != 0).map(|(&k, &a)| (k, a)).collect();
    let total = entries.iter().map(|(_, a)| a).sum();
    (entries, total)
}

/// Walk area shares (ascending humus order) through `factors.len()` bands
/// of equal area. A share lying in one band gets that band's factor; a
/// share straddling boundaries gets the area-weighted blend of every band
/// it covers.
fn band_walk(shares: &[f64], factors: &[f64]) -> Vec<f64> {
    let n = factors.len();
    let band = 1.0 / n as f64;
    let last = shares.len().saturating_sub(1);

    let mut out = Vec::with_capacity(shares.len());
    let mut idx = 0usize;
    let mut band_end = band;
    let mut cumulative = 0.0f64;
    // Share of area already assigned to the current band.
    let mut consumed = 0.0f64;

    for (i, &share) in shares.iter().enumerate() {
        cumulative = if i == last { 1.0 } else { cumulative + share };

        if share <= 0.0 || cumulative <= band_end + BAND_EPSILON {
            consumed = consumed.max(cumulative);
            out.push(factors[idx]);
            continue;
        }

        let mut factor = 0.0;
        while cumulative > band_end + BAND_EPSILON && idx + 1 < n {
            factor += factors[idx] * (band_end - consumed) / share;
            consumed = band_end;
            idx += 1;
            band_end += band;
        }
        factor += factors[idx] * (cumulative - consumed) / share;
        consumed = cumulative;
        out.push(factor);
    }
    out
}

/// Five-step (or N-step) distribution: equal-area quantiles of the humus
/// values, `factors[0]` for the poorest soil, the last factor for the richest.
///
/// An empty map, or one holding only the no-data key, yields `{0 → -1}`.
pub fn distribute_steps(map: &HumusAreaMap, factors: &[f64]) -> FertilizerRateMap {
    let (entries, total) = quantisable(map);
    if entries.is_empty() || factors.is_empty() || total <= 0.0 {
        return sentinel();
    }

    let shares: Vec<f64> = entries.iter().map(|(_, a)| a / total).collect();
    let ratios = band_walk(&shares, factors);

    let mut rates: FertilizerRateMap = entries.iter().map(|(k, _)| *k).zip(ratios).collect();
    rates.insert(0, NO_DATA_FACTOR);
    tracing::trace!(values = entries.len(), steps = factors.len(), "stepped distribution");
    rates
}

/// Continuous distribution: each value's factor falls linearly from
/// `+range_max` to `-range_max` with the midpoint of its cumulative-area
/// band. Rounded to 10 decimals; a single value gets `0`.
pub fn distribute_stepless(map: &HumusAreaMap, range_max: f64) -> FertilizerRateMap {
    let (entries, total) = quantisable(map);
    if entries.is_empty() || total <= 0.0 {
        return sentinel();
    }

    let mut rates = FertilizerRateMap::new();
    let mut before = 0.0;
    for (humus, area) in &entries {
        let share = area / total;
        let position = before + share / 2.0;
        before += share;
        let factor = range_max * (1.0 - 2.0 * position);
        rates.insert(*humus, (factor * 1e10).round() / 1e10);
    }
    rates.insert(0, NO_DATA_FACTOR);
    tracing::trace!(values = entries.len(), range_max, "stepless distribution");
    rates
}
