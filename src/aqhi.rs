//! Rolling aggregation and the composite health index.
//!
//! The index follows the AQHI construction: a scaled sum of exponential
//! terms over 3-hour rolling means of NO2, O3 and PM2.5, floored by a
//! short-term particulate term so 1-hour PM spikes can raise the reported
//! value but never lower it.

use crate::stats::mean;
use crate::types::{CalibratedRow, Pollutant};

/// Samples per 3-hour trailing window at the 15-minute logger cadence.
pub const SAMPLES_3H: usize = 12;
/// Samples per 1-hour trailing window.
pub const SAMPLES_1H: usize = 4;

/// Scale constant applied to the summed exponential terms.
const AQHI_SCALE: f64 = 100.0 * (10.0 / 10.4);

/// Per-pollutant rate constants, in [`Pollutant::AQHI`] order.
const AQHI_RATES: [f64; 3] = [0.000871, 0.000537, 0.000487];

/// Index fields derived for one row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndexRow {
    pub aqhi: Option<f64>,
    pub top_contributor: Option<Pollutant>,
}

/// Right-aligned trailing rolling mean over a fixed sample count.
///
/// Rows with fewer than `window - 1` predecessors get a missing value, not
/// zero. Within a full window the mean is taken over the defined samples;
/// a fully-missing window stays missing.
pub fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    assert!(window > 0, "window must be at least one sample");

    series
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                return None;
            }
            let defined: Vec<f64> = series[i + 1 - window..=i]
                .iter()
                .filter_map(|v| *v)
                .collect();
            if defined.is_empty() {
                None
            } else {
                Some(mean(&defined))
            }
        })
        .collect()
}

/// Derives the composite index and contributor label for every row.
///
/// `rows` must already be sorted ascending by timestamp; rolling windows
/// are meaningless otherwise.
pub fn annotate(rows: &[CalibratedRow]) -> Vec<IndexRow> {
    debug_assert!(
        rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "rows must be sorted ascending by timestamp"
    );

    let means_3h: Vec<Vec<Option<f64>>> = Pollutant::AQHI
        .iter()
        .map(|p| {
            let series: Vec<Option<f64>> = rows.iter().map(|r| r.value(*p)).collect();
            rolling_mean(&series, SAMPLES_3H)
        })
        .collect();

    let pm_series: Vec<Option<f64>> = rows.iter().map(|r| r.value(Pollutant::Pm25)).collect();
    let pm_1h = rolling_mean(&pm_series, SAMPLES_1H);

    (0..rows.len())
        .map(|i| {
            let terms = [
                means_3h[0][i].map(|m| term(AQHI_RATES[0], m)),
                means_3h[1][i].map(|m| term(AQHI_RATES[1], m)),
                means_3h[2][i].map(|m| term(AQHI_RATES[2], m)),
            ];
            compose(terms, pm_1h[i])
        })
        .collect()
}

fn term(rate: f64, rolling_mean: f64) -> f64 {
    (rate * rolling_mean).exp() - 1.0
}

/// Combines the three exponential terms and the particulate floor.
fn compose(terms: [Option<f64>; 3], pm_1h: Option<f64>) -> IndexRow {
    let composite = match terms {
        [Some(a), Some(b), Some(c)] => Some(((a + b + c) * AQHI_SCALE).round()),
        _ => None,
    };
    let floor = pm_1h.map(|m| (m / 10.0).ceil());

    let aqhi = match (composite, floor) {
        (Some(c), Some(f)) => Some(c.max(f)),
        (Some(c), None) => Some(c),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    };

    IndexRow {
        aqhi,
        top_contributor: top_contributor(terms),
    }
}

/// Fractional share of the summed terms attributable to each pollutant.
///
/// Shares are defined only for defined terms, and only when the sum over
/// the defined terms is non-zero. When all three terms are defined, the
/// shares sum to 1.
pub fn contributor_shares(terms: [Option<f64>; 3]) -> [Option<f64>; 3] {
    let sum: f64 = terms.iter().flatten().sum();
    if sum == 0.0 {
        return [None; 3];
    }
    terms.map(|t| t.map(|v| v / sum))
}

/// Picks the pollutant with the largest share. Missing shares compare as
/// negative infinity; ties keep the earliest entry of [`Pollutant::AQHI`],
/// an arbitrary but fixed order. `None` only when every share is missing.
fn top_contributor(terms: [Option<f64>; 3]) -> Option<Pollutant> {
    let shares = contributor_shares(terms);
    if shares.iter().all(|s| s.is_none()) {
        return None;
    }

    let mut best = 0usize;
    for i in 1..shares.len() {
        let current = shares[i].unwrap_or(f64::NEG_INFINITY);
        let leader = shares[best].unwrap_or(f64::NEG_INFINITY);
        if current > leader {
            best = i;
        }
    }

    shares[best].map(|_| Pollutant::AQHI[best])
}
