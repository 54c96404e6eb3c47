//! Bearing and pull autofill.
//!
//! Fills span lengths and bearings from pole coordinates, then pole
//! incoming/outgoing bearings from the spans touching each pole, then
//! `PULL_ft` from the line deflection. Values already present on a record are
//! never overwritten.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::models::{Pole, Span};
use crate::spatial::{distance_ft, final_bearing_deg, initial_bearing_deg, pull_ft, round2};

pub const DEFAULT_PULL_REFERENCE_FT: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofillOptions {
    /// Leg length used when measuring pull, in feet
    pub pull_reference_ft: f64,
}

impl Default for AutofillOptions {
    fn default() -> Self {
        Self {
            pull_reference_ft: DEFAULT_PULL_REFERENCE_FT,
        }
    }
}

/// Counts of values written by an autofill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofillReport {
    pub span_lengths: usize,
    pub span_bearings: usize,
    pub pole_bearings: usize,
    pub pulls: usize,
}

/// Derive missing bearings and pulls in place.
pub fn autofill_bearings_and_pull(
    poles: &mut [Pole],
    spans: &mut [Span],
    options: &AutofillOptions,
) -> AutofillReport {
    let mut report = AutofillReport::default();

    let positions: HashMap<String, [f64; 2]> = poles
        .iter()
        .filter(|p| !p.id.is_empty())
        .filter_map(|p| p.position().map(|pos| (p.id.clone(), pos)))
        .collect();

    for span in spans.iter_mut() {
        let (Some(&[lon1, lat1]), Some(&[lon2, lat2])) =
            (positions.get(&span.from_id), positions.get(&span.to_id))
        else {
            continue;
        };
        if span.from_id == span.to_id {
            continue;
        }
        if lenient::finite(span.length).is_none() {
            span.length = Some(round2(distance_ft(lat1, lon1, lat2, lon2)));
            report.span_lengths += 1;
        }
        if lenient::finite(span.outgoing_bearing_deg).is_none() {
            span.outgoing_bearing_deg = Some(round2(initial_bearing_deg(lat1, lon1, lat2, lon2)));
            report.span_bearings += 1;
        }
        if lenient::finite(span.incoming_bearing_deg).is_none() {
            span.incoming_bearing_deg = Some(round2(final_bearing_deg(lat1, lon1, lat2, lon2)));
            report.span_bearings += 1;
        }
    }

    // First span arriving at / leaving each pole, in input order.
    let mut arriving: HashMap<&str, f64> = HashMap::new();
    let mut leaving: HashMap<&str, f64> = HashMap::new();
    for span in spans.iter() {
        if let Some(bearing) = lenient::finite(span.incoming_bearing_deg) {
            if !span.to_id.is_empty() {
                arriving.entry(span.to_id.as_str()).or_insert(bearing);
            }
        }
        if let Some(bearing) = lenient::finite(span.outgoing_bearing_deg) {
            if !span.from_id.is_empty() {
                leaving.entry(span.from_id.as_str()).or_insert(bearing);
            }
        }
    }

    for pole in poles.iter_mut() {
        if lenient::finite(pole.incoming_bearing_deg).is_none() {
            if let Some(&bearing) = arriving.get(pole.id.as_str()) {
                pole.incoming_bearing_deg = Some(bearing);
                report.pole_bearings += 1;
            }
        }
        if lenient::finite(pole.outgoing_bearing_deg).is_none() {
            if let Some(&bearing) = leaving.get(pole.id.as_str()) {
                pole.outgoing_bearing_deg = Some(bearing);
                report.pole_bearings += 1;
            }
        }
        if lenient::finite(pole.pull_ft).is_none() {
            if let (Some(incoming), Some(outgoing)) = (
                lenient::finite(pole.incoming_bearing_deg),
                lenient::finite(pole.outgoing_bearing_deg),
            ) {
                pole.pull_ft = Some(round2(pull_ft(incoming, outgoing, options.pull_reference_ft)));
                report.pulls += 1;
            }
        }
    }

    tracing::debug!(
        span_lengths = report.span_lengths,
        span_bearings = report.span_bearings,
        pole_bearings = report.pole_bearings,
        pulls = report.pulls,
        "autofill complete"
    );
    report
}
