//! Smoothing catalog for measured current and impedance series.
//!
//! Filters are a closed set looked up in [`CATALOG`]. Each strategy may refuse
//! its input (too short, singular fit); the caller then falls back to the
//! three-point rule and only logs the degradation.

mod kernels;
mod savgol;

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kernels::{round3, three_point};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterKind {
    #[default]
    MovingAverage3,
    MovingAverage7,
    MovingAverage9,
    MovingAverage11,
    MovingAverage13,
    MovingAverage15,
    SavitzkyGolay,
    Gaussian,
    Median,
    Combo,
    Exponential,
}

/// Raised by a strategy that cannot handle its input.
#[derive(Debug, Error)]
#[error("{filter} degraded to 3-point rule: {reason}")]
pub struct FilterDegraded {
    pub filter: &'static str,
    pub reason: String,
}

pub(crate) type Strategy = fn(&[f64]) -> Result<Vec<f64>, FilterDegraded>;

pub struct FilterEntry {
    pub kind: FilterKind,
    pub label: &'static str,
    pub description: &'static str,
    pub(crate) apply: Strategy,
}

pub static CATALOG: [FilterEntry; 11] = [
    FilterEntry {
        kind: FilterKind::MovingAverage3,
        label: "1/3 (Moving Avg 3pt)",
        description: "trailing mean of the last three points",
        apply: kernels::trailing_three,
    },
    FilterEntry {
        kind: FilterKind::MovingAverage7,
        label: "1/7 (Moving Avg 7pt)",
        description: "centred 7-point mean, edge padded",
        apply: kernels::moving_average_7,
    },
    FilterEntry {
        kind: FilterKind::MovingAverage9,
        label: "1/9 (Moving Avg 9pt)",
        description: "centred 9-point mean, edge padded",
        apply: kernels::moving_average_9,
    },
    FilterEntry {
        kind: FilterKind::MovingAverage11,
        label: "1/11 (Moving Avg 11pt)",
        description: "centred 11-point mean, edge padded",
        apply: kernels::moving_average_11,
    },
    FilterEntry {
        kind: FilterKind::MovingAverage13,
        label: "1/13 (Moving Avg 13pt)",
        description: "centred 13-point mean, edge padded",
        apply: kernels::moving_average_13,
    },
    FilterEntry {
        kind: FilterKind::MovingAverage15,
        label: "1/15 (Moving Avg 15pt)",
        description: "centred 15-point mean, edge padded",
        apply: kernels::moving_average_15,
    },
    FilterEntry {
        kind: FilterKind::SavitzkyGolay,
        label: "Savitzky-Golay",
        description: "quadratic fit over up to 7 points",
        apply: savgol::savitzky_golay_default,
    },
    FilterEntry {
        kind: FilterKind::Gaussian,
        label: "Gaussian Filter",
        description: "gaussian kernel, sigma 1, reflected edges",
        apply: kernels::gaussian,
    },
    FilterEntry {
        kind: FilterKind::Median,
        label: "Median Filter",
        description: "running median over up to 5 points",
        apply: kernels::median,
    },
    FilterEntry {
        kind: FilterKind::Combo,
        label: "Combo Filter",
        description: "3-point median followed by 5-point Savitzky-Golay",
        apply: kernels::combo,
    },
    FilterEntry {
        kind: FilterKind::Exponential,
        label: "Exponential Smoothing",
        description: "exponential smoothing, alpha 0.3",
        apply: kernels::exponential,
    },
];

static BY_LABEL: Lazy<HashMap<&'static str, FilterKind>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for entry in CATALOG.iter() {
        map.insert(entry.label, entry.kind);
        // "1/7" is accepted for "1/7 (Moving Avg 7pt)"
        if let Some((short, _)) = entry.label.split_once(' ') {
            if short.starts_with("1/") {
                map.insert(short, entry.kind);
            }
        }
    }
    map
});

impl FilterKind {
    pub fn entry(self) -> &'static FilterEntry {
        // CATALOG is ordered like the enum
        &CATALOG[self as usize]
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    pub fn from_label(label: &str) -> Option<FilterKind> {
        BY_LABEL.get(label.trim()).copied()
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Filter `series` with `kind`. Output has the same length, rounded to 3 decimals.
pub fn smooth(series: &[f64], kind: FilterKind) -> Vec<f64> {
    let entry = kind.entry();
    let filtered = match (entry.apply)(series) {
        Ok(out) if out.len() == series.len() && out.iter().all(|v| v.is_finite()) => out,
        Ok(_) => {
            log::warn!("{} produced unusable output, using 3-point rule", entry.label);
            three_point(series)
        }
        Err(degraded) => {
            log::warn!("{degraded}");
            three_point(series)
        }
    };
    filtered.into_iter().map(round3).collect()
}
