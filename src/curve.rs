use crate::smoothing::{smooth, FilterKind};
use crate::types::Technique;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Axis {
    pub name: &'static str,
    pub unit: &'static str,
}

impl Axis {
    pub const VOLTAGE: Axis = Axis {
        name: "Voltage",
        unit: "mV",
    };
    pub const TIME: Axis = Axis {
        name: "Time",
        unit: "s",
    };
    pub const FREQUENCY: Axis = Axis {
        name: "Frequency",
        unit: "Hz",
    };

    pub fn column(&self) -> String {
        format!("{} ({})", self.name, self.unit)
    }
}

/// One dependent quantity of a curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub name: &'static str,
    pub unit: &'static str,
    pub raw: Vec<f64>,
    /// Empty until a filter is applied, or for series that are never smoothed.
    pub filtered: Vec<f64>,
    pub smoothed: bool,
}

impl Series {
    pub fn new(name: &'static str, unit: &'static str, raw: Vec<f64>, smoothed: bool) -> Self {
        Self {
            name,
            unit,
            raw,
            filtered: Vec::new(),
            smoothed,
        }
    }

    pub fn raw_column(&self) -> String {
        format!("{} ({})", self.name, self.unit)
    }

    pub fn filtered_column(&self) -> String {
        format!("{} Filtered ({})", self.name, self.unit)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurvePoint {
    pub x: f64,
    pub values: Vec<f64>,
}

/// Reconstructed measurement: an independent axis and its series.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    pub technique: Technique,
    pub axis: Axis,
    pub x: Vec<f64>,
    pub series: Vec<Series>,
    /// False when the session ended before every expected sample arrived.
    pub complete: bool,
}

impl Curve {
    pub fn new(technique: Technique, axis: Axis, x: Vec<f64>, series: Vec<Series>) -> Self {
        Self {
            technique,
            axis,
            x,
            series,
            complete: true,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }

    /// The series a plot shows first (current, net current or magnitude).
    pub fn primary(&self) -> Option<&Series> {
        self.series.first()
    }

    pub fn point(&self, idx: usize) -> Option<CurvePoint> {
        let x = *self.x.get(idx)?;
        let values = self
            .series
            .iter()
            .map(|s| s.raw.get(idx).copied())
            .collect::<Option<Vec<_>>>()?;
        Some(CurvePoint { x, values })
    }

    pub fn points(&self) -> impl Iterator<Item = CurvePoint> + '_ {
        (0..self.len()).filter_map(|i| self.point(i))
    }

    /// Recompute every smoothed series from its raw values.
    pub fn apply_filter(&mut self, kind: FilterKind) {
        for series in self.series.iter_mut().filter(|s| s.smoothed) {
            series.filtered = smooth(&series.raw, kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Curve {
        Curve::new(
            Technique::Lsv,
            Axis::VOLTAGE,
            vec![0.0, 10.0, 20.0],
            vec![Series::new("Current", "uA", vec![1.0, 3.0, 5.0], true)],
        )
    }

    #[test]
    fn refiltering_uses_raw_values() {
        let mut curve = sample();
        curve.apply_filter(FilterKind::MovingAverage3);
        let first = curve.series[0].filtered.clone();
        curve.apply_filter(FilterKind::MovingAverage3);
        assert_eq!(curve.series[0].filtered, first);
        assert_eq!(curve.series[0].raw, vec![1.0, 3.0, 5.0]);
        assert_eq!(first, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn points_zip_axis_and_series() {
        let curve = sample();
        let pts: Vec<_> = curve.points().collect();
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[1], CurvePoint { x: 10.0, values: vec![3.0] });
        assert_eq!(curve.series[0].raw_column(), "Current (uA)");
        assert_eq!(curve.series[0].filtered_column(), "Current Filtered (uA)");
    }
}
