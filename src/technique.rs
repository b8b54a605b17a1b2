use crate::curve::{Axis, Curve};
use crate::drivers::EngineError;
use crate::reconstruct;
use crate::smoothing::FilterKind;
use crate::types::{RawSample, Technique};

pub type Reconstructor =
    fn(&[RawSample], &crate::params::TechniqueParameters) -> Result<Curve, EngineError>;

/// Column layout of one curve series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeriesLayout {
    pub name: &'static str,
    pub unit: &'static str,
    pub smoothed: bool,
}

const fn layout(name: &'static str, unit: &'static str, smoothed: bool) -> SeriesLayout {
    SeriesLayout {
        name,
        unit,
        smoothed,
    }
}

const CURRENT: &[SeriesLayout] = &[layout("Current", "uA", true)];
const SWV_CURRENTS: &[SeriesLayout] = &[
    layout("Net", "uA", true),
    layout("If", "uA", false),
    layout("Ib", "uA", false),
];
const IMPEDANCE: &[SeriesLayout] = &[
    layout("Magnitude", "Ohm", true),
    layout("Phase", "deg", true),
    layout("Re(Z)", "Ohm", true),
    layout("Im(Z)", "Ohm", true),
];

/// Per-technique wiring for the generic acquisition engine.
pub struct TechniqueProfile {
    pub technique: Technique,
    /// Leading digit of the device command.
    pub command_id: char,
    /// Minimum `;`-separated fields per line, tag included.
    pub min_fields: usize,
    /// Whether a literal `END` line finishes the session early.
    pub accepts_end_marker: bool,
    pub default_filter: FilterKind,
    pub axis: Axis,
    pub series: &'static [SeriesLayout],
    pub reconstruct: Reconstructor,
}

static PROFILES: [TechniqueProfile; 8] = [
    TechniqueProfile {
        technique: Technique::Lsv,
        command_id: '7',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::VOLTAGE,
        series: CURRENT,
        reconstruct: reconstruct::lsv,
    },
    TechniqueProfile {
        technique: Technique::Asv,
        command_id: '8',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::VOLTAGE,
        series: CURRENT,
        reconstruct: reconstruct::asv,
    },
    TechniqueProfile {
        technique: Technique::Dpv,
        command_id: '6',
        min_fields: 2,
        accepts_end_marker: true,
        default_filter: FilterKind::MovingAverage7,
        axis: Axis::VOLTAGE,
        series: CURRENT,
        reconstruct: reconstruct::dpv,
    },
    TechniqueProfile {
        technique: Technique::Swv,
        command_id: '4',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::VOLTAGE,
        series: SWV_CURRENTS,
        reconstruct: reconstruct::swv,
    },
    TechniqueProfile {
        technique: Technique::Cv,
        command_id: '1',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage7,
        axis: Axis::VOLTAGE,
        series: CURRENT,
        reconstruct: reconstruct::cv,
    },
    TechniqueProfile {
        technique: Technique::Ca,
        command_id: '5',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::TIME,
        series: CURRENT,
        reconstruct: reconstruct::ca,
    },
    TechniqueProfile {
        technique: Technique::Eis3,
        command_id: '3',
        min_fields: 3,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::FREQUENCY,
        series: IMPEDANCE,
        reconstruct: reconstruct::eis3,
    },
    TechniqueProfile {
        technique: Technique::Eis2,
        command_id: '2',
        min_fields: 2,
        accepts_end_marker: false,
        default_filter: FilterKind::MovingAverage3,
        axis: Axis::FREQUENCY,
        series: IMPEDANCE,
        reconstruct: reconstruct::eis2,
    },
];

impl Technique {
    pub fn profile(self) -> &'static TechniqueProfile {
        &PROFILES[self as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::params::TechniqueParameters;

    #[test]
    fn table_follows_enum_order() {
        for technique in Technique::ALL {
            assert_eq!(technique.profile().technique, technique);
        }
    }

    #[test]
    fn reconstructed_series_match_layout() {
        for technique in Technique::ALL {
            let params = TechniqueParameters::defaults_for(technique);
            let samples: Vec<RawSample> = (0..400)
                .map(|i| RawSample {
                    seq: i,
                    tag: i as f64,
                    values: vec![
                        crate::types::SampleValue::Finite(1.0),
                        crate::types::SampleValue::Finite(0.5),
                    ],
                })
                .collect();
            let curve = (technique.profile().reconstruct)(&samples, &params).unwrap();
            let got: Vec<SeriesLayout> = curve
                .series
                .iter()
                .map(|s| layout(s.name, s.unit, s.smoothed))
                .collect();
            assert_eq!(got, technique.profile().series, "{technique}");
            assert_eq!(curve.axis, technique.profile().axis);
        }
    }

    #[test]
    fn command_ids_match_the_encoder() {
        for technique in Technique::ALL {
            let cmd = encode(&TechniqueParameters::defaults_for(technique)).unwrap();
            assert!(cmd.command.starts_with(&format!("{}#", technique.profile().command_id)));
            assert!(cmd.command.ends_with('!'));
        }
    }
}
