use serde::{Deserialize, Serialize};

use crate::drivers::EngineError;
use crate::types::Technique;

/// A potential held for a fixed time before the sweep (ASV/DPV pretreatment).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldPhase {
    pub voltage_mv: i32,
    pub time_ms: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepParams {
    pub start_mv: i32,
    pub end_mv: i32,
    pub step_mv: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsvParams {
    pub start_mv: i32,
    pub end_mv: i32,
    pub step_mv: i32,
    pub clean: HoldPhase,
    pub deposition: HoldPhase,
    pub equilibrium: HoldPhase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpvParams {
    pub start_mv: i32,
    pub end_mv: i32,
    pub step_mv: i32,
    pub amplitude_mv: i32,
    pub pulse_width_ms: i32,
    #[serde(default)]
    pub deposition: Option<HoldPhase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwvParams {
    pub start_mv: i32,
    pub end_mv: i32,
    pub step_mv: i32,
    pub amplitude_mv: i32,
    pub frequency_hz: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvParams {
    pub start_mv: i32,
    pub end_mv: i32,
    pub step_mv: i32,
    pub scan_rate_mv_s: f64,
    pub repeats: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaParams {
    pub voltage_mv: i32,
    pub run_time_s: i32,
    pub interval_ms: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EisParams {
    pub start_hz: i32,
    pub stop_hz: i32,
    pub sweep_points: i32,
    pub repeats: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eis2Params {
    pub start_hz: i32,
    pub stop_hz: i32,
    pub sweep_points: i32,
    pub repeats: i32,
    #[serde(default)]
    pub logarithmic: bool,
}

/// Parameters for one measurement, tagged by technique.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "technique", rename_all = "snake_case")]
pub enum TechniqueParameters {
    Lsv(SweepParams),
    Asv(AsvParams),
    Dpv(DpvParams),
    Swv(SwvParams),
    Cv(CvParams),
    Ca(CaParams),
    Eis3(EisParams),
    Eis2(Eis2Params),
}

impl TechniqueParameters {
    pub fn technique(&self) -> Technique {
        match self {
            TechniqueParameters::Lsv(_) => Technique::Lsv,
            TechniqueParameters::Asv(_) => Technique::Asv,
            TechniqueParameters::Dpv(_) => Technique::Dpv,
            TechniqueParameters::Swv(_) => Technique::Swv,
            TechniqueParameters::Cv(_) => Technique::Cv,
            TechniqueParameters::Ca(_) => Technique::Ca,
            TechniqueParameters::Eis3(_) => Technique::Eis3,
            TechniqueParameters::Eis2(_) => Technique::Eis2,
        }
    }

    /// Bench defaults used by the instrument front panel.
    pub fn defaults_for(technique: Technique) -> Self {
        match technique {
            Technique::Lsv => TechniqueParameters::Lsv(SweepParams {
                start_mv: -200,
                end_mv: 700,
                step_mv: 10,
            }),
            Technique::Asv => TechniqueParameters::Asv(AsvParams {
                start_mv: -200,
                end_mv: 700,
                step_mv: 10,
                clean: HoldPhase {
                    voltage_mv: 1100,
                    time_ms: 8000,
                },
                deposition: HoldPhase {
                    voltage_mv: -1000,
                    time_ms: 120_000,
                },
                equilibrium: HoldPhase {
                    voltage_mv: -50,
                    time_ms: 10_000,
                },
            }),
            Technique::Dpv => TechniqueParameters::Dpv(DpvParams {
                start_mv: -200,
                end_mv: 600,
                step_mv: 5,
                amplitude_mv: 50,
                pulse_width_ms: 50,
                deposition: None,
            }),
            Technique::Swv => TechniqueParameters::Swv(SwvParams {
                start_mv: -200,
                end_mv: 600,
                step_mv: 10,
                amplitude_mv: 25,
                frequency_hz: 10,
            }),
            Technique::Cv => TechniqueParameters::Cv(CvParams {
                start_mv: -200,
                end_mv: 600,
                step_mv: 10,
                scan_rate_mv_s: 100.0,
                repeats: 1,
            }),
            Technique::Ca => TechniqueParameters::Ca(CaParams {
                voltage_mv: 200,
                run_time_s: 10,
                interval_ms: 100,
            }),
            Technique::Eis3 => TechniqueParameters::Eis3(EisParams {
                start_hz: 100,
                stop_hz: 100_000,
                sweep_points: 50,
                repeats: 1,
            }),
            Technique::Eis2 => TechniqueParameters::Eis2(Eis2Params {
                start_hz: 100,
                stop_hz: 100_000,
                sweep_points: 50,
                repeats: 1,
                logarithmic: true,
            }),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_tagged_by_technique() {
        let text = r#"{"technique":"swv","start_mv":-200,"end_mv":600,"step_mv":10,"amplitude_mv":25,"frequency_hz":10}"#;
        let params = TechniqueParameters::from_json(text).unwrap();
        assert_eq!(params.technique(), Technique::Swv);
        assert_eq!(params, TechniqueParameters::defaults_for(Technique::Swv));
    }

    #[test]
    fn dpv_deposition_is_optional_in_json() {
        let text = r#"{"technique":"dpv","start_mv":0,"end_mv":100,"step_mv":5,"amplitude_mv":50,"pulse_width_ms":50}"#;
        let TechniqueParameters::Dpv(dpv) = TechniqueParameters::from_json(text).unwrap() else {
            panic!("expected dpv parameters");
        };
        assert!(dpv.deposition.is_none());
    }

    #[test]
    fn defaults_match_their_technique() {
        for technique in Technique::ALL {
            assert_eq!(TechniqueParameters::defaults_for(technique).technique(), technique);
        }
    }
}
