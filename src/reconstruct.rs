//! Raw device samples to physical curves, one rule set per technique.
//!
//! All functions are pure; samples are consumed in receive order.

use crate::curve::{Axis, Curve, Series};
use crate::drivers::impedance::{self, ImpedancePoint};
use crate::drivers::EngineError;
use crate::encoder::cv_steps_one_way;
use crate::params::{
    AsvParams, CvParams, DpvParams, SweepParams, SwvParams, TechniqueParameters,
};
use crate::types::{RawSample, SampleValue, Technique};

/// CA current ceiling in µA; the front end saturates above it.
pub const CA_CURRENT_LIMIT_UA: f64 = 5234.0;
/// CV raw readings are scaled by this gain to µA.
pub const CV_CURRENT_GAIN: f64 = -25000.0;
/// Leading CV samples replaced by the first settled one.
const CV_SETTLE_SAMPLES: usize = 4;

pub fn reconstruct(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    (params.technique().profile().reconstruct)(samples, params)
}

fn mismatch(expected: Technique, params: &TechniqueParameters) -> EngineError {
    EngineError::TechniqueMismatch {
        expected,
        actual: params.technique(),
    }
}

fn current_series(raw: Vec<f64>) -> Series {
    Series::new("Current", "uA", raw, true)
}

fn staircase(
    technique: Technique,
    samples: &[RawSample],
    start_mv: i32,
    step_mv: i32,
) -> Curve {
    let (x, current): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let current = s.value(0)?.finite()?;
            Some((f64::from(start_mv) + i as f64 * f64::from(step_mv), current))
        })
        .unzip();
    Curve::new(technique, Axis::VOLTAGE, x, vec![current_series(current)])
}

pub(crate) fn lsv(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    let TechniqueParameters::Lsv(SweepParams {
        start_mv, step_mv, ..
    }) = *params
    else {
        return Err(mismatch(Technique::Lsv, params));
    };
    Ok(staircase(Technique::Lsv, samples, start_mv, step_mv))
}

pub(crate) fn asv(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    let TechniqueParameters::Asv(AsvParams {
        start_mv, step_mv, ..
    }) = *params
    else {
        return Err(mismatch(Technique::Asv, params));
    };
    Ok(staircase(Technique::Asv, samples, start_mv, step_mv))
}

/// DPV places each point by the index the device sent with it.
pub(crate) fn dpv(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    let TechniqueParameters::Dpv(DpvParams {
        start_mv, step_mv, ..
    }) = *params
    else {
        return Err(mismatch(Technique::Dpv, params));
    };
    let (x, current): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let raw = s.value(0)?.finite()?;
            let index = s.index_tag().unwrap_or(i as i64);
            Some((
                f64::from(start_mv) + index as f64 * f64::from(step_mv),
                -raw,
            ))
        })
        .unzip();
    Ok(Curve::new(
        Technique::Dpv,
        Axis::VOLTAGE,
        x,
        vec![current_series(current)],
    ))
}

/// SWV lines alternate forward and reverse currents; each pair is one step.
pub(crate) fn swv(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    let TechniqueParameters::Swv(SwvParams {
        start_mv, step_mv, ..
    }) = *params
    else {
        return Err(mismatch(Technique::Swv, params));
    };
    let mut x = Vec::with_capacity(samples.len() / 2);
    let mut net = Vec::with_capacity(samples.len() / 2);
    let mut forward = Vec::with_capacity(samples.len() / 2);
    let mut reverse = Vec::with_capacity(samples.len() / 2);
    for (k, pair) in samples.chunks_exact(2).enumerate() {
        let (Some(i_f), Some(i_b)) = (
            pair[0].value(0).and_then(SampleValue::finite),
            pair[1].value(0).and_then(SampleValue::finite),
        ) else {
            continue;
        };
        x.push(f64::from(start_mv) + k as f64 * f64::from(step_mv));
        net.push(i_f - i_b);
        forward.push(i_f);
        reverse.push(i_b);
    }
    Ok(Curve::new(
        Technique::Swv,
        Axis::VOLTAGE,
        x,
        vec![
            Series::new("Net", "uA", net, true),
            Series::new("If", "uA", forward, false),
            Series::new("Ib", "uA", reverse, false),
        ],
    ))
}

/// CV samples arrive with each half-sweep reversed; the block order is
/// restored before voltages are assigned by sweep direction.
pub(crate) fn cv(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    let TechniqueParameters::Cv(p) = *params else {
        return Err(mismatch(Technique::Cv, params));
    };
    let CvParams {
        start_mv,
        end_mv,
        step_mv,
        repeats,
        ..
    } = p;
    let half = usize::try_from(cv_steps_one_way(&p)?)
        .map_err(|_| EngineError::InvalidParameters("cv sweep too long".into()))?;
    let cycle = half * 2;
    let repeats = usize::try_from(repeats)
        .ok()
        .filter(|r| *r > 0)
        .ok_or_else(|| EngineError::InvalidParameters(format!("repeats {repeats}")))?;
    let needed = cycle * repeats;
    if samples.len() < needed {
        return Err(EngineError::InsufficientData {
            needed,
            got: samples.len(),
        });
    }

    let mut values: Vec<SampleValue> = samples[..needed]
        .iter()
        .map(|s| s.value(0).unwrap_or(SampleValue::Infinite))
        .collect();
    if let Some(&settled) = values.get(CV_SETTLE_SAMPLES) {
        values[..CV_SETTLE_SAMPLES].fill(settled);
    }
    for block in values.chunks_mut(half) {
        block.reverse();
    }

    let step = if end_mv >= start_mv {
        f64::from(step_mv)
    } else {
        -f64::from(step_mv)
    };
    let start = f64::from(start_mv);
    let mut x = Vec::with_capacity(needed);
    let mut current = Vec::with_capacity(needed);
    let mut voltage = start;
    for (i, value) in values.iter().enumerate() {
        voltage = if i % cycle == 0 {
            start
        } else if (i / half) % 2 == 0 {
            voltage + step
        } else if i % half == 0 {
            voltage
        } else {
            voltage - step
        };
        if let SampleValue::Finite(raw) = value {
            x.push(voltage);
            current.push(raw * CV_CURRENT_GAIN);
        }
    }
    Ok(Curve::new(
        Technique::Cv,
        Axis::VOLTAGE,
        x,
        vec![current_series(current)],
    ))
}

pub(crate) fn ca(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    if !matches!(params, TechniqueParameters::Ca(_)) {
        return Err(mismatch(Technique::Ca, params));
    }
    let (time, current): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .map(|s| {
            let current = match s.value(0) {
                Some(SampleValue::Finite(v)) => v.min(CA_CURRENT_LIMIT_UA),
                _ => 0.0,
            };
            (s.tag, current)
        })
        .unzip();
    Ok(Curve::new(
        Technique::Ca,
        Axis::TIME,
        time,
        vec![current_series(current)],
    ))
}

fn impedance_curve(technique: Technique, points: Vec<ImpedancePoint>) -> Curve {
    let x = points.iter().map(|p| p.frequency_hz).collect();
    let column = |f: fn(&ImpedancePoint) -> f64| points.iter().map(f).collect::<Vec<_>>();
    Curve::new(
        technique,
        Axis::FREQUENCY,
        x,
        vec![
            Series::new("Magnitude", "Ohm", column(|p| p.magnitude_ohms), true),
            Series::new("Phase", "deg", column(|p| p.phase_deg), true),
            Series::new("Re(Z)", "Ohm", column(|p| p.real_ohms), true),
            Series::new("Im(Z)", "Ohm", column(|p| p.imag_ohms), true),
        ],
    )
}

pub(crate) fn eis3(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    if !matches!(params, TechniqueParameters::Eis3(_)) {
        return Err(mismatch(Technique::Eis3, params));
    }
    let points = samples
        .iter()
        .map(|s| match (s.value(0), s.value(1)) {
            (Some(SampleValue::Finite(re)), Some(SampleValue::Finite(im))) => {
                impedance::from_rectangular(s.tag, re, im)
            }
            _ => impedance::open_circuit_3e(s.tag),
        })
        .collect();
    Ok(impedance_curve(Technique::Eis3, points))
}

pub(crate) fn eis2(
    samples: &[RawSample],
    params: &TechniqueParameters,
) -> Result<Curve, EngineError> {
    if !matches!(params, TechniqueParameters::Eis2(_)) {
        return Err(mismatch(Technique::Eis2, params));
    }
    let points = samples
        .iter()
        .map(|s| match (s.value(0), s.value(1)) {
            (Some(SampleValue::Finite(mag)), Some(SampleValue::Finite(phase))) => {
                impedance::from_polar(s.tag, mag, phase)
            }
            (Some(SampleValue::Finite(mag)), None) => impedance::from_polar(s.tag, mag, 0.0),
            _ => impedance::open_circuit_2e(s.tag),
        })
        .collect();
    Ok(impedance_curve(Technique::Eis2, points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_line;
    use crate::params::{Eis2Params, EisParams, HoldPhase};

    fn lines(raw: &[&str], min_fields: usize) -> Vec<RawSample> {
        raw.iter()
            .enumerate()
            .map(|(i, l)| decode_line(l, i, min_fields).unwrap())
            .collect()
    }

    fn indexed(values: &[f64]) -> Vec<RawSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawSample {
                seq: i,
                tag: i as f64,
                values: vec![SampleValue::Finite(*v)],
            })
            .collect()
    }

    #[test]
    fn lsv_voltage_is_an_arithmetic_staircase() {
        let params = TechniqueParameters::Lsv(SweepParams {
            start_mv: -200,
            end_mv: 700,
            step_mv: 10,
        });
        let mut samples = indexed(&[1.5; 91]);
        samples[0].values[0] = SampleValue::Finite(1.0);
        samples[90].values[0] = SampleValue::Finite(2.0);
        let curve = reconstruct(&samples, &params).unwrap();
        assert_eq!(curve.len(), 91);
        assert_eq!(curve.x[0], -200.0);
        assert_eq!(curve.x[90], 700.0);
        assert!(curve.x.windows(2).all(|w| w[1] - w[0] == 10.0));
        assert_eq!(curve.primary().unwrap().raw[90], 2.0);
    }

    #[test]
    fn asv_voltage_is_an_arithmetic_staircase() {
        let params = TechniqueParameters::Asv(AsvParams {
            start_mv: -100,
            end_mv: 100,
            step_mv: 20,
            clean: HoldPhase {
                voltage_mv: 1100,
                time_ms: 8000,
            },
            deposition: HoldPhase {
                voltage_mv: -1000,
                time_ms: 120000,
            },
            equilibrium: HoldPhase {
                voltage_mv: -50,
                time_ms: 10000,
            },
        });
        let raw: Vec<f64> = (0..11).map(|i| i as f64 * 0.5).collect();
        let mut samples = indexed(&raw);
        samples[3].values[0] = SampleValue::Infinite;
        let curve = reconstruct(&samples, &params).unwrap();

        assert_eq!(curve.technique, Technique::Asv);
        assert_eq!(curve.len(), 10);
        assert_eq!(curve.x[0], -100.0);
        assert_eq!(curve.x[9], 100.0);
        // the dropped reading leaves a gap, not a shift
        assert_eq!(curve.x[2..4], [-60.0, -20.0]);
        let raw = &curve.primary().unwrap().raw;
        assert_eq!(raw[2..4], [1.0, 2.0]);
        for (x, current) in curve.x.iter().zip(raw) {
            assert_eq!(*x, -100.0 + current / 0.5 * 20.0);
        }
    }

    #[test]
    fn dpv_uses_device_index_and_inverts_current() {
        let params = TechniqueParameters::defaults_for(Technique::Dpv);
        let samples = lines(&["0;1.5", "2;-0.5"], 2);
        let curve = reconstruct(&samples, &params).unwrap();
        assert_eq!(curve.x, vec![-200.0, -190.0]);
        assert_eq!(curve.primary().unwrap().raw, vec![-1.5, 0.5]);
    }

    #[test]
    fn swv_pairs_forward_and_reverse() {
        let params = TechniqueParameters::defaults_for(Technique::Swv);
        let samples = indexed(&[5.0, 2.0, 6.0, 1.0, 9.0]);
        let curve = reconstruct(&samples, &params).unwrap();
        assert_eq!(curve.x, vec![-200.0, -190.0]);
        assert_eq!(curve.series("Net").unwrap().raw, vec![3.0, 5.0]);
        assert_eq!(curve.series("If").unwrap().raw, vec![5.0, 6.0]);
        assert_eq!(curve.series("Ib").unwrap().raw, vec![2.0, 1.0]);
        assert!(!curve.series("If").unwrap().smoothed);
    }

    #[test]
    fn cv_requires_a_full_cycle() {
        let params = TechniqueParameters::Cv(CvParams {
            start_mv: 0,
            end_mv: 40,
            step_mv: 10,
            scan_rate_mv_s: 100.0,
            repeats: 1,
        });
        let err = reconstruct(&indexed(&[1.0; 9]), &params).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData { needed: 10, got: 9 }
        ));
    }

    #[test]
    fn cv_restores_block_order_and_sweeps_back() {
        let params = TechniqueParameters::Cv(CvParams {
            start_mv: 0,
            end_mv: 40,
            step_mv: 10,
            scan_rate_mv_s: 100.0,
            repeats: 1,
        });
        let raw: Vec<f64> = (0..10).map(|i| i as f64 * 0.001).collect();
        let curve = reconstruct(&indexed(&raw), &params).unwrap();
        assert_eq!(
            curve.x,
            vec![0.0, 10.0, 20.0, 30.0, 40.0, 40.0, 30.0, 20.0, 10.0, 0.0]
        );
        // first four readings take the fifth, then each half is reversed
        let expected: Vec<f64> = [
            0.004, 0.004, 0.004, 0.004, 0.004, 0.009, 0.008, 0.007, 0.006, 0.005,
        ]
        .iter()
        .map(|v| v * CV_CURRENT_GAIN)
        .collect();
        let got = &curve.primary().unwrap().raw;
        for (a, b) in got.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn cv_reverses_blocks_in_every_cycle() {
        let params = TechniqueParameters::Cv(CvParams {
            start_mv: 0,
            end_mv: 20,
            step_mv: 10,
            scan_rate_mv_s: 100.0,
            repeats: 2,
        });
        let raw: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let curve = reconstruct(&indexed(&raw), &params).unwrap();
        assert_eq!(
            curve.x,
            vec![0.0, 10.0, 20.0, 20.0, 10.0, 0.0, 0.0, 10.0, 20.0, 20.0, 10.0, 0.0]
        );
        let expected: Vec<f64> = [4.0, 4.0, 4.0, 5.0, 4.0, 4.0, 8.0, 7.0, 6.0, 11.0, 10.0, 9.0]
            .iter()
            .map(|v| v * CV_CURRENT_GAIN)
            .collect();
        assert_eq!(curve.primary().unwrap().raw, expected);
    }

    #[test]
    fn cv_descending_sweep_steps_down() {
        let params = TechniqueParameters::Cv(CvParams {
            start_mv: 20,
            end_mv: 0,
            step_mv: 10,
            scan_rate_mv_s: 50.0,
            repeats: 2,
        });
        let curve = reconstruct(&indexed(&[0.001; 12]), &params).unwrap();
        assert_eq!(
            curve.x,
            vec![20.0, 10.0, 0.0, 0.0, 10.0, 20.0, 20.0, 10.0, 0.0, 0.0, 10.0, 20.0]
        );
    }

    #[test]
    fn cv_drops_infinite_currents() {
        let params = TechniqueParameters::Cv(CvParams {
            start_mv: 0,
            end_mv: 40,
            step_mv: 10,
            scan_rate_mv_s: 100.0,
            repeats: 1,
        });
        let mut samples = indexed(&[0.001; 10]);
        samples[7].values[0] = SampleValue::Infinite;
        let curve = reconstruct(&samples, &params).unwrap();
        assert_eq!(curve.len(), 9);
        assert_eq!(curve.primary().unwrap().raw.len(), 9);
    }

    #[test]
    fn ca_clamps_and_zeroes_infinite() {
        let params = TechniqueParameters::defaults_for(Technique::Ca);
        let samples = lines(&["0.1;12.5", "0.2;inf", "0.3;9000"], 2);
        let curve = reconstruct(&samples, &params).unwrap();
        assert_eq!(curve.x, vec![0.1, 0.2, 0.3]);
        assert_eq!(curve.primary().unwrap().raw, vec![12.5, 0.0, 5234.0]);
    }

    #[test]
    fn eis_front_ends() {
        let eis3 = TechniqueParameters::Eis3(EisParams {
            start_hz: 10,
            stop_hz: 1000,
            sweep_points: 2,
            repeats: 1,
        });
        let curve = reconstruct(&lines(&["10;3;-4", "1000;inf;1"], 3), &eis3).unwrap();
        assert_eq!(curve.series("Magnitude").unwrap().raw, vec![5.0, 6.0e8]);
        assert_eq!(curve.series("Phase").unwrap().raw[1], 0.0);

        let eis2 = TechniqueParameters::Eis2(Eis2Params {
            start_hz: 10,
            stop_hz: 1000,
            sweep_points: 2,
            repeats: 1,
            logarithmic: true,
        });
        let curve = reconstruct(&lines(&["10;100;30", "1000;INF;0", "5000;20"], 2), &eis2).unwrap();
        assert_eq!(curve.series("Re(Z)").unwrap().raw, vec![86.603, 6.0e7, 20.0]);
        assert_eq!(curve.series("Im(Z)").unwrap().raw[0], -50.0);
        assert_eq!(curve.x, vec![10.0, 1000.0, 5000.0]);
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let params = TechniqueParameters::defaults_for(Technique::Ca);
        assert!(matches!(
            lsv(&[], &params),
            Err(EngineError::TechniqueMismatch { .. })
        ));
    }
}
