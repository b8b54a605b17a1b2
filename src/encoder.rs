//! Parameter validation and device command encoding.
//!
//! Every command is `<id>#<a>?<b>/<c>|...!`, where `<id>` is the technique's
//! command id from [`crate::technique`]. The firmware parses each field as
//! a signed 32-bit decimal, so every integer field is range-checked here.

use crate::drivers::EngineError;
use crate::params::{
    AsvParams, CaParams, CvParams, DpvParams, Eis2Params, EisParams, SweepParams, SwvParams,
    TechniqueParameters,
};

/// Encoded command plus the number of samples the device will stream back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedCommand {
    pub command: String,
    pub expected_samples: usize,
}

pub fn encode(params: &TechniqueParameters) -> Result<EncodedCommand, EngineError> {
    let mut encoded = match params {
        TechniqueParameters::Lsv(p) => encode_lsv(p),
        TechniqueParameters::Asv(p) => encode_asv(p),
        TechniqueParameters::Dpv(p) => encode_dpv(p),
        TechniqueParameters::Swv(p) => encode_swv(p),
        TechniqueParameters::Cv(p) => encode_cv(p),
        TechniqueParameters::Ca(p) => encode_ca(p),
        TechniqueParameters::Eis3(p) => encode_eis3(p),
        TechniqueParameters::Eis2(p) => encode_eis2(p),
    }?;
    // 命令头取自技术表
    let id = params.technique().profile().command_id;
    encoded.command.insert_str(0, &format!("{id}#"));
    Ok(encoded)
}

/// Samples for a staircase from `start` to `end`: `floor((end-start)/step)+1`.
pub fn staircase_points(start_mv: i32, end_mv: i32, step_mv: i32) -> Result<usize, EngineError> {
    require_positive("step", step_mv)?;
    let span = i64::from(end_mv) - i64::from(start_mv);
    sample_count(span.div_euclid(i64::from(step_mv)) + 1)
}

fn encode_lsv(p: &SweepParams) -> Result<EncodedCommand, EngineError> {
    let n = staircase_points(p.start_mv, p.end_mv, p.step_mv)?;
    Ok(EncodedCommand {
        command: format!("{}?{}/{}|1$0!", p.start_mv, p.end_mv, n),
        expected_samples: n,
    })
}

fn encode_asv(p: &AsvParams) -> Result<EncodedCommand, EngineError> {
    let n = staircase_points(p.start_mv, p.end_mv, p.step_mv)?;
    for (name, time) in [
        ("clean time", p.clean.time_ms),
        ("deposition time", p.deposition.time_ms),
        ("equilibrium time", p.equilibrium.time_ms),
    ] {
        require_non_negative(name, time)?;
    }
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}|{}${}|{}${}|{}${}!",
            p.start_mv,
            p.end_mv,
            n,
            p.clean.voltage_mv,
            p.clean.time_ms,
            p.deposition.voltage_mv,
            p.deposition.time_ms,
            p.equilibrium.voltage_mv,
            p.equilibrium.time_ms,
        ),
        expected_samples: n,
    })
}

fn encode_dpv(p: &DpvParams) -> Result<EncodedCommand, EngineError> {
    let n = staircase_points(p.start_mv, p.end_mv, p.step_mv)?;
    require_positive("pulse width", p.pulse_width_ms)?;
    let mut command = format!(
        "{}?{}/{}|{}${}",
        p.start_mv, p.end_mv, p.step_mv, p.amplitude_mv, p.pulse_width_ms
    );
    if let Some(dep) = p.deposition {
        require_non_negative("deposition time", dep.time_ms)?;
        command.push_str(&format!("|{}${}", dep.voltage_mv, dep.time_ms));
    }
    command.push('!');
    Ok(EncodedCommand {
        command,
        expected_samples: n,
    })
}

// The firmware sweeps SWV from the negated start; forward and reverse
// currents arrive interleaved, two lines per step.
fn encode_swv(p: &SwvParams) -> Result<EncodedCommand, EngineError> {
    require_positive("step", p.step_mv)?;
    require_positive("frequency", p.frequency_hz)?;
    let shifted_start = -i64::from(p.start_mv);
    let span = i64::from(p.end_mv) - i64::from(p.start_mv);
    let shifted_end = span + shifted_start;
    let amplitude = i64::from(p.amplitude_mv) * 2;
    let n = sample_count(span.div_euclid(i64::from(p.step_mv)) * 2)?;
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}|{}${}!",
            int_field("start", shifted_start)?,
            int_field("end", shifted_end)?,
            p.step_mv,
            int_field("amplitude", amplitude)?,
            p.frequency_hz
        ),
        expected_samples: n,
    })
}

/// Half-sweep length of a CV cycle: `floor(|end-start|/step)+1`.
pub fn cv_steps_one_way(p: &CvParams) -> Result<i64, EngineError> {
    require_positive("step", p.step_mv)?;
    if p.end_mv == p.start_mv {
        return Err(EngineError::InvalidParameters(
            "cv start and end voltage must differ".into(),
        ));
    }
    let span = (i64::from(p.end_mv) - i64::from(p.start_mv)).abs();
    Ok(span / i64::from(p.step_mv) + 1)
}

fn encode_cv(p: &CvParams) -> Result<EncodedCommand, EngineError> {
    let one_way = cv_steps_one_way(p)?;
    require_positive("repeats", p.repeats)?;
    if !p.scan_rate_mv_s.is_finite() || p.scan_rate_mv_s <= 0.0 {
        return Err(EngineError::InvalidParameters(format!(
            "scan rate must be a positive number, got {}",
            p.scan_rate_mv_s
        )));
    }
    let per_cycle = one_way * 2;
    let n = sample_count(per_cycle * i64::from(p.repeats))?;
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}@{}|{}$0!",
            int_field("end", -i64::from(p.end_mv))?,
            int_field("start", -i64::from(p.start_mv))?,
            int_field("step count", per_cycle)?,
            decimal_field(p.scan_rate_mv_s),
            p.repeats
        ),
        expected_samples: n,
    })
}

fn encode_ca(p: &CaParams) -> Result<EncodedCommand, EngineError> {
    require_positive("run time", p.run_time_s)?;
    require_positive("interval", p.interval_ms)?;
    let n = sample_count(i64::from(p.run_time_s) * 1000 / i64::from(p.interval_ms))?;
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}|{}$0!",
            p.run_time_s, p.voltage_mv, p.interval_ms, p.interval_ms
        ),
        expected_samples: n,
    })
}

fn validate_sweep(
    start_hz: i32,
    stop_hz: i32,
    points: i32,
    repeats: i32,
) -> Result<usize, EngineError> {
    require_positive("start frequency", start_hz)?;
    if start_hz >= stop_hz {
        return Err(EngineError::InvalidParameters(format!(
            "start frequency {start_hz} Hz must be below stop frequency {stop_hz} Hz"
        )));
    }
    if points < 2 {
        return Err(EngineError::InvalidParameters(format!(
            "sweep needs at least 2 points, got {points}"
        )));
    }
    require_positive("repeats", repeats)?;
    sample_count(i64::from(points) * i64::from(repeats))
}

fn encode_eis3(p: &EisParams) -> Result<EncodedCommand, EngineError> {
    let n = validate_sweep(p.start_hz, p.stop_hz, p.sweep_points, p.repeats)?;
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}|{}$1!",
            p.start_hz, p.stop_hz, p.sweep_points, p.repeats
        ),
        expected_samples: n,
    })
}

fn encode_eis2(p: &Eis2Params) -> Result<EncodedCommand, EngineError> {
    let n = validate_sweep(p.start_hz, p.stop_hz, p.sweep_points, p.repeats)?;
    Ok(EncodedCommand {
        command: format!(
            "{}?{}/{}|{}${}!",
            p.start_hz,
            p.stop_hz,
            p.sweep_points,
            p.repeats,
            u8::from(p.logarithmic)
        ),
        expected_samples: n,
    })
}

fn require_positive(name: &str, value: i32) -> Result<(), EngineError> {
    if value <= 0 {
        return Err(EngineError::InvalidParameters(format!(
            "{name} must be greater than zero, got {value}"
        )));
    }
    Ok(())
}

fn require_non_negative(name: &str, value: i32) -> Result<(), EngineError> {
    if value < 0 {
        return Err(EngineError::InvalidParameters(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    Ok(())
}

fn int_field(name: &str, value: i64) -> Result<i32, EngineError> {
    i32::try_from(value).map_err(|_| {
        EngineError::InvalidParameters(format!("{name} {value} does not fit the command field"))
    })
}

fn sample_count(count: i64) -> Result<usize, EngineError> {
    if count <= 0 {
        return Err(EngineError::InvalidParameters(format!(
            "parameters yield {count} samples"
        )));
    }
    int_field("sample count", count)?;
    usize::try_from(count)
        .map_err(|_| EngineError::InvalidParameters(format!("sample count {count} out of range")))
}

// 固件要求小数形式, 如 100.0
fn decimal_field(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
