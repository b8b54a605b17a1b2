// src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

// 八种测量技术
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Lsv,
    Asv,
    Dpv,
    Swv,
    Cv,
    Ca,
    Eis3,
    Eis2,
}

impl Technique {
    pub const ALL: [Technique; 8] = [
        Technique::Lsv,
        Technique::Asv,
        Technique::Dpv,
        Technique::Swv,
        Technique::Cv,
        Technique::Ca,
        Technique::Eis3,
        Technique::Eis2,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            Technique::Lsv => "LSV",
            Technique::Asv => "ASV",
            Technique::Dpv => "DPV",
            Technique::Swv => "SWV",
            Technique::Cv => "CV",
            Technique::Ca => "CA",
            Technique::Eis3 => "EIS3E",
            Technique::Eis2 => "EIS2E",
        }
    }

    pub fn is_impedance(self) -> bool {
        matches!(self, Technique::Eis3 | Technique::Eis2)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// 采集状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Sending,
    Receiving,
    Completed,
    Aborted,
    TimedOut,
}

/// One numeric field of a device line. `inf` marks an open circuit or an
/// out-of-range reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleValue {
    Finite(f64),
    Infinite,
}

impl SampleValue {
    pub fn finite(self) -> Option<f64> {
        match self {
            SampleValue::Finite(v) => Some(v),
            SampleValue::Infinite => None,
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, SampleValue::Infinite)
    }
}

/// A decoded device line: receive index, leading tag field and the values after it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSample {
    pub seq: usize,
    /// Device index, elapsed time or frequency depending on the technique.
    pub tag: f64,
    pub values: Vec<SampleValue>,
}

impl RawSample {
    pub fn value(&self, idx: usize) -> Option<SampleValue> {
        self.values.get(idx).copied()
    }

    /// Tag as a sample index when the device sent an integral one.
    pub fn index_tag(&self) -> Option<i64> {
        if self.tag.fract() == 0.0 && self.tag.abs() < i64::MAX as f64 {
            Some(self.tag as i64)
        } else {
            None
        }
    }
}

// 后台采集线程发给前台的消息
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Log(String),
    State(AcquisitionState),
    Progress { received: usize, expected: usize },
}
