use crate::curve::Curve;
use crate::drivers::{EngineError, SampleBuffer};
use crate::params::TechniqueParameters;
use crate::reconstruct::reconstruct;
use crate::smoothing::FilterKind;
use crate::types::AcquisitionState;

/// Post-acquisition stage: raw buffer to a filtered, ready-to-plot curve.
///
/// Runs only on buffers handed back by a terminal session.
pub struct CurvePipeline {
    params: TechniqueParameters,
    filter: FilterKind,
}

impl CurvePipeline {
    pub fn new(params: TechniqueParameters, filter: FilterKind) -> Self {
        Self { params, filter }
    }

    pub fn build(
        &self,
        samples: &SampleBuffer,
        state: AcquisitionState,
    ) -> Result<Curve, EngineError> {
        let mut curve = reconstruct(samples.as_slice(), &self.params)?;
        curve.complete = state == AcquisitionState::Completed;
        curve.apply_filter(self.filter);
        Ok(curve)
    }
}
