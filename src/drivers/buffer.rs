use crate::types::RawSample;

/// Append-only store of the samples one session accepted, in receive order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<RawSample>,
}

impl SampleBuffer {
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            samples: Vec::with_capacity(expected),
        }
    }

    pub fn push(&mut self, sample: RawSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[RawSample] {
        &self.samples
    }
}

impl From<Vec<RawSample>> for SampleBuffer {
    fn from(samples: Vec<RawSample>) -> Self {
        Self { samples }
    }
}
