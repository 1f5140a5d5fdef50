use crate::shared::constants::DEFAULT_STRIDE;

/// Fixed-stride frame selection: frame `i` is sampled iff `i % stride == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingPolicy {
    stride: usize,
}

impl SamplingPolicy {
    pub fn new(stride: usize) -> Result<Self, &'static str> {
        if stride < 1 {
            return Err("stride must be >= 1");
        }
        Ok(Self { stride })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_selected(&self, frame_index: usize) -> bool {
        frame_index % self.stride == 0
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
        }
    }
}
