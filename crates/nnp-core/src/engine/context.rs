use candle_core::{DType, Device};

/// Everything a forward pass needs to know about where and how to compute.
///
/// Passed explicitly to every call; nothing about execution is cached between calls.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    device: Device,
}

impl ForwardContext {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dtype(&self) -> DType {
        DType::F64
    }
}

impl Default for ForwardContext {
    fn default() -> Self {
        Self::cpu()
    }
}
