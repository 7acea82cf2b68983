use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder, linear};

/// Per-atom energy head: `Linear(F, H) → SiLU → Linear(H, 1)`, squeezed to `[N]`.
#[derive(Debug, Clone)]
pub struct EnergyReadout {
    hidden: Linear,
    output: Linear,
}

impl EnergyReadout {
    pub fn new(input_width: usize, hidden_width: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            hidden: linear(input_width, hidden_width, vb.pp("hidden"))?,
            output: linear(hidden_width, 1, vb.pp("output"))?,
        })
    }

    pub fn forward(&self, scalar_representation: &Tensor) -> candle_core::Result<Tensor> {
        self.output
            .forward(&self.hidden.forward(scalar_representation)?.silu()?)?
            .squeeze(1)
    }
}
