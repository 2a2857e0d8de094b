// ============================================================
// BitLinear — ternary-weight projections (BitNet b1.58)
// ============================================================
// A drop-in replacement for nn::Linear whose weights are
// quantised to {-γ, 0, +γ} on every forward pass, where γ is the
// mean absolute weight value. Activations are quantised to 8 bits
// with a per-tensor absmax scale. Gradients still flow to the
// full-precision weights through a straight-through estimator:
//
//     w_ste = w + (quantise(w) - w).detach()
//
// The forward pass sees the quantised value, the backward pass
// sees the identity. The full-precision weights remain the
// training state; quantisation is recomputed from them each step.
//
// Why an enum wrapper (Dense) instead of a trait object?
//   - Burn modules must be concrete types to derive Module
//   - The variant is fixed at construction from config, so a
//     two-armed enum dispatch costs nothing per forward
//
// Reference: Wang et al. (2023) BitNet: Scaling 1-bit Transformers
//            Ma et al. (2024) The Era of 1-bit LLMs
//            Burn Book §3 (Building Blocks)

use burn::{
    module::Param,
    nn::{Initializer, Linear, LinearConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

/// Which linear implementation the transformer blocks should use.
/// Selected once at model construction, recorded in the training
/// config so a checkpoint reloads with the same projection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearKind {
    Standard,
    Bit,
}

impl LinearKind {
    pub fn init<B: Backend>(&self, d_input: usize, d_output: usize, device: &B::Device) -> Dense<B> {
        match self {
            LinearKind::Standard => Dense::Standard(LinearConfig::new(d_input, d_output).init(device)),
            LinearKind::Bit      => Dense::Bit(BitLinearConfig::new(d_input, d_output).init(device)),
        }
    }
}

#[derive(Config, Debug)]
pub struct BitLinearConfig {
    pub d_input:  usize,
    pub d_output: usize,
    /// Whether a (full-precision) bias is added to the output.
    #[config(default = true)]
    pub bias: bool,
    /// Same default as nn::Linear, so the two variants start from
    /// an identically distributed full-precision weight.
    #[config(default = "Initializer::KaimingUniform { gain: 0.577_350_269_189_625_8, fan_out_only: false }")]
    pub initializer: Initializer,
}

impl BitLinearConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BitLinear<B> {
        let shape = [self.d_input, self.d_output];
        let weight = self
            .initializer
            .init_with(shape, Some(self.d_input), Some(self.d_output), device);
        let bias = self.bias.then(|| {
            self.initializer
                .init_with([self.d_output], Some(self.d_input), Some(self.d_output), device)
        });
        BitLinear { weight, bias }
    }
}

/// Linear layer with ternary weights and 8-bit activations.
/// The stored `weight` is full precision; quantisation happens
/// inside `forward`.
#[derive(Module, Debug)]
pub struct BitLinear<B: Backend> {
    pub weight: Param<Tensor<B, 2>>,
    pub bias:   Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> BitLinear<B> {
    /// input: [..., d_input] → [..., d_output]
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let weight = self.weight.val();
        let weight = ste(weight.clone(), weight_quantize(weight));
        let input  = ste(input.clone(), activation_quantize(input));
        let output = input.matmul(weight.unsqueeze());
        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze(),
            None => output,
        }
    }

    /// The ternary weight the forward pass actually multiplies by.
    pub fn quantized_weight(&self) -> Tensor<B, 2> {
        weight_quantize(self.weight.val())
    }
}

/// Straight-through estimator: forward takes `quantized`, backward
/// treats the quantisation as the identity.
fn ste<B: Backend, const D: usize>(raw: Tensor<B, D>, quantized: Tensor<B, D>) -> Tensor<B, D> {
    raw.clone() + (quantized - raw).detach()
}

/// Absmean ternarisation: scale by γ = mean(|w|), round to the
/// nearest integer, clamp to {-1, 0, 1}, scale back.
fn weight_quantize<B: Backend>(weight: Tensor<B, 2>) -> Tensor<B, 2> {
    let gamma = weight.clone().abs().mean().clamp_min(1e-5); // [1]
    let scaled = weight / gamma.clone().unsqueeze();
    scaled.round().clamp(-1.0, 1.0) * gamma.unsqueeze()
}

/// Absmax 8-bit quantisation: map the largest magnitude to 127,
/// round, and undo the scale so downstream shapes stay float.
fn activation_quantize<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    let scale = input
        .clone()
        .abs()
        .max()
        .clamp_min(1e-5)
        .recip()
        .mul_scalar(127.0); // [1]
    let scale = scale.unsqueeze::<D>();
    (input * scale.clone()).round().clamp(-127.0, 127.0) / scale
}

/// Either a standard full-precision linear or a BitLinear; every
/// transformer projection goes through this wrapper.
#[derive(Module, Debug)]
pub enum Dense<B: Backend> {
    Standard(Linear<B>),
    Bit(BitLinear<B>),
}

impl<B: Backend> Dense<B> {
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Dense::Standard(layer) => layer.forward(input),
            Dense::Bit(layer) => layer.forward(input),
        }
    }

    pub fn as_standard(&self) -> Option<&Linear<B>> {
        match self {
            Dense::Standard(layer) => Some(layer),
            Dense::Bit(_) => None,
        }
    }
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TB = burn::backend::NdArray;
    type AB = burn::backend::Autodiff<burn::backend::NdArray>;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    /// γ = mean(|w|) = (0.5 + 1.2 + 0.05 + 0.8) / 4 = 0.6375, so
    /// 0.5/γ rounds to 1, -1.2/γ to -2 → clamped -1, 0.05/γ to 0.
    #[test]
    fn test_weight_quantisation_is_ternary_absmean() {
        let layer = BitLinear::<TB> {
            weight: Param::from_tensor(Tensor::from_floats(
                [[0.5, -1.2], [0.05, 0.8]],
                &device(),
            )),
            bias: None,
        };
        let expected = TensorData::from([[0.6375f32, -0.6375], [0.0, 0.6375]]);
        layer.quantized_weight().into_data().assert_approx_eq(&expected, 5);
    }

    #[test]
    fn test_activation_quantisation_keeps_extremes_exact() {
        // absmax = 1 → scale = 127, and ±127/127 reproduce ±1 exactly;
        // 0.4 lands on 51/127
        let input = Tensor::<TB, 2>::from_floats([[1.0, -1.0, 0.4]], &device());
        let quantized = activation_quantize(input.clone());
        quantized
            .into_data()
            .assert_approx_eq(&TensorData::from([[1.0f32, -1.0, 0.401_575]]), 4);
    }

    #[test]
    fn test_forward_uses_quantised_weights() {
        let layer = BitLinear::<TB> {
            weight: Param::from_tensor(Tensor::from_floats(
                [[0.5, -1.2], [0.05, 0.8]],
                &device(),
            )),
            bias: None,
        };
        // x = [1, 1] quantises exactly, so y = x · w_q
        let y = layer.forward(Tensor::<TB, 2>::from_floats([[1.0, 1.0]], &device()));
        y.into_data()
            .assert_approx_eq(&TensorData::from([[0.6375f32, 0.0]]), 4);
    }

    #[test]
    fn test_straight_through_input_gradient() {
        let device = Default::default();
        let layer = BitLinear::<AB> {
            weight: Param::from_tensor(Tensor::from_floats(
                [[0.5, -1.2], [0.05, 0.8]],
                &device,
            )),
            bias: None,
        };
        let x = Tensor::<AB, 2>::from_floats([[1.0, 1.0]], &device).require_grad();
        let grads = layer.forward(x.clone()).sum().backward();

        // d(sum)/dx_j = Σ_k w_q[j, k]: row 0 cancels, row 1 sums to γ
        let x_grad = x.grad(&grads).unwrap();
        x_grad
            .into_data()
            .assert_approx_eq(&TensorData::from([[0.0f32, 0.6375]]), 4);
    }

    #[test]
    fn test_straight_through_weight_gradient() {
        let device = Default::default();
        let layer = BitLinear::<AB> {
            weight: Param::from_tensor(Tensor::from_floats(
                [[0.5, -1.2], [0.05, 0.8]],
                &device,
            )),
            bias: None,
        };
        let x = Tensor::<AB, 2>::from_floats([[1.0, 1.0]], &device);
        let grads = layer.forward(x).sum().backward();

        // The STE routes the quantised-path gradient onto the raw
        // weights: d(sum)/dw[j, k] = x_q[0, j] = 1 everywhere.
        let w_grad = layer.weight.grad(&grads).unwrap();
        w_grad
            .into_data()
            .assert_approx_eq(&TensorData::from([[1.0f32, 1.0], [1.0, 1.0]]), 4);
    }

    #[test]
    fn test_kind_selects_variant() {
        let device = device();
        assert!(matches!(
            LinearKind::Standard.init::<TB>(8, 4, &device),
            Dense::Standard(_)
        ));
        assert!(matches!(
            LinearKind::Bit.init::<TB>(8, 4, &device),
            Dense::Bit(_)
        ));
    }
}
