use crate::candle_aux_layers::{StackLayers, TransferFn};
use crate::candle_aux_linear::{AffineLinear, XavierInit};
use crate::candle_inference::VaeArchitecture;
use crate::candle_model_traits::DecoderModuleT;

use candle_core::{Result, Tensor};
use candle_nn::Module;

/// Mirror of [`crate::candle_model_encoder::GaussianEncoder`]; the
/// output layer is affine with no nonlinearity, so reconstructions
/// live in the same (standardized) space as the input.
pub struct GaussianDecoder {
    n_features: usize,
    n_topics: usize,
    fc: StackLayers<AffineLinear>,
}

impl DecoderModuleT for GaussianDecoder {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        self.fc.forward(z_nk)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_topics
    }
}

impl GaussianDecoder {
    /// Registers `w_dec_h1`, `b_dec_h1`, (`w_dec_h2`, `b_dec_h2`),
    /// `w_out`, `b_out`
    pub fn new(arch: &VaeArchitecture, transfer: TransferFn, init: &mut XavierInit) -> Result<Self> {
        let mut fc = StackLayers::new();
        fc.push_with_act(
            init.affine(arch.n_z, arch.n_hidden_1, "w_dec_h1", "b_dec_h1")?,
            transfer,
        );
        if let Some(n_hidden_2) = arch.n_hidden_2 {
            fc.push_with_act(
                init.affine(arch.n_hidden_1, n_hidden_2, "w_dec_h2", "b_dec_h2")?,
                transfer,
            );
        }
        fc.push(init.affine(arch.last_hidden(), arch.n_input, "w_out", "b_out")?);

        Ok(Self {
            n_features: arch.n_input,
            n_topics: arch.n_z,
            fc,
        })
    }
}
