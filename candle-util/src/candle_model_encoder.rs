use crate::candle_aux_layers::{StackLayers, TransferFn};
use crate::candle_aux_linear::{AffineLinear, XavierInit};
use crate::candle_inference::VaeArchitecture;
use crate::candle_model_traits::EncoderModuleT;

use candle_core::{Result, Tensor};
use candle_nn::Module;

/// Dense encoder: one or two hidden layers, then two parallel heads
/// for the latent mean and the latent log variance
pub struct GaussianEncoder {
    n_features: usize,
    n_topics: usize,
    fc: StackLayers<AffineLinear>,
    z_mean: AffineLinear,
    z_lnvar: AffineLinear,
}

impl EncoderModuleT for GaussianEncoder {
    fn latent_gaussian_params(&self, x_nd: &Tensor) -> Result<(Tensor, Tensor)> {
        let h_nl = self.fc.forward(x_nd)?;
        let z_mean_nk = self.z_mean.forward(&h_nl)?;
        let z_lnvar_nk = self.z_lnvar.forward(&h_nl)?;
        Ok((z_mean_nk, z_lnvar_nk))
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_topics
    }
}

impl GaussianEncoder {
    /// Build the encoder, drawing parameters in a fixed order
    ///
    /// * `arch` - layer widths
    /// * `transfer` - hidden-layer nonlinearity
    /// * `init` - registers `w_enc_h1`, `b_enc_h1`, (`w_enc_h2`,
    ///   `b_enc_h2`), `w_z_mean`, `b_z_mean`, `w_z_ls2`, `b_z_ls2`
    pub fn new(arch: &VaeArchitecture, transfer: TransferFn, init: &mut XavierInit) -> Result<Self> {
        let mut fc = StackLayers::new();
        fc.push_with_act(
            init.affine(arch.n_input, arch.n_hidden_1, "w_enc_h1", "b_enc_h1")?,
            transfer,
        );
        if let Some(n_hidden_2) = arch.n_hidden_2 {
            fc.push_with_act(
                init.affine(arch.n_hidden_1, n_hidden_2, "w_enc_h2", "b_enc_h2")?,
                transfer,
            );
        }

        let z_mean = init.affine(arch.last_hidden(), arch.n_z, "w_z_mean", "b_z_mean")?;
        let z_lnvar = init.affine(arch.last_hidden(), arch.n_z, "w_z_ls2", "b_z_ls2")?;

        Ok(Self {
            n_features: arch.n_input,
            n_topics: arch.n_z,
            fc,
            z_mean,
            z_lnvar,
        })
    }

    /// z = mu + exp(0.5 * lnvar) * eps
    pub fn reparameterize(z_mean: &Tensor, z_lnvar: &Tensor, eps: &Tensor) -> Result<Tensor> {
        z_mean + (z_lnvar * 0.5)?.exp()?.mul(eps)?
    }
}
