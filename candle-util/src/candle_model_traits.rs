use candle_core::{Result, Tensor};

pub trait EncoderModuleT {
    /// Parameters of the approximate posterior
    ///
    /// # Returns `(z_mean_nk, z_lnvar_nk)`
    /// * `z_mean_nk` - latent mean (n x k)
    /// * `z_lnvar_nk` - latent log variance, `log(sigma^2)` (n x k)
    fn latent_gaussian_params(&self, x_nd: &Tensor) -> Result<(Tensor, Tensor)>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstruction
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and a per-row loss
    /// * `z_nk` - latent states
    /// * `x_nd` - observed data to validate with
    /// * `loss` - fn (observed, reconstruction) -> loss (n)
    fn forward_with_loss<LossFn>(
        &self,
        z_nk: &Tensor,
        x_nd: &Tensor,
        loss: &LossFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let recon_nd = self.forward(z_nk)?;
        let loss_n = loss(x_nd, &recon_nd)?;
        Ok((recon_nd, loss_n))
    }

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
