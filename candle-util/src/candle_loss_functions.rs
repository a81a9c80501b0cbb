use candle_core::{Result, Tensor};

/// KL divergence loss between two Gaussian distributions
///
/// -0.5 * (1 + log(sigma^2) - mu^2 - sigma^2)
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
///
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// Same KL divergence parameterized by `log(sigma)`
///
/// -0.5 * sum(1 + 2 log(sigma) - mu^2 - exp(2 log(sigma)))
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_log_sigma` - log standard deviation
///
pub fn gaussian_kl_loss_log_sigma(z_mean: &Tensor, z_log_sigma: &Tensor) -> Result<Tensor> {
    gaussian_kl_loss(z_mean, &(z_log_sigma * 2.)?)
}

/// Squared reconstruction error summed over features
///
/// loss(i) = sum_j (recon(i,j) - x(i,j))^2
///
/// * `x_nd` - observed data
/// * `recon_nd` - reconstruction
///
pub fn l2_reconstruction_loss(x_nd: &Tensor, recon_nd: &Tensor) -> Result<Tensor> {
    recon_nd.sub(x_nd)?.sqr()?.sum(x_nd.rank() - 1)
}
