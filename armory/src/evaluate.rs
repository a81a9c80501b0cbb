use candle_util::Vae;
use matrix_util::traits::ConvertMatOps;
use ndarray::{Array2, Axis};
use serde::Serialize;
use weapon_data::BatchedDataset;

/// Reconstruction quality over a held-out set
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// replicated-row VAE cost
    pub avg_cost: f64,
    /// L1 distance between a weapon and its reconstruction, original
    /// scale
    pub avg_unstandardized_distance: f64,
    /// the same in standardized space
    pub avg_standardized_distance: f64,
}

/// Reconstruct every test weapon and average the cost and the L1
/// distances
///
/// The test set is standardized with its own parameters, so both
/// the input and the reconstruction are mapped back through them.
pub fn evaluate(vae: &mut Vae, test: &BatchedDataset) -> anyhow::Result<Evaluation> {
    let nn = test.num_examples();
    if nn == 0 {
        anyhow::bail!("empty test set");
    }

    let x_nd = test.data().to_owned();
    let x_tensor = x_nd.to_tensor(vae.device())?;
    let costs = vae.replicated_loss(&x_tensor)?;
    let recon_nd = Array2::<f64>::from_tensor(&vae.encode_and_decode(&x_tensor, false)?)?;

    let params = test.params();
    let standardized = (&x_nd - &recon_nd).mapv(f64::abs).sum_axis(Axis(1));
    let unstandardized = (&params.invert(&x_nd) - &params.invert(&recon_nd))
        .mapv(f64::abs)
        .sum_axis(Axis(1));

    let nn = nn as f64;
    Ok(Evaluation {
        avg_cost: costs.iter().map(|&c| c as f64).sum::<f64>() / nn,
        avg_unstandardized_distance: unstandardized.sum() / nn,
        avg_standardized_distance: standardized.sum() / nn,
    })
}
