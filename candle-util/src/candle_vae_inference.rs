use crate::candle_aux_linear::XavierInit;
use crate::candle_data_loader::DataLoader;
use crate::candle_inference::*;
use crate::candle_loss_functions::{gaussian_kl_loss, l2_reconstruction_loss};
use crate::candle_model_decoder::GaussianDecoder;
use crate::candle_model_encoder::GaussianEncoder;
use crate::candle_model_traits::{DecoderModuleT, EncoderModuleT};
use crate::candle_rmsprop::{ParamsRmsProp, RmsProp};
use crate::error::VaeError;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, VarMap, SGD};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const CHECKPOINT_FILE: &str = "model.safetensors";

enum VaeOptimizer {
    Sgd(SGD),
    AdamW(AdamW),
    RmsProp(RmsProp),
}

impl VaeOptimizer {
    fn new(kind: OptimizerKind, varmap: &VarMap, lr: f64) -> candle_core::Result<Self> {
        let vars = varmap.all_vars();
        Ok(match kind {
            OptimizerKind::Sgd => Self::Sgd(SGD::new(vars, lr)?),
            OptimizerKind::AdamW => Self::AdamW(AdamW::new_lr(vars, lr)?),
            OptimizerKind::RmsProp => Self::RmsProp(RmsProp::new(
                vars,
                ParamsRmsProp {
                    lr,
                    ..Default::default()
                },
            )?),
        })
    }

    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        match self {
            Self::Sgd(opt) => opt.backward_step(loss),
            Self::AdamW(opt) => opt.backward_step(loss),
            Self::RmsProp(opt) => opt.backward_step(loss),
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::Sgd(opt) => opt.set_learning_rate(lr),
            Self::AdamW(opt) => opt.set_learning_rate(lr),
            Self::RmsProp(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Per-row terms of the VAE cost
pub struct RowLosses {
    /// sum of squared reconstruction errors (n)
    pub reconstruction: Tensor,
    /// KL divergence from the standard normal prior (n)
    pub kl: Tensor,
    /// reconstruction in the input space (n x d)
    pub recon_nd: Tensor,
}

/// Variational autoencoder with a fixed sampling batch size
///
/// Every call that draws latent noise uses `batch_size x n_z`
/// standard normal draws from the model's own seeded generator.
pub struct Vae {
    arch: VaeArchitecture,
    options: VaeOptions,
    device: Device,
    variable_map: VarMap,
    encoder: GaussianEncoder,
    decoder: GaussianDecoder,
    optimizer: VaeOptimizer,
    noise: StdRng,
}

impl Vae {
    /// Build a freshly initialized model
    /// * `arch` - layer widths
    /// * `options` - transfer function, optimizer, batch size, seed
    /// * `device` - where parameters live
    pub fn new(arch: VaeArchitecture, options: VaeOptions, device: &Device) -> anyhow::Result<Self> {
        arch.validate()?;
        if options.batch_size == 0 {
            return Err(VaeError::InvalidArchitecture("zero batch size".into()).into());
        }

        let variable_map = VarMap::new();
        let (encoder, decoder) = {
            let mut init = XavierInit::new(&variable_map, options.seed, device);
            let encoder = GaussianEncoder::new(&arch, options.transfer, &mut init)?;
            let decoder = GaussianDecoder::new(&arch, options.transfer, &mut init)?;
            (encoder, decoder)
        };
        let optimizer = VaeOptimizer::new(options.optimizer, &variable_map, options.learning_rate)?;

        Ok(Self {
            arch,
            options,
            device: device.clone(),
            variable_map,
            encoder,
            decoder,
            optimizer,
            noise: StdRng::seed_from_u64(options.seed.wrapping_add(1)),
        })
    }

    pub fn architecture(&self) -> &VaeArchitecture {
        &self.arch
    }

    pub fn options(&self) -> &VaeOptions {
        &self.options
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn num_parameters(&self) -> usize {
        self.variable_map
            .all_vars()
            .iter()
            .map(|v| v.elem_count())
            .sum()
    }

    /// Restart the latent noise stream
    pub fn reseed_noise(&mut self, seed: u64) {
        self.noise = StdRng::seed_from_u64(seed);
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.options.learning_rate = lr;
        self.optimizer.set_learning_rate(lr);
    }

    fn sample_eps(&mut self, nn: usize) -> candle_core::Result<Tensor> {
        let kk = self.arch.n_z;
        let eps: Vec<f32> = (0..nn * kk)
            .map(|_| StandardNormal.sample(&mut self.noise))
            .collect();
        Tensor::from_vec(eps, (nn, kk), &self.device)
    }

    fn check_batch(&self, x_nd: &Tensor) -> anyhow::Result<()> {
        let (nn, dd) = x_nd.dims2()?;
        if nn != self.batch_size() {
            return Err(VaeError::BatchSizeMismatch {
                expected: self.batch_size(),
                found: nn,
            }
            .into());
        }
        if dd != self.arch.n_input {
            anyhow::bail!("{} input columns, model expects {}", dd, self.arch.n_input);
        }
        Ok(())
    }

    fn sample_latent(&mut self, x_nd: &Tensor) -> candle_core::Result<(Tensor, Tensor, Tensor)> {
        let (z_mean, z_lnvar) = self.encoder.latent_gaussian_params(x_nd)?;
        let eps = self.sample_eps(x_nd.dims()[0])?;
        let z_nk = GaussianEncoder::reparameterize(&z_mean, &z_lnvar, &eps)?;
        Ok((z_nk, z_mean, z_lnvar))
    }

    fn forward_losses(&mut self, x_nd: &Tensor) -> candle_core::Result<RowLosses> {
        let (z_nk, z_mean, z_lnvar) = self.sample_latent(x_nd)?;
        let (recon_nd, reconstruction) =
            self.decoder
                .forward_with_loss(&z_nk, x_nd, &l2_reconstruction_loss)?;
        let kl = gaussian_kl_loss(&z_mean, &z_lnvar)?;
        Ok(RowLosses {
            reconstruction,
            kl,
            recon_nd,
        })
    }

    fn cost(losses: &RowLosses) -> candle_core::Result<Tensor> {
        (&losses.reconstruction + &losses.kl)?.mean_all()
    }

    /// One optimizer step on a minibatch of exactly `batch_size` rows
    ///
    /// Returns the cost evaluated before the update.
    pub fn train_with_mini_batch(&mut self, x_nd: &Tensor) -> anyhow::Result<f32> {
        self.check_batch(x_nd)?;
        let x_nd = x_nd.to_dtype(DType::F32)?;
        let cost = Self::cost(&self.forward_losses(&x_nd)?)?;
        let cost_val = cost.to_scalar::<f32>()?;
        self.optimizer.backward_step(&cost)?;
        Ok(cost_val)
    }

    /// Mean cost of a minibatch without touching the parameters
    pub fn calculate_loss(&mut self, x_nd: &Tensor) -> anyhow::Result<f32> {
        self.check_batch(x_nd)?;
        let x_nd = x_nd.to_dtype(DType::F32)?;
        let cost = Self::cost(&self.forward_losses(&x_nd)?)?;
        Ok(cost.to_scalar::<f32>()?)
    }

    /// Reconstruction and KL terms for each row of a minibatch
    pub fn calculate_row_losses(&mut self, x_nd: &Tensor) -> anyhow::Result<RowLosses> {
        self.check_batch(x_nd)?;
        Ok(self.forward_losses(&x_nd.to_dtype(DType::F32)?)?)
    }

    /// A sample from the approximate posterior for each row
    pub fn calculate_z(&mut self, x_nd: &Tensor) -> anyhow::Result<Tensor> {
        self.check_batch(x_nd)?;
        let (z_nk, _, _) = self.sample_latent(&x_nd.to_dtype(DType::F32)?)?;
        Ok(z_nk)
    }

    /// Posterior mean for each row; no noise is drawn
    pub fn calculate_z_mean(&self, x_nd: &Tensor) -> anyhow::Result<Tensor> {
        let (z_mean, _) = self
            .encoder
            .latent_gaussian_params(&x_nd.to_dtype(DType::F32)?)?;
        Ok(z_mean)
    }

    /// Encode, sample and decode
    ///
    /// * `x_nd` - input rows
    /// * `matches_trained_batch_size` - if true, `x_nd` must have
    ///   `batch_size` rows and one reconstruction per row comes back;
    ///   otherwise each row is replicated `batch_size` times and the
    ///   reconstructions of the copies are averaged (n x d)
    pub fn encode_and_decode(
        &mut self,
        x_nd: &Tensor,
        matches_trained_batch_size: bool,
    ) -> anyhow::Result<Tensor> {
        let x_nd = x_nd.to_dtype(DType::F32)?;
        if matches_trained_batch_size {
            self.check_batch(&x_nd)?;
            return Ok(self.forward_losses(&x_nd)?.recon_nd);
        }

        let (nn, dd) = x_nd.dims2()?;
        let bs = self.batch_size();
        let mut rows = Vec::with_capacity(nn);
        for i in 0..nn {
            let x_bd = x_nd.narrow(0, i, 1)?.broadcast_as((bs, dd))?.contiguous()?;
            let (z_nk, _, _) = self.sample_latent(&x_bd)?;
            rows.push(self.decoder.forward(&z_nk)?.mean_keepdim(0)?);
        }
        Ok(Tensor::cat(&rows, 0)?)
    }

    /// Mean per-row cost of each input row replicated `batch_size`
    /// times (n)
    pub fn replicated_loss(&mut self, x_nd: &Tensor) -> anyhow::Result<Vec<f32>> {
        let x_nd = x_nd.to_dtype(DType::F32)?;
        let (nn, dd) = x_nd.dims2()?;
        let bs = self.batch_size();
        let mut ret = Vec::with_capacity(nn);
        for i in 0..nn {
            let x_bd = x_nd.narrow(0, i, 1)?.broadcast_as((bs, dd))?.contiguous()?;
            let cost = Self::cost(&self.forward_losses(&x_bd)?)?;
            ret.push(cost.to_scalar::<f32>()?);
        }
        Ok(ret)
    }

    /// Map latent points back to the input space
    ///
    /// The decoder is deterministic, so the averaged path of
    /// `encode_and_decode` reduces to decoding each row once.
    pub fn decode_from_latent_space(
        &self,
        z_nk: &Tensor,
        matches_trained_batch_size: bool,
    ) -> anyhow::Result<Tensor> {
        let z_nk = z_nk.to_dtype(DType::F32)?;
        let (nn, kk) = z_nk.dims2()?;
        if kk != self.arch.n_z {
            anyhow::bail!("{} latent columns, model expects {}", kk, self.arch.n_z);
        }
        if matches_trained_batch_size && nn != self.batch_size() {
            return Err(VaeError::BatchSizeMismatch {
                expected: self.batch_size(),
                found: nn,
            }
            .into());
        }
        Ok(self.decoder.forward(&z_nk)?)
    }

    /// Write every parameter to `dir/model.safetensors`
    pub fn save(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let io_err = |message: String| VaeError::CheckpointIo {
            path: dir.to_string_lossy().into(),
            message,
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(e.to_string()))?;
        let path = dir.join(CHECKPOINT_FILE);
        self.variable_map
            .save(&path)
            .map_err(|e| io_err(e.to_string()))?;
        debug!("saved {} parameters to {}", self.num_parameters(), path.display());
        Ok(path)
    }

    /// Load parameters saved by a model of the same architecture
    ///
    /// * `path` - a checkpoint file or the directory holding one
    pub fn restore(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = if path.is_dir() {
            path.join(CHECKPOINT_FILE)
        } else {
            path.to_path_buf()
        };

        let saved = candle_core::safetensors::load(&path, &self.device).map_err(|e| {
            VaeError::CheckpointIo {
                path: path.to_string_lossy().into(),
                message: e.to_string(),
            }
        })?;

        let data = self
            .variable_map
            .data()
            .lock()
            .map_err(|e| anyhow::anyhow!("variable map lock: {}", e))?;

        // validate everything before writing anything
        for (name, var) in data.iter() {
            let tensor = saved.get(name).ok_or_else(|| VaeError::MissingParameter {
                name: name.as_str().into(),
            })?;
            if tensor.dims() != var.dims() {
                return Err(VaeError::CheckpointShapeMismatch {
                    name: name.as_str().into(),
                    expected: var.dims().to_vec(),
                    found: tensor.dims().to_vec(),
                }
                .into());
            }
        }
        if let Some(name) = saved.keys().find(|name| !data.contains_key(name.as_str())) {
            return Err(VaeError::UnexpectedParameter {
                name: name.as_str().into(),
            }
            .into());
        }

        for (name, var) in data.iter() {
            if let Some(tensor) = saved.get(name) {
                var.set(&tensor.to_dtype(var.dtype())?)?;
            }
        }
        debug!("restored {} tensors from {}", data.len(), path.display());
        Ok(())
    }
}

/// What a training run produced
#[derive(Debug, Default)]
pub struct TrainLog {
    /// average cost of each completed epoch
    pub avg_costs: Vec<f32>,
    /// "Epoch:0001 - Cost:..." lines
    pub log_lines: Vec<Box<str>>,
    pub checkpoint: Option<PathBuf>,
    pub stopped_early: bool,
    pub cancelled: bool,
}

impl TrainLog {
    pub fn last_cost(&self) -> Option<f32> {
        self.avg_costs.last().copied()
    }

    pub fn joined_log(&self) -> String {
        self.log_lines.join("\n")
    }
}

/// Train the VAE model for a fixed number of epochs
///
/// Each epoch runs `floor(num_examples / batch_size)` minibatches and
/// accumulates `cost * batch_size / num_examples`.
///
/// * `vae` - model; its batch size must equal `train_config.batch_size`
/// * `data` - data loader
/// * `train_config` - training configuration
/// * `stop` - polled before every epoch
pub fn train_vae<DataL>(
    vae: &mut Vae,
    data: &mut DataL,
    train_config: &TrainConfig,
    stop: Option<&AtomicBool>,
) -> anyhow::Result<TrainLog>
where
    DataL: DataLoader,
{
    let batch_size = train_config.batch_size;
    if batch_size != vae.batch_size() {
        return Err(VaeError::BatchSizeMismatch {
            expected: vae.batch_size(),
            found: batch_size,
        }
        .into());
    }

    let num_examples = data.num_examples();
    let num_minibatches = num_examples / batch_size.max(1);
    if num_minibatches == 0 {
        anyhow::bail!(
            "batch size {} exceeds the {} training examples",
            batch_size,
            num_examples
        );
    }

    vae.set_learning_rate(train_config.learning_rate as f64);

    let pb = ProgressBar::new(train_config.num_epochs as u64);
    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let log_every = train_config.log_every_n_epochs.max(1);
    let mut log = TrainLog::default();
    let mut best_cost = f32::INFINITY;
    let mut num_stale = 0;

    for epoch in 0..train_config.num_epochs {
        if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
            info!("stop requested after {} epochs", epoch);
            log.cancelled = true;
            break;
        }

        let mut avg_cost = 0f32;
        for _ in 0..num_minibatches {
            let x_nd = data.next_minibatch(batch_size, &train_config.device)?;
            let cost = vae.train_with_mini_batch(&x_nd)?;
            avg_cost += cost / num_examples as f32 * batch_size as f32;
        }
        log.avg_costs.push(avg_cost);
        pb.inc(1);

        if (epoch + 1) % log_every == 0 {
            let line = format!("Epoch:{:04} - Cost:{:.9}", epoch + 1, avg_cost);
            if train_config.verbose {
                info!("{}", line);
            } else {
                debug!("{}", line);
            }
            log.log_lines.push(line.into_boxed_str());
        }

        if let CheckpointPolicy::EveryEpoch { dir } = &train_config.checkpoint {
            log.checkpoint = Some(vae.save(dir)?);
        }

        if let Some(early) = &train_config.early_stopping {
            if avg_cost < best_cost - early.min_delta {
                best_cost = avg_cost;
                num_stale = 0;
            } else {
                num_stale += 1;
                if num_stale >= early.patience {
                    info!("no improvement for {} epochs, stopping", num_stale);
                    log.stopped_early = true;
                    break;
                }
            }
        }
    }
    pb.finish_and_clear();

    if let CheckpointPolicy::AtEnd { dir } = &train_config.checkpoint {
        log.checkpoint = Some(vae.save(dir)?);
    }

    Ok(log)
}
