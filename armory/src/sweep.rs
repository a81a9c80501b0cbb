use crate::config::GeneratorConfig;
use crate::evaluate::evaluate;
use crate::metrics::{RunSummary, SummaryWriter};

use candle_util::candle_core::Device;
use candle_util::{train_vae, CheckpointPolicy, OptimizerKind, TransferFn, Vae};
use indicatif::ParallelProgressIterator;
use log::{info, warn};
use rayon::prelude::*;
use weapon_data::{BatchedDataset, FeatureCodec};

/// Hyper-parameter grid
///
/// Each width starts one step above the first value tried: hidden
/// widths go down by 2 while at least 3, latent widths down by 1 to 1,
/// batch sizes halve down to 1.
#[derive(Clone, Debug)]
pub struct SweepGrid {
    pub n_hidden_1_start: usize,
    pub n_z_start: usize,
    pub batch_size_start: usize,
    pub transfers: Vec<TransferFn>,
    pub optimizers: Vec<OptimizerKind>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            n_hidden_1_start: 10,
            n_z_start: 4,
            batch_size_start: 20,
            transfers: vec![
                TransferFn::Sigmoid,
                TransferFn::Tanh,
                TransferFn::Elu,
                TransferFn::Selu,
                TransferFn::Softsign,
            ],
            optimizers: OptimizerKind::all().to_vec(),
        }
    }
}

impl SweepGrid {
    pub fn hidden_widths(&self) -> Vec<usize> {
        let mut ret = vec![];
        let mut h = self.n_hidden_1_start;
        while h >= 5 {
            h -= 2;
            ret.push(h);
        }
        ret
    }

    pub fn latent_widths(&self) -> Vec<usize> {
        (1..self.n_z_start).rev().collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        let mut ret = vec![];
        let mut b = self.batch_size_start / 2;
        while b >= 1 {
            ret.push(b);
            b /= 2;
        }
        ret
    }

    /// Every combination on top of `base`, in a fixed order
    pub fn configurations(&self, base: &GeneratorConfig) -> Vec<GeneratorConfig> {
        let mut ret = vec![];
        for &n_hidden_1 in self.hidden_widths().iter() {
            for &n_z in self.latent_widths().iter() {
                for &batch_size in self.batch_sizes().iter() {
                    for &transfer in self.transfers.iter() {
                        for &optimizer in self.optimizers.iter() {
                            ret.push(GeneratorConfig {
                                n_hidden_1,
                                n_z,
                                batch_size,
                                transfer,
                                optimizer,
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }
        ret
    }
}

fn train_and_evaluate(
    config: &GeneratorConfig,
    mut train: BatchedDataset,
    test: &BatchedDataset,
    device: &Device,
) -> anyhow::Result<Option<RunSummary>> {
    if config.batch_size > train.num_examples() {
        warn!(
            "skipping batch size {} for {} training weapons",
            config.batch_size,
            train.num_examples()
        );
        return Ok(None);
    }

    let mut vae = Vae::new(
        config.architecture(train.num_features()),
        config.vae_options(),
        device,
    )?;
    let mut train_config = config.train_config(device, CheckpointPolicy::Never);
    train_config.log_every_n_epochs = 1;
    let log = train_vae(&mut vae, &mut train, &train_config, None)?;

    let eval = evaluate(&mut vae, test)?;
    Ok(Some(RunSummary::new(config, &eval, &log)))
}

/// Train and evaluate every configuration of the grid, appending one
/// summary row each
///
/// * `base` - data files, schema and everything the grid leaves fixed
/// * `grid` - varied parameters
/// * `summary_file` - CSV file to append to
/// * `dry_run` - only count the configurations
///
/// Returns the number of configurations.
pub fn run_sweep(
    base: &GeneratorConfig,
    grid: &SweepGrid,
    summary_file: &str,
    dry_run: bool,
    device: &Device,
) -> anyhow::Result<usize> {
    let configs = grid.configurations(base);
    let njobs = configs.len();
    info!("{} configurations", njobs);
    if dry_run {
        return Ok(njobs);
    }

    let Some(test_file) = base.test_file.as_deref() else {
        anyhow::bail!("the sweep needs a test file");
    };

    let codec = FeatureCodec::new(base.schema()?)?;
    let train = BatchedDataset::from_csv(codec.clone(), &base.train_file, base.seed)?;
    let test = BatchedDataset::from_csv(codec, test_file, base.seed)?;

    let rows = configs
        .par_iter()
        .progress_count(njobs as u64)
        .map(|config| train_and_evaluate(config, train.clone(), &test, device))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut writer = SummaryWriter::open(summary_file)?;
    for row in rows.into_iter().flatten() {
        writer.write(&row)?;
    }
    Ok(njobs)
}
