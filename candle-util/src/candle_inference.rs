use crate::candle_aux_layers::TransferFn;
use crate::error::VaeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Layer widths of the encoder; the decoder mirrors them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaeArchitecture {
    pub n_input: usize,
    pub n_hidden_1: usize,
    pub n_hidden_2: Option<usize>,
    pub n_z: usize,
}

impl VaeArchitecture {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.n_input == 0 || self.n_hidden_1 == 0 || self.n_z == 0 {
            return Err(VaeError::InvalidArchitecture(format!(
                "zero-width layer in {:?}",
                self
            ))
            .into());
        }
        if self.n_hidden_2 == Some(0) {
            return Err(VaeError::InvalidArchitecture(
                "second hidden layer must be absent or non-empty".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Width of the last hidden layer, the one feeding the latent heads
    pub fn last_hidden(&self) -> usize {
        self.n_hidden_2.unwrap_or(self.n_hidden_1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    AdamW,
    RmsProp,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sgd => "sgd",
            Self::AdamW => "adamw",
            Self::RmsProp => "rmsprop",
        }
    }

    pub fn all() -> [OptimizerKind; 3] {
        [Self::Sgd, Self::AdamW, Self::RmsProp]
    }
}

/// When the driver writes a checkpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointPolicy {
    Never,
    EveryEpoch { dir: PathBuf },
    AtEnd { dir: PathBuf },
}

/// Stop once the epoch cost hasn't improved by `min_delta` for
/// `patience` consecutive epochs
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f32,
}

pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub log_every_n_epochs: usize,
    pub checkpoint: CheckpointPolicy,
    pub early_stopping: Option<EarlyStopping>,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            batch_size: 4,
            num_epochs: 70,
            log_every_n_epochs: 1,
            checkpoint: CheckpointPolicy::Never,
            early_stopping: None,
            device: candle_core::Device::Cpu,
            verbose: false,
            show_progress: false,
        }
    }
}

/// Model-side settings that are fixed at construction
#[derive(Clone, Copy, Debug)]
pub struct VaeOptions {
    pub transfer: TransferFn,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for VaeOptions {
    fn default() -> Self {
        Self {
            transfer: TransferFn::Elu,
            optimizer: OptimizerKind::RmsProp,
            learning_rate: 0.01,
            batch_size: 4,
            seed: 19071991,
        }
    }
}
