use candle_util::candle_core::Device;
use candle_util::{
    CheckpointPolicy, OptimizerKind, TrainConfig, TransferFn, VaeArchitecture, VaeOptions,
};
use matrix_util::common_io::{mkdir, open_buf_reader, open_buf_writer};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use weapon_data::schema::{weapon_schema, DEFAULT_SEED};
use weapon_data::{DecodeMode, LabelSelection, Schema};

pub const CONFIG_FILE: &str = "config.json";

/// Everything needed to rebuild a generator: data, schema,
/// architecture, training and generation policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub train_file: String,
    pub test_file: Option<String>,
    pub model_dir: String,

    /// `type`, `firemode`, then the hashed `ammo` block
    pub num_categorical: usize,
    pub num_numerical: usize,
    pub embedded_dim: usize,

    pub n_hidden_1: usize,
    pub n_hidden_2: Option<usize>,
    pub n_z: usize,
    pub transfer: TransferFn,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub log_every_n_epochs: usize,
    pub seed: u64,

    pub label_selection: LabelSelection,
    pub legacy_decode: bool,
    pub decimals: usize,
    /// clamp generated rows into the standardized range of the
    /// training data before decoding
    pub clamp_generated: bool,

    /// replicated-row cost at or above which `infer` falls back to a
    /// random weapon
    pub generation_cost_threshold: f32,
    /// dismantled weapons collected before asking for a retrain
    pub retrain_after: usize,
    pub extra_epochs_per_retrain: usize,

    /// report every logged epoch at `info` level; not saved
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            train_file: "weapon_data.csv".into(),
            test_file: None,
            model_dir: "vae_model".into(),
            num_categorical: 2,
            num_numerical: 14,
            embedded_dim: 0,
            n_hidden_1: 26,
            n_hidden_2: Some(12),
            n_z: 2,
            transfer: TransferFn::Elu,
            optimizer: OptimizerKind::RmsProp,
            learning_rate: 0.01,
            batch_size: 4,
            num_epochs: 70,
            log_every_n_epochs: 10,
            seed: DEFAULT_SEED,
            label_selection: LabelSelection::ArgMax,
            legacy_decode: false,
            decimals: 4,
            clamp_generated: false,
            generation_cost_threshold: 50.0,
            retrain_after: 20,
            extra_epochs_per_retrain: 10,
            verbose: false,
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_file(file_path: &str) -> anyhow::Result<Self> {
        let reader = open_buf_reader(file_path)?;
        serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", file_path, e))
    }

    pub fn to_json_file(&self, file_path: &str) -> anyhow::Result<()> {
        mkdir(file_path)?;
        let mut writer = open_buf_writer(file_path)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// `config.json` inside the model directory
    pub fn saved_path(&self) -> PathBuf {
        PathBuf::from(&self.model_dir).join(CONFIG_FILE)
    }

    pub fn schema(&self) -> anyhow::Result<Schema> {
        weapon_schema(
            self.num_categorical,
            self.num_numerical,
            self.embedded_dim,
            self.seed,
        )
    }

    pub fn decode_mode(&self) -> DecodeMode {
        if self.legacy_decode {
            DecodeMode::LegacyTruncated
        } else {
            DecodeMode::Symmetric
        }
    }

    pub fn architecture(&self, n_input: usize) -> VaeArchitecture {
        VaeArchitecture {
            n_input,
            n_hidden_1: self.n_hidden_1,
            n_hidden_2: self.n_hidden_2.filter(|&h| h > 0),
            n_z: self.n_z,
        }
    }

    pub fn vae_options(&self) -> VaeOptions {
        VaeOptions {
            transfer: self.transfer,
            optimizer: self.optimizer,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            seed: self.seed,
        }
    }

    pub fn train_config(&self, device: &Device, checkpoint: CheckpointPolicy) -> TrainConfig {
        TrainConfig {
            learning_rate: self.learning_rate as f32,
            batch_size: self.batch_size,
            num_epochs: self.num_epochs,
            log_every_n_epochs: self.log_every_n_epochs,
            checkpoint,
            early_stopping: None,
            device: device.clone(),
            verbose: self.verbose,
            show_progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::create_temp_dir_file;

    #[test]
    fn config_survives_json() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".json")?;
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

        let config = GeneratorConfig {
            label_selection: LabelSelection::Threshold { min_score: 0.8 },
            n_hidden_2: None,
            ..Default::default()
        };
        config.to_json_file(file)?;
        assert_eq!(GeneratorConfig::from_json_file(file)?, config);
        Ok(())
    }

    #[test]
    fn missing_keys_take_defaults() -> anyhow::Result<()> {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{ "n_z": 3, "optimizer": "adamw", "transfer": "tanh" }"#)?;
        assert_eq!(config.n_z, 3);
        assert_eq!(config.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.transfer, TransferFn::Tanh);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.architecture(20).n_hidden_2, Some(12));
        Ok(())
    }

    #[test]
    fn verbosity_reaches_the_driver_but_not_the_file() -> anyhow::Result<()> {
        let config = GeneratorConfig {
            verbose: true,
            ..Default::default()
        };
        let train_config = config.train_config(&Device::Cpu, CheckpointPolicy::Never);
        assert!(train_config.verbose);

        let json = serde_json::to_string(&config)?;
        assert!(!json.contains("verbose"));
        let reread: GeneratorConfig = serde_json::from_str(&json)?;
        assert!(!reread.verbose);
        Ok(())
    }
}
