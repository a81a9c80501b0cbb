use crate::config::GeneratorConfig;

use candle_util::candle_core::{Device, Tensor};
use candle_util::{train_vae, CheckpointPolicy, TrainLog, Vae};
use log::{debug, info, warn};
use matrix_util::common_io::mkdir;
use matrix_util::traits::ConvertMatOps;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weapon_data::{
    prepare_decoded_record_for_encoding, BatchedDataset, DataError, FeatureCodec, Record,
};

pub const SUCCESS_KEY: &str = "success";
pub const STANDARDIZATION_FILE: &str = "standardization.tsv";

/// A generated weapon and how it came about
#[derive(Debug, Clone, Default)]
pub struct InferResponse {
    pub weapon: Record,
    pub success: bool,
    /// replicated-row cost of the request
    pub cost: Option<f32>,
    /// the request was too unfamiliar and a random weapon came back
    pub random_fallback: bool,
}

impl InferResponse {
    fn failed() -> Self {
        Self::default()
    }

    /// The weapon with a `success` entry of `true` or `false`
    pub fn to_record(&self) -> Record {
        let mut ret = self.weapon.clone();
        ret.insert(SUCCESS_KEY.into(), self.success.to_string());
        ret
    }
}

/// Training data, the current model and the dismantled weapons
/// collected since the last training run
pub struct WeaponGenerator {
    config: GeneratorConfig,
    device: Device,
    train_data: BatchedDataset,
    model: Option<Vae>,
    dismantled: Vec<Array1<f64>>,
    should_retrain: bool,
    stop: Arc<AtomicBool>,
    rng: StdRng,
}

impl WeaponGenerator {
    /// Read the training file named in `config`
    pub fn setup(config: GeneratorConfig, device: &Device) -> anyhow::Result<Self> {
        let codec = FeatureCodec::new(config.schema()?)?;
        let train_data = BatchedDataset::from_csv(codec, &config.train_file, config.seed)?;
        Self::with_dataset(config, train_data, device)
    }

    pub fn with_dataset(
        config: GeneratorConfig,
        train_data: BatchedDataset,
        device: &Device,
    ) -> anyhow::Result<Self> {
        if config.batch_size == 0 || config.batch_size > train_data.num_examples() {
            return Err(DataError::InvalidBatchSize {
                batch_size: config.batch_size,
                num_examples: train_data.num_examples(),
            }
            .into());
        }
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(2));
        Ok(Self {
            config,
            device: device.clone(),
            train_data,
            model: None,
            dismantled: vec![],
            should_retrain: false,
            stop: Arc::new(AtomicBool::new(false)),
            rng,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn train_data(&self) -> &BatchedDataset {
        &self.train_data
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Set it to `true` to end the current training run after the
    /// epoch in progress
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn should_retrain(&self) -> bool {
        self.should_retrain
    }

    pub fn num_dismantled(&self) -> usize {
        self.dismantled.len()
    }

    fn fresh_model(&self) -> anyhow::Result<Vae> {
        let arch = self.config.architecture(self.train_data.num_features());
        Vae::new(arch, self.config.vae_options(), &self.device)
    }

    /// Train a new model from scratch
    ///
    /// Pending dismantled weapons join the training data first, and
    /// each such retrain runs `extra_epochs_per_retrain` more epochs
    /// than the last. The checkpoint and `config.json` land in
    /// `model_dir`.
    pub fn train_one_run(&mut self) -> anyhow::Result<TrainLog> {
        self.stop.store(false, Ordering::Relaxed);

        if !self.dismantled.is_empty() {
            let views: Vec<ArrayView1<f64>> = self.dismantled.iter().map(|x| x.view()).collect();
            let z_nd = ndarray::stack(Axis(0), &views)?;
            self.train_data.add_standardized_rows(z_nd.view())?;
            self.dismantled.clear();
            self.config.num_epochs += self.config.extra_epochs_per_retrain;
        }
        self.should_retrain = false;

        info!(
            "training on {} weapons for {} epochs",
            self.train_data.num_examples(),
            self.config.num_epochs
        );

        let mut vae = self.fresh_model()?;
        let train_config = self.config.train_config(
            &self.device,
            CheckpointPolicy::AtEnd {
                dir: PathBuf::from(&self.config.model_dir),
            },
        );
        let log = train_vae(
            &mut vae,
            &mut self.train_data,
            &train_config,
            Some(self.stop.as_ref()),
        )?;

        let config_file = self.config.saved_path();
        self.config.to_json_file(&config_file.to_string_lossy())?;
        let report = PathBuf::from(&self.config.model_dir).join(STANDARDIZATION_FILE);
        let report = report.to_string_lossy();
        mkdir(&report)?;
        self.train_data.save_standardization(&report)?;
        if let Some(path) = &log.checkpoint {
            info!("saved the model to {}", path.display());
        }

        self.model = Some(vae);
        Ok(log)
    }

    /// Restore the model saved in `model_dir`
    pub fn load_model(&mut self) -> anyhow::Result<()> {
        let mut vae = self.fresh_model()?;
        vae.restore(&PathBuf::from(&self.config.model_dir))?;
        self.model = Some(vae);
        Ok(())
    }

    /// Generate a weapon from a dismantled one
    ///
    /// The request may carry plain field values, per-label scores
    /// (`type_Rifle`, ...) or both; missing numeric fields take the
    /// training mean. A request the model reconstructs poorly gives
    /// a random weapon instead. Either way the request is kept as a
    /// dismantled weapon for the next training run.
    pub fn infer(&mut self, request: &Record) -> anyhow::Result<InferResponse> {
        let Some(vae) = self.model.as_mut() else {
            warn!("no trained model");
            return Ok(InferResponse::failed());
        };

        let mut request = request.clone();
        request.remove(SUCCESS_KEY);
        if request.is_empty() {
            warn!("empty request");
            return Ok(InferResponse::failed());
        }

        let record = prepare_decoded_record_for_encoding(
            &request,
            self.train_data.codec().schema(),
            self.config.label_selection,
        )?;
        let z_d = self.train_data.encode_record_standardized(&record)?;
        let x_1d = z_d.to_tensor(vae.device())?;

        let cost = vae
            .replicated_loss(&x_1d)?
            .first()
            .copied()
            .unwrap_or(f32::NAN);

        let random_fallback = !cost.is_finite() || cost >= self.config.generation_cost_threshold;
        let gen_nd = if random_fallback {
            info!("cost {} too high, generating a random weapon", cost);
            sample_from_prior(vae, &mut self.rng, 1)?
        } else {
            debug!("cost {}, reconstructing the dismantled weapon", cost);
            Array2::<f64>::from_tensor(&vae.encode_and_decode(&x_1d, false)?)?
        };

        self.dismantled.push(z_d);
        if self.dismantled.len() >= self.config.retrain_after && !self.should_retrain {
            info!("{} dismantled weapons, should retrain", self.dismantled.len());
            self.should_retrain = true;
        }

        let weapon = self.decode(gen_nd.row(0))?;
        Ok(InferResponse {
            weapon,
            success: true,
            cost: Some(cost),
            random_fallback,
        })
    }

    /// Decode `nn` draws from the latent prior
    pub fn generate_random_weapons(&mut self, nn: usize) -> anyhow::Result<Vec<Record>> {
        let Some(vae) = self.model.as_ref() else {
            anyhow::bail!("no trained model");
        };
        let gen_nd = sample_from_prior(vae, &mut self.rng, nn)?;
        gen_nd.rows().into_iter().map(|z_d| self.decode(z_d)).collect()
    }

    fn decode(&self, z_d: ArrayView1<f64>) -> anyhow::Result<Record> {
        let z_d = if self.config.clamp_generated {
            self.train_data.params().clamp_to_observed_range(z_d)
        } else {
            z_d.to_owned()
        };
        let (record, _) = self.train_data.decode_processed_row(
            z_d.view(),
            self.config.decimals,
            self.config.decode_mode(),
        )?;
        Ok(record)
    }
}

fn sample_from_prior(vae: &Vae, rng: &mut StdRng, nn: usize) -> anyhow::Result<Array2<f64>> {
    let kk = vae.architecture().n_z;
    let z: Vec<f32> = (0..nn * kk)
        .map(|_| StandardNormal.sample(&mut *rng))
        .collect();
    let z_nk = Tensor::from_vec(z, (nn, kk), vae.device())?;
    Array2::<f64>::from_tensor(&vae.decode_from_latent_space(&z_nk, false)?)
}
