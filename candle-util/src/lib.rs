pub mod candle_aux_layers;
pub mod candle_aux_linear;
pub mod candle_data_loader;
pub mod candle_inference;
pub mod candle_loss_functions;
pub mod candle_model_decoder;
pub mod candle_model_encoder;
pub mod candle_model_traits;
pub mod candle_rmsprop;
pub mod candle_vae_inference;
pub mod error;

pub use candle_aux_layers::TransferFn;
pub use candle_inference::{
    CheckpointPolicy, EarlyStopping, OptimizerKind, TrainConfig, VaeArchitecture, VaeOptions,
};
pub use candle_vae_inference::{train_vae, TrainLog, Vae};
pub use error::VaeError;

pub use candle_core;
pub use candle_nn;
