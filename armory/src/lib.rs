pub mod config;
pub mod evaluate;
pub mod generator;
pub mod metrics;
pub mod sweep;

pub use config::GeneratorConfig;
pub use evaluate::{evaluate, Evaluation};
pub use generator::{InferResponse, WeaponGenerator};
pub use metrics::{EpochCostWriter, RunSummary, SummaryWriter};
pub use sweep::{run_sweep, SweepGrid};
