use crate::config::GeneratorConfig;
use crate::evaluate::Evaluation;

use candle_util::TrainLog;
use matrix_util::common_io::{mkdir, open_append_writer, open_buf_reader, open_buf_writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};

/// `epoch,avg_cost` rows of a single training run
pub struct EpochCostWriter {
    writer: csv::Writer<Box<dyn Write>>,
}

impl EpochCostWriter {
    pub fn create(file_path: &str) -> anyhow::Result<Self> {
        mkdir(file_path)?;
        let mut writer = csv::Writer::from_writer(open_buf_writer(file_path)?);
        writer.write_record(["epoch", "avg_cost"])?;
        Ok(Self { writer })
    }

    /// * `epoch` - one-based
    pub fn write(&mut self, epoch: usize, avg_cost: f32) -> anyhow::Result<()> {
        self.writer
            .write_record([epoch.to_string(), avg_cost.to_string()])?;
        Ok(())
    }

    pub fn write_log(&mut self, log: &TrainLog) -> anyhow::Result<()> {
        for (e, &cost) in log.avg_costs.iter().enumerate() {
            self.write(e + 1, cost)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One row of the sweep summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub avg_cost: f64,
    pub avg_un_dist: f64,
    pub avg_n_dist: f64,
    pub l_r: f64,
    pub n_h_1: usize,
    /// 0 without a second hidden layer
    pub n_h_2: usize,
    pub n_z: usize,
    pub optimiz: String,
    pub transf: String,
    pub epochs: usize,
    pub batch: usize,
    pub n_cat: usize,
    pub n_num: usize,
    pub ammo_f: usize,
    pub train_log: String,
}

impl RunSummary {
    pub fn new(config: &GeneratorConfig, eval: &Evaluation, log: &TrainLog) -> Self {
        Self {
            avg_cost: eval.avg_cost,
            avg_un_dist: eval.avg_unstandardized_distance,
            avg_n_dist: eval.avg_standardized_distance,
            l_r: config.learning_rate,
            n_h_1: config.n_hidden_1,
            n_h_2: config.n_hidden_2.unwrap_or(0),
            n_z: config.n_z,
            optimiz: config.optimizer.name().into(),
            transf: config.transfer.name().into(),
            epochs: config.num_epochs,
            batch: config.batch_size,
            n_cat: config.num_categorical,
            n_num: config.num_numerical,
            ammo_f: config.embedded_dim,
            train_log: log.joined_log(),
        }
    }
}

/// Appends summary rows to a CSV file; the header goes in only when
/// the file starts out empty
pub struct SummaryWriter {
    writer: csv::Writer<BufWriter<File>>,
}

impl SummaryWriter {
    pub fn open(file_path: &str) -> anyhow::Result<Self> {
        let (file, was_empty) = open_append_writer(file_path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(was_empty)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn write(&mut self, row: &RunSummary) -> anyhow::Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub fn read_summaries(file_path: &str) -> anyhow::Result<Vec<RunSummary>> {
    let mut reader = csv::Reader::from_reader(open_buf_reader(file_path)?);
    let mut ret = vec![];
    for row in reader.deserialize() {
        ret.push(row?);
    }
    Ok(ret)
}
