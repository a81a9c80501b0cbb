use crate::csv_io::read_records_csv;
use crate::error::DataError;
use crate::feature_codec::{DecodeMode, FeatureCodec, Record};

use candle_util::candle_core::{Device, Tensor};
use candle_util::candle_data_loader::DataLoader;
use log::{debug, info};
use matrix_util::ndarray_stat::StandardizationParams;
use matrix_util::traits::ConvertMatOps;
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Position of the minibatch cursor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchCursor {
    pub epochs_completed: usize,
    pub index_in_epoch: usize,
}

/// Encoded weapons, their standardized copy and a minibatch cursor
///
/// The original (encoded, unstandardized) matrix is the reference:
/// standardization parameters are always fitted on all of it, and
/// appending rows refits them from scratch.
///
/// Batches wrap around: the last batch of an epoch takes the rows left
/// over and tops up from the start of the freshly shuffled next
/// epoch, so rows near the boundary can show up in two epochs.
#[derive(Clone)]
pub struct BatchedDataset {
    codec: FeatureCodec,
    original_nd: Array2<f64>,
    params: StandardizationParams,
    standardized_nd: Array2<f64>,
    order: Vec<usize>,
    cursor: BatchCursor,
    rng: StdRng,
}

impl BatchedDataset {
    /// Encode `records` and standardize them
    /// * `codec` - feature codec of the schema in use
    /// * `records` - complete weapon records
    /// * `seed` - shuffling seed
    pub fn new(codec: FeatureCodec, records: &[Record], seed: u64) -> anyhow::Result<Self> {
        let (original_nd, _) = codec.encode(records)?;
        Self::from_encoded(codec, original_nd, seed)
    }

    /// Read the weapons from a CSV file that has every schema field
    pub fn from_csv(codec: FeatureCodec, file_path: &str, seed: u64) -> anyhow::Result<Self> {
        let records = read_records_csv(file_path, &codec.schema().field_names())?;
        let ret = Self::new(codec, &records, seed)?;
        info!(
            "{} weapons x {} features from {}",
            ret.num_examples(),
            ret.num_features(),
            file_path
        );
        Ok(ret)
    }

    /// Wrap an already encoded matrix
    pub fn from_encoded(
        codec: FeatureCodec,
        original_nd: Array2<f64>,
        seed: u64,
    ) -> anyhow::Result<Self> {
        if original_nd.ncols() != codec.width() {
            return Err(DataError::WidthMismatch {
                expected: codec.width(),
                found: original_nd.ncols(),
            }
            .into());
        }
        let params = StandardizationParams::fit(&original_nd)?;
        let standardized_nd = params.apply(&original_nd);
        let order = (0..original_nd.nrows()).collect();

        Ok(Self {
            codec,
            original_nd,
            params,
            standardized_nd,
            order,
            cursor: BatchCursor::default(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn codec(&self) -> &FeatureCodec {
        &self.codec
    }

    /// Standardized matrix in its original row order
    pub fn data(&self) -> ArrayView2<f64> {
        self.standardized_nd.view()
    }

    pub fn original(&self) -> ArrayView2<f64> {
        self.original_nd.view()
    }

    pub fn params(&self) -> &StandardizationParams {
        &self.params
    }

    pub fn num_examples(&self) -> usize {
        self.original_nd.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.original_nd.ncols()
    }

    pub fn epochs_completed(&self) -> usize {
        self.cursor.epochs_completed
    }

    pub fn cursor(&self) -> BatchCursor {
        self.cursor
    }

    pub fn standardized_min(&self) -> ArrayView1<f64> {
        self.params.standardized_min.view()
    }

    pub fn standardized_max(&self) -> ArrayView1<f64> {
        self.params.standardized_max.view()
    }

    fn rows(&self, range: std::ops::Range<usize>) -> Array2<f64> {
        self.standardized_nd
            .select(Axis(0), &self.order[range])
    }

    /// The next `batch_size` standardized rows
    ///
    /// * `batch_size` - between 1 and `num_examples`
    /// * `shuffle` - reshuffle at the start of the first and of every
    ///   following epoch
    pub fn next_batch(&mut self, batch_size: usize, shuffle: bool) -> anyhow::Result<Array2<f64>> {
        let nn = self.num_examples();
        if batch_size == 0 || batch_size > nn {
            return Err(DataError::InvalidBatchSize {
                batch_size,
                num_examples: nn,
            }
            .into());
        }

        // the cursor only sits at zero before the first batch and right
        // after an append; every wrap leaves it past zero
        let start = self.cursor.index_in_epoch;
        if start == 0 && shuffle {
            self.order.shuffle(&mut self.rng);
        }

        if start + batch_size <= nn {
            self.cursor.index_in_epoch += batch_size;
            return Ok(self.rows(start..self.cursor.index_in_epoch));
        }

        self.cursor.epochs_completed += 1;
        debug!("completed epoch {}", self.cursor.epochs_completed);

        let tail = self.rows(start..nn);
        if shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor.index_in_epoch = batch_size - tail.nrows();
        let head = self.rows(0..self.cursor.index_in_epoch);
        Ok(concatenate(Axis(0), &[tail.view(), head.view()])?)
    }

    /// Append encoded rows in the original scale and refit the
    /// standardization over everything
    ///
    /// The cursor goes back to the start of the current epoch, which a
    /// shuffling [`Self::next_batch`] reshuffles; the epoch count is
    /// kept.
    pub fn add_new_weapons_and_restandardize_data(
        &mut self,
        new_nd: ArrayView2<f64>,
    ) -> anyhow::Result<()> {
        if new_nd.ncols() != self.num_features() {
            return Err(DataError::WidthMismatch {
                expected: self.num_features(),
                found: new_nd.ncols(),
            }
            .into());
        }

        let original_nd = concatenate(Axis(0), &[self.original_nd.view(), new_nd.reborrow()])?;
        self.params = StandardizationParams::fit(&original_nd)?;
        self.standardized_nd = self.params.apply(&original_nd);
        self.original_nd = original_nd;
        self.order = (0..self.num_examples()).collect();
        self.cursor.index_in_epoch = 0;

        info!(
            "added {} weapons, now {} in the dataset",
            new_nd.nrows(),
            self.num_examples()
        );
        Ok(())
    }

    /// Same as [`Self::add_new_weapons_and_restandardize_data`] for rows
    /// standardized with the current parameters
    pub fn add_standardized_rows(&mut self, z_nd: ArrayView2<f64>) -> anyhow::Result<()> {
        let x_nd = self.params.invert(&z_nd);
        self.add_new_weapons_and_restandardize_data(x_nd.view())
    }

    /// Standardize foreign encoded rows with this dataset's parameters
    pub fn standardize_encoded(&self, x_nd: ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
        if x_nd.ncols() != self.num_features() {
            return Err(DataError::WidthMismatch {
                expected: self.num_features(),
                found: x_nd.ncols(),
            }
            .into());
        }
        Ok(self.params.apply(&x_nd))
    }

    /// Encode a possibly incomplete record and standardize it; missing
    /// numeric fields land on the column mean (standardized zero)
    pub fn encode_record_standardized(&self, record: &Record) -> anyhow::Result<Array1<f64>> {
        let num_numeric = self.codec.schema().numeric().len();
        let defaults = self.params.mean.slice(s![..num_numeric]);
        let x_d = self.codec.encode_partial(record, defaults)?;
        Ok(self.params.apply_row(&x_d))
    }

    /// Undo the standardization of a row and decode it
    ///
    /// Returns the record and the row in the original scale.
    pub fn decode_processed_row(
        &self,
        z_d: ArrayView1<f64>,
        decimals: usize,
        mode: DecodeMode,
    ) -> anyhow::Result<(Record, Array1<f64>)> {
        if z_d.len() != self.num_features() {
            return Err(DataError::WidthMismatch {
                expected: self.num_features(),
                found: z_d.len(),
            }
            .into());
        }
        let x_d = self.params.invert_row(&z_d);
        let record = self.codec.decode_row(x_d.view(), decimals, mode)?;
        Ok((record, x_d))
    }

    /// Write the column statistics as a tab-separated table
    pub fn save_standardization(&self, file_path: &str) -> anyhow::Result<()> {
        self.params
            .save(file_path, &self.codec.column_map().names(), "\t")
    }
}

impl DataLoader for BatchedDataset {
    fn next_minibatch(
        &mut self,
        batch_size: usize,
        target_device: &Device,
    ) -> anyhow::Result<Tensor> {
        self.next_batch(batch_size, true)?.to_tensor(target_device)
    }

    fn num_examples(&self) -> usize {
        BatchedDataset::num_examples(self)
    }

    fn epochs_completed(&self) -> usize {
        self.cursor.epochs_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CategoricalField, Schema};
    use ndarray::array;

    fn codec(num_numeric: usize) -> anyhow::Result<FeatureCodec> {
        let numeric = (0..num_numeric).map(|j| format!("x{}", j).into()).collect();
        FeatureCodec::new(Schema::new(numeric, vec![], None)?)
    }

    fn counting(nn: usize) -> anyhow::Result<BatchedDataset> {
        let x_nd = Array2::from_shape_fn((nn, 1), |(i, _)| i as f64);
        BatchedDataset::from_encoded(codec(1)?, x_nd, 42)
    }

    fn row_ids(ds: &BatchedDataset, batch: &Array2<f64>) -> Vec<usize> {
        let params = ds.params();
        batch
            .column(0)
            .iter()
            .map(|z| (z * params.std[0] + params.mean[0]).round() as usize)
            .collect()
    }

    #[test]
    fn unshuffled_batches_wrap_around() -> anyhow::Result<()> {
        let mut ds = counting(5)?;
        let b1 = ds.next_batch(2, false)?;
        let b2 = ds.next_batch(2, false)?;
        let b3 = ds.next_batch(2, false)?;
        assert_eq!(row_ids(&ds, &b1), vec![0, 1]);
        assert_eq!(row_ids(&ds, &b2), vec![2, 3]);
        assert_eq!(row_ids(&ds, &b3), vec![4, 0]);
        assert_eq!(
            ds.cursor(),
            BatchCursor {
                epochs_completed: 1,
                index_in_epoch: 1
            }
        );
        Ok(())
    }

    #[test]
    fn every_row_is_visited_each_epoch() -> anyhow::Result<()> {
        let mut ds = counting(12)?;
        for epoch in 0..4 {
            let mut seen = vec![];
            for _ in 0..3 {
                let batch = ds.next_batch(4, true)?;
                assert_eq!(batch.nrows(), 4);
                seen.extend(row_ids(&ds, &batch));
            }
            seen.sort();
            assert_eq!(seen, (0..12).collect::<Vec<_>>());
            // the wrap happens on the first call of the next epoch
            assert_eq!(ds.epochs_completed(), epoch);
        }
        ds.next_batch(4, true)?;
        assert_eq!(ds.epochs_completed(), 4);
        Ok(())
    }

    #[test]
    fn shuffling_is_seeded() -> anyhow::Result<()> {
        let mut a = counting(20)?;
        let mut b = counting(20)?;
        for _ in 0..7 {
            assert_eq!(a.next_batch(6, true)?, b.next_batch(6, true)?);
        }
        Ok(())
    }

    #[test]
    fn oversized_batch_is_rejected() -> anyhow::Result<()> {
        let mut ds = counting(3)?;
        for bs in [0, 4] {
            let err = ds.next_batch(bs, true).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<DataError>(),
                Some(DataError::InvalidBatchSize { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn append_refits_from_scratch() -> anyhow::Result<()> {
        let mut ds = counting(4)?;
        ds.next_batch(3, false)?;
        ds.add_new_weapons_and_restandardize_data(array![[10.0]].view())?;

        assert_eq!(ds.num_examples(), 5);
        assert_eq!(ds.cursor().index_in_epoch, 0);

        let refit = StandardizationParams::fit(&array![[0.0], [1.0], [2.0], [3.0], [10.0]])?;
        assert_eq!(ds.params(), &refit);
        assert_eq!(ds.data(), refit.apply(&ds.original()));
        Ok(())
    }

    #[test]
    fn epoch_after_append_is_reshuffled() -> anyhow::Result<()> {
        let mut ds = counting(20)?;
        for _ in 0..6 {
            ds.next_batch(4, true)?;
        }
        assert_eq!(ds.epochs_completed(), 1);
        ds.add_new_weapons_and_restandardize_data(array![[20.0]].view())?;

        let mut seen = vec![];
        for _ in 0..5 {
            let batch = ds.next_batch(4, true)?;
            seen.extend(row_ids(&ds, &batch));
        }
        assert_eq!(ds.cursor().index_in_epoch, 20);
        assert_ne!(seen, (0..20).collect::<Vec<_>>());

        let batch = ds.next_batch(4, true)?;
        seen.extend(row_ids(&ds, &batch).into_iter().take(1));
        seen.sort();
        assert_eq!(seen, (0..21).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn standardized_rows_are_unstandardized_before_append() -> anyhow::Result<()> {
        let mut ds = counting(4)?;
        let z = ds.standardize_encoded(array![[7.0]].view())?;
        ds.add_standardized_rows(z.view())?;
        approx::assert_abs_diff_eq!(ds.original()[[4, 0]], 7.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn partial_record_lands_on_the_mean() -> anyhow::Result<()> {
        let codec = FeatureCodec::new(Schema::new(
            vec!["a".into(), "b".into()],
            vec![CategoricalField::new("type", &["X", "Y"])],
            None,
        )?)?;
        let x_nd = array![[1.0, 2.0, 1.0, 0.0], [3.0, 4.0, 0.0, 1.0]];
        let ds = BatchedDataset::from_encoded(codec, x_nd, 1)?;

        let mut rec = Record::new();
        rec.insert("b".into(), "4.0".into());
        rec.insert("type".into(), "Y".into());
        let z_d = ds.encode_record_standardized(&rec)?;
        assert_eq!(z_d, array![0.0, 1.0, -1.0, 1.0]);

        let (decoded, x_d) = ds.decode_processed_row(z_d.view(), 1, DecodeMode::Symmetric)?;
        assert_eq!(x_d, array![2.0, 4.0, 0.0, 1.0]);
        assert_eq!(decoded["a"], "2.0");
        assert_eq!(decoded["type_Y"], "1.0");
        Ok(())
    }
}
