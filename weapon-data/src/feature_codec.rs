use crate::error::DataError;
use crate::schema::{Column, ColumnMap, EmbeddedField, Schema};

use fnv::FnvHasher;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayViewMut1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::hash::Hasher;

/// A weapon as field name -> raw text value
pub type Record = BTreeMap<String, String>;

/// How a decoded one-hot block is written back out
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// one `<field>_<label>` entry per vocabulary label
    #[default]
    Symmetric,
    /// drops the key of the last label of every block while still
    /// stepping over its column, as older checkpoints expect
    LegacyTruncated,
}

/// Converts weapon records into fixed-width numeric rows and back
///
/// Row layout: numeric fields, then one one-hot block per categorical
/// field (labels in vocabulary order), then the hashed embedding
/// block if the schema has one.
#[derive(Clone)]
pub struct FeatureCodec {
    schema: Schema,
    columns: ColumnMap,
    embedding: Option<Array2<f64>>,
}

impl FeatureCodec {
    pub fn new(schema: Schema) -> anyhow::Result<Self> {
        let embedding = match schema.embedded() {
            Some(field) => Some(embedding_table(field)?),
            None => None,
        };
        let columns = schema.column_map();
        Ok(Self {
            schema,
            columns,
            embedding,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Encode complete records
    ///
    /// Every schema field must be present. Numeric values that don't
    /// parse fail the whole call; unknown labels give a zero block.
    pub fn encode(&self, records: &[Record]) -> anyhow::Result<(Array2<f64>, ColumnMap)> {
        let mut x_nd = Array2::zeros((records.len(), self.width()));
        for (i, record) in records.iter().enumerate() {
            for field in self.schema.field_names() {
                if !record.contains_key(field) {
                    return Err(DataError::SchemaMismatch {
                        field: field.into(),
                        origin: format!("record {}", i).into(),
                    }
                    .into());
                }
            }
            self.encode_into(record, None, x_nd.row_mut(i))?;
        }
        Ok((x_nd, self.columns.clone()))
    }

    /// Encode a record that may lack some fields
    ///
    /// * `record` - possibly incomplete weapon
    /// * `numeric_defaults` - value per numeric field, in schema order,
    ///   used when that field is missing
    pub fn encode_partial(
        &self,
        record: &Record,
        numeric_defaults: ArrayView1<f64>,
    ) -> anyhow::Result<Array1<f64>> {
        let num_numeric = self.schema.numeric().len();
        if numeric_defaults.len() != num_numeric {
            return Err(DataError::WidthMismatch {
                expected: num_numeric,
                found: numeric_defaults.len(),
            }
            .into());
        }
        let mut x_d = Array1::zeros(self.width());
        self.encode_into(record, Some(numeric_defaults), x_d.view_mut())?;
        Ok(x_d)
    }

    fn encode_into(
        &self,
        record: &Record,
        numeric_defaults: Option<ArrayView1<f64>>,
        mut x_d: ArrayViewMut1<f64>,
    ) -> anyhow::Result<()> {
        let mut j = 0;

        for (k, field) in self.schema.numeric().iter().enumerate() {
            x_d[j] = match (record.get(&field[..]), numeric_defaults) {
                (Some(value), _) => parse_numeric(field, value)?,
                (None, Some(defaults)) => defaults[k],
                (None, None) => {
                    return Err(DataError::SchemaMismatch {
                        field: field.clone(),
                        origin: "record".into(),
                    }
                    .into())
                }
            };
            j += 1;
        }

        for field in self.schema.categorical() {
            if let Some(value) = record.get(&field.name[..]) {
                let value = value.trim();
                if let Some(pos) = field.vocabulary.iter().position(|l| &**l == value) {
                    x_d[j + pos] = 1.0;
                }
            }
            j += field.vocabulary.len();
        }

        if let (Some(field), Some(table)) = (self.schema.embedded(), &self.embedding) {
            if let Some(value) = record.get(&field.name[..]) {
                let bucket = hash_bucket(value.trim(), field.num_buckets);
                x_d.slice_mut(s![j..j + field.dim])
                    .assign(&table.row(bucket));
            }
        }

        Ok(())
    }

    /// Turn an encoded row (original scale) back into a record
    ///
    /// Numeric fields are printed with `decimals` digits. Each label
    /// of a categorical field comes out under `<field>_<label>` with
    /// its score; picking a winner is left to the caller (see
    /// [`crate::label_policy`]). The embedded block is skipped.
    pub fn decode_row(
        &self,
        x_d: ArrayView1<f64>,
        decimals: usize,
        mode: DecodeMode,
    ) -> anyhow::Result<Record> {
        if x_d.len() != self.width() {
            return Err(DataError::WidthMismatch {
                expected: self.width(),
                found: x_d.len(),
            }
            .into());
        }

        let mut ret = Record::new();
        let mut j = 0;
        for field in self.schema.numeric() {
            ret.insert(field.to_string(), format!("{:.*}", decimals, x_d[j]));
            j += 1;
        }

        for field in self.schema.categorical() {
            let num_labels = match mode {
                DecodeMode::Symmetric => field.vocabulary.len(),
                DecodeMode::LegacyTruncated => field.vocabulary.len() - 1,
            };
            for (k, label) in field.vocabulary.iter().take(num_labels).enumerate() {
                ret.insert(
                    field.label_key(label),
                    format!("{:.*}", decimals, x_d[j + k]),
                );
            }
            j += field.vocabulary.len();
        }

        debug_assert!(self
            .columns
            .columns()
            .iter()
            .skip(j)
            .all(|c| matches!(c, Column::Embedded { .. })));

        Ok(ret)
    }
}

fn parse_numeric(field: &str, value: &str) -> anyhow::Result<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        DataError::Parse {
            field: field.into(),
            value: value.into(),
        }
        .into()
    })
}

/// FNV-1a of the raw bytes, so buckets are stable across runs
pub fn hash_bucket(value: &str, num_buckets: usize) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write(value.as_bytes());
    (hasher.finish() % num_buckets as u64) as usize
}

/// Fixed embedding table: N(0, 1/dim) draws, one row per bucket
fn embedding_table(field: &EmbeddedField) -> anyhow::Result<Array2<f64>> {
    let mut rng = StdRng::seed_from_u64(field.seed);
    let normal = Normal::new(0.0, 1.0 / (field.dim as f64).sqrt())?;
    Ok(Array2::from_shape_simple_fn(
        (field.num_buckets, field.dim),
        || normal.sample(&mut rng),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{weapon_schema, CategoricalField, DEFAULT_SEED};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ab_type() -> anyhow::Result<FeatureCodec> {
        let schema = Schema::new(
            vec!["a".into(), "b".into()],
            vec![CategoricalField::new("type", &["X", "Y"])],
            None,
        )?;
        FeatureCodec::new(schema)
    }

    #[test]
    fn encode_two_rows() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let rows = vec![
            record(&[("a", "1.0"), ("b", "2.0"), ("type", "X")]),
            record(&[("a", "3.0"), ("b", "4.0"), ("type", "Y")]),
        ];
        let (x_nd, columns) = codec.encode(&rows)?;
        assert_eq!(x_nd, array![[1.0, 2.0, 1.0, 0.0], [3.0, 4.0, 0.0, 1.0]]);
        let names: Vec<String> = columns.names().iter().map(|x| x.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "type_X", "type_Y"]);
        Ok(())
    }

    #[test]
    fn unknown_label_is_a_zero_block() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let rows = vec![record(&[("a", "1"), ("b", "2"), ("type", "Z")])];
        let (x_nd, _) = codec.encode(&rows)?;
        assert_eq!(x_nd.row(0), array![1.0, 2.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn bad_number_fails_the_whole_call() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let rows = vec![
            record(&[("a", "1"), ("b", "2"), ("type", "X")]),
            record(&[("a", "fast"), ("b", "2"), ("type", "X")]),
        ];
        let err = codec.encode(&rows).unwrap_err();
        match err.downcast_ref::<DataError>() {
            Some(DataError::Parse { field, value }) => {
                assert_eq!(&**field, "a");
                assert_eq!(&**value, "fast");
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn missing_field_is_a_schema_mismatch() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let err = codec
            .encode(&[record(&[("a", "1"), ("type", "X")])])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn partial_record_takes_defaults() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let x_d = codec.encode_partial(&record(&[("b", "7")]), array![2.5, 0.0].view())?;
        assert_eq!(x_d, array![2.5, 7.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn decode_emits_every_label() -> anyhow::Result<()> {
        let codec = ab_type()?;
        let rec = codec.decode_row(array![1.0, 2.25, 0.9, 0.1].view(), 2, DecodeMode::Symmetric)?;
        assert_eq!(rec["a"], "1.00");
        assert_eq!(rec["b"], "2.25");
        assert_eq!(rec["type_X"], "0.90");
        assert_eq!(rec["type_Y"], "0.10");
        assert_eq!(rec.len(), 4);
        Ok(())
    }

    #[test]
    fn legacy_decode_drops_the_last_label() -> anyhow::Result<()> {
        let schema = weapon_schema(2, 1, 1, DEFAULT_SEED)?;
        let codec = FeatureCodec::new(schema)?;
        let mut x_d = Array1::zeros(codec.width());
        x_d[0] = 3.0;
        x_d[1 + 6] = 1.0; // firemode_Automatic
        let rec = codec.decode_row(x_d.view(), 1, DecodeMode::LegacyTruncated)?;
        assert!(rec.contains_key("type_Sniper"));
        assert!(!rec.contains_key("type_MG"));
        assert!(!rec.contains_key("firemode_Single"));
        assert_eq!(rec["firemode_Automatic"], "1.0");
        assert_eq!(rec.len(), 1 + 5 + 2);
        Ok(())
    }

    #[test]
    fn ammo_is_embedded_deterministically() -> anyhow::Result<()> {
        let codec_1 = FeatureCodec::new(weapon_schema(3, 1, 2, DEFAULT_SEED)?)?;
        let codec_2 = FeatureCodec::new(weapon_schema(3, 1, 2, DEFAULT_SEED)?)?;
        let rec = record(&[
            ("damages_first", "10"),
            ("type", "MG"),
            ("firemode", "Semi"),
            ("ammo", "5.56mm"),
        ]);
        let (x1, _) = codec_1.encode(&[rec.clone()])?;
        let (x2, _) = codec_2.encode(&[rec])?;
        assert_eq!(x1, x2);
        assert_eq!(x1.ncols(), 1 + 6 + 3 + 2);
        assert_abs_diff_eq!(x1[[0, 6]], 1.0);
        assert!(x1.slice(s![0, 10..]).iter().any(|&v| v != 0.0));

        let decoded = codec_1.decode_row(x1.row(0), 0, DecodeMode::Symmetric)?;
        assert!(!decoded.keys().any(|k| k.starts_with("ammo")));
        Ok(())
    }

    #[test]
    fn hash_buckets_are_stable() {
        assert_eq!(hash_bucket("9mm", 31), hash_bucket("9mm", 31));
        assert!(hash_bucket("anything", 31) < 31);
    }
}
