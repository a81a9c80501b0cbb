use crate::error::DataError;
use crate::feature_codec::Record;
use crate::schema::Schema;

use serde::{Deserialize, Serialize};

/// How to pick one label out of the per-label scores of a decoded
/// categorical block
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelSelection {
    /// highest score; ties go to the earlier label
    ArgMax,
    /// the last label scoring at least `min_score`; if none does,
    /// the label at the position right after the scored ones (or the
    /// first label once that runs past the vocabulary)
    Threshold { min_score: f64 },
}

impl Default for LabelSelection {
    fn default() -> Self {
        Self::ArgMax
    }
}

/// Collapse `<field>_<label>` scores into a plain `<field>` entry
///
/// Keys that aren't label scores of a schema field pass through
/// unchanged, so the result can go straight to
/// [`crate::feature_codec::FeatureCodec::encode_partial`].
///
/// * `decoded` - record with per-label scores
/// * `schema` - which fields are categorical
/// * `policy` - label selection rule
pub fn prepare_decoded_record_for_encoding(
    decoded: &Record,
    schema: &Schema,
    policy: LabelSelection,
) -> anyhow::Result<Record> {
    let mut ret = Record::new();

    let label_keys: Vec<String> = schema
        .categorical()
        .iter()
        .flat_map(|f| f.vocabulary.iter().map(|l| f.label_key(l)))
        .collect();

    for (k, v) in decoded.iter() {
        if !label_keys.contains(k) {
            ret.insert(k.clone(), v.clone());
        }
    }

    for field in schema.categorical() {
        let mut scores = vec![];
        for label in field.vocabulary.iter() {
            if let Some(value) = decoded.get(&field.label_key(label)) {
                let score = value.trim().parse::<f64>().map_err(|_| DataError::Parse {
                    field: field.label_key(label).into(),
                    value: value.as_str().into(),
                })?;
                scores.push((label, score));
            }
        }

        if scores.is_empty() {
            // nothing to choose from; keep whatever plain value came in
            continue;
        }

        let chosen = match policy {
            LabelSelection::ArgMax => {
                let mut best = scores[0];
                for &(label, score) in scores.iter().skip(1) {
                    if score > best.1 || best.1.is_nan() {
                        best = (label, score);
                    }
                }
                best.0
            }
            LabelSelection::Threshold { min_score } => scores
                .iter()
                .rev()
                .find(|(_, score)| *score >= min_score)
                .map(|(label, _)| *label)
                .unwrap_or_else(|| {
                    field
                        .vocabulary
                        .get(scores.len())
                        .unwrap_or(&field.vocabulary[0])
                }),
        };
        ret.insert(field.name.to_string(), chosen.to_string());
    }

    Ok(ret)
}
