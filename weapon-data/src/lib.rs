pub mod csv_io;
pub mod dataset;
pub mod error;
pub mod feature_codec;
pub mod label_policy;
pub mod schema;

pub use dataset::{BatchCursor, BatchedDataset};
pub use error::DataError;
pub use feature_codec::{DecodeMode, FeatureCodec, Record};
pub use label_policy::{prepare_decoded_record_for_encoding, LabelSelection};
pub use schema::{weapon_schema, CategoricalField, Column, ColumnMap, EmbeddedField, Schema};
