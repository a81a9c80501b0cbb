use crate::error::DataError;
use crate::feature_codec::Record;

use matrix_util::common_io::{open_buf_reader, open_buf_writer};

/// Read every row of a headed CSV file (plain or gzipped)
///
/// * `file_path` - input file
/// * `required` - header names that must be present
pub fn read_records_csv(file_path: &str, required: &[&str]) -> anyhow::Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(open_buf_reader(file_path)?);

    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    for &field in required {
        if !header.iter().any(|h| h == field) {
            return Err(DataError::SchemaMismatch {
                field: field.into(),
                origin: file_path.into(),
            }
            .into());
        }
    }

    let mut ret = vec![];
    for row in reader.records() {
        let row = row?;
        ret.push(
            header
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect(),
        );
    }
    log::debug!("read {} records from {}", ret.len(), file_path);
    Ok(ret)
}

/// Write records with a fixed column order; missing values are empty
pub fn write_records_csv(
    file_path: &str,
    records: &[Record],
    columns: &[&str],
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(open_buf_writer(file_path)?);
    writer.write_record(columns)?;
    for rec in records {
        writer.write_record(
            columns
                .iter()
                .map(|&c| rec.get(c).map(|v| v.as_str()).unwrap_or("")),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::{create_temp_dir_file, write_lines};

    #[test]
    fn records_round_trip_through_csv() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".csv")?;
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

        let mut rec = Record::new();
        rec.insert("name".into(), "Big, Gun".into());
        rec.insert("rof".into(), "600".into());
        write_records_csv(file, &[rec.clone()], &["name", "rof"])?;

        let back = read_records_csv(file, &["rof"])?;
        assert_eq!(back, vec![rec]);
        Ok(())
    }

    #[test]
    fn missing_header_is_a_schema_mismatch() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".csv.gz")?;
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;
        let lines: Vec<Box<str>> = vec!["a,b".into(), "1,2".into()];
        write_lines(&lines, file)?;

        let err = read_records_csv(file, &["a", "type"]).unwrap_err();
        match err.downcast_ref::<DataError>() {
            Some(DataError::SchemaMismatch { field, .. }) => assert_eq!(&**field, "type"),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }
}
