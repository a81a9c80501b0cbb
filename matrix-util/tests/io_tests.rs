use matrix_util::common_io::{create_temp_dir_file, open_append_writer, read_lines, write_lines};
use matrix_util::ndarray_stat::StandardizationParams;
use std::io::Write;

#[test]
fn gzipped_lines_round_trip() -> anyhow::Result<()> {
    let file = create_temp_dir_file("txt.gz")?;
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    let lines: Vec<Box<str>> = vec!["damages_first\t30".into(), "rof\t600".into()];
    write_lines(&lines, file)?;
    assert_eq!(read_lines(file)?, lines);
    Ok(())
}

#[test]
fn append_writer_reports_an_empty_start_once() -> anyhow::Result<()> {
    let file = create_temp_dir_file(".csv")?;
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    for expected in [true, false] {
        let (mut writer, was_empty) = open_append_writer(file)?;
        assert_eq!(was_empty, expected);
        writeln!(writer, "row")?;
        writer.flush()?;
    }
    assert_eq!(read_lines(file)?.len(), 2);
    Ok(())
}

#[test]
fn standardization_table_has_one_row_per_column() -> anyhow::Result<()> {
    let file = create_temp_dir_file(".tsv")?;
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    let x_nd = ndarray::array![[1.0, 10.0], [3.0, 30.0]];
    let params = StandardizationParams::fit(&x_nd)?;
    params.save(file, &["a".into(), "b".into()], "\t")?;

    let lines = read_lines(file)?;
    assert_eq!(&*lines[0], "#name\tmu\tsig\tmin\tmax");
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("b\t20"));
    Ok(())
}
