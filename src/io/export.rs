use crate::types::{Band, BandTables, SeriesResult, TallRecord, WideRow, NODATA};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Region identifier column shared by both tables
pub const ID_COLUMN: &str = "id";

/// Write a tall table: `id, date, <band>`
pub fn write_tall_csv<W: Write>(writer: W, band: Band, records: &[TallRecord]) -> SeriesResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([ID_COLUMN, "date", band.name()])?;
    for record in records {
        let value = record.value.to_string();
        csv.write_record([record.region_id.as_str(), record.date.as_str(), value.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write a wide table: `id, <day_1>, <day_2>, ...`, days ascending. Cells a
/// region has no value for are written as the NODATA sentinel.
pub fn write_wide_csv<W: Write>(writer: W, rows: &[WideRow]) -> SeriesResult<()> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.columns.keys().map(String::as_str))
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec![ID_COLUMN];
    header.extend(columns.iter().copied());
    csv.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.region_id.clone()];
        record.extend(
            columns
                .iter()
                .map(|c| row.columns.get(*c).copied().unwrap_or(NODATA).to_string()),
        );
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Output file names of one band
pub fn table_paths(dir: &Path, band: Band) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}_time_series_multiple_tall.csv", band)),
        dir.join(format!("{}_time_series_multiple_wide.csv", band)),
    )
}

/// Write tall and wide CSVs of every band into `dir`, returning the paths written
pub fn write_band_tables(dir: &Path, tables: &[BandTables]) -> SeriesResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(tables.len() * 2);
    for table in tables {
        let (tall_path, wide_path) = table_paths(dir, table.band);
        write_tall_csv(File::create(&tall_path)?, table.band, &table.tall)?;
        write_wide_csv(File::create(&wide_path)?, &table.wide)?;
        log::info!(
            "Wrote {} ({} rows) and {} ({} rows)",
            tall_path.display(),
            table.tall.len(),
            wide_path.display(),
            table.wide.len()
        );
        written.push(tall_path);
        written.push(wide_path);
    }
    Ok(written)
}
