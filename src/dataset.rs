use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use sqlx::Connection;
use tracing::info;

use crate::db;
use crate::error::{ForecastError, Result};
use crate::models::{CaseRow, Disease, GeoRecord};

/// A CSV source exactly as read: header names, string cells, and a per-column
/// numeric/text classification inferred from the cells. This is the shape
/// that gets archived to the durable store.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub numeric: Vec<bool>,
}

impl RawTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn text(&self, row: &[String], name: &str) -> String {
        self.column(name)
            .map(|index| row[index].clone())
            .unwrap_or_default()
    }

    fn number(&self, row: &[String], name: &str) -> f64 {
        self.column(name)
            .and_then(|index| row[index].parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// `Some` only when the source actually carries the column.
    fn optional_number(&self, row: &[String], name: &str) -> Option<f64> {
        self.column(name)
            .map(|index| row[index].parse::<f64>().unwrap_or(0.0))
    }
}

/// Everything the pipeline needs downstream of a load: the two typed disease
/// tables plus the geographic lookup.
#[derive(Debug)]
pub struct LoadedData {
    pub corona: Vec<CaseRow>,
    pub variole: Vec<CaseRow>,
    pub geo: Vec<GeoRecord>,
}

pub fn read_raw_csv(path: &Path) -> Result<RawTable> {
    let reader = csv::Reader::from_path(path)?;
    parse_raw(reader)
}

/// Reads a CSV into a `RawTable` and applies the fill policy: a column is
/// numeric iff every non-empty cell parses as a number, then empty numeric
/// cells become `0` and empty text cells become the empty string. Rows are
/// never dropped for missing data.
pub fn parse_raw<R: Read>(mut reader: csv::Reader<R>) -> Result<RawTable> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    let numeric: Vec<bool> = (0..headers.len())
        .map(|column| {
            let mut saw_value = false;
            for row in &rows {
                let cell = row[column].trim();
                if cell.is_empty() {
                    continue;
                }
                saw_value = true;
                if cell.parse::<f64>().is_err() {
                    return false;
                }
            }
            saw_value
        })
        .collect();

    for row in rows.iter_mut() {
        for (column, cell) in row.iter_mut().enumerate() {
            if cell.trim().is_empty() {
                *cell = if numeric[column] {
                    "0".to_string()
                } else {
                    String::new()
                };
            }
        }
    }

    Ok(RawTable {
        headers,
        rows,
        numeric,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| ForecastError::Internal(format!("invalid date {raw:?}: {err}")))
}

/// Types the corona source. Its own columns (cumulative totals, active and
/// daily counts) are kept, and the canonical fields are populated from them
/// so both feature schemas can read the same row shape.
pub fn corona_rows(raw: &RawTable) -> Result<Vec<CaseRow>> {
    raw.rows
        .iter()
        .map(|row| {
            let cumulative_cases = raw.number(row, "cumulative_total_cases");
            let cumulative_deaths = raw.number(row, "cumulative_total_deaths");
            let daily_cases = raw.number(row, "daily_new_cases");
            let daily_deaths = raw.number(row, "daily_new_deaths");

            Ok(CaseRow {
                country: raw.text(row, "country"),
                date: parse_date(&raw.text(row, "date"))?,
                total_cases: cumulative_cases,
                total_deaths: cumulative_deaths,
                new_cases: daily_cases,
                new_deaths: daily_deaths,
                cumulative_total_cases: raw.optional_number(row, "cumulative_total_cases"),
                active_cases: raw.optional_number(row, "active_cases"),
                daily_new_cases: raw.optional_number(row, "daily_new_cases"),
            })
        })
        .collect()
}

/// Normalizes the variole source to the canonical shape {country, date,
/// total_cases, total_deaths, new_cases, new_deaths}: `location` becomes
/// `country`, extra columns are dropped, and the aggregate pseudo-country
/// row "Africa" is excluded because it double-counts its constituents.
pub fn variole_rows(raw: &RawTable) -> Result<Vec<CaseRow>> {
    raw.rows
        .iter()
        .filter(|row| raw.text(row, "location") != "Africa")
        .map(|row| {
            Ok(CaseRow {
                country: raw.text(row, "location"),
                date: parse_date(&raw.text(row, "date"))?,
                total_cases: raw.number(row, "total_cases"),
                total_deaths: raw.number(row, "total_deaths"),
                new_cases: raw.number(row, "new_cases"),
                new_deaths: raw.number(row, "new_deaths"),
                cumulative_total_cases: None,
                active_cases: None,
                daily_new_cases: None,
            })
        })
        .collect()
}

pub fn geo_records(raw: &RawTable) -> Vec<GeoRecord> {
    raw.rows
        .iter()
        .map(|row| GeoRecord {
            country: raw.text(row, "country"),
            continent: raw.text(row, "continent"),
        })
        .collect()
}

/// Reads the three tabular sources, archives raw copies of both disease
/// tables to the durable store, and returns the cleaned, typed tables.
///
/// The archival write is a side effect only; nothing downstream reads it
/// back. An unreachable store still fails the whole load, no partial-result
/// semantics.
pub async fn load(data_dir: &Path, database_url: &str) -> Result<LoadedData> {
    let corona_raw = read_raw_csv(&data_dir.join("corona.csv"))?;
    let variole_raw = read_raw_csv(&data_dir.join("variole.csv"))?;
    let geo_raw = read_raw_csv(&data_dir.join("localisation.csv"))?;

    archive_raw(database_url, &corona_raw, &variole_raw).await?;

    Ok(LoadedData {
        corona: corona_rows(&corona_raw)?,
        variole: variole_rows(&variole_raw)?,
        geo: geo_records(&geo_raw),
    })
}

/// One scoped store connection per load, closed on every exit path.
async fn archive_raw(database_url: &str, corona: &RawTable, variole: &RawTable) -> Result<()> {
    let mut conn = db::connect(database_url).await?;

    let outcome: Result<()> = async {
        db::replace_raw_table(&mut conn, Disease::Corona.raw_table(), corona).await?;
        db::replace_raw_table(&mut conn, Disease::Variole.raw_table(), variole).await?;
        Ok(())
    }
    .await;

    let _ = conn.close().await;

    if outcome.is_ok() {
        info!(
            corona_rows = corona.rows.len(),
            variole_rows = variole.rows.len(),
            "archived raw disease tables"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_from(text: &str) -> RawTable {
        parse_raw(csv::Reader::from_reader(text.as_bytes())).unwrap()
    }

    #[test]
    fn missing_numeric_cells_become_zero_and_text_stays_empty() {
        let raw = raw_from("country,date,new_cases\nFrance,2024-01-02,\n,2024-01-03,7\n");
        assert!(raw.numeric[2]);
        assert!(!raw.numeric[0]);
        assert_eq!(raw.rows[0][2], "0");
        assert_eq!(raw.rows[1][0], "");
        assert_eq!(raw.rows.len(), 2, "missing cells never drop rows");
    }

    #[test]
    fn date_columns_are_classified_as_text() {
        let raw = raw_from("date,value\n2024-01-02,1\n2024-01-03,2\n");
        assert!(!raw.numeric[0]);
        assert!(raw.numeric[1]);
    }

    #[test]
    fn corona_rows_carry_source_columns_and_canonical_aliases() {
        let raw = raw_from(
            "country,date,cumulative_total_cases,daily_new_cases,active_cases,cumulative_total_deaths,daily_new_deaths\n\
             France,2024-12-31,1000,10,40,25,1\n",
        );
        let rows = corona_rows(&raw).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.cumulative_total_cases, Some(1000.0));
        assert_eq!(row.active_cases, Some(40.0));
        assert_eq!(row.daily_new_cases, Some(10.0));
        assert_eq!(row.total_cases, 1000.0);
        assert_eq!(row.new_cases, 10.0);
        assert_eq!(row.date, "2024-12-31".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn variole_rows_are_normalized_and_exclude_the_africa_aggregate() {
        let raw = raw_from(
            "location,date,total_cases,total_deaths,new_cases,new_deaths,iso_code\n\
             Nigeria,2024-06-01,120,3,5,0,NGA\n\
             Africa,2024-06-01,900,40,55,2,\n\
             Egypt,2024-06-01,80,1,2,0,EGY\n",
        );
        let rows = variole_rows(&raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.country != "Africa"));
        assert_eq!(rows[0].country, "Nigeria");
        assert_eq!(rows[0].total_cases, 120.0);
        assert!(rows[0].cumulative_total_cases.is_none());
    }

    #[test]
    fn malformed_dates_fail_the_load() {
        let raw = raw_from("country,date,cumulative_total_cases\nFrance,not-a-date,5\n");
        assert!(corona_rows(&raw).is_err());
    }

    #[test]
    fn geo_records_default_missing_continent_to_empty() {
        let raw = raw_from("country,continent\nFrance,Europe\nAtlantis,\n");
        let geo = geo_records(&raw);
        assert_eq!(geo.len(), 2);
        assert_eq!(geo[1].continent, "");
    }
}
