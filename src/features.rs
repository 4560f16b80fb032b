use std::collections::HashMap;

use chrono::Datelike;

use crate::encoding::encode_cyclical;
use crate::models::{CaseRow, FeatureRow, GeoRecord};

/// Left-joins a disease table with the geographic lookup and derives the
/// temporal features the models train on.
///
/// Rows with no geographic match are kept with an empty continent, never
/// dropped: downstream consumers depend on row-count parity with the source
/// table. The date goes out as a string because `FeatureRow` is also the
/// transport shape.
pub fn build_features(rows: &[CaseRow], geo: &[GeoRecord]) -> Vec<FeatureRow> {
    let continents: HashMap<&str, &str> = geo
        .iter()
        .map(|record| (record.country.as_str(), record.continent.as_str()))
        .collect();

    rows.iter()
        .map(|row| {
            let continent = continents
                .get(row.country.as_str())
                .copied()
                .unwrap_or("")
                .to_string();
            let month = row.date.month();
            let (month_sin, month_cos) = encode_cyclical(month, 12);

            FeatureRow {
                country: row.country.clone(),
                date: row.date.format("%Y-%m-%d").to_string(),
                continent,
                total_cases: row.total_cases,
                total_deaths: row.total_deaths,
                new_cases: row.new_cases,
                new_deaths: row.new_deaths,
                cumulative_total_cases: row.cumulative_total_cases,
                active_cases: row.active_cases,
                daily_new_cases: row.daily_new_cases,
                year: row.date.year(),
                month,
                month_sin,
                month_cos,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(country: &str, date: &str) -> CaseRow {
        CaseRow {
            country: country.to_string(),
            date: date.parse().unwrap(),
            total_cases: 100.0,
            total_deaths: 2.0,
            new_cases: 5.0,
            new_deaths: 0.0,
            cumulative_total_cases: None,
            active_cases: None,
            daily_new_cases: None,
        }
    }

    #[test]
    fn empty_lookup_keeps_every_row() {
        let rows: Vec<CaseRow> = (1..=5)
            .map(|day| case("France", &format!("2024-03-0{day}")))
            .collect();
        let features = build_features(&rows, &[]);
        assert_eq!(features.len(), 5);
        assert!(features.iter().all(|row| row.continent.is_empty()));
    }

    #[test]
    fn matched_rows_pick_up_their_continent() {
        let geo = vec![GeoRecord {
            country: "France".to_string(),
            continent: "Europe".to_string(),
        }];
        let rows = vec![case("France", "2024-03-01"), case("Atlantis", "2024-03-01")];
        let features = build_features(&rows, &geo);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].continent, "Europe");
        assert_eq!(features[1].continent, "");
    }

    #[test]
    fn temporal_features_derive_from_the_date() {
        let features = build_features(&[case("France", "2024-12-15")], &[]);
        let row = &features[0];
        assert_eq!(row.year, 2024);
        assert_eq!(row.month, 12);
        assert_eq!(row.date, "2024-12-15");
        assert!((row.month_sin.powi(2) + row.month_cos.powi(2) - 1.0).abs() < 1e-9);
    }
}
