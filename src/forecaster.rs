use crate::error::{ForecastError, Result};
use crate::models::{Disease, FeatureRow};
use crate::regression::{r_squared, train_test_split, ForestConfig, RandomForest, StandardScaler};

/// Explicit tagged feature schema.
///
/// Which columns feed the model is a configuration decision made by the
/// caller, never inferred from which columns happen to be present in the
/// table. A required column the table does not carry is a schema mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSchema {
    /// `[year, month, cumulative_total_cases, active_cases]`, predicting
    /// `daily_new_cases`. For sources that track cumulative counts and an
    /// active caseload; the only schema drivable from request inputs alone.
    CumulativeActivity,
    /// `[year, month, total_cases, new_cases, total_deaths, new_deaths]`,
    /// predicting `new_cases`. For canonical-shape sources.
    CaseDeltas,
}

impl FeatureSchema {
    /// The schema each disease's source data is configured to train under.
    pub fn for_disease(disease: Disease) -> Self {
        match disease {
            Disease::Corona => FeatureSchema::CumulativeActivity,
            Disease::Variole => FeatureSchema::CaseDeltas,
        }
    }

    pub fn feature_columns(&self) -> &'static [&'static str] {
        match self {
            FeatureSchema::CumulativeActivity => {
                &["year", "month", "cumulative_total_cases", "active_cases"]
            }
            FeatureSchema::CaseDeltas => &[
                "year",
                "month",
                "total_cases",
                "new_cases",
                "total_deaths",
                "new_deaths",
            ],
        }
    }

    pub fn target_column(&self) -> &'static str {
        match self {
            FeatureSchema::CumulativeActivity => "daily_new_cases",
            FeatureSchema::CaseDeltas => "new_cases",
        }
    }

    fn require(value: Option<f64>, column: &str) -> Result<f64> {
        value.ok_or_else(|| {
            ForecastError::SchemaMismatch(format!("source table has no {column} column"))
        })
    }

    /// The training vector for one feature row.
    pub fn feature_vector(&self, row: &FeatureRow) -> Result<Vec<f64>> {
        match self {
            FeatureSchema::CumulativeActivity => Ok(vec![
                f64::from(row.year),
                f64::from(row.month),
                Self::require(row.cumulative_total_cases, "cumulative_total_cases")?,
                Self::require(row.active_cases, "active_cases")?,
            ]),
            FeatureSchema::CaseDeltas => Ok(vec![
                f64::from(row.year),
                f64::from(row.month),
                row.total_cases,
                row.new_cases,
                row.total_deaths,
                row.new_deaths,
            ]),
        }
    }

    pub fn target(&self, row: &FeatureRow) -> Result<f64> {
        match self {
            FeatureSchema::CumulativeActivity => {
                Self::require(row.daily_new_cases, "daily_new_cases")
            }
            FeatureSchema::CaseDeltas => Ok(row.new_cases),
        }
    }

    /// A single-step vector built from request inputs. Prediction requests
    /// supply only current and active case counts, so a schema that needs
    /// more source columns than that cannot be served and says so rather
    /// than fabricating the difference.
    pub fn request_vector(
        &self,
        year: i32,
        month: u32,
        current_cases: f64,
        active_cases: f64,
    ) -> Result<Vec<f64>> {
        match self {
            FeatureSchema::CumulativeActivity => Ok(vec![
                f64::from(year),
                f64::from(month),
                current_cases,
                active_cases,
            ]),
            FeatureSchema::CaseDeltas => Err(ForecastError::SchemaMismatch(
                "the case-deltas schema trains on six source columns; a request supplies \
                 only current and active case counts"
                    .to_string(),
            )),
        }
    }
}

/// One trained (scaler, regressor) pair.
///
/// Constructing a new value is the only way to retrain, so the scaler and
/// the forest can never be replaced independently of each other. After
/// training the value is immutable and can be shared across concurrent
/// requests without coordination.
#[derive(Debug, Clone)]
pub struct Forecaster {
    schema: FeatureSchema,
    scaler: StandardScaler,
    forest: RandomForest,
    accuracy: f64,
}

impl Forecaster {
    /// Trains the scaler and forest together on the full feature table and
    /// scores the result on a held-out 20% slice.
    ///
    /// The scaler is fit on the full matrix before the split, matching the
    /// behavior of the system this replaces.
    pub fn train(schema: FeatureSchema, rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ForecastError::NoHistoricalData(
                "empty feature table".to_string(),
            ));
        }

        let x: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| schema.feature_vector(row))
            .collect::<Result<_>>()?;
        let y: Vec<f64> = rows
            .iter()
            .map(|row| schema.target(row))
            .collect::<Result<_>>()?;

        let scaler = StandardScaler::fit(&x)?;
        let scaled = scaler.transform(&x)?;

        let config = ForestConfig::default();
        let (train_idx, test_idx) = train_test_split(scaled.len(), 0.2, config.seed);

        let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| scaled[i].clone()).collect();
        let train_y: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();
        let forest = RandomForest::fit(&train_x, &train_y, &config)?;

        let test_x: Vec<Vec<f64>> = test_idx.iter().map(|&i| scaled[i].clone()).collect();
        let test_y: Vec<f64> = test_idx.iter().map(|&i| y[i]).collect();
        let accuracy = r_squared(&test_y, &forest.predict(&test_x));

        Ok(Self {
            schema,
            scaler,
            forest,
            accuracy,
        })
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// Held-out coefficient of determination from the training run.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Scales and predicts a batch of feature vectors. Read-only; a vector
    /// whose width disagrees with the trained schema is rejected.
    pub fn predict(&self, vectors: &[Vec<f64>]) -> Result<Vec<f64>> {
        let scaled = self.scaler.transform(vectors)?;
        Ok(self.forest.predict(&scaled))
    }

    pub fn predict_one(&self, vector: &[f64]) -> Result<f64> {
        let predictions = self.predict(&[vector.to_vec()])?;
        predictions
            .into_iter()
            .next()
            .ok_or_else(|| ForecastError::Internal("empty prediction batch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corona_row(year: i32, month: u32, cumulative: f64, daily: f64) -> FeatureRow {
        let (month_sin, month_cos) = crate::encoding::encode_cyclical(month, 12);
        FeatureRow {
            country: "France".to_string(),
            date: format!("{year}-{month:02}-01"),
            continent: "Europe".to_string(),
            total_cases: cumulative,
            total_deaths: 0.0,
            new_cases: daily,
            new_deaths: 0.0,
            cumulative_total_cases: Some(cumulative),
            active_cases: Some(daily * 3.0),
            daily_new_cases: Some(daily),
            year,
            month,
            month_sin,
            month_cos,
        }
    }

    fn training_rows() -> Vec<FeatureRow> {
        (0..40)
            .map(|i| {
                let month = (i % 12) + 1;
                corona_row(2024, month, 1000.0 + 50.0 * i as f64, 40.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn training_on_an_empty_table_is_a_not_found_condition() {
        let result = Forecaster::train(FeatureSchema::CumulativeActivity, &[]);
        assert!(matches!(result, Err(ForecastError::NoHistoricalData(_))));
    }

    #[test]
    fn training_yields_a_finite_score_and_a_usable_model() {
        let model = Forecaster::train(FeatureSchema::CumulativeActivity, &training_rows()).unwrap();
        assert!(model.accuracy().is_finite());

        let vector = model
            .schema()
            .request_vector(2025, 1, 3000.0, 150.0)
            .unwrap();
        let prediction = model.predict_one(&vector).unwrap();
        assert!(prediction.is_finite());
    }

    #[test]
    fn cumulative_schema_rejects_tables_without_its_columns() {
        let mut row = corona_row(2024, 5, 1000.0, 40.0);
        row.cumulative_total_cases = None;
        row.active_cases = None;
        row.daily_new_cases = None;
        let result = Forecaster::train(FeatureSchema::CumulativeActivity, &[row]);
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));
    }

    #[test]
    fn case_deltas_schema_cannot_be_driven_from_request_inputs() {
        let result = FeatureSchema::CaseDeltas.request_vector(2025, 1, 100.0, 40.0);
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));
    }

    #[test]
    fn predict_rejects_vectors_of_the_wrong_width() {
        let model = Forecaster::train(FeatureSchema::CumulativeActivity, &training_rows()).unwrap();
        let result = model.predict(&[vec![2025.0, 1.0]]);
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));
    }

    #[test]
    fn schemas_are_selected_per_disease_not_inferred() {
        assert_eq!(
            FeatureSchema::for_disease(Disease::Corona),
            FeatureSchema::CumulativeActivity
        );
        assert_eq!(
            FeatureSchema::for_disease(Disease::Variole),
            FeatureSchema::CaseDeltas
        );
        assert_eq!(
            FeatureSchema::CumulativeActivity.feature_columns().len(),
            4
        );
        assert_eq!(FeatureSchema::CaseDeltas.target_column(), "new_cases");
    }
}
