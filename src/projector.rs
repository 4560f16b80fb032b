use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{ForecastError, Result};
use crate::forecaster::Forecaster;
use crate::models::{ForecastQuery, Observation};

/// One-day-ahead prediction seam, so the projection loop can be exercised
/// against stand-in models.
pub trait DailyStepModel {
    fn predict_step(&self, date: NaiveDate, current_cases: f64, active_cases: f64) -> Result<f64>;
}

impl DailyStepModel for Forecaster {
    fn predict_step(&self, date: NaiveDate, current_cases: f64, active_cases: f64) -> Result<f64> {
        let vector =
            self.schema()
                .request_vector(date.year(), date.month(), current_cases, active_cases)?;
        self.predict_one(&vector)
    }
}

/// How the exogenous inputs evolve while the projection walks forward.
///
/// The system this replaces held them constant for every simulated day, so
/// predictions never feed back into their own inputs. That is a modeling
/// simplification, not an accident, and it stays the serving default; the
/// feedback variant is available for callers who want the running total to
/// drive the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExogenousPolicy {
    Static,
    Feedback,
}

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        ForecastError::Internal(format!("no such calendar month: year {year}, month {month}"))
    })
}

/// Walks day by day from the last known observation to the target date,
/// accumulating one predicted daily increment per step.
///
/// A target on or before the start date returns the starting total with
/// zero predictions; the loop never runs backward. The horizon cap bounds
/// the loop (and request latency) and is mandatory for serving callers.
pub fn project(
    model: &impl DailyStepModel,
    start: Observation,
    target_date: NaiveDate,
    current_cases: f64,
    active_cases: f64,
    policy: ExogenousPolicy,
    max_horizon_days: i64,
) -> Result<f64> {
    if target_date <= start.date {
        return Ok(start.cumulative_total);
    }

    let horizon = (target_date - start.date).num_days();
    if horizon > max_horizon_days {
        return Err(ForecastError::Internal(format!(
            "target {target_date} is {horizon} days past the last observation \
             ({}); the horizon cap is {max_horizon_days} days",
            start.date
        )));
    }

    let mut date = start.date;
    let mut total = start.cumulative_total;
    let mut current = current_cases;

    while date < target_date {
        let increment = model.predict_step(date, current, active_cases)?;
        total += increment;
        date = date + Duration::days(1);
        if policy == ExogenousPolicy::Feedback {
            current = total;
        }
    }

    Ok(total)
}

/// Projects to the first day of the queried calendar month, the granularity
/// the serving surface exposes.
pub fn project_to_month(
    model: &impl DailyStepModel,
    start: Observation,
    query: &ForecastQuery,
    policy: ExogenousPolicy,
    max_horizon_days: i64,
) -> Result<f64> {
    let target_date = first_of_month(query.year, query.month)?;
    project(
        model,
        start,
        target_date,
        query.current_cases,
        query.active_cases,
        policy,
        max_horizon_days,
    )
}
