//! Bounds post-processing for raw regressor output
//!
//! Every prediction is clamped into a range derived from the month's current
//! expenses, adjusted for seasonality and sanity-capped against income:
//!
//! 1. Base range: 80% to 120% of current expenses
//! 2. Festival season (Oct-Dec) raises the ceiling to 130%; the new-year
//!    period (Jan-Feb) raises the floor to 90%
//! 3. With positive income, the ceiling is capped at `min(30% income, 150% expenses)`
//!    and the floor lifted to `max(1% income, 50% expenses)`

use serde::Serialize;

const BASE_FLOOR: f64 = 0.8;
const BASE_CEILING: f64 = 1.2;
const FESTIVAL_CEILING: f64 = 1.3;
const NEW_YEAR_FLOOR: f64 = 0.9;
const INCOME_CEILING: f64 = 0.3;
const EXPENSE_CEILING: f64 = 1.5;
const INCOME_FLOOR: f64 = 0.01;
const EXPENSE_FLOOR: f64 = 0.5;

/// Seasonal adjustment applied to a month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// October through December
    Festival,
    /// January and February
    NewYear,
    Regular,
}

impl Season {
    pub fn for_month(month: u32) -> Self {
        match month {
            10..=12 => Season::Festival,
            1 | 2 => Season::NewYear,
            _ => Season::Regular,
        }
    }
}

/// Clamp interval for a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionBounds {
    pub lower: f64,
    pub upper: f64,
}

impl PredictionBounds {
    pub fn compute(expenses: f64, month: u32, income: f64) -> Self {
        let mut lower = expenses * BASE_FLOOR;
        let mut upper = expenses * BASE_CEILING;

        match Season::for_month(month) {
            Season::Festival => upper = expenses * FESTIVAL_CEILING,
            Season::NewYear => lower = expenses * NEW_YEAR_FLOOR,
            Season::Regular => {}
        }

        if income > 0.0 {
            let max_allowed = (income * INCOME_CEILING).min(expenses * EXPENSE_CEILING);
            let min_allowed = (income * INCOME_FLOOR).max(expenses * EXPENSE_FLOOR);
            upper = upper.min(max_allowed);
            lower = lower.max(min_allowed);
        }

        Self { lower, upper }
    }

    /// Bounds invert when a small income caps the ceiling below the floor
    pub fn is_inverted(&self) -> bool {
        self.upper < self.lower
    }

    /// Clamp a raw value into the interval.
    ///
    /// An inverted interval collapses to `lower`, and so does a non-finite
    /// raw value.
    pub fn clamp(&self, raw: f64) -> f64 {
        if self.is_inverted() || !raw.is_finite() {
            return self.lower;
        }
        raw.max(self.lower).min(self.upper)
    }
}

/// Clamp a raw prediction into its seasonally and income-adjusted range
pub fn clamp_prediction(raw: f64, expenses: f64, month: u32, income: f64) -> f64 {
    PredictionBounds::compute(expenses, month, income).clamp(raw)
}
