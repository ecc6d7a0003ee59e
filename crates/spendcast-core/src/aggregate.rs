//! Transaction aggregation into supervised training pairs
//!
//! Raw transactions are bucketed by calendar month, summed per type and
//! turned into one `(this month, next month's expenses)` pair for every two
//! consecutive months that carry both income and expense records.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ExpenseObservation, MonthKey, TrainingPair, TransactionRecord, TransactionType};

/// Income and expense totals for one calendar month
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlySummary {
    pub key: MonthKey,
    pub income: Option<f64>,
    pub expense: Option<f64>,
}

impl MonthlySummary {
    pub fn is_complete(&self) -> bool {
        self.income.is_some() && self.expense.is_some()
    }

    /// Snapshot for a complete month
    pub fn observation(&self) -> Option<ExpenseObservation> {
        let income = self.income?;
        let expense = self.expense?;
        Some(ExpenseObservation::new(
            income,
            expense,
            self.key.month,
            income - expense,
        ))
    }
}

/// Sum transactions per calendar month, in chronological order.
///
/// Records whose date cannot be parsed are skipped.
pub fn monthly_totals(log: &[TransactionRecord]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<MonthKey, MonthlySummary> = BTreeMap::new();

    for tx in log {
        let key = match tx.month_key() {
            Ok(key) => key,
            Err(e) => {
                warn!(date = %tx.date, error = %e, "Skipping transaction with bad date");
                continue;
            }
        };

        let entry = months.entry(key).or_insert(MonthlySummary {
            key,
            income: None,
            expense: None,
        });
        let slot = match tx.kind {
            TransactionType::Income => &mut entry.income,
            TransactionType::Expense => &mut entry.expense,
        };
        *slot = Some(slot.unwrap_or(0.0) + tx.amount);
    }

    months.into_values().collect()
}

/// Build next-month-expense training pairs from a transaction log
pub fn build_training_set(log: &[TransactionRecord]) -> Result<Vec<TrainingPair>> {
    let months = monthly_totals(log);

    let has_income = months.iter().any(|m| m.income.is_some());
    let has_expense = months.iter().any(|m| m.expense.is_some());
    if !has_income || !has_expense {
        return Err(Error::InsufficientDataTypes(format!(
            "Need both income and expense transactions (income: {}, expense: {})",
            has_income, has_expense
        )));
    }

    let complete: Vec<ExpenseObservation> = months
        .iter()
        .filter_map(|m| {
            if !m.is_complete() {
                debug!(month = %m.key, "Excluding month without both transaction types");
            }
            m.observation()
        })
        .collect();

    let pairs: Vec<TrainingPair> = complete
        .windows(2)
        .map(|w| TrainingPair {
            features: w[0],
            target: w[1].expenses,
        })
        .collect();

    if pairs.is_empty() {
        return Err(Error::InsufficientSequentialData(format!(
            "Need at least 2 months with both income and expenses, found {}",
            complete.len()
        )));
    }

    Ok(pairs)
}
