//! Data models for Spendcast

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of model input features: `[income, expenses, month, savings]`
pub const FEATURE_COUNT: usize = 4;

/// One month's aggregate financial snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpenseObservation {
    pub income: f64,
    pub expenses: f64,
    pub month: u32,
    pub savings: f64,
}

impl ExpenseObservation {
    pub fn new(income: f64, expenses: f64, month: u32, savings: f64) -> Self {
        Self {
            income,
            expenses,
            month,
            savings,
        }
    }

    /// Feature vector in model column order
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [self.income, self.expenses, self.month as f64, self.savings]
    }
}

/// A supervised example: this month's snapshot and next month's expense total
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingPair {
    pub features: ExpenseObservation,
    pub target: f64,
}

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

/// Calendar month bucket used for aggregation. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A raw transaction as ingested from the surrounding service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Upstream identifier, used for deduplication when present
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// ISO-8601 date or timestamp
    pub date: String,
    #[serde(default)]
    pub currency: String,
}

impl TransactionRecord {
    pub fn new(kind: TransactionType, amount: f64, date: &str) -> Self {
        Self {
            id: None,
            amount,
            kind,
            date: date.to_string(),
            currency: "USD".to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Parse the record's date. Accepts RFC 3339 timestamps and plain dates.
    pub fn parsed_date(&self) -> Result<NaiveDate> {
        let raw = self.date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.date_naive());
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(dt.date());
        }
        // Anything with a leading YYYY-MM-DD is good enough for monthly buckets
        let prefix = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
            .map_err(|_| Error::InvalidInput(format!("Unparseable transaction date: {}", raw)))
    }

    pub fn month_key(&self) -> Result<MonthKey> {
        let date = self.parsed_date()?;
        Ok(MonthKey {
            year: date.year(),
            month: date.month(),
        })
    }

    /// Check the record can be aggregated later
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Transaction amount must be finite, got {}",
                self.amount
            )));
        }
        self.parsed_date().map(|_| ())
    }
}

/// Ensemble blend between the shared base model and the user's own model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub base: f64,
    pub personal: f64,
}

impl BlendWeights {
    /// Freshly bootstrapped users predict from the base model only
    pub const BASE_ONLY: BlendWeights = BlendWeights {
        base: 1.0,
        personal: 0.0,
    };

    pub const fn new(base: f64, personal: f64) -> Self {
        Self { base, personal }
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self::BASE_ONLY
    }
}

/// Validation metrics recorded after the most recent training run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub mae: Option<f64>,
    pub mse: Option<f64>,
}

/// Persisted per-user model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created_at: DateTime<Utc>,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub training_count: u32,
    pub transaction_count: usize,
    pub base_weight: f64,
    pub personal_weight: f64,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

impl ModelMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        let weights = BlendWeights::BASE_ONLY;
        Self {
            created_at,
            last_trained_at: None,
            training_count: 0,
            transaction_count: 0,
            base_weight: weights.base,
            personal_weight: weights.personal,
            performance_metrics: PerformanceMetrics::default(),
        }
    }

    pub fn weights(&self) -> BlendWeights {
        BlendWeights::new(self.base_weight, self.personal_weight)
    }

    pub fn set_weights(&mut self, weights: BlendWeights) {
        self.base_weight = weights.base;
        self.personal_weight = weights.personal;
    }
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
