//! Expense model
//!
//! An expense is a dated amount with a title and a free-text category. It
//! belongs to exactly one user, fixed when it is created.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Expense entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// What the money was spent on
    pub title: String,
    /// Amount in the user's currency
    pub amount: f64,
    /// Category label, e.g. "Food"
    pub category: String,
    /// When the expense happened
    pub date: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Build an expense that has not been stored yet
    pub fn new(user_id: i64, input: CreateExpenseInput) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            user_id,
            title: input.title,
            amount: input.amount,
            category: input.category,
            date: input.date.unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this expense
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// Apply a partial update. Every field present in `input` wins, even
    /// zero amounts and empty strings; absent fields are kept.
    pub fn apply(&mut self, input: UpdateExpenseInput) {
        if let Some(title) = input.title {
            self.title = title;
        }
        if let Some(amount) = input.amount {
            self.amount = amount;
        }
        if let Some(category) = input.category {
            self.category = category;
        }
        if let Some(date) = input.date {
            self.date = date;
        }
        self.updated_at = Utc::now();
    }
}

/// Input for creating an expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpenseInput {
    pub title: String,
    #[serde(deserialize_with = "flexible_amount::deserialize")]
    pub amount: f64,
    pub category: String,
    /// Defaults to the time of creation
    #[serde(default, deserialize_with = "flexible_date::deserialize_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl CreateExpenseInput {
    pub fn new(title: impl Into<String>, amount: f64, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            amount,
            category: category.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Partial update of an expense; `None` means "leave unchanged"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExpenseInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flexible_amount::deserialize_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "flexible_date::deserialize_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl UpdateExpenseInput {
    /// True when the update carries no field at all
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.amount.is_none() && self.category.is_none() && self.date.is_none()
    }
}

/// Dates as sent by clients: a full RFC 3339 timestamp or a bare
/// `YYYY-MM-DD`, which is read as midnight UTC.
pub mod flexible_date {
    use super::*;

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", s))),
        }
    }
}

/// Amounts as sent by clients: a JSON number or a numeric string, which is
/// what HTML number inputs produce.
pub mod flexible_amount {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(f64),
        Text(String),
    }

    fn resolve<E: serde::de::Error>(raw: RawAmount) -> Result<f64, E> {
        let amount = match raw {
            RawAmount::Number(n) => n,
            RawAmount::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid amount: {}", s)))?,
        };
        if amount.is_finite() {
            Ok(amount)
        } else {
            Err(E::custom("amount must be a finite number"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        resolve(RawAmount::deserialize(deserializer)?)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawAmount>::deserialize(deserializer)?
            .map(resolve)
            .transpose()
    }
}
