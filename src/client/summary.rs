//! Client-side aggregation
//!
//! Pure functions over a slice of expenses. Nothing is cached; callers
//! recompute whenever the list or the clock changes.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::Expense;

/// Categories offered when entering an expense
pub const DEFAULT_CATEGORIES: [&str; 7] = [
    "Food",
    "Transport",
    "Shopping",
    "Bills",
    "Entertainment",
    "Health",
    "Other",
];

/// Rolling windows shown on the dashboard, in days
pub const SUMMARY_WINDOWS: [i64; 3] = [1, 7, 30];

/// Which expenses a list view shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    /// Every category
    #[default]
    All,
    /// Exactly this category name
    Category(String),
}

impl CategoryFilter {
    /// Parse a selector value; "All" (any case) or empty selects everything
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Category(value.to_string())
        }
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        match self {
            Self::All => true,
            Self::Category(name) => expense.category == *name,
        }
    }
}

/// Total spent in one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

/// Dashboard figures derived from the expense list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub last_day: f64,
    pub last_week: f64,
    pub last_month: f64,
    pub by_category: Vec<CategoryTotal>,
}

/// Apply a category filter
pub fn filter_expenses<'a>(expenses: &'a [Expense], filter: &CategoryFilter) -> Vec<&'a Expense> {
    expenses.iter().filter(|e| filter.matches(e)).collect()
}

/// Sum of amounts dated within the trailing `days` days before `now`.
///
/// An expense counts when `0 <= now - date <= days`; future-dated expenses
/// are left out.
pub fn rolling_total(expenses: &[Expense], now: DateTime<Utc>, days: i64) -> f64 {
    let window = Duration::days(days);
    expenses
        .iter()
        .filter(|e| {
            let age = now - e.date;
            age >= Duration::zero() && age <= window
        })
        .map(|e| e.amount)
        .sum()
}

/// Per-category totals, largest first (ties by name)
pub fn category_breakdown(expenses: &[Expense]) -> Vec<CategoryTotal> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for expense in expenses {
        *totals.entry(expense.category.as_str()).or_insert(0.0) += expense.amount;
    }

    let mut breakdown: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            total,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.category.cmp(&b.category))
    });
    breakdown
}

/// All dashboard figures at once
pub fn summarize(expenses: &[Expense], now: DateTime<Utc>) -> Summary {
    let [day, week, month] = SUMMARY_WINDOWS;
    Summary {
        last_day: rolling_total(expenses, now, day),
        last_week: rolling_total(expenses, now, week),
        last_month: rolling_total(expenses, now, month),
        by_category: category_breakdown(expenses),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateExpenseInput;
    use proptest::prelude::*;

    fn expense(amount: f64, category: &str, date: DateTime<Utc>) -> Expense {
        Expense::new(1, CreateExpenseInput::new("x", amount, category).with_date(date))
    }

    #[test]
    fn test_rolling_windows() {
        let now = Utc::now();
        let expenses = vec![
            expense(10.0, "Food", now),
            expense(20.0, "Food", now - Duration::days(5)),
            expense(30.0, "Bills", now - Duration::days(40)),
        ];

        assert_eq!(rolling_total(&expenses, now, 1), 10.0);
        assert_eq!(rolling_total(&expenses, now, 7), 30.0);
        assert_eq!(rolling_total(&expenses, now, 30), 30.0);
    }

    #[test]
    fn test_future_expenses_excluded() {
        let now = Utc::now();
        let expenses = vec![expense(99.0, "Food", now + Duration::days(2))];
        assert_eq!(rolling_total(&expenses, now, 30), 0.0);
    }

    #[test]
    fn test_window_boundary_inclusive() {
        let now = Utc::now();
        let expenses = vec![expense(5.0, "Food", now - Duration::days(7))];
        assert_eq!(rolling_total(&expenses, now, 7), 5.0);
        assert_eq!(rolling_total(&expenses, now, 1), 0.0);
    }

    #[test]
    fn test_category_breakdown_sorted() {
        let now = Utc::now();
        let expenses = vec![
            expense(5.0, "Food", now),
            expense(50.0, "Bills", now),
            expense(7.0, "Food", now),
            expense(12.0, "Transport", now),
        ];

        let breakdown = category_breakdown(&expenses);
        let names: Vec<&str> = breakdown.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Bills", "Food", "Transport"]);
        assert_eq!(breakdown[1].total, 12.0);
    }

    #[test]
    fn test_filter() {
        let now = Utc::now();
        let expenses = vec![expense(1.0, "Food", now), expense(2.0, "Bills", now)];

        assert_eq!(filter_expenses(&expenses, &CategoryFilter::All).len(), 2);
        let food = filter_expenses(&expenses, &CategoryFilter::parse("Food"));
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].amount, 1.0);
        assert!(filter_expenses(&expenses, &CategoryFilter::parse("food")).is_empty());
        assert_eq!(CategoryFilter::parse("All"), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(""), CategoryFilter::All);
    }

    #[test]
    fn test_default_categories() {
        assert_eq!(DEFAULT_CATEGORIES.first(), Some(&"Food"));
        assert_eq!(DEFAULT_CATEGORIES.last(), Some(&"Other"));
        let unique: std::collections::HashSet<_> = DEFAULT_CATEGORIES.iter().collect();
        assert_eq!(unique.len(), DEFAULT_CATEGORIES.len());

        // Every default parses to a filter that selects only its own category
        for name in DEFAULT_CATEGORIES {
            assert_eq!(
                CategoryFilter::parse(name),
                CategoryFilter::Category(name.to_string())
            );
        }
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], Utc::now());
        assert_eq!(summary.last_day, 0.0);
        assert_eq!(summary.last_month, 0.0);
        assert!(summary.by_category.is_empty());
    }

    proptest! {
        #[test]
        fn prop_windows_are_nested(offsets in proptest::collection::vec((0i64..60 * 24, 0u32..1000), 0..30)) {
            let now = Utc::now();
            let expenses: Vec<Expense> = offsets
                .iter()
                .map(|(hours, cents)| expense(*cents as f64 / 100.0, "Food", now - Duration::hours(*hours)))
                .collect();

            let summary = summarize(&expenses, now);
            prop_assert!(summary.last_day <= summary.last_week + 1e-9);
            prop_assert!(summary.last_week <= summary.last_month + 1e-9);

            let all: f64 = expenses.iter().map(|e| e.amount).sum();
            let by_category: f64 = summary.by_category.iter().map(|c| c.total).sum();
            prop_assert!((all - by_category).abs() < 1e-6);
        }
    }
}
