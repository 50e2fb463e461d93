//! Progressive income-tax estimator
//!
//! Rough, demo-grade estimate. The bracket table is configuration, kept
//! apart from the marginal calculation so a revised table can ship as data.

use crate::error::AdvisorError;
use crate::models::TaxEstimate;
use crate::Result;
use serde::{Deserialize, Serialize};

/// One marginal bracket: income above `lower` (up to the next bracket's
/// `lower`) is taxed at `rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub lower: f64,
    pub rate: f64,
}

/// Indian new-regime slabs, FY 2023-24. Amounts in rupees.
const INDIA_SLABS_FY24: &[(f64, f64)] = &[
    (0.0, 0.00),
    (300_000.0, 0.05),
    (600_000.0, 0.10),
    (900_000.0, 0.15),
    (1_200_000.0, 0.20),
    (1_500_000.0, 0.30),
];

/// An ordered, non-overlapping set of marginal brackets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSchedule {
    brackets: Vec<TaxBracket>,
}

impl Default for TaxSchedule {
    fn default() -> Self {
        Self {
            brackets: INDIA_SLABS_FY24
                .iter()
                .map(|&(lower, rate)| TaxBracket { lower, rate })
                .collect(),
        }
    }
}

impl TaxSchedule {
    /// Build a schedule from a replacement bracket table, rejecting tables
    /// that are empty or not strictly ascending by lower bound.
    pub fn from_brackets(brackets: Vec<TaxBracket>) -> Result<Self> {
        if brackets.is_empty() {
            return Err(AdvisorError::Validation(
                "Tax schedule needs at least one bracket".to_string(),
            ));
        }
        for pair in brackets.windows(2) {
            if pair[1].lower <= pair[0].lower {
                return Err(AdvisorError::Validation(format!(
                    "Tax brackets must ascend by lower bound, got {} after {}",
                    pair[1].lower, pair[0].lower
                )));
            }
        }
        Ok(Self { brackets })
    }

    /// Marginal tax across all brackets covered by `annual_income`.
    ///
    /// Negative income is out of contract and clamps to zero, so the
    /// estimate stays total for any finite input.
    pub fn estimate(&self, annual_income: f64) -> TaxEstimate {
        let income = if annual_income.is_finite() && annual_income > 0.0 {
            annual_income
        } else {
            0.0
        };

        let mut tax = 0.0;
        for (i, bracket) in self.brackets.iter().enumerate() {
            if income <= bracket.lower {
                break;
            }
            let upper = self
                .brackets
                .get(i + 1)
                .map(|next| next.lower)
                .unwrap_or(f64::INFINITY);
            tax += (income.min(upper) - bracket.lower) * bracket.rate;
        }

        let effective_rate = if income > 0.0 { tax / income } else { 0.0 };

        TaxEstimate {
            estimated_tax: tax,
            effective_rate,
        }
    }
}

/// Estimate annual tax under the default Indian schedule.
pub fn estimate_tax_india(annual_income: f64) -> TaxEstimate {
    TaxSchedule::default().estimate(annual_income)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_income() {
        let estimate = estimate_tax_india(0.0);
        assert_eq!(estimate.estimated_tax, 0.0);
        assert_eq!(estimate.effective_rate, 0.0);
    }

    #[test]
    fn test_income_below_first_threshold() {
        let estimate = estimate_tax_india(250_000.0);
        assert_eq!(estimate.estimated_tax, 0.0);
    }

    #[test]
    fn test_known_marginal_value() {
        // 3L at 0% + 3L at 5% + 3L at 10% + 1L at 15% = 60,000
        let estimate = estimate_tax_india(1_000_000.0);
        assert!((estimate.estimated_tax - 60_000.0).abs() < 1e-6);
        assert!((estimate.effective_rate - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_top_bracket_is_open_ended() {
        // 15,000 + 30,000 + 45,000 + 60,000 + 90,000 for the first 15L,
        // then 5L more at 30%
        let estimate = estimate_tax_india(2_000_000.0);
        assert!((estimate.estimated_tax - 300_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_tax_is_non_negative_and_monotonic() {
        let incomes = [
            0.0, 100_000.0, 299_999.0, 300_000.0, 300_001.0, 650_000.0, 900_000.0,
            1_499_999.0, 1_500_000.0, 3_000_000.0, 10_000_000.0,
        ];
        let mut previous = 0.0;
        for income in incomes {
            let estimate = estimate_tax_india(income);
            assert!(estimate.estimated_tax >= 0.0);
            assert!(estimate.estimated_tax >= previous, "not monotonic at {}", income);
            assert!((0.0..=1.0).contains(&estimate.effective_rate));
            previous = estimate.estimated_tax;
        }
    }

    #[test]
    fn test_negative_income_clamps_to_zero() {
        let estimate = estimate_tax_india(-50_000.0);
        assert_eq!(estimate.estimated_tax, 0.0);
        assert_eq!(estimate.effective_rate, 0.0);
    }

    #[test]
    fn test_replacement_schedule_loads_as_data() {
        let schedule: TaxSchedule = serde_json::from_str(
            r#"{"brackets": [{"lower": 0.0, "rate": 0.0}, {"lower": 10000.0, "rate": 0.1}]}"#,
        )
        .unwrap();
        let estimate = schedule.estimate(20_000.0);
        assert!((estimate.estimated_tax - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_brackets_rejects_unordered_table() {
        let result = TaxSchedule::from_brackets(vec![
            TaxBracket { lower: 500.0, rate: 0.1 },
            TaxBracket { lower: 100.0, rate: 0.2 },
        ]);
        assert!(result.is_err());
        assert!(TaxSchedule::from_brackets(vec![]).is_err());
    }
}
