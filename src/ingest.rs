//! Transaction CSV ingestion
//!
//! Parses and validates uploaded "date, description, amount, category"
//! rows into typed records before they reach the store. Validation is
//! all-or-nothing: a bad header or a single bad row rejects the upload.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::io::Read;
use tracing::debug;

use crate::error::AdvisorError;
use crate::models::NewTransaction;
use crate::Result;

const REQUIRED_COLUMNS: &[&str] = &["date", "description", "amount", "category"];

/// Accepted date formats, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Parse an uploaded CSV into transaction rows.
///
/// Column matching is case-insensitive and order-independent. Rows failing
/// date or amount parsing reject the whole upload; nothing is silently
/// dropped.
pub fn parse_transactions_csv<R: Read>(reader: R) -> Result<Vec<NewTransaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let mut indexes = [0usize; 4];
    for (slot, column) in REQUIRED_COLUMNS.iter().enumerate() {
        match lowered.iter().position(|h| h == column) {
            Some(index) => indexes[slot] = index,
            None => {
                return Err(AdvisorError::Validation(
                    "CSV must have columns: date, description, amount, category".to_string(),
                ))
            }
        }
    }
    let [date_idx, description_idx, amount_idx, category_idx] = indexes;

    let mut rows = Vec::new();
    for (row_number, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row_number + 2; // header is line 1

        let date_str = record.get(date_idx).unwrap_or("");
        let date = parse_date(date_str).ok_or_else(|| {
            AdvisorError::Validation(format!(
                "Row {}: '{}' is not a valid date",
                line, date_str
            ))
        })?;

        let amount_str = record.get(amount_idx).unwrap_or("");
        let amount: f64 = amount_str.trim().parse().map_err(|_| {
            AdvisorError::Validation(format!(
                "Row {}: '{}' is not a valid amount",
                line, amount_str
            ))
        })?;

        rows.push(NewTransaction {
            date,
            description: record.get(description_idx).unwrap_or("").to_string(),
            amount,
            category: record.get(category_idx).unwrap_or("").to_string(),
        });
    }

    debug!(rows = rows.len(), "Parsed transaction CSV");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_CSV: &str = "\
date,description,amount,category
2026-05-01,Groceries,1200.50,food
2026-05-03,Bus pass,300,transport
2026-05-10,Refund,-450,shopping
";

    #[test]
    fn test_parses_valid_rows() {
        let rows = parse_transactions_csv(GOOD_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].category, "food");
        assert_eq!(rows[0].amount, 1200.50);
        assert_eq!(rows[2].amount, -450.0);
        assert_eq!(
            rows[1].date,
            NaiveDate::from_ymd_opt(2026, 5, 3).unwrap()
        );
    }

    #[test]
    fn test_headers_are_case_insensitive_and_reorderable() {
        let csv = "Category,AMOUNT,Date,Description\nfood,99,2026-01-15,Lunch\n";
        let rows = parse_transactions_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "Lunch");
        assert_eq!(rows[0].amount, 99.0);
    }

    #[test]
    fn test_missing_category_column_rejects_upload() {
        let csv = "date,description,amount\n2026-05-01,Groceries,1200\n";
        let error = parse_transactions_csv(csv.as_bytes()).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("category"), "unexpected error: {}", message);
    }

    #[test]
    fn test_bad_date_rejects_whole_upload() {
        let csv = "\
date,description,amount,category
2026-05-01,Groceries,1200,food
not-a-date,Rent,15000,housing
";
        let error = parse_transactions_csv(csv.as_bytes()).unwrap_err();
        assert!(error.to_string().contains("not-a-date"));
    }

    #[test]
    fn test_bad_amount_rejects_whole_upload() {
        let csv = "date,description,amount,category\n2026-05-01,Groceries,lots,food\n";
        assert!(parse_transactions_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_alternate_date_formats() {
        let csv = "\
date,description,amount,category
05/20/2026,Dinner,800,food
20-05-2026,Metro,50,transport
";
        let rows = parse_transactions_csv(csv.as_bytes()).unwrap();
        let expected = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
        assert_eq!(rows[0].date, expected);
        assert_eq!(rows[1].date, expected);
    }

    #[test]
    fn test_empty_body_yields_no_rows() {
        let csv = "date,description,amount,category\n";
        let rows = parse_transactions_csv(csv.as_bytes()).unwrap();
        assert!(rows.is_empty());
    }
}
