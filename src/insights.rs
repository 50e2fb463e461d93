//! Rule-based financial insights
//!
//! Pure, deterministic guidance functions. No storage access and no LLM
//! involvement; the chat layer appends these to generated replies.

use crate::models::UserKind;

/// Format a rupee amount with thousands separators, rounded to whole rupees.
fn format_inr(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let negative = rounded < 0;
    let digits = rounded.abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-₹{}", grouped)
    } else {
        format!("₹{}", grouped)
    }
}

/// Negative inputs are out of contract and clamp to zero.
fn clamp_amount(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Suggest a discretionary/savings split for the month.
///
/// Absent or zero fixed expenses are treated as zero. Zero income returns
/// generic guidance instead of dividing by anything.
pub fn summarize_budget(monthly_income: f64, fixed_expenses: Option<f64>) -> String {
    let income = clamp_amount(monthly_income);
    let fixed = clamp_amount(fixed_expenses.unwrap_or(0.0));

    if income == 0.0 {
        return "Add your monthly income to get a personalized split. Until then, keep \
                essentials lean and avoid taking on new fixed commitments."
            .to_string();
    }

    if fixed >= income {
        return format!(
            "Your fixed expenses ({}) use up your entire income ({}). Look for one fixed \
             cost to cut before planning savings.",
            format_inr(fixed),
            format_inr(income)
        );
    }

    let discretionary = income - fixed;
    let savings_target = (income * 0.20).min(discretionary);
    let spending = discretionary - savings_target;

    format!(
        "Of {} income, {} goes to fixed costs, leaving {} discretionary. Aim to save {} \
         and keep flexible spending within {}.",
        format_inr(income),
        format_inr(fixed),
        format_inr(discretionary),
        format_inr(savings_target),
        format_inr(spending)
    )
}

/// Recommend an emergency-fund target as a multiple of monthly expenses.
///
/// A zero baseline falls back to qualitative advice rather than a
/// zero-rupee figure.
pub fn plan_emergency_fund(monthly_baseline: f64) -> String {
    let baseline = clamp_amount(monthly_baseline);

    if baseline == 0.0 {
        return "Start with whatever you can set aside each month and build toward three \
                to six months of living costs in a separate, easy-to-access account."
            .to_string();
    }

    format!(
        "Target an emergency fund of {} to {} (3 to 6 months of your {} monthly \
         baseline), parked in a liquid account you do not touch for daily spending.",
        format_inr(baseline * 3.0),
        format_inr(baseline * 6.0),
        format_inr(baseline)
    )
}

/// One short, actionable tip anchored on the user's first goal.
///
/// Tone varies by kind; an empty or absent goals list gets a sensible
/// default.
pub fn quick_goals_tip(kind: UserKind, goals_text: Option<&str>) -> String {
    let first_goal = goals_text
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .find(|g| !g.is_empty())
        .map(str::to_string);

    match (kind, first_goal) {
        (UserKind::Student, Some(goal)) => format!(
            "Focus on \"{}\" first: set aside a small fixed amount every month and treat \
             it like a bill you owe yourself.",
            goal
        ),
        (UserKind::Professional, Some(goal)) => format!(
            "Automate progress on \"{}\": a standing transfer on payday beats relying on \
             month-end leftovers.",
            goal
        ),
        (UserKind::Student, None) => "Pick one concrete goal to start. Even a few hundred \
             rupees a month toward an emergency fund builds the habit early."
            .to_string(),
        (UserKind::Professional, None) => "Pick one concrete goal and automate it: a fixed \
             transfer on payday makes saving happen before spending does."
            .to_string(),
    }
}
