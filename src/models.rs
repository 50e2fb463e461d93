//! Core data models for the finance chatbot

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Student,
    Professional,
}

impl UserKind {
    /// Parse a user-supplied kind string.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "student" => Some(UserKind::Student),
            "professional" => Some(UserKind::Professional),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Lenient parse for values coming back from storage.
    pub fn from_db(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

//
// ================= Profile =================
//

/// A user's financial profile. One current version per user, replaced
/// wholesale on every upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub kind: UserKind,
    pub age: u8,
    pub monthly_income: f64,
    pub fixed_expenses: f64,
    /// Ordered goals, entered as comma-separated text.
    pub goals: Vec<String>,
}

impl Profile {
    /// Split a comma-separated goals string into an ordered list,
    /// dropping empty entries.
    pub fn parse_goals(text: &str) -> Vec<String> {
        text.split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Joined form, as stored and as fed to the goal-tip function.
    pub fn goals_text(&self) -> String {
        self.goals.join(", ")
    }
}

//
// ================= Transactions =================
//

/// A transaction row as parsed from an upload, before it has been
/// assigned to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Positive = expense by convention. Negative amounts (refunds,
    /// credits) are accepted and flow through aggregation.
    pub amount: f64,
    pub category: String,
}

/// A persisted transaction, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: String,
}

/// Spend total for one category over a rolling window. Derived, never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub total: f64,
}

//
// ================= Chat =================
//

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The (role, content) pair handed to the reply generator and returned
/// by history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

//
// ================= Tax =================
//

/// Output of the progressive tax estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxEstimate {
    pub estimated_tax: f64,
    /// Total tax divided by total income; 0 when income is 0.
    pub effective_rate: f64,
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserKind::Student => "student",
            UserKind::Professional => "professional",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
