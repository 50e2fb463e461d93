//! Persistence layer
//!
//! Stores profiles, transactions, and the chat transcript, all scoped by
//! `user_id`. Backed by Postgres when POSTGRES_URL/DATABASE_URL is set,
//! with an in-memory fallback for offline use and tests.

use chrono::{Months, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::models::{
    CategorySummary, ChatMessage, Message, MessageRole, NewTransaction, Profile, Transaction,
    UserKind,
};
use crate::Result;

#[derive(Default)]
struct MemState {
    profiles: HashMap<String, Profile>,
    transactions: HashMap<String, Vec<Transaction>>,
    messages: HashMap<String, Vec<Message>>,
}

enum StoreBackend {
    InMemory {
        state: Arc<RwLock<MemState>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

/// The single source of truth for profiles, transactions, and messages.
pub struct FinanceStore {
    backend: StoreBackend,
}

impl FinanceStore {
    /// Pick the backend from the environment: Postgres when a connection
    /// URL is configured and the pool can be created, in-memory otherwise.
    pub fn from_env() -> Self {
        let database_url = env::var("POSTGRES_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();

        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(&url)
            {
                Ok(pool) => {
                    info!("Finance store backend: postgres");
                    return Self {
                        backend: StoreBackend::Postgres {
                            pool,
                            schema_ready: Arc::new(OnceCell::new()),
                        },
                    };
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres store, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Finance store backend: in-memory");
        Self::in_memory()
    }

    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::InMemory {
                state: Arc::new(RwLock::new(MemState::default())),
            },
        }
    }

    /// Idempotent schema creation. Safe to invoke on every startup; every
    /// storage operation also runs it once per process via the schema guard.
    pub async fn init_db(&self) -> Result<()> {
        self.ensure_schema().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        let StoreBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS profiles (
                      user_id TEXT PRIMARY KEY,
                      kind TEXT NOT NULL,
                      age SMALLINT NOT NULL,
                      monthly_income DOUBLE PRECISION NOT NULL,
                      fixed_expenses DOUBLE PRECISION NOT NULL,
                      goals TEXT NOT NULL DEFAULT ''
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      id BIGSERIAL PRIMARY KEY,
                      user_id TEXT NOT NULL,
                      txn_date DATE NOT NULL,
                      description TEXT NOT NULL,
                      amount DOUBLE PRECISION NOT NULL,
                      category TEXT NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                    ON transactions (user_id, txn_date);
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS messages (
                      id BIGSERIAL PRIMARY KEY,
                      message_id UUID NOT NULL,
                      user_id TEXT NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_messages_user_time
                    ON messages (user_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AdvisorError::Database(format!("Failed to initialize schema: {}", e))
            })?;

        Ok(())
    }

    // =============================
    // Profiles
    // =============================

    /// Insert or replace the full profile record for its `user_id`.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        match &self.backend {
            StoreBackend::InMemory { state } => {
                let mut locked = state.write().await;
                locked
                    .profiles
                    .insert(profile.user_id.clone(), profile.clone());
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                sqlx::query(
                    r#"
                    INSERT INTO profiles (user_id, kind, age, monthly_income, fixed_expenses, goals)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (user_id) DO UPDATE SET
                      kind = EXCLUDED.kind,
                      age = EXCLUDED.age,
                      monthly_income = EXCLUDED.monthly_income,
                      fixed_expenses = EXCLUDED.fixed_expenses,
                      goals = EXCLUDED.goals
                    "#,
                )
                .bind(&profile.user_id)
                .bind(profile.kind.to_string())
                .bind(profile.age as i16)
                .bind(profile.monthly_income)
                .bind(profile.fixed_expenses)
                .bind(profile.goals_text())
                .execute(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to upsert profile: {}", e))
                })?;

                Ok(())
            }
        }
    }

    /// Current profile for the user, or `None` when no profile was saved.
    /// Not-found is a normal empty result, never an error.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        match &self.backend {
            StoreBackend::InMemory { state } => {
                let locked = state.read().await;
                Ok(locked.profiles.get(user_id).cloned())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                let row = sqlx::query(
                    r#"
                    SELECT user_id, kind, age, monthly_income, fixed_expenses, goals
                    FROM profiles
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to load profile: {}", e))
                })?;

                let Some(row) = row else {
                    return Ok(None);
                };

                let kind: String = row.try_get("kind").unwrap_or_default();
                let age: i16 = row.try_get("age").unwrap_or(0);
                let goals: String = row.try_get("goals").unwrap_or_default();

                Ok(Some(Profile {
                    user_id: row.try_get("user_id").unwrap_or_default(),
                    kind: UserKind::parse(&kind).unwrap_or(UserKind::Student),
                    age: age.clamp(0, u8::MAX as i16) as u8,
                    monthly_income: row.try_get("monthly_income").unwrap_or(0.0),
                    fixed_expenses: row.try_get("fixed_expenses").unwrap_or(0.0),
                    goals: Profile::parse_goals(&goals),
                }))
            }
        }
    }

    // =============================
    // Transactions
    // =============================

    /// Bulk-append transactions. Atomic as a batch: either every row is
    /// persisted or none, on any exit path.
    pub async fn add_transactions(
        &self,
        user_id: &str,
        rows: &[NewTransaction],
    ) -> Result<usize> {
        match &self.backend {
            StoreBackend::InMemory { state } => {
                let mut locked = state.write().await;
                let entries = locked
                    .transactions
                    .entry(user_id.to_string())
                    .or_default();
                for row in rows {
                    entries.push(Transaction {
                        user_id: user_id.to_string(),
                        date: row.date,
                        description: row.description.clone(),
                        amount: row.amount,
                        category: row.category.clone(),
                    });
                }
                Ok(rows.len())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                let mut tx = pool.begin().await.map_err(|e| {
                    AdvisorError::Database(format!(
                        "Failed to begin transaction batch: {}",
                        e
                    ))
                })?;

                for row in rows {
                    sqlx::query(
                        r#"
                        INSERT INTO transactions (user_id, txn_date, description, amount, category)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(user_id)
                    .bind(row.date)
                    .bind(&row.description)
                    .bind(row.amount)
                    .bind(&row.category)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AdvisorError::Database(format!("Failed to insert transaction: {}", e))
                    })?;
                }

                tx.commit().await.map_err(|e| {
                    AdvisorError::Database(format!(
                        "Failed to commit transaction batch: {}",
                        e
                    ))
                })?;

                Ok(rows.len())
            }
        }
    }

    /// Transactions within the trailing `months` window, ordered by date
    /// ascending with insertion order breaking ties.
    pub async fn fetch_transactions(
        &self,
        user_id: &str,
        months: u32,
    ) -> Result<Vec<Transaction>> {
        let cutoff = window_start(months);

        match &self.backend {
            StoreBackend::InMemory { state } => {
                let locked = state.read().await;
                let mut rows: Vec<Transaction> = locked
                    .transactions
                    .get(user_id)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter(|t| t.date >= cutoff)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                // Stable sort keeps insertion order within a date.
                rows.sort_by_key(|t| t.date);
                Ok(rows)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT user_id, txn_date, description, amount, category
                    FROM transactions
                    WHERE user_id = $1 AND txn_date >= $2
                    ORDER BY txn_date ASC, id ASC
                    "#,
                )
                .bind(user_id)
                .bind(cutoff)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to load transactions: {}", e))
                })?;

                Ok(rows
                    .into_iter()
                    .map(|row| Transaction {
                        user_id: row.try_get("user_id").unwrap_or_default(),
                        date: row
                            .try_get("txn_date")
                            .unwrap_or_else(|_| Utc::now().date_naive()),
                        description: row.try_get("description").unwrap_or_default(),
                        amount: row.try_get("amount").unwrap_or(0.0),
                        category: row.try_get("category").unwrap_or_default(),
                    })
                    .collect())
            }
        }
    }

    /// Per-category totals over the same window as `fetch_transactions`,
    /// ordered by total descending with category ascending breaking ties.
    /// Categories absent from the window are omitted, not zero-filled.
    pub async fn category_summary(
        &self,
        user_id: &str,
        months: u32,
    ) -> Result<Vec<CategorySummary>> {
        match &self.backend {
            StoreBackend::InMemory { .. } => {
                let transactions = self.fetch_transactions(user_id, months).await?;

                let mut totals: HashMap<String, f64> = HashMap::new();
                for t in &transactions {
                    *totals.entry(t.category.clone()).or_insert(0.0) += t.amount;
                }

                let mut summary: Vec<CategorySummary> = totals
                    .into_iter()
                    .map(|(category, total)| CategorySummary { category, total })
                    .collect();
                summary.sort_by(|a, b| {
                    b.total
                        .partial_cmp(&a.total)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.category.cmp(&b.category))
                });
                Ok(summary)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                let cutoff = window_start(months);
                let rows = sqlx::query(
                    r#"
                    SELECT category, SUM(amount) AS total
                    FROM transactions
                    WHERE user_id = $1 AND txn_date >= $2
                    GROUP BY category
                    ORDER BY total DESC, category ASC
                    "#,
                )
                .bind(user_id)
                .bind(cutoff)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to aggregate categories: {}", e))
                })?;

                Ok(rows
                    .into_iter()
                    .map(|row| CategorySummary {
                        category: row.try_get("category").unwrap_or_default(),
                        total: row.try_get("total").unwrap_or(0.0),
                    })
                    .collect())
            }
        }
    }

    // =============================
    // Chat transcript
    // =============================

    /// Append one message with a server-assigned timestamp.
    pub async fn save_message(
        &self,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        match &self.backend {
            StoreBackend::InMemory { state } => {
                let mut locked = state.write().await;
                locked
                    .messages
                    .entry(user_id.to_string())
                    .or_default()
                    .push(Message {
                        message_id: Uuid::new_v4(),
                        user_id: user_id.to_string(),
                        role,
                        content: content.to_string(),
                        created_at: Utc::now(),
                    });
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                sqlx::query(
                    r#"
                    INSERT INTO messages (message_id, user_id, role, content)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(role.as_str())
                .bind(content)
                .execute(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to save message: {}", e))
                })?;

                Ok(())
            }
        }
    }

    /// The most recent `limit` messages, returned in chronological order
    /// (oldest of the returned set first). The underlying query fetches
    /// newest-first and reverses.
    pub async fn fetch_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        match &self.backend {
            StoreBackend::InMemory { state } => {
                let locked = state.read().await;
                let messages = locked.messages.get(user_id);
                Ok(messages
                    .map(|entries| {
                        let skip = entries.len().saturating_sub(limit);
                        entries
                            .iter()
                            .skip(skip)
                            .map(|m| ChatMessage {
                                role: m.role,
                                content: m.content.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT role, content
                    FROM messages
                    WHERE user_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    AdvisorError::Database(format!("Failed to load history: {}", e))
                })?;

                let mut history: Vec<ChatMessage> = rows
                    .into_iter()
                    .map(|row| {
                        let role: String =
                            row.try_get("role").unwrap_or_else(|_| "user".to_string());
                        ChatMessage {
                            role: MessageRole::from_db(&role),
                            content: row.try_get("content").unwrap_or_default(),
                        }
                    })
                    .collect();
                history.reverse();
                Ok(history)
            }
        }
    }
}

/// Start of the trailing window: today minus `months` calendar months.
fn window_start(months: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn txn(days_ago: i64, description: &str, amount: f64, category: &str) -> NewTransaction {
        NewTransaction {
            date: Utc::now().date_naive() - Duration::days(days_ago),
            description: description.to_string(),
            amount,
            category: category.to_string(),
        }
    }

    fn sample_profile(user_id: &str) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            kind: UserKind::Professional,
            age: 29,
            monthly_income: 50_000.0,
            fixed_expenses: 20_000.0,
            goals: vec!["build emergency fund".to_string()],
        }
    }

    #[tokio::test]
    async fn test_profile_missing_is_none() {
        let store = FinanceStore::in_memory();
        assert!(store.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let store = FinanceStore::in_memory();
        store.upsert_profile(&sample_profile("u1")).await.unwrap();

        let replacement = Profile {
            kind: UserKind::Student,
            age: 21,
            monthly_income: 12_000.0,
            fixed_expenses: 0.0,
            goals: vec![],
            ..sample_profile("u1")
        };
        store.upsert_profile(&replacement).await.unwrap();

        let loaded = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, UserKind::Student);
        assert_eq!(loaded.age, 21);
        assert!(loaded.goals.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_round_trip_ordered_by_date() {
        let store = FinanceStore::in_memory();
        let rows = vec![
            txn(10, "Groceries", 1200.0, "food"),
            txn(40, "Rent", 15_000.0, "housing"),
            txn(2, "Metro", 50.0, "transport"),
        ];
        let inserted = store.add_transactions("u1", &rows).await.unwrap();
        assert_eq!(inserted, 3);

        let fetched = store.fetch_transactions("u1", 12).await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched[0].description, "Rent");
        assert_eq!(fetched[2].description, "Metro");
        assert!(fetched.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[tokio::test]
    async fn test_window_excludes_old_transactions() {
        let store = FinanceStore::in_memory();
        let rows = vec![
            txn(5, "Recent", 100.0, "misc"),
            txn(400, "Ancient", 999.0, "misc"),
        ];
        store.add_transactions("u1", &rows).await.unwrap();

        let fetched = store.fetch_transactions("u1", 6).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].description, "Recent");
    }

    #[tokio::test]
    async fn test_summary_matches_grouped_fetch() {
        let store = FinanceStore::in_memory();
        let rows = vec![
            txn(3, "Groceries", 1200.0, "food"),
            txn(5, "Dinner", 800.0, "food"),
            txn(7, "Bus", 50.0, "transport"),
            txn(9, "Refund", -450.0, "shopping"),
        ];
        store.add_transactions("u1", &rows).await.unwrap();

        let transactions = store.fetch_transactions("u1", 6).await.unwrap();
        let summary = store.category_summary("u1", 6).await.unwrap();

        let mut expected: HashMap<String, f64> = HashMap::new();
        for t in &transactions {
            *expected.entry(t.category.clone()).or_insert(0.0) += t.amount;
        }
        assert_eq!(summary.len(), expected.len());
        for entry in &summary {
            let total = expected.get(&entry.category).copied().unwrap();
            assert!((entry.total - total).abs() < 1e-9);
        }

        // Ordered by total descending; the negative refund total sorts last.
        assert_eq!(summary[0].category, "food");
        assert_eq!(summary[2].category, "shopping");
        assert!((summary[2].total - -450.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_window_yields_empty_summary() {
        let store = FinanceStore::in_memory();
        assert!(store.category_summary("u1", 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_user_isolation() {
        let store = FinanceStore::in_memory();
        store
            .add_transactions("alice", &[txn(1, "Coffee", 200.0, "food")])
            .await
            .unwrap();
        store.save_message("alice", MessageRole::User, "hi").await.unwrap();
        store.upsert_profile(&sample_profile("alice")).await.unwrap();

        assert!(store.fetch_transactions("bob", 12).await.unwrap().is_empty());
        assert!(store.fetch_history("bob", 10).await.unwrap().is_empty());
        assert!(store.get_profile("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_cap_and_order() {
        let store = FinanceStore::in_memory();
        for i in 0..7 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            store
                .save_message("u1", role, &format!("message {}", i))
                .await
                .unwrap();
        }

        let history = store.fetch_history("u1", 4).await.unwrap();
        assert_eq!(history.len(), 4);
        // Chronological: oldest of the returned window first.
        assert_eq!(history[0].content, "message 3");
        assert_eq!(history[3].content, "message 6");

        let all = store.fetch_history("u1", 50).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0].content, "message 0");
    }
}
