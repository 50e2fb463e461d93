use finance_chatbot::{
    chat::handle_chat_turn,
    ingest::parse_transactions_csv,
    models::{Profile, UserKind},
    nlp::OfflineGenerator,
    store::FinanceStore,
    tax::estimate_tax_india,
};
use tracing::info;

const SAMPLE_CSV: &str = "\
date,description,amount,category
2026-06-02,Rent,15000,housing
2026-06-05,Groceries,3200,food
2026-06-12,Metro card,600,transport
2026-07-01,Rent,15000,housing
2026-07-09,Dinner out,1400,food
";

/// Offline demo flow: exercises the full core against the in-memory store.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Personal Finance Chatbot demo starting");

    let store = FinanceStore::in_memory();
    store.init_db().await?;

    let profile = Profile {
        user_id: "demo_user".to_string(),
        kind: UserKind::Professional,
        age: 29,
        monthly_income: 50_000.0,
        fixed_expenses: 20_000.0,
        goals: Profile::parse_goals("build emergency fund, pay education loan"),
    };
    store.upsert_profile(&profile).await?;

    let rows = parse_transactions_csv(SAMPLE_CSV.as_bytes())?;
    let inserted = store.add_transactions(&profile.user_id, &rows).await?;
    info!(inserted, "Uploaded sample transactions");

    for entry in store.category_summary(&profile.user_id, 6).await? {
        info!(category = %entry.category, total = entry.total, "Spend by category");
    }

    let tax = estimate_tax_india(profile.monthly_income * 12.0);
    info!(
        estimated_tax = tax.estimated_tax,
        effective_rate = tax.effective_rate,
        "Annual tax estimate"
    );

    let reply = handle_chat_turn(
        &store,
        &OfflineGenerator,
        &profile.user_id,
        "How much should I be saving each month?",
    )
    .await?;
    info!("Assistant reply:\n{}", reply);

    Ok(())
}
