use finance_chatbot::{api::start_server, nlp::generator_from_env, store::FinanceStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Personal Finance Chatbot - API Server");
    info!("Port: {}", api_port);

    let store = Arc::new(FinanceStore::from_env());

    // Schema creation is idempotent; a failure here means the configured
    // database is unreachable and the server should not come up.
    store.init_db().await?;
    info!("Store initialized");

    let generator = generator_from_env();

    start_server(store, generator, api_port).await?;

    Ok(())
}
