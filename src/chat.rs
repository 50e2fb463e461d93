//! Chat turn composition
//!
//! Glues the transcript store, the reply generator, and the deterministic
//! insight tips into a single turn. The store is the source of truth for
//! history; nothing is kept in process memory between turns.

use tracing::warn;

use crate::insights::{quick_goals_tip, summarize_budget};
use crate::models::{ChatMessage, MessageRole, UserKind};
use crate::nlp::ReplyGenerator;
use crate::store::FinanceStore;
use crate::Result;

/// Recent-message cap handed to the reply generator as context.
pub const HISTORY_WINDOW: usize = 10;

/// Run one chat turn: persist the user message, generate a reply with the
/// bounded history window and optional profile, append deterministic tips,
/// persist the assistant message, and return the final text.
///
/// Transcript writes are best-effort: a failed save is logged and never
/// blocks the reply.
pub async fn handle_chat_turn(
    store: &FinanceStore,
    generator: &dyn ReplyGenerator,
    user_id: &str,
    prompt: &str,
) -> Result<String> {
    if let Err(error) = store.save_message(user_id, MessageRole::User, prompt).await {
        warn!("Could not save user message: {}", error);
    }

    let profile = match store.get_profile(user_id).await {
        Ok(profile) => profile,
        Err(error) => {
            warn!("Profile load failed, continuing without it: {}", error);
            None
        }
    };

    let mut history = match store.fetch_history(user_id, HISTORY_WINDOW).await {
        Ok(history) => history,
        Err(error) => {
            warn!("History load failed, continuing with the current turn only: {}", error);
            Vec::new()
        }
    };
    // If the save above failed, the prompt is not in the fetched window yet.
    if history.last().map(|m| m.content.as_str()) != Some(prompt) {
        history.push(ChatMessage {
            role: MessageRole::User,
            content: prompt.to_string(),
        });
    }

    let reply = generator.generate_reply(&history, profile.as_ref()).await?;

    let mut tips = Vec::new();
    let kind = profile.as_ref().map(|p| p.kind).unwrap_or(UserKind::Student);
    let goals_text = profile.as_ref().map(|p| p.goals_text());
    tips.push(quick_goals_tip(kind, goals_text.as_deref()));
    if let Some(profile) = &profile {
        tips.push(summarize_budget(
            profile.monthly_income,
            Some(profile.fixed_expenses),
        ));
    }

    let final_reply = format!("{}\n\n• {}", reply, tips.join("\n• "));

    if let Err(error) = store
        .save_message(user_id, MessageRole::Assistant, &final_reply)
        .await
    {
        warn!("Could not save assistant message: {}", error);
    }

    Ok(final_reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::nlp::OfflineGenerator;

    fn sample_profile() -> Profile {
        Profile {
            user_id: "u1".to_string(),
            kind: UserKind::Professional,
            age: 29,
            monthly_income: 50_000.0,
            fixed_expenses: 20_000.0,
            goals: vec!["build emergency fund".to_string()],
        }
    }

    #[tokio::test]
    async fn test_turn_persists_both_messages() {
        let store = FinanceStore::in_memory();
        let reply = handle_chat_turn(&store, &OfflineGenerator, "u1", "how do I save?")
            .await
            .unwrap();

        let history = store.fetch_history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "how do I save?");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, reply);
    }

    #[tokio::test]
    async fn test_reply_includes_tips_without_profile() {
        let store = FinanceStore::in_memory();
        let reply = handle_chat_turn(&store, &OfflineGenerator, "u1", "hello")
            .await
            .unwrap();
        assert!(reply.contains("• "));
    }

    #[tokio::test]
    async fn test_reply_includes_budget_tip_with_profile() {
        let store = FinanceStore::in_memory();
        store.upsert_profile(&sample_profile()).await.unwrap();

        let reply = handle_chat_turn(&store, &OfflineGenerator, "u1", "how much can I spend?")
            .await
            .unwrap();
        // 50,000 - 20,000 discretionary from summarize_budget
        assert!(reply.contains("₹30,000"));
        assert!(reply.contains("build emergency fund"));
    }

    #[tokio::test]
    async fn test_turns_accumulate_in_transcript() {
        let store = FinanceStore::in_memory();
        for i in 0..3 {
            handle_chat_turn(&store, &OfflineGenerator, "u1", &format!("question {}", i))
                .await
                .unwrap();
        }
        let history = store.fetch_history("u1", 50).await.unwrap();
        assert_eq!(history.len(), 6);
    }
}
