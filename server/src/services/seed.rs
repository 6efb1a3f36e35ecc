//! Demo data for a fresh database.

use records::NewMessage;
use tracing::info;

use super::store::{Store, StoreError};

pub const DEMO_MESSAGES: [&str; 2] = ["What's on your mind?", "I'm so scared for tonight"];

/// Insert the demo messages if there are no messages yet.
/// Returns how many rows were inserted.
///
/// # Errors
///
/// Returns the first store error.
pub async fn seed_demo(store: &dyn Store) -> Result<usize, StoreError> {
    if store.count_messages().await? > 0 {
        info!(backend = store.backend(), "messages present; skipping seed");
        return Ok(0);
    }
    for content in DEMO_MESSAGES {
        store
            .create_message(&NewMessage { content: content.to_owned() })
            .await?;
    }
    info!(backend = store.backend(), inserted = DEMO_MESSAGES.len(), "seeded demo messages");
    Ok(DEMO_MESSAGES.len())
}
