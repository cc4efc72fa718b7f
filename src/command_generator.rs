//! Turns a natural-language request into a shell command.
//!
//! A request either starts a fresh conversation or, when the previous answer
//! is recent enough, continues it with the persisted history as context.

use crate::completion_client::CompletionClient;
use crate::config::Config;
use crate::conversation::{ConversationState, Message};
use crate::error::{HowtoError, Result};
use crate::providers::TimeProvider;
use crate::state_store::StateStore;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    /// No usable context: the request is framed as "<shell> command to <input>".
    Fresh,
    /// Within the conversation window: prior turns are replayed verbatim.
    Continuing,
}

/// Outcome of a successful generation.
#[derive(Debug)]
pub struct Generation {
    pub command: String,
    pub mode: ConversationMode,
    /// History replayed as context (empty for fresh conversations).
    pub context: Vec<Message>,
    /// Set when the answer was produced but the updated history could not be saved.
    pub save_error: Option<HowtoError>,
}

pub struct CommandGenerator {
    store: Box<dyn StateStore>,
    client: Box<dyn CompletionClient>,
    time_provider: Box<dyn TimeProvider>,
}

impl CommandGenerator {
    pub fn new(
        store: Box<dyn StateStore>,
        client: Box<dyn CompletionClient>,
        time_provider: Box<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            client,
            time_provider,
        }
    }

    pub async fn generate(&self, user_input: &str, config: &Config, credential: &str) -> Result<Generation> {
        if user_input.trim().is_empty() {
            return Err(HowtoError::Usage(
                "Usage: howto <prompt>. Describe what you want to do, e.g. `howto tar without compression`"
                    .to_string(),
            ));
        }

        let state = self
            .store
            .load()
            .map_err(|e| match e {
                HowtoError::Storage(msg) => HowtoError::Storage(format!("Error getting conversation state: {}", msg)),
                other => other,
            })?;

        let now = self.time_provider.now();
        let mode = decide_mode(&state, now, config.conversation_window());
        info!("Conversation mode: {:?}", mode);

        let messages = build_messages(mode, &state, user_input, config);
        let reply = self.client.complete(&messages, config, credential).await?;

        let mut history = state.history;
        let context = match mode {
            ConversationMode::Continuing => history.clone(),
            ConversationMode::Fresh => {
                history.clear();
                Vec::new()
            }
        };
        // build_messages always ends with the new user turn.
        if let Some(user_turn) = messages.last() {
            history.push(user_turn.clone());
        }
        history.push(Message::assistant(reply.clone()));

        let updated = ConversationState {
            schema_version: state.schema_version,
            history,
            last_update: now,
        };
        let save_error = match self.store.save(&updated) {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to persist conversation state: {}", e);
                Some(e)
            }
        };

        Ok(Generation {
            command: reply,
            mode,
            context,
            save_error,
        })
    }
}

/// Continuing when the history is non-empty and at most `window` has elapsed
/// since the last update (inclusive boundary).
pub fn decide_mode(state: &ConversationState, now: chrono::DateTime<chrono::Utc>, window: Duration) -> ConversationMode {
    if state.history.is_empty() {
        return ConversationMode::Fresh;
    }
    let elapsed = now.signed_duration_since(state.last_update);
    match chrono::Duration::from_std(window) {
        Ok(window) if elapsed <= window => ConversationMode::Continuing,
        _ => ConversationMode::Fresh,
    }
}

pub fn build_messages(
    mode: ConversationMode,
    state: &ConversationState,
    user_input: &str,
    config: &Config,
) -> Vec<Message> {
    let mut messages = vec![Message::system(config.system_message.clone())];
    match mode {
        ConversationMode::Continuing => {
            messages.extend(state.history.iter().cloned());
            messages.push(Message::user(user_input));
        }
        ConversationMode::Fresh => {
            messages.push(Message::user(format!("{} command to {}", config.shell, user_input)));
        }
    }
    messages
}
