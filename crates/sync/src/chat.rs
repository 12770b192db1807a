//! AI chat session

use beacon_core::{ChatRequest, ChatResponse, ChatTurn};
use parking_lot::Mutex;

use crate::client::SyncClient;
use crate::error::SyncError;

#[derive(Default)]
struct ChatState {
    history: Vec<ChatTurn>,
    loading: bool,
    error: Option<SyncError>,
}

/// Conversation with the assistant. History only grows on successful replies.
pub struct ChatSession {
    client: SyncClient,
    state: Mutex<ChatState>,
}

impl ChatSession {
    pub fn new(client: &SyncClient) -> Self {
        Self {
            client: client.clone(),
            state: Mutex::new(ChatState::default()),
        }
    }

    pub async fn send(
        &self,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Result<ChatResponse, SyncError> {
        let message = message.into();
        let request = {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
            ChatRequest::new(message.clone())
                .with_context(context)
                .with_history(state.history.clone())
        };

        let result = self.client.chat(request).await;

        let mut state = self.state.lock();
        state.loading = false;
        match &result {
            Ok(response) => {
                state.history.push(ChatTurn::user(message));
                state
                    .history
                    .push(ChatTurn::assistant(response.response.clone()));
            }
            Err(e) => {
                log::warn!("Chat request failed: {}", e);
                state.error = Some(e.clone());
            }
        }
        result
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.state.lock().history.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn error(&self) -> Option<SyncError> {
        self.state.lock().error.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.error = None;
    }
}
