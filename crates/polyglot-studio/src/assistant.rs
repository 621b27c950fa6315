//! Assistant chat grounded on the latest localization result.

use crate::error::Result;
use crate::models::{ChatMessage, LocalizationResult, Role};
use crate::service::LocalizationService;

/// In-memory conversation. History lives as long as the value does.
pub struct Assistant<'a, S: LocalizationService + ?Sized> {
    service: &'a S,
    context: Option<LocalizationResult>,
    history: Vec<ChatMessage>,
}

impl<'a, S: LocalizationService + ?Sized> Assistant<'a, S> {
    pub fn new(service: &'a S, context: Option<LocalizationResult>) -> Self {
        Self {
            service,
            context,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send one message and return the reply.
    ///
    /// The user message stays in the history even when the call fails; the reply
    /// is only recorded on success. Blank input is ignored.
    pub fn send(&mut self, message: &str) -> Result<Option<String>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(None);
        }
        let prior = self.history.len();
        self.history.push(ChatMessage::new(Role::User, message));

        let reply = self
            .service
            .chat(&self.history[..prior], message, self.context.as_ref())
            .inspect_err(|e| tracing::warn!("assistant chat failed: {e}"))?;

        self.history.push(ChatMessage::new(Role::Model, reply.clone()));
        Ok(Some(reply))
    }
}
