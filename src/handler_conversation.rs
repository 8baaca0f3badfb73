//! Conversational Q&A handler.
//!
//! No sub-classification: the input is forwarded as-is with the assembled
//! conversation context and the fixed conversational sampling parameters.

use anyhow::Result;
use async_trait::async_trait;

use crate::assemble::{assemble, mode_profile};
use crate::gateway::{ChatGateway, ChatRequest};
use crate::handler::{generate, HandlerResponse, ModeHandler};
use crate::models::Mode;
use crate::store::ContextStore;

pub struct ConversationHandler<'a> {
    gateway: &'a dyn ChatGateway,
    stream: bool,
}

impl<'a> ConversationHandler<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, stream: bool) -> Self {
        Self { gateway, stream }
    }
}

#[async_trait]
impl ModeHandler for ConversationHandler<'_> {
    async fn handle(&self, input: &str, store: &mut ContextStore) -> Result<HandlerResponse> {
        let snapshot = assemble(Mode::Conversation, store);

        let request = ChatRequest {
            system_prompt: snapshot.system_prompt_with_context(),
            history: snapshot.history.clone(),
            user_message: input.to_string(),
            params: mode_profile(Mode::Conversation).params,
        };

        generate(self.gateway, &request, self.stream).await
    }
}
