//! Common handler interface.
//!
//! Every mode handler consumes the raw input plus the context store and
//! produces the final response text. Validation failures (a missing file,
//! an unextractable command) are ordinary responses here, not errors —
//! the error channel is reserved for genuine failures such as an
//! unreachable gateway.

use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;

use crate::gateway::{ChatGateway, ChatRequest};
use crate::handler_command::CommandHandler;
use crate::handler_conversation::ConversationHandler;
use crate::handler_document::DocumentHandler;
use crate::models::Mode;
use crate::store::ContextStore;

/// A handler's final answer.
pub struct HandlerResponse {
    pub text: String,
    /// True when the text was already printed fragment-by-fragment while
    /// streaming; the caller must not print it again.
    pub streamed: bool,
}

impl HandlerResponse {
    /// A locally produced response (validation message or clarification)
    /// that never reached the model.
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            streamed: false,
        }
    }
}

#[async_trait]
pub trait ModeHandler {
    async fn handle(&self, input: &str, store: &mut ContextStore) -> Result<HandlerResponse>;
}

/// Route one request to the handler for its mode. Exhaustive over
/// [`Mode`] — adding a variant forces a decision here.
pub async fn dispatch(
    mode: Mode,
    gateway: &dyn ChatGateway,
    input: &str,
    store: &mut ContextStore,
    stream: bool,
) -> Result<HandlerResponse> {
    match mode {
        Mode::Conversation => {
            ConversationHandler::new(gateway, stream)
                .handle(input, store)
                .await
        }
        Mode::Command => {
            CommandHandler::new(gateway, stream)
                .handle(input, store)
                .await
        }
        Mode::Document => {
            DocumentHandler::new(gateway, stream)
                .handle(input, store)
                .await
        }
    }
}

/// Run one generation against the gateway.
///
/// When `stream` is set, fragments are printed to stdout as they arrive
/// and the concatenated text is returned for history storage; otherwise a
/// single blocking completion is made.
pub(crate) async fn generate(
    gateway: &dyn ChatGateway,
    request: &ChatRequest,
    stream: bool,
) -> Result<HandlerResponse> {
    if !stream {
        let text = gateway.complete(request).await?;
        return Ok(HandlerResponse {
            text,
            streamed: false,
        });
    }

    let mut rx = gateway.stream(request).await?;
    let mut text = String::new();
    let mut stdout = std::io::stdout();

    while let Some(fragment) = rx.recv().await {
        let fragment = fragment?;
        print!("{}", fragment);
        let _ = stdout.flush();
        text.push_str(&fragment);
    }
    println!();

    Ok(HandlerResponse {
        text,
        streamed: true,
    })
}
