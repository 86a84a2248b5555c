//! Streaming chat-completion client for the OpenRouter API.
//!
//! [`CompletionClient::generate`] turns a character plus one user message
//! into a lazy stream of text tokens. The upstream protocol is SSE-style:
//! `data: <json>` frames terminated by a `data: [DONE]` sentinel. Transport
//! failures never reach the caller as errors; they degrade to a single
//! fixed fallback token delivered as if it were model output.

use async_stream::stream;
use futures::{Stream, StreamExt};
use shared::models::Character;
use std::pin::Pin;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Shown to the user in place of a reply when the upstream call fails.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again later.";

pub type TokenStream = Pin<Box<dyn Stream<Item = String> + Send>>;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion provider returned {0}")]
    Status(reqwest::StatusCode),
}

pub trait CompletionClient: Send + Sync {
    /// Open a fresh upstream request and return its tokens lazily.
    ///
    /// The stream is finite and not restartable; calling again re-issues a
    /// new request.
    fn generate(&self, character: &Character, user_message: &str) -> TokenStream;
}

/// Outcome of classifying one line of the upstream stream.
#[derive(Debug, PartialEq)]
pub enum Frame {
    /// A non-empty incremental content fragment.
    Token(String),
    /// The `[DONE]` sentinel: normal end of stream.
    Done,
    /// Empty line, comment, empty delta, or malformed JSON.
    Skip,
}

/// Classify one newline-delimited line of the upstream transport.
///
/// Malformed JSON is logged and skipped; it never ends the stream.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim();
    let Some(body) = line.strip_prefix("data: ") else {
        return Frame::Skip;
    };
    if body == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(chunk) => match chunk["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => Frame::Token(content.to_string()),
            _ => Frame::Skip,
        },
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed completion frame");
            Frame::Skip
        }
    }
}

/// Apply the degrade-to-fallback policy: tokens pass through untouched, the
/// first transport error is replaced by exactly one [`FALLBACK_REPLY`] token
/// and the stream ends.
pub(crate) fn with_fallback<S>(inner: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<String, CompletionError>> + Send,
{
    stream! {
        let mut inner = std::pin::pin!(inner);
        while let Some(item) = inner.next().await {
            match item {
                Ok(token) => yield token,
                Err(e) => {
                    tracing::error!(error = %e, "completion stream failed, degrading to fallback reply");
                    yield FALLBACK_REPLY.to_string();
                    return;
                }
            }
        }
    }
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
            model: model.into(),
        }
    }

    /// Raw token stream with transport failures as typed errors. The public
    /// [`CompletionClient::generate`] wraps this with [`with_fallback`].
    fn raw_stream(
        &self,
        character: &Character,
        user_message: &str,
    ) -> Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>> {
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.api_base);
        let api_key = self.api_key.clone();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(character) },
                { "role": "user", "content": user_message },
            ],
            "stream": true,
        });

        Box::pin(stream! {
            let response = match http.post(&url).bearer_auth(&api_key).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(CompletionError::Transport(e));
                    return;
                }
            };
            if !response.status().is_success() {
                yield Err(CompletionError::Status(response.status()));
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(CompletionError::Transport(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process every complete line accumulated so far.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].to_string();
                    buffer.drain(..=line_end);
                    match parse_frame(&line) {
                        Frame::Token(token) => yield Ok(token),
                        Frame::Done => return,
                        Frame::Skip => {}
                    }
                }
            }
        })
    }
}

impl CompletionClient for OpenRouterClient {
    fn generate(&self, character: &Character, user_message: &str) -> TokenStream {
        Box::pin(with_fallback(self.raw_stream(character, user_message)))
    }
}

/// Render the character into the system instruction: description first, then
/// one `Capitalized-key: value` line per attribute.
fn system_prompt(character: &Character) -> String {
    let mut prompt = format!(
        "You are roleplaying as {}. Here's your character description: {}",
        character.name, character.description
    );
    for (key, value) in &character.attributes {
        prompt.push('\n');
        prompt.push_str(&capitalize(key));
        prompt.push_str(": ");
        prompt.push_str(value);
    }
    prompt
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
