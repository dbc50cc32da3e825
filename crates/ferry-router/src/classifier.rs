// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM relevance classifier client.
//!
//! Calls an OpenAI-compatible chat-completion endpoint with a YES/NO
//! strategy prompt to decide whether buffered group chatter deserves a
//! response. Every failure mode (HTTP error, timeout, unparseable reply)
//! resolves to `false` — the conservative "no response".

use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{FerryError, RelevanceFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classifier endpoint settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API, without trailing slash.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// HTTP client for the relevance classifier.
pub struct RelevanceClassifier {
    http: reqwest::Client,
    config: ClassifierConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl RelevanceClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, FerryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FerryError::Classifier(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// One classification call. Returns the raw verdict text.
    async fn ask(&self, system: &str, user: &str) -> Result<String, FerryError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            // Low temperature and a short budget: the answer is YES or NO.
            temperature: 0.1,
            max_tokens: 50,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FerryError::Classifier(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FerryError::Classifier(format!(
                "classifier returned {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| FerryError::Classifier(format!("bad response body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| FerryError::Classifier("no response choices".to_string()))?;

        Ok(choice.message.content)
    }
}

#[async_trait]
impl RelevanceFilter for RelevanceClassifier {
    async fn should_respond(&self, current: &str, history: &str, strategy: &str) -> bool {
        let user = format!(
            "## Recent messages\n{history}\n## Current message\n{current}\n\nShould the bot respond? Reply only YES or NO."
        );

        match self.ask(strategy, &user).await {
            Ok(verdict) => {
                let yes = verdict.trim().to_uppercase().starts_with("YES");
                debug!(verdict = verdict.trim(), yes, "classifier verdict");
                yes
            }
            Err(e) => {
                warn!(error = %e, "classifier call failed, treating as no-response");
                false
            }
        }
    }
}

/// Compose the strategy prompt carrying the bot name and the current
/// interest topics. Called at classification time so topic edits take
/// effect immediately.
pub fn listen_strategy(bot_name: &str, topics: &[String]) -> String {
    let topics_section = if topics.is_empty() {
        String::new()
    } else {
        format!(
            "\n- Topics of interest: {} (if related to these topics -> YES)",
            topics.join(", ")
        )
    };

    format!(
        r#"You are a message filter that determines whether group chat messages need a response from the bot "{bot_name}".

## Bot Information
- Name: {bot_name}
- Role: programming assistant, skilled at code, technical questions, and file operations{topics_section}

## Recognizing @ Mentions
1. @{bot_name} (the bot name directly) -> clearly calling the bot
2. @_user_N placeholders -> system format, usually @-ing OTHER users, not the bot

## Decision Rules
1. Message explicitly contains @{bot_name} -> YES
2. Message contains @_user_N placeholders -> those are other users -> NO
3. No @, but asking technical or programming questions -> YES
4. Casual chat unrelated to tech -> NO
5. Uncertain -> NO

Reply only YES or NO."#
    )
}
