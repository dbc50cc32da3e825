// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST client for the chat platform, implementing [`ChatPort`].
//!
//! Handles tenant-token acquisition with expiry caching, message sends
//! (plain and with `<at>` mention tags), reactions, member and history
//! listing, and image resource downloads.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ferry_core::{ChatPort, FerryError, Member, Message};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// REST request budget per the platform contract.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens are refreshed this long before their reported expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Platform connection settings.
#[derive(Debug, Clone)]
pub struct LarkConfig {
    pub app_id: String,
    pub app_secret: String,
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Directory image attachments are downloaded into.
    pub image_dir: PathBuf,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// The platform REST client.
pub struct LarkClient {
    http: reqwest::Client,
    config: LarkConfig,
    token: Mutex<Option<CachedToken>>,
    bot_open_id: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    #[serde(default)]
    expire: u64,
}

#[derive(Deserialize)]
struct BasicResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct BotInfoResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    bot: BotInfo,
}

#[derive(Default, Deserialize)]
struct BotInfo {
    #[serde(default)]
    open_id: String,
    #[serde(default)]
    app_name: String,
}

#[derive(Deserialize)]
struct DataResponse<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct MemberList {
    #[serde(default)]
    items: Vec<MemberItem>,
}

#[derive(Deserialize)]
struct MemberItem {
    #[serde(default)]
    member_id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    items: Vec<MessageItem>,
}

#[derive(Deserialize)]
struct MessageItem {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    msg_type: String,
    /// Millisecond timestamp, serialized as a string by the platform.
    #[serde(default)]
    create_time: String,
    sender: Option<MessageSender>,
    body: Option<MessageBody>,
}

#[derive(Deserialize)]
struct MessageSender {
    #[serde(default)]
    id: String,
    #[serde(default)]
    sender_type: String,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: String,
}

impl LarkClient {
    pub fn new(config: LarkConfig) -> Result<Self, FerryError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FerryError::Chat {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
            bot_open_id: Mutex::new(None),
        })
    }

    /// The bot's own `open_id`, fetched once and cached for the life of
    /// the client. Mentions are matched against this stable identity, not
    /// against a display name (users rename bots; the id never changes).
    pub async fn bot_open_id(&self) -> Result<String, FerryError> {
        let mut cached = self.bot_open_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let token = self.tenant_token().await?;
        let url = format!("{}/bot/v3/info", self.config.base_url);
        let response: BotInfoResponse = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(chat_err("bot info fetch failed"))?
            .json()
            .await
            .map_err(chat_err("bad bot info response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "bot info rejected ({}): {}",
                response.code, response.msg
            )));
        }
        if response.bot.open_id.is_empty() {
            return Err(FerryError::chat("bot info returned no open_id"));
        }

        info!(
            open_id = %response.bot.open_id,
            app_name = %response.bot.app_name,
            "bot identity resolved"
        );
        *cached = Some(response.bot.open_id.clone());
        Ok(response.bot.open_id)
    }

    /// Current tenant token, refreshed when within the expiry slack.
    async fn tenant_token(&self) -> Result<String, FerryError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/auth/v3/tenant_access_token/internal", self.config.base_url);
        let response: TokenResponse = self
            .http
            .post(&url)
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await
            .map_err(chat_err("token request failed"))?
            .json()
            .await
            .map_err(chat_err("bad token response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "token request rejected ({}): {}",
                response.code, response.msg
            )));
        }

        let ttl = Duration::from_secs(response.expire).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: response.tenant_access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        debug!("tenant token refreshed");
        Ok(response.tenant_access_token)
    }

    async fn send_message_content(&self, chat_id: &str, content: String) -> Result<(), FerryError> {
        let token = self.tenant_token().await?;
        let url = format!(
            "{}/im/v1/messages?receive_id_type=chat_id",
            self.config.base_url
        );
        let response: BasicResponse = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "receive_id": chat_id,
                "msg_type": "text",
                "content": content,
            }))
            .send()
            .await
            .map_err(chat_err("send failed"))?
            .json()
            .await
            .map_err(chat_err("bad send response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "send rejected ({}): {}",
                response.code, response.msg
            )));
        }
        Ok(())
    }

    /// Parse the text payload of a history item. Non-text types come
    /// back as a short placeholder so history lines stay readable.
    fn item_text(msg_type: &str, raw_content: &str) -> Option<String> {
        let content: serde_json::Value = serde_json::from_str(raw_content).ok()?;
        match msg_type {
            "text" => content
                .get("text")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            "post" => {
                let mut parts = Vec::new();
                if let Some(lines) = content.get("content").and_then(serde_json::Value::as_array) {
                    for line in lines.iter().filter_map(serde_json::Value::as_array) {
                        for run in line {
                            if let Some(text) = run.get("text").and_then(serde_json::Value::as_str)
                            {
                                parts.push(text.to_string());
                            }
                        }
                    }
                }
                Some(parts.join(" "))
            }
            "image" => Some("[image]".to_string()),
            _ => None,
        }
    }
}

fn chat_err(context: &'static str) -> impl Fn(reqwest::Error) -> FerryError {
    move |e| FerryError::Chat {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl ChatPort for LarkClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), FerryError> {
        self.send_message_content(chat_id, json!({"text": text}).to_string())
            .await
    }

    async fn send_text_with_mentions(
        &self,
        chat_id: &str,
        text: &str,
        mentions: &[Member],
        mention_all: bool,
    ) -> Result<(), FerryError> {
        let mut tagged = String::new();
        if mention_all {
            tagged.push_str("<at user_id=\"all\">@all</at> ");
        }
        for m in mentions {
            tagged.push_str(&format!("<at user_id=\"{}\">@{}</at> ", m.user_id, m.name));
        }
        tagged.push_str(text);

        self.send_message_content(chat_id, json!({"text": tagged}).to_string())
            .await
    }

    async fn add_reaction(&self, msg_id: &str, emoji: &str) -> Result<(), FerryError> {
        let token = self.tenant_token().await?;
        let url = format!("{}/im/v1/messages/{msg_id}/reactions", self.config.base_url);
        let response: BasicResponse = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({"reaction_type": {"emoji_type": emoji}}))
            .send()
            .await
            .map_err(chat_err("reaction failed"))?
            .json()
            .await
            .map_err(chat_err("bad reaction response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "reaction rejected ({}): {}",
                response.code, response.msg
            )));
        }
        Ok(())
    }

    async fn chat_members(&self, chat_id: &str) -> Result<Vec<Member>, FerryError> {
        let token = self.tenant_token().await?;
        let url = format!(
            "{}/im/v1/chats/{chat_id}/members?page_size=100",
            self.config.base_url
        );
        let response: DataResponse<MemberList> = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(chat_err("member list failed"))?
            .json()
            .await
            .map_err(chat_err("bad member list response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "member list rejected ({}): {}",
                response.code, response.msg
            )));
        }

        Ok(response
            .data
            .map(|d| d.items)
            .unwrap_or_default()
            .into_iter()
            .map(|item| Member {
                user_id: item.member_id,
                name: item.name,
            })
            .collect())
    }

    async fn chat_history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, FerryError> {
        let token = self.tenant_token().await?;
        let url = format!(
            "{}/im/v1/messages?container_id_type=chat&container_id={chat_id}&sort_type=ByCreateTimeDesc&page_size={limit}",
            self.config.base_url
        );
        let response: DataResponse<MessageList> = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(chat_err("history fetch failed"))?
            .json()
            .await
            .map_err(chat_err("bad history response"))?;

        if response.code != 0 {
            return Err(FerryError::chat(format!(
                "history fetch rejected ({}): {}",
                response.code, response.msg
            )));
        }

        // Best-effort sender name enrichment from the member list.
        let members = self.chat_members(chat_id).await.unwrap_or_else(|e| {
            debug!(chat_id, error = %e, "member enrichment failed");
            Vec::new()
        });

        let mut messages: Vec<Message> = response
            .data
            .map(|d| d.items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let body = item.body.as_ref()?;
                let content = Self::item_text(&item.msg_type, &body.content)?;
                let sender = item.sender.unwrap_or(MessageSender {
                    id: String::new(),
                    sender_type: String::new(),
                });
                let sender_name = members
                    .iter()
                    .find(|m| m.user_id == sender.id)
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                Some(Message {
                    id: item.message_id,
                    chat_id: chat_id.to_string(),
                    sender_id: sender.id,
                    sender_name,
                    content,
                    msg_type: item.msg_type,
                    create_time: item.create_time.parse().unwrap_or_default(),
                    is_bot: sender.sender_type == "app",
                })
            })
            .collect();

        // The API returns newest first; callers expect oldest first.
        messages.reverse();
        Ok(messages)
    }

    async fn download_image(
        &self,
        msg_id: &str,
        image_key: &str,
    ) -> Result<PathBuf, FerryError> {
        let token = self.tenant_token().await?;
        let url = format!(
            "{}/im/v1/messages/{msg_id}/resources/{image_key}?type=image",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(chat_err("image download failed"))?;

        if !response.status().is_success() {
            return Err(FerryError::chat(format!(
                "image download rejected: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(chat_err("image body read failed"))?;

        tokio::fs::create_dir_all(&self.config.image_dir)
            .await
            .map_err(|e| FerryError::Chat {
                message: format!("failed to create image dir: {e}"),
                source: Some(Box::new(e)),
            })?;

        let path = self.config.image_dir.join(format!("{image_key}.png"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| FerryError::Chat {
                message: format!("failed to write image: {e}"),
                source: Some(Box::new(e)),
            })?;

        if bytes.is_empty() {
            warn!(image_key, "downloaded image is empty");
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> LarkClient {
        LarkClient::new(LarkConfig {
            app_id: "cli_test".to_string(),
            app_secret: "secret".to_string(),
            base_url: base_url.to_string(),
            image_dir: std::env::temp_dir().join("ferry-lark-tests"),
        })
        .unwrap()
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok", "tenant_access_token": "t-token", "expire": 7200
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok", "tenant_access_token": "t-token", "expire": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/im/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "msg": "ok"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        client.send_text("oc_1", "first").await.unwrap();
        client.send_text("oc_1", "second").await.unwrap();
    }

    #[tokio::test]
    async fn send_text_posts_the_expected_body() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/im/v1/messages"))
            .and(query_param("receive_id_type", "chat_id"))
            .and(body_partial_json(serde_json::json!({
                "receive_id": "oc_1",
                "msg_type": "text",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "msg": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri()).send_text("oc_1", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn mention_send_builds_at_tags() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/im/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "msg": "ok"})),
            )
            .mount(&server)
            .await;

        let client = client(&server.uri());
        client
            .send_text_with_mentions(
                "oc_1",
                "ping",
                &[Member {
                    user_id: "ou_1".to_string(),
                    name: "Alice".to_string(),
                }],
                false,
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let send = requests
            .iter()
            .find(|r| r.url.path() == "/im/v1/messages")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&send.body).unwrap();
        let content = body["content"].as_str().unwrap();
        assert!(content.contains("<at user_id=\\\"ou_1\\\">@Alice</at>") ||
                content.contains("<at user_id=\"ou_1\">@Alice</at>"));
        assert!(content.contains("ping"));
    }

    #[tokio::test]
    async fn platform_error_code_surfaces_as_chat_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/im/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 230002, "msg": "bot not in chat"
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .send_text("oc_1", "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bot not in chat"));
    }

    #[tokio::test]
    async fn members_are_listed_and_mapped() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/im/v1/chats/oc_1/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok",
                "data": {"items": [
                    {"member_id": "ou_1", "name": "Alice"},
                    {"member_id": "ou_2", "name": "Bob"}
                ]}
            })))
            .mount(&server)
            .await;

        let members = client(&server.uri()).chat_members("oc_1").await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].user_id, "ou_1");
        assert_eq!(members[1].name, "Bob");
    }

    #[tokio::test]
    async fn history_is_reversed_to_oldest_first_with_bot_flags() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/im/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok",
                "data": {"items": [
                    {
                        "message_id": "m2",
                        "msg_type": "text",
                        "create_time": "1700000002000",
                        "sender": {"id": "bot_1", "sender_type": "app"},
                        "body": {"content": "{\"text\":\"newer (from bot)\"}"}
                    },
                    {
                        "message_id": "m1",
                        "msg_type": "text",
                        "create_time": "1700000001000",
                        "sender": {"id": "ou_1", "sender_type": "user"},
                        "body": {"content": "{\"text\":\"older\"}"}
                    }
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/im/v1/chats/oc_1/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok",
                "data": {"items": [{"member_id": "ou_1", "name": "Alice"}]}
            })))
            .mount(&server)
            .await;

        let history = client(&server.uri()).chat_history("oc_1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "m1");
        assert_eq!(history[0].sender_name, "Alice");
        assert_eq!(history[0].create_time, 1_700_000_001_000);
        assert!(!history[0].is_bot);
        assert_eq!(history[1].id, "m2");
        assert!(history[1].is_bot);
    }

    #[tokio::test]
    async fn bot_open_id_is_fetched_once_and_cached() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/bot/v3/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok",
                "bot": {"open_id": "ou_bot_42", "app_name": "ferry"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        assert_eq!(client.bot_open_id().await.unwrap(), "ou_bot_42");
        // Second call serves from the cache.
        assert_eq!(client.bot_open_id().await.unwrap(), "ou_bot_42");
    }

    #[tokio::test]
    async fn bot_info_without_open_id_is_an_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/bot/v3/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "msg": "ok", "bot": {}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).bot_open_id().await.unwrap_err();
        assert!(err.to_string().contains("open_id"));
    }

    #[tokio::test]
    async fn reaction_hits_the_message_resource() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/im/v1/messages/om_1/reactions"))
            .and(body_partial_json(serde_json::json!({
                "reaction_type": {"emoji_type": "THUMBSUP"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "msg": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri()).add_reaction("om_1", "THUMBSUP").await.unwrap();
    }

    #[test]
    fn post_content_flattens_text_runs() {
        let raw = r#"{"title":"t","content":[[{"tag":"text","text":"hello"},{"tag":"at","user_id":"ou_1"}],[{"tag":"text","text":"world"}]]}"#;
        let text = LarkClient::item_text("post", raw).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn unsupported_history_types_are_skipped() {
        assert!(LarkClient::item_text("sticker", "{}").is_none());
    }
}
