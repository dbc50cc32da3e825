// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly for new and resumed backend threads.
//!
//! A new-thread prompt carries the full system prompt, chat context,
//! member listing, truncated history, and the current message, joined by
//! `\n\n---\n\n` section separators. A resumed-thread prompt assumes the
//! system prompt is already in-thread and only carries the chat context,
//! the history slice after the resumption anchor, and the current message.

use ferry_core::{Conversation, Member, Message};

/// History section marker.
const HISTORY_MARKER: &str = "[Recent chat messages - for reference]";
/// Current message marker.
const CURRENT_MARKER: &str = "[Current message]";

/// Prompt configuration.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// System prompt for new threads. Opaque to this module.
    pub system_prompt: String,
    /// Member listing header for group chats.
    pub member_list_header: String,
    /// Chat context template; `{{chat_id}}` and `{{chat_type}}` are
    /// interpolated literally.
    pub chat_context_template: String,
    /// Tail count kept unconditionally. Zero or negative keeps everything.
    pub max_history_count: i64,
    /// Time window (minutes) applied to older messages beyond the tail.
    /// Zero or negative drops the older prefix entirely.
    pub max_history_minutes: i64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            member_list_header: "## Chat Members\nHere are the members of this chat. \
                                 You can use [MENTION:user_id:name] to @ them:"
                .to_string(),
            chat_context_template: "## Current Chat Context\n\
                                    - chat_id: {{chat_id}}\n\
                                    - chat_type: {{chat_type}}\n\n\
                                    Note: tool calls may omit the chat_id argument - it \
                                    defaults to the current chat above."
                .to_string(),
            max_history_count: 15,
            max_history_minutes: 120,
        }
    }
}

/// Default system prompt for new threads.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a group chat assistant. Everything you output is sent directly to the chat.

## Rules
1. Output reply content directly, without meta-descriptions ("Here's a response:", "I'll reply with:").
2. Everything you write will be seen by everyone in the chat.
3. Prefer concise responses.
4. Read the "Recent chat messages" section before responding; users often refer to earlier content. Don't ask for information that's already in the history.

## Chat Directives
Embed these tokens in your output to produce side effects; they are parsed out and never appear in the final message. Multiple directives per message are allowed.

- [REACTION:TYPE] - add an emoji reaction to the triggering message. TYPE options: THUMBSUP, DONE, HEART, APPRECIATE, LAUGH, PARTY, SURPRISED, CRY
- [MENTION:user_id:name] - @ a specific user
- [MENTION_ALL] - @ everyone

Example: [REACTION:THUMBSUP] Great question!

## Configuration Tools
A local HTTP tool surface lets you manage your own notification preferences mid-conversation:
- Whitelist: chats whose messages always reach you immediately ("watch this chat")
- Keywords: trigger words for immediate processing (priority 2 = immediate)
- Interest topics: topics the relevance filter watches for in buffered group chatter
- Buffer: view unread message counts and buffered messages per chat
- Chat: fetch member lists (for mentions) and extra history"#;

/// Result of history truncation: the kept window plus the dropped older
/// messages (used for the omission notice).
#[derive(Debug, Clone)]
pub struct TruncatedHistory {
    pub kept: Vec<Message>,
    pub dropped: Vec<Message>,
}

/// Truncate history: the tail `max_history_count` messages are retained
/// unconditionally; from the older prefix, only messages newer than
/// `now - max_history_minutes` survive. Chronological order is preserved.
///
/// This optimizes for the freshest continuous context: recent messages are
/// always present regardless of age, while older ones are included only
/// when genuinely recent.
pub fn truncate_history(messages: &[Message], cfg: &PromptConfig, now_ms: i64) -> TruncatedHistory {
    if messages.is_empty() {
        return TruncatedHistory {
            kept: Vec::new(),
            dropped: Vec::new(),
        };
    }

    let n = messages.len();
    let tail = if cfg.max_history_count <= 0 || cfg.max_history_count as usize > n {
        n
    } else {
        cfg.max_history_count as usize
    };

    let (older, recent) = messages.split_at(n - tail);

    let cutoff = now_ms - cfg.max_history_minutes * 60_000;
    let mut kept = Vec::with_capacity(n);
    let mut dropped = Vec::new();
    for m in older {
        if cfg.max_history_minutes > 0 && m.is_after(cutoff) {
            kept.push(m.clone());
        } else {
            dropped.push(m.clone());
        }
    }
    kept.extend_from_slice(recent);

    TruncatedHistory { kept, dropped }
}

/// Format the prompt for a brand-new backend thread.
pub fn format_for_new_thread(conv: &Conversation, cfg: &PromptConfig, now_ms: i64) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(cfg.system_prompt.clone());
    parts.push(format_chat_context(conv, &cfg.chat_context_template));

    if conv.is_group() && !conv.members.is_empty() {
        parts.push(format_member_list(&conv.members, &cfg.member_list_header));
    }

    let full = conv.history_excluding_current();
    let truncated = truncate_history(&full, cfg, now_ms);

    if !truncated.dropped.is_empty() {
        parts.push(format_omission_notice(&truncated.dropped));
    }
    if !truncated.kept.is_empty() {
        parts.push(format_history(&truncated.kept, HISTORY_MARKER));
    }

    parts.push(format_current_message(&conv.current, CURRENT_MARKER));

    parts.join("\n\n---\n\n")
}

/// Format the prompt for a resumed thread.
///
/// Anchor resolution: if `last_processed_msg_id` is non-empty and present
/// in history, the slice starts after it; otherwise messages newer than
/// `last_msg_time` are taken. This gives exact recovery across restarts
/// and tolerates platform-side deletions.
pub fn format_for_resumed_thread(
    conv: &Conversation,
    last_processed_msg_id: &str,
    last_msg_time_ms: i64,
    cfg: &PromptConfig,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format_chat_context(conv, &cfg.chat_context_template));

    let recent = conv.history_after_msg_id(last_processed_msg_id, last_msg_time_ms);
    if !recent.is_empty() {
        parts.push(format_history(&recent, HISTORY_MARKER));
    }

    parts.push(format_current_message(&conv.current, CURRENT_MARKER));

    parts.join("\n\n")
}

/// Compact `[name]: content` lines for the relevance classifier.
pub fn format_history_for_filter(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!("[{}]: {}\n", m.display_name(), m.content));
    }
    out
}

fn format_chat_context(conv: &Conversation, template: &str) -> String {
    template
        .replace("{{chat_id}}", &conv.chat_id)
        .replace("{{chat_type}}", &conv.chat_type.to_string())
        .trim()
        .to_string()
}

fn format_member_list(members: &[Member], header: &str) -> String {
    let mut out = String::from(header);
    out.push('\n');
    for m in members {
        out.push_str(&format!("- {} (user_id: {})\n", m.name, m.user_id));
    }
    out
}

/// One-line omission notice plus up to 3 sample lines from the dropped
/// messages closest to the truncation point, content capped at 50 chars.
fn format_omission_notice(dropped: &[Message]) -> String {
    let mut out = format!(
        "[{} earlier messages omitted. Use the history tool to view if needed]\n",
        dropped.len()
    );

    let samples = dropped.len().min(3);
    if samples > 0 {
        out.push_str("Summary:\n");
        for m in &dropped[dropped.len() - samples..] {
            let name = if m.is_bot { "You (bot)" } else { m.display_name() };
            let content: String = m.content.chars().take(50).collect();
            let ellipsis = if m.content.chars().count() > 50 { "..." } else { "" };
            out.push_str(&format!("  - [{name}]: {content}{ellipsis}\n"));
        }
    }

    out
}

fn format_history(messages: &[Message], marker: &str) -> String {
    let mut out = String::from(marker);
    out.push('\n');
    for m in messages {
        if m.is_bot {
            // Flagged as the bot's own message so the backend recognizes
            // its previous replies.
            out.push_str(&format!("[You (bot)]: {}\n", m.content));
        } else {
            out.push_str(&format!("[{}]: {}\n", m.display_name(), m.content));
        }
    }
    out
}

fn format_current_message(msg: &Message, marker: &str) -> String {
    let name = msg.display_name();
    if msg.sender_id.is_empty() {
        format!("{marker}\n[Message from {name}]:\n{}", msg.content)
    } else {
        format!(
            "{marker}\n[Message from {name} (user_id: {})]:\n{}",
            msg.sender_id, msg.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::ChatType;

    fn msg(id: &str, create_time: i64) -> Message {
        Message {
            id: id.to_string(),
            chat_id: "c1".to_string(),
            sender_id: format!("u_{id}"),
            sender_name: format!("Sender {id}"),
            content: format!("content {id}"),
            msg_type: "text".to_string(),
            create_time,
            is_bot: false,
        }
    }

    fn conv(history: Vec<Message>, current: Message) -> Conversation {
        Conversation {
            chat_id: "oc_123".to_string(),
            chat_type: ChatType::Group,
            members: vec![
                Member {
                    user_id: "ou_1".to_string(),
                    name: "Alice".to_string(),
                },
                Member {
                    user_id: "ou_2".to_string(),
                    name: "Bob".to_string(),
                },
            ],
            history,
            current,
        }
    }

    fn cfg(count: i64, minutes: i64) -> PromptConfig {
        PromptConfig {
            max_history_count: count,
            max_history_minutes: minutes,
            ..PromptConfig::default()
        }
    }

    const NOW: i64 = 10_000_000;

    #[test]
    fn truncate_keeps_tail_unconditionally() {
        // Five ancient messages, tail of 3 is kept regardless of age.
        let msgs: Vec<Message> = (0..5).map(|i| msg(&format!("m{i}"), 100 + i)).collect();
        let t = truncate_history(&msgs, &cfg(3, 120), NOW);
        let kept: Vec<_> = t.kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(kept, vec!["m2", "m3", "m4"]);
        assert_eq!(t.dropped.len(), 2);
    }

    #[test]
    fn truncate_retains_recent_older_messages_within_window() {
        // m0 ancient, m1 within the 2h window, m2/m3 tail.
        let msgs = vec![
            msg("m0", NOW - 10 * 3_600_000),
            msg("m1", NOW - 30 * 60_000),
            msg("m2", NOW - 10),
            msg("m3", NOW - 5),
        ];
        let t = truncate_history(&msgs, &cfg(2, 120), NOW);
        let kept: Vec<_> = t.kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(kept, vec!["m1", "m2", "m3"]);
        assert_eq!(t.dropped.len(), 1);
        assert_eq!(t.dropped[0].id, "m0");
    }

    #[test]
    fn truncate_with_zero_count_keeps_all() {
        let msgs: Vec<Message> = (0..4).map(|i| msg(&format!("m{i}"), 100 + i)).collect();
        let t = truncate_history(&msgs, &cfg(0, 120), NOW);
        assert_eq!(t.kept.len(), 4);
        assert!(t.dropped.is_empty());
    }

    #[test]
    fn truncate_with_count_larger_than_len_keeps_all() {
        let msgs: Vec<Message> = (0..3).map(|i| msg(&format!("m{i}"), 100 + i)).collect();
        let t = truncate_history(&msgs, &cfg(50, 120), NOW);
        assert_eq!(t.kept.len(), 3);
        assert!(t.dropped.is_empty());
    }

    #[test]
    fn truncate_zero_minutes_drops_entire_older_prefix() {
        let msgs = vec![msg("m0", NOW - 10), msg("m1", NOW - 5), msg("m2", NOW - 1)];
        let t = truncate_history(&msgs, &cfg(1, 0), NOW);
        let kept: Vec<_> = t.kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(kept, vec!["m2"]);
        assert_eq!(t.dropped.len(), 2);
    }

    #[test]
    fn truncate_empty_history() {
        let t = truncate_history(&[], &cfg(5, 120), NOW);
        assert!(t.kept.is_empty());
        assert!(t.dropped.is_empty());
    }

    #[test]
    fn tail_of_input_is_always_present_in_output() {
        // The last min(N, len) input messages always survive.
        for len in 1..8usize {
            let msgs: Vec<Message> =
                (0..len).map(|i| msg(&format!("m{i}"), i as i64)).collect();
            let t = truncate_history(&msgs, &cfg(3, 0), NOW);
            let tail = 3.min(len);
            let expected: Vec<_> = msgs[len - tail..].iter().map(|m| m.id.clone()).collect();
            let got: Vec<_> = t.kept[t.kept.len() - tail..]
                .iter()
                .map(|m| m.id.clone())
                .collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn new_thread_prompt_contains_all_sections() {
        let c = conv(vec![msg("m1", NOW - 100), msg("m2", NOW - 50)], msg("m3", NOW));
        let cfg = cfg(15, 120);
        let prompt = format_for_new_thread(&c, &cfg, NOW);

        assert!(prompt.starts_with(&cfg.system_prompt));
        assert!(prompt.contains("chat_id: oc_123"));
        assert!(prompt.contains("chat_type: group"));
        assert!(prompt.contains("- Alice (user_id: ou_1)"));
        assert!(prompt.contains("- Bob (user_id: ou_2)"));
        assert!(prompt.contains(HISTORY_MARKER));
        assert!(prompt.contains("[Sender m1]: content m1"));
        assert!(prompt.contains("[Current message]"));
        assert!(prompt.contains("[Message from Sender m3 (user_id: u_m3)]:\ncontent m3"));
        assert!(prompt.contains("\n\n---\n\n"));
    }

    #[test]
    fn new_thread_prompt_emits_omission_notice() {
        let mut history: Vec<Message> = (0..10).map(|i| msg(&format!("m{i}"), 100 + i)).collect();
        history[0].content = "x".repeat(80);
        let c = conv(history, msg("cur", NOW));
        let prompt = format_for_new_thread(&c, &cfg(4, 0), NOW);

        assert!(prompt.contains("[6 earlier messages omitted. Use the history tool to view if needed]"));
        assert!(prompt.contains("Summary:"));
        // Sample lines come from the dropped messages closest to the cut.
        assert!(prompt.contains("  - [Sender m5]: content m5"));
        assert!(!prompt.contains("content m0"));
    }

    #[test]
    fn omission_sample_caps_content_at_50_chars() {
        let mut long = msg("m0", 100);
        long.content = "a".repeat(80);
        let dropped = vec![long];
        let notice = format_omission_notice(&dropped);
        assert!(notice.contains(&format!("{}...", "a".repeat(50))));
        assert!(!notice.contains(&"a".repeat(51)));
    }

    #[test]
    fn p2p_new_thread_prompt_has_no_member_list() {
        let mut c = conv(vec![], msg("m1", NOW));
        c.chat_type = ChatType::P2p;
        let prompt = format_for_new_thread(&c, &cfg(15, 120), NOW);
        assert!(!prompt.contains("## Chat Members"));
        assert!(prompt.contains("chat_type: p2p"));
    }

    #[test]
    fn bot_history_lines_are_marked() {
        let mut bot_msg = msg("m1", NOW - 10);
        bot_msg.is_bot = true;
        let c = conv(vec![bot_msg], msg("m2", NOW));
        let prompt = format_for_new_thread(&c, &cfg(15, 120), NOW);
        assert!(prompt.contains("[You (bot)]: content m1"));
    }

    #[test]
    fn resumed_thread_prompt_omits_system_prompt_and_members() {
        let c = conv(
            vec![msg("m1", 100), msg("m2", 200), msg("m3", 300)],
            msg("m4", 400),
        );
        let cfg = cfg(15, 120);
        let prompt = format_for_resumed_thread(&c, "m1", 0, &cfg);

        assert!(!prompt.contains(&cfg.system_prompt));
        assert!(!prompt.contains("## Chat Members"));
        assert!(prompt.contains("chat_id: oc_123"));
        assert!(prompt.contains("[Sender m2]: content m2"));
        assert!(prompt.contains("[Sender m3]: content m3"));
        assert!(!prompt.contains("[Sender m1]: content m1"));
        assert!(prompt.contains("[Message from Sender m4"));
        // Resumed prompts use plain blank-line joins, not section rules.
        assert!(!prompt.contains("\n\n---\n\n"));
    }

    #[test]
    fn resumed_prompt_with_anchor_at_last_entry_has_no_history_section() {
        let c = conv(vec![msg("m1", 100), msg("m2", 200)], msg("m3", 300));
        let prompt = format_for_resumed_thread(&c, "m2", 0, &cfg(15, 120));
        assert!(!prompt.contains(HISTORY_MARKER));
        assert!(prompt.contains("[Message from Sender m3"));
    }

    #[test]
    fn resumed_prompt_falls_back_to_time_anchor() {
        let c = conv(
            vec![msg("m1", 100), msg("m2", 200), msg("m3", 300)],
            msg("m4", 400),
        );
        let prompt = format_for_resumed_thread(&c, "deleted", 150, &cfg(15, 120));
        assert!(!prompt.contains("content m1"));
        assert!(prompt.contains("content m2"));
        assert!(prompt.contains("content m3"));
    }

    #[test]
    fn filter_history_format_is_compact() {
        let msgs = vec![msg("m1", 100), msg("m2", 200)];
        let text = format_history_for_filter(&msgs);
        assert_eq!(
            text,
            "[Sender m1]: content m1\n[Sender m2]: content m2\n"
        );
    }

    #[test]
    fn filter_history_falls_back_to_sender_id() {
        let mut m = msg("m1", 100);
        m.sender_name.clear();
        let text = format_history_for_filter(&[m]);
        assert_eq!(text, "[u_m1]: content m1\n");
    }
}
