// OneBot v11 HTTP-POST webhook, health and metrics routes.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::commands::{Dispatcher, InboundMessage};
use crate::metrics;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    access_token: Option<Arc<str>>,
    allowed_groups: Arc<BTreeSet<i64>>,
}

// ── Event types ───────────────────────────────────────────────────────

/// The subset of a OneBot v11 event the bot reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Event {
    pub post_type: String,
    pub message_type: String,
    pub self_id: i64,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub raw_message: String,
    pub message: Value,
}

impl Event {
    /// CQ-coded text of the message, preferring `raw_message`.
    fn cq_text(&self) -> String {
        if !self.raw_message.is_empty() {
            return self.raw_message.clone();
        }
        match &self.message {
            Value::String(s) => s.clone(),
            Value::Array(segments) => segments.iter().map(segment_to_cq).collect(),
            _ => String::new(),
        }
    }
}

/// Render an array-format message segment back into CQ code.
fn segment_to_cq(segment: &Value) -> String {
    let kind = segment["type"].as_str().unwrap_or_default();
    let data = &segment["data"];
    match kind {
        "text" => escape(data["text"].as_str().unwrap_or_default()),
        "at" => {
            let qq = match &data["qq"] {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => String::new(),
            };
            format!("[CQ:at,qq={qq}]")
        }
        other => format!("[CQ:{other}]"),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

fn unescape(text: &str) -> String {
    text.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

/// Strip CQ codes from a message.
///
/// Returns the plain text and whether the bot itself was mentioned. Mentions
/// of other users are kept as `@<qq>` so they can be used as arguments.
pub fn parse_cq(raw: &str, self_id: i64) -> (String, bool) {
    let self_id = self_id.to_string();
    let mut text = String::with_capacity(raw.len());
    let mut mentioned = false;
    let mut rest = raw;

    while let Some(start) = rest.find("[CQ:") {
        text.push_str(&unescape(&rest[..start]));
        let Some(len) = rest[start..].find(']') else {
            rest = &rest[start..];
            break;
        };
        let code = &rest[start + 4..start + len];
        rest = &rest[start + len + 1..];

        let mut parts = code.split(',');
        if parts.next() != Some("at") {
            continue;
        }
        let qq = parts.find_map(|p| p.strip_prefix("qq=")).unwrap_or_default();
        if qq == self_id {
            mentioned = true;
        } else if qq != "all" && !qq.is_empty() {
            text.push_str(&format!(" @{qq} "));
        }
    }
    text.push_str(&unescape(rest));

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (text, mentioned)
}

// ── Helpers ───────────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("Token ")))
        .is_some_and(|token| token == expected)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<Event>,
) -> Response {
    if let Some(expected) = &state.access_token {
        if !authorized(&headers, expected) {
            tracing::warn!("rejected webhook call with bad access token");
            return json_error(StatusCode::UNAUTHORIZED, "Invalid access token");
        }
    }

    if event.post_type != "message" {
        return StatusCode::NO_CONTENT.into_response();
    }
    match (event.message_type.as_str(), event.group_id) {
        ("group", Some(group)) => {
            if !state.allowed_groups.is_empty() && !state.allowed_groups.contains(&group) {
                tracing::debug!(group, "ignoring message from group outside allow list");
                return StatusCode::NO_CONTENT.into_response();
            }
        }
        ("private", _) => {}
        _ => return StatusCode::NO_CONTENT.into_response(),
    }

    let (text, mentioned) = parse_cq(&event.cq_text(), event.self_id);
    let msg = InboundMessage {
        sender: event.user_id.to_string(),
        text,
        // Private chats are always addressed to the bot.
        mentioned: mentioned || event.message_type == "private",
    };

    match state.dispatcher.handle(&msg).await {
        Some(reply) => Json(json!({ "reply": reply, "at_sender": false })).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "crcon-bot" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = AppState {
        access_token: dispatcher
            .config
            .onebot_access_token
            .as_deref()
            .map(Arc::from),
        allowed_groups: Arc::new(dispatcher.config.allowed_groups.clone()),
        dispatcher,
    };

    Router::new()
        .route("/onebot", post(handle_event))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(parse_cq("/帮助", 10000), ("/帮助".to_string(), false));
    }

    #[test]
    fn test_self_mention_is_detected_and_removed() {
        let (text, mentioned) = parse_cq("[CQ:at,qq=10000] 服务器信息 2", 10000);
        assert_eq!(text, "服务器信息 2");
        assert!(mentioned);
    }

    #[test]
    fn test_other_mention_becomes_argument() {
        let (text, mentioned) = parse_cq("/添加管理员 [CQ:at,qq=123456789]", 10000);
        assert_eq!(text, "/添加管理员 @123456789");
        assert!(!mentioned);
    }

    #[test]
    fn test_other_codes_are_stripped_and_entities_unescaped() {
        let (text, _) = parse_cq("[CQ:reply,id=42]/私信玩家 1 &#91;警告&#93; a&amp;b", 10000);
        assert_eq!(text, "/私信玩家 1 [警告] a&b");
    }

    #[test]
    fn test_unterminated_code_is_kept_as_text() {
        let (text, _) = parse_cq("hello [CQ:at", 10000);
        assert_eq!(text, "hello [CQ:at");
    }

    #[test]
    fn test_array_message_is_rendered() {
        let event: Event = serde_json::from_value(json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10000,
            "user_id": 20000,
            "group_id": 1,
            "message": [
                { "type": "at", "data": { "qq": "10000" } },
                { "type": "text", "data": { "text": " 状态" } }
            ]
        }))
        .unwrap();
        let (text, mentioned) = parse_cq(&event.cq_text(), event.self_id);
        assert_eq!(text, "状态");
        assert!(mentioned);
    }

    #[test]
    fn test_authorization_header() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, "secret"));
        headers.insert("Authorization", "Bearer secret".parse().unwrap());
        assert!(authorized(&headers, "secret"));
        headers.insert("Authorization", "Bearer other".parse().unwrap());
        assert!(!authorized(&headers, "secret"));
    }
}
