//! Session title generation.
//!
//! One short non-streaming model call that names the conversation from the
//! user's message. Never fails: provider errors fall back to a fixed title.

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use wf_domain::tool::Message;
use wf_domain::trace::TraceEvent;
use wf_providers::{ChatRequest, LlmProvider};

pub const FALLBACK_TITLE: &str = "Travel Planning";
pub const EMPTY_TITLE: &str = "Travel Plans";
pub const DEFAULT_TAGLINE: &str = "Explore your next destination";

const TITLE_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates concise, \
descriptive titles for travel planning conversations. The title should be 2-5 words, focus \
on destinations or travel themes mentioned, and be capitalized appropriately.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTitle {
    pub title: String,
    pub tagline: String,
}

impl SessionTitle {
    /// Used whenever the model cannot name the conversation.
    pub fn fallback() -> Self {
        Self {
            title: FALLBACK_TITLE.to_owned(),
            tagline: DEFAULT_TAGLINE.to_owned(),
        }
    }
}

fn quoted() -> Option<&'static Regex> {
    static QUOTED: OnceLock<Option<Regex>> = OnceLock::new();
    QUOTED
        .get_or_init(|| Regex::new(r#"^["'](.*)["']$"#).ok())
        .as_ref()
}

/// Trim the model output and strip one pair of surrounding quotes.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EMPTY_TITLE.to_owned();
    }
    match quoted().and_then(|re| re.captures(trimmed)) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default(),
        None => trimmed.to_owned(),
    }
}

pub async fn generate_title(
    provider: &dyn LlmProvider,
    model: Option<String>,
    user_text: &str,
) -> SessionTitle {
    let req = ChatRequest {
        messages: vec![
            Message::system(TITLE_SYSTEM_PROMPT),
            Message::user(format!(
                "Please generate a short, concise title (2-5 words) for this travel \
                 conversation. Focus on the destination or main travel theme:\n\n{user_text}"
            )),
        ],
        tools: Vec::new(),
        temperature: Some(0.7),
        max_tokens: Some(20),
        model,
    };

    let started = Instant::now();
    let title = match provider.chat(req).await {
        Ok(resp) => {
            TraceEvent::LlmRequest {
                provider: provider.provider_id().to_owned(),
                model: resp.model.clone(),
                streaming: false,
                duration_ms: started.elapsed().as_millis() as u64,
                prompt_tokens: resp.usage.map(|u| u.prompt_tokens),
                completion_tokens: resp.usage.map(|u| u.completion_tokens),
            }
            .emit();
            clean_title(&resp.content)
        }
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed, using fallback");
            FALLBACK_TITLE.to_owned()
        }
    };

    SessionTitle {
        title,
        tagline: DEFAULT_TAGLINE.to_owned(),
    }
}
