//! URL fetch tool: retrieve one page and hand its readable text to the model.
//!
//! Every target passes through [`UrlPolicy`] before the request, after DNS
//! resolution, and on each redirect hop. Bodies are streamed and cut at
//! `max_bytes`, so a huge or endless response cannot exhaust memory.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use scraper::{Html, Selector};
use threadloom_core::error::ToolError;
use threadloom_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::url_policy::UrlPolicy;

const TOOL_NAME: &str = "url_fetch";
const MAX_REDIRECTS: usize = 5;

pub struct UrlFetchTool {
    client: reqwest::Client,
    policy: UrlPolicy,
    max_bytes: usize,
}

impl UrlFetchTool {
    pub fn new(policy: UrlPolicy, max_bytes: usize) -> Result<Self, ToolError> {
        let hop_policy = policy.clone();
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
            }
            match hop_policy.check(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(reason) => attempt.error(reason),
            }
        });

        Ok(Self {
            client: crate::http_client(TOOL_NAME, redirect)?,
            policy,
            max_bytes: max_bytes.max(1),
        })
    }

    fn denied(reason: String) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: TOOL_NAME.into(),
            reason,
        }
    }

    fn unreachable(reason: impl Into<String>) -> ToolError {
        ToolError::Unreachable {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for UrlFetchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Fetch a web page by URL and return its readable text. \
         Use this to read a page found through search or given by the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http or https URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let raw = arguments["url"].as_str().unwrap_or_default().trim();
        let url = Url::parse(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid URL '{raw}': {e}")))?;

        self.policy.check(&url).map_err(Self::denied)?;
        self.policy.check_resolved(&url).await.map_err(Self::denied)?;

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_redirect() {
                Self::denied(e.to_string())
            } else {
                Self::unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unreachable(format!("{url} returned HTTP {}", status.as_u16())));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::unreachable(e.to_string()))?;
            let room = self.max_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                truncated = chunk.len() > room || stream.next().await.is_some();
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.len();

        let text = decode_prefix(&body);
        let mut content = if content_type.contains("html") || looks_like_html(&text) {
            html_to_text(&text)
        } else {
            text
        };
        if content.trim().is_empty() {
            content = "(empty page)".into();
        }
        if truncated {
            content.push_str(&format!("\n[truncated at {} bytes]", self.max_bytes));
        }

        debug!(url = %final_url, bytes, truncated, "Fetched page");

        Ok(ToolOutput::text(content).with_data(serde_json::json!({
            "url": final_url,
            "status": status.as_u16(),
            "content_type": content_type,
            "truncated": truncated,
            "bytes": bytes,
        })))
    }
}

/// Decode bytes as UTF-8, dropping a multi-byte sequence split by the cap.
fn decode_prefix(bytes: &[u8]) -> String {
    let valid = match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => bytes.len(),
    };
    String::from_utf8_lossy(&bytes[..valid]).into_owned()
}

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().get(..15).unwrap_or("").to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Title plus visible text, whitespace collapsed.
fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts = Vec::new();

    if let Ok(sel) = Selector::parse("title")
        && let Some(el) = doc.select(&sel).next()
    {
        let title = collapse_whitespace(&el.text().collect::<String>());
        if !title.is_empty() {
            parts.push(format!("Title: {title}"));
        }
    }

    let mut visible = String::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(e.name(), "script" | "style" | "noscript" | "head" | "template")
            })
        });
        if !hidden {
            visible.push_str(text);
            visible.push(' ');
        }
    }
    let visible = collapse_whitespace(&visible);
    if !visible.is_empty() {
        parts.push(visible);
    }

    parts.join("\n\n")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
