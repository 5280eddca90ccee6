//! Web search tool backed by a DuckDuckGo instant-answer style endpoint.
//!
//! The endpoint returns one JSON document with a direct answer, an abstract,
//! result links, and related topics (optionally nested). These are flattened
//! into a ranked list of `{rank, title, url, snippet}` entries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use threadloom_core::error::ToolError;
use threadloom_core::tool::{Tool, ToolOutput};
use tracing::debug;

const TOOL_NAME: &str = "web_search";

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(endpoint: &str, max_results: usize) -> Result<Self, ToolError> {
        Ok(Self {
            client: crate::http_client(TOOL_NAME, reqwest::redirect::Policy::limited(5))?,
            endpoint: endpoint.to_string(),
            max_results: max_results.max(1),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct InstantAnswer {
    answer: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    heading: String,
    results: Vec<Topic>,
    related_topics: Vec<Topic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Topic {
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    /// Present on category groups instead of `Text`
    topics: Vec<Topic>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web. Use this when you cannot answer from your own knowledge \
         or when the question needs recent information. Returns ranked results \
         with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }
        let limit = arguments["max_results"]
            .as_u64()
            .map(|n| (n as usize).clamp(1, self.max_results))
            .unwrap_or(self.max_results);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Unreachable {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Unreachable {
                tool_name: TOOL_NAME.into(),
                reason: format!("search endpoint returned HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| ToolError::Unreachable {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;
        let answer: InstantAnswer =
            serde_json::from_str(&body).map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("unexpected search response: {e}"),
            })?;

        let hits = rank(answer, limit);
        debug!(query, hits = hits.len(), "Search complete");

        if hits.is_empty() {
            return Ok(ToolOutput::text(format!("No results found for \"{query}\".")));
        }

        Ok(ToolOutput::text(render(&hits)).with_data(serde_json::json!({
            "query": query,
            "results": hits,
        })))
    }
}

/// Flatten an instant answer into hits: direct answer, abstract, results,
/// then related topics in document order.
fn rank(answer: InstantAnswer, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    if !answer.answer.is_empty() {
        hits.push(SearchHit {
            rank: 0,
            title: "Answer".into(),
            url: String::new(),
            snippet: answer.answer,
        });
    }

    if !answer.abstract_text.is_empty() {
        hits.push(SearchHit {
            rank: 0,
            title: if answer.heading.is_empty() {
                "Abstract".into()
            } else {
                answer.heading
            },
            url: answer.abstract_url,
            snippet: answer.abstract_text,
        });
    }

    let mut topics = Vec::new();
    flatten(answer.results, &mut topics);
    flatten(answer.related_topics, &mut topics);
    hits.extend(topics.into_iter().map(topic_hit));

    hits.truncate(limit);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    hits
}

fn flatten(topics: Vec<Topic>, out: &mut Vec<Topic>) {
    for mut topic in topics {
        let nested = std::mem::take(&mut topic.topics);
        if !topic.text.is_empty() {
            out.push(topic);
        }
        flatten(nested, out);
    }
}

fn topic_hit(topic: Topic) -> SearchHit {
    let title = topic
        .text
        .split_once(" - ")
        .map(|(head, _)| head.to_string())
        .unwrap_or_else(|| topic.text.clone());
    SearchHit {
        rank: 0,
        title,
        url: topic.first_url,
        snippet: topic.text,
    }
}

fn render(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            if hit.url.is_empty() {
                format!("{}. {}\n   {}", hit.rank, hit.title, hit.snippet)
            } else {
                format!("{}. {}\n   {}\n   {}", hit.rank, hit.title, hit.url, hit.snippet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
