//! Web tools: search and fetch.
//!
//! Lightweight web access tools that work without browser automation.
//! - `web_search`: Search the web using DuckDuckGo instant answers (privacy-first).
//! - `url_fetch`: Fetch a URL and extract readable text content.

use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::error::ToolError;
use rustant_core::types::{RiskLevel, ToolOutput};
use std::time::Duration;

// ---------------------------------------------------------------------------
// WebSearchTool
// ---------------------------------------------------------------------------

/// Search the web using DuckDuckGo instant answers API.
///
/// Returns structured results with titles, snippets, and URLs.
/// Privacy-first: queries go directly to DuckDuckGo, never through a third party.
#[derive(Default)]
pub struct WebSearchTool;

impl WebSearchTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns titles, snippets, and URLs from search results. \
         Use this to look up documentation, find solutions to errors, or research topics."
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
                    "description": "Maximum number of results to return (default: 5, max: 10)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = args.get("query").and_then(|v| v.as_str()).ok_or_else(|| {
            ToolError::InvalidArguments {
                name: "web_search".into(),
                reason: "Missing required parameter: query".into(),
            }
        })?;

        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .min(10) as usize;

        // Use DuckDuckGo HTML search (no API key required, privacy-first)
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Rustant/1.0")
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                name: "web_search".into(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        // Use DuckDuckGo instant answer API
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "web_search".into(),
                message: format!("Search request failed: {}", e),
            })?;

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    name: "web_search".into(),
                    message: format!("Failed to parse search response: {}", e),
                })?;

        let mut results = Vec::new();

        // Extract abstract (main answer)
        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                let source = body
                    .get("AbstractSource")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown");
                let url = body
                    .get("AbstractURL")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                results.push(format!("[{}] {}\n  URL: {}", source, abstract_text, url));
            }
        }

        // Extract related topics
        if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics
                .iter()
                .take(max_results.saturating_sub(results.len()))
            {
                if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
                    let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                    results.push(format!("- {}\n  URL: {}", text, url));
                }
            }
        }

        // Extract results from Results array
        if let Some(res_array) = body.get("Results").and_then(|v| v.as_array()) {
            for result in res_array
                .iter()
                .take(max_results.saturating_sub(results.len()))
            {
                if let Some(text) = result.get("Text").and_then(|v| v.as_str()) {
                    let url = result
                        .get("FirstURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    results.push(format!("- {}\n  URL: {}", text, url));
                }
            }
        }

        let content = if results.is_empty() {
            format!(
                "No instant answers found for \"{}\". Try refining your query or use url_fetch with a specific URL.",
                query
            )
        } else {
            format!(
                "Search results for \"{}\":\n\n{}",
                query,
                results.join("\n\n")
            )
        };

        Ok(ToolOutput::text(content))
    }
}

// ---------------------------------------------------------------------------
// UrlFetchTool
// ---------------------------------------------------------------------------

/// Fetch a URL and extract readable text content.
///
/// Strips HTML tags and returns clean text. Much lighter than browser
/// automation — no Chrome required.
#[derive(Default)]
pub struct UrlFetchTool;

impl UrlFetchTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for UrlFetchTool {
    fn name(&self) -> &str {
        "url_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page URL and extract its text content. Returns the readable text \
         from the page, stripped of HTML. Use this to read documentation, articles, or \
         API references from the web."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "max_length": {
                    "type": "integer",
                    "description": "Maximum characters of content to return (default: 5000)",
                    "default": 5000
                }
            },
            "required": ["url"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let url = args.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            ToolError::InvalidArguments {
                name: "url_fetch".into(),
                reason: "Missing required parameter: url".into(),
            }
        })?;

        let max_length = args
            .get("max_length")
            .and_then(|v| v.as_u64())
            .unwrap_or(5000) as usize;

        // Validate URL
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments {
                name: "url_fetch".into(),
                reason: "URL must start with http:// or https://".into(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Rustant/1.0")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                name: "url_fetch".into(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "url_fetch".into(),
                message: format!("Fetch failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolOutput::text(format!(
                "HTTP {} for URL: {}",
                status, url
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "url_fetch".into(),
                message: format!("Failed to read response body: {}", e),
            })?;

        // Extract text from HTML
        let text =
            if content_type.contains("text/html") || content_type.contains("application/xhtml") {
                extract_text_from_html(&body)
            } else {
                // Plain text or other formats — return as-is
                body
            };

        // Truncate if needed
        let text = if text.len() > max_length {
            format!(
                "{}...\n\n[Truncated at {} characters. Use max_length to see more.]",
                &text[..max_length],
                max_length
            )
        } else {
            text
        };

        let content = format!("Content from {}:\n\n{}", url, text);

        Ok(ToolOutput::text(content))
    }
}

/// Simple HTML-to-text extraction.
///
/// Strips HTML tags and extracts readable content. Handles common elements
/// like paragraphs, headings, list items, and code blocks.
fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' {
            in_tag = false;
            building_tag = false;

            let tag_lower = tag_name.to_lowercase();
            if tag_lower == "script" {
                in_script = true;
            } else if tag_lower == "/script" {
                in_script = false;
            } else if tag_lower == "style" {
                in_style = true;
            } else if tag_lower == "/style" {
                in_style = false;
            }

            // Add newlines for block elements
            if tag_lower.starts_with("p")
                || tag_lower.starts_with("/p")
                || tag_lower.starts_with("br")
                || tag_lower.starts_with("div")
                || tag_lower.starts_with("/div")
                || tag_lower.starts_with("h1")
                || tag_lower.starts_with("h2")
                || tag_lower.starts_with("h3")
                || tag_lower.starts_with("h4")
                || tag_lower.starts_with("h5")
                || tag_lower.starts_with("h6")
                || tag_lower.starts_with("/h")
                || tag_lower.starts_with("li")
                || tag_lower.starts_with("tr")
            {
                text.push('\n');
            }

            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if in_script || in_style {
            continue;
        }
        text.push(ch);
    }

    // Decode common HTML entities
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    // Clean up whitespace: collapse multiple blank lines
    let mut lines: Vec<&str> = text.lines().map(|l| l.trim()).collect();
    lines.dedup_by(|a, b| a.is_empty() && b.is_empty());
    let result: String = lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_html() {
        let html = r#"
        <html>
        <head><title>Test</title></head>
        <body>
            <h1>Hello World</h1>
            <p>This is a <b>test</b> paragraph.</p>
            <script>var x = 1;</script>
            <style>.foo { color: red; }</style>
            <ul>
                <li>Item 1</li>
                <li>Item 2</li>
            </ul>
        </body>
        </html>"#;

        let text = extract_text_from_html(html);
        assert!(text.contains("Hello World"));
        assert!(text.contains("This is a test paragraph."));
        assert!(text.contains("Item 1"));
        assert!(text.contains("Item 2"));
        assert!(!text.contains("var x = 1"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_text_html_entities() {
        let html = "<p>A &amp; B &lt; C &gt; D &quot;E&quot;</p>";
        let text = extract_text_from_html(html);
        assert!(text.contains("A & B < C > D \"E\""));
    }

    #[tokio::test]
    async fn test_web_search_tool_schema() {
        let tool = WebSearchTool::new();
        assert_eq!(tool.name(), "web_search");
        assert_eq!(tool.risk_level(), RiskLevel::ReadOnly);
        let schema = tool.parameters_schema();
        assert!(schema.get("properties").is_some());
        assert!(schema["properties"].get("query").is_some());
    }

    #[tokio::test]
    async fn test_url_fetch_tool_schema() {
        let tool = UrlFetchTool::new();
        assert_eq!(tool.name(), "url_fetch");
        assert_eq!(tool.risk_level(), RiskLevel::ReadOnly);
        let schema = tool.parameters_schema();
        assert!(schema["properties"].get("url").is_some());
    }

    #[tokio::test]
    async fn test_url_fetch_invalid_url() {
        let tool = UrlFetchTool::new();
        let result = tool.execute(serde_json::json!({"url": "not-a-url"})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_web_search_missing_query() {
        let tool = WebSearchTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
