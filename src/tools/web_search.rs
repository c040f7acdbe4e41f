//! Web search backed by DuckDuckGo's lite endpoint (no API key required).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::Tool;

const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    client: Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "google_web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return result titles, URLs and snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: &Value) -> anyhow::Result<Value> {
        let query = args["query"].as_str().unwrap_or_default();
        let url = reqwest::Url::parse_with_params("https://lite.duckduckgo.com/lite/", &[("q", query)])?;

        let html = self.client.get(url).send().await?.text().await?;
        let results = parse_lite_results(&html, MAX_RESULTS);

        Ok(json!({ "results": results }))
    }
}

/// Parse the lite results page with plain string scanning; it is a minimal
/// table of `result-link` anchors followed by `result-snippet` cells.
fn parse_lite_results(html: &str, max_results: usize) -> Vec<Value> {
    let mut results = Vec::new();
    let mut pos = 0;

    while results.len() < max_results {
        let link_start = match html[pos..].find("class=\"result-link\"") {
            Some(p) => pos + p,
            None => break,
        };

        let tag_start = html[..link_start].rfind("<a ").unwrap_or(link_start);
        let href = extract_attr(&html[tag_start..], "href").unwrap_or_default();

        let title_start = match html[link_start..].find('>') {
            Some(p) => link_start + p + 1,
            None => break,
        };
        let title_end = match html[title_start..].find("</a>") {
            Some(p) => title_start + p,
            None => break,
        };
        let title = strip_tags(&html[title_start..title_end]);

        let snippet = html[title_end..]
            .find("result-snippet\">")
            .map(|p| {
                let start = title_end + p + "result-snippet\">".len();
                let end = html[start..].find("</td>").map(|e| start + e).unwrap_or(start);
                strip_tags(&html[start..end])
            })
            .unwrap_or_default();

        if !href.is_empty() {
            results.push(json!({
                "title": title.trim(),
                "url": href,
                "snippet": snippet.trim(),
            }));
        }
        pos = title_end;
    }

    results
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let marker = format!("{}=\"", attr);
    let start = tag.find(&marker)? + marker.len();
    let end = tag[start..].find('"')? + start;
    Some(html_decode(&tag[start..end]))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    html_decode(&out)
}

/// Decode common HTML entities. The lite page HTML-escapes its redirect URLs,
/// so hrefs come out with `&amp;` between query parameters.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <tr><td><a rel="nofollow" href="https://example.com/a" class="result-link">First <b>Result</b></a></td></tr>
        <tr><td class="result-snippet">Snippet one.</td></tr>
        <tr><td><a rel="nofollow" href="https://example.com/b" class="result-link">Second</a></td></tr>
        <tr><td class="result-snippet">Snippet two.</td></tr>
    "#;

    #[test]
    fn parses_links_titles_and_snippets() {
        let results = parse_lite_results(SAMPLE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://example.com/a");
        assert_eq!(results[0]["title"], "First Result");
        assert_eq!(results[0]["snippet"], "Snippet one.");
        assert_eq!(results[1]["url"], "https://example.com/b");
    }

    #[test]
    fn respects_max_results() {
        let results = parse_lite_results(SAMPLE, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn entities_are_decoded_in_hrefs_titles_and_snippets() {
        let html = r#"
            <tr><td><a rel="nofollow" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&amp;rut=abc" class="result-link">Tom &amp; Jerry&#39;s page</a></td></tr>
            <tr><td class="result-snippet">A &quot;quoted&quot; snippet &lt;here&gt;.</td></tr>
        "#;
        let results = parse_lite_results(html, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0]["url"],
            "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=abc"
        );
        assert_eq!(results[0]["title"], "Tom & Jerry's page");
        assert_eq!(results[0]["snippet"], "A \"quoted\" snippet <here>.");
    }
}
