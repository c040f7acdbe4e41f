//! URL fetching with SSRF guards.

use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::utils::truncate_str;

use super::Tool;

const MAX_CONTENT_CHARS: usize = 20_000;

/// Reject URLs that would let the model reach loopback, link-local or
/// private-range addresses.
pub fn validate_url(url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("Blocked scheme '{}': only http/https allowed", scheme)),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| "URL must have a host".to_string())?;
    let host_lower = host.to_lowercase();

    const BLOCKED_HOSTS: &[&str] = &[
        "localhost",
        "127.0.0.1",
        "::1",
        "[::1]",
        "0.0.0.0",
        "metadata.google.internal",
        "169.254.169.254",
    ];
    if BLOCKED_HOSTS.contains(&host_lower.as_str()) {
        return Err(format!("Blocked host: {}", host));
    }
    if host_lower.ends_with(".internal")
        || host_lower.ends_with(".local")
        || host_lower.ends_with(".localhost")
    {
        return Err(format!("Blocked internal hostname: {}", host));
    }

    let port = parsed.port_or_known_default().unwrap_or(443);
    if let Ok(addrs) = format!("{}:{}", host, port).to_socket_addrs() {
        for addr in addrs {
            if is_blocked_ip(addr.ip()) {
                return Err(format!(
                    "Blocked IP address {} (resolved from {})",
                    addr.ip(),
                    host
                ));
            }
        }
    } else if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(format!("Blocked IP address: {}", ip));
        }
    }

    Ok(())
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the content of a public http(s) URL"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn call(&self, args: &Value) -> anyhow::Result<Value> {
        let url = args["url"].as_str().unwrap_or_default();
        validate_url(url).map_err(|e| anyhow::anyhow!("{}", e))?;

        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(json!({
            "status": status,
            "content": truncate_str(&body, MAX_CONTENT_CHARS),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::validate_url;

    #[test]
    fn public_https_is_allowed() {
        validate_url("https://example.com/page").unwrap();
    }

    #[test]
    fn loopback_and_schemes_are_blocked() {
        assert!(validate_url("http://localhost/admin").is_err());
        assert!(validate_url("http://127.0.0.1:8080/").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("http://169.254.169.254/latest/meta-data").is_err());
    }

    #[test]
    fn internal_suffixes_are_blocked() {
        assert!(validate_url("http://db.internal/").is_err());
        assert!(validate_url("http://printer.local/").is_err());
    }
}
