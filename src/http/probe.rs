//! Size probe
//!
//! A HEAD request tells the controller how large the resource is and
//! whether the server honours byte ranges.

use crate::error::{EngineError, NetworkErrorKind, Result};
use reqwest::Client;

/// Server capabilities determined from a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    /// Content-Length header value
    pub content_length: Option<u64>,
    /// Whether server supports Range requests
    pub supports_range: bool,
}

impl ServerCapabilities {
    /// Total size in bytes, 0 when the server did not say
    pub fn total_size(&self) -> u64 {
        self.content_length.unwrap_or(0)
    }
}

/// Probe server capabilities with a HEAD request
pub async fn probe_server(
    client: &Client,
    url: &str,
    user_agent: &str,
) -> Result<ServerCapabilities> {
    let response = client
        .head(url)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|e| {
            let err = EngineError::from(e);
            match err {
                EngineError::Network { kind, message } => EngineError::probe_failed(
                    kind,
                    format!("HEAD request failed: {}", message),
                ),
                other => EngineError::probe_failed(NetworkErrorKind::Other, other.to_string()),
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::probe_failed(
            NetworkErrorKind::HttpStatus(status.as_u16()),
            format!("HEAD request returned: {}", status),
        ));
    }

    let headers = response.headers();

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());

    let supports_range = headers
        .get("accept-ranges")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("bytes"))
        .unwrap_or(false);

    tracing::debug!(
        "Probed {}: length={:?} ranges={}",
        url,
        content_length,
        supports_range
    );

    Ok(ServerCapabilities {
        content_length,
        supports_range,
    })
}

/// Extract filename from URL path
pub fn extract_filename_from_url(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.to_string())
                .unwrap_or_else(|_| s.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_size_defaults_to_zero() {
        let caps = ServerCapabilities::default();
        assert_eq!(caps.total_size(), 0);

        let caps = ServerCapabilities {
            content_length: Some(1234),
            supports_range: true,
        };
        assert_eq!(caps.total_size(), 1234);
    }

    #[test]
    fn test_extract_filename_from_url() {
        assert_eq!(
            extract_filename_from_url("https://example.com/path/to/file.zip"),
            Some("file.zip".to_string())
        );

        assert_eq!(
            extract_filename_from_url("https://example.com/path/to/file%20name.zip"),
            Some("file name.zip".to_string())
        );

        assert_eq!(extract_filename_from_url("https://example.com/"), None);
    }
}
