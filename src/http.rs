//! Shared helpers for the HTTP backends (remote STT, remote TTS, Ollama)

/// Check a configured base URL and return it without a trailing slash.
pub fn normalize_endpoint(endpoint: &str) -> Result<String, String> {
    let endpoint = endpoint.trim();
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(format!(
            "endpoint must start with http:// or https://, got: {}",
            endpoint
        ));
    }

    if endpoint.starts_with("http://") && !is_loopback(endpoint) {
        tracing::warn!(
            "Endpoint {} uses HTTP without TLS. Data will be transmitted unencrypted!",
            endpoint
        );
    }

    Ok(endpoint.trim_end_matches('/').to_string())
}

fn is_loopback(endpoint: &str) -> bool {
    endpoint.contains("localhost") || endpoint.contains("127.0.0.1") || endpoint.contains("[::1]")
}

/// A failed HTTP request, split by whether the server answered
#[derive(Debug)]
pub enum RequestFailure {
    /// Server responded with an error status
    Status(String),
    /// Connection, DNS, TLS or timeout failure
    Transport(String),
}

impl From<ureq::Error> for RequestFailure {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                RequestFailure::Status(format!("Server returned {}: {}", code, body.trim()))
            }
            ureq::Error::Transport(t) => RequestFailure::Transport(format!("Request failed: {}", t)),
        }
    }
}
