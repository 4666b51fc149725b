//! Server URL normalisation.
//!
//! The configured server may be given as a bare host, an `http(s)://` URL or
//! a `ws(s)://` URL. HTTP calls and the realtime socket each need their own
//! scheme.

/// Builds an HTTP URL for `path` on `server_url`.
pub fn build_http_url(server_url: &str, path: &str) -> String {
    let base_url = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Builds the WebSocket URL for `path`, authenticated with `api_key`.
pub fn build_ws_url(server_url: &str, path: &str, api_key: &str) -> String {
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}?key={}", base_url.trim_end_matches('/'), path, api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_url() {
        assert_eq!(
            build_http_url("http://localhost:8080", "/me"),
            "http://localhost:8080/me"
        );
        assert_eq!(
            build_http_url("ws://localhost:8080", "/me"),
            "http://localhost:8080/me"
        );
        assert_eq!(
            build_http_url("https://muster.example.org/", "/api/users"),
            "https://muster.example.org/api/users"
        );
        assert_eq!(
            build_http_url("wss://muster.example.org", "/health"),
            "https://muster.example.org/health"
        );
        assert_eq!(
            build_http_url("localhost:8080", "/me"),
            "http://localhost:8080/me"
        );
    }

    #[test]
    fn test_build_ws_url() {
        assert_eq!(
            build_ws_url("ws://localhost:8080", "/realtime", "k"),
            "ws://localhost:8080/realtime?key=k"
        );
        assert_eq!(
            build_ws_url("http://localhost:8080/", "/realtime", "k"),
            "ws://localhost:8080/realtime?key=k"
        );
        assert_eq!(
            build_ws_url("https://muster.example.org", "/realtime", "k"),
            "wss://muster.example.org/realtime?key=k"
        );
        assert_eq!(
            build_ws_url("localhost:8080", "/realtime", "k"),
            "ws://localhost:8080/realtime?key=k"
        );
    }
}
