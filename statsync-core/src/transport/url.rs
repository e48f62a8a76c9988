/// Builds an HTTP URL for `path`, converting a ws(s) base if needed.
pub fn http_url(server_url: &str, path: &str) -> String {
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

/// Builds a WebSocket URL for `path`, converting an http(s) base if needed.
pub fn ws_url(server_url: &str, path: &str) -> String {
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url() {
        assert_eq!(
            http_url("http://localhost:8080", "/stats"),
            "http://localhost:8080/stats"
        );
        assert_eq!(
            http_url("ws://localhost:8080/", "/stats"),
            "http://localhost:8080/stats"
        );
        assert_eq!(
            http_url("wss://api.example.com", "/stats/u1"),
            "https://api.example.com/stats/u1"
        );
        assert_eq!(http_url("localhost:8080", "/stats"), "http://localhost:8080/stats");
    }

    #[test]
    fn test_ws_url() {
        assert_eq!(
            ws_url("http://localhost:8080", "/realtime"),
            "ws://localhost:8080/realtime"
        );
        assert_eq!(
            ws_url("https://api.example.com/", "/realtime"),
            "wss://api.example.com/realtime"
        );
        assert_eq!(
            ws_url("wss://api.example.com", "/realtime"),
            "wss://api.example.com/realtime"
        );
        assert_eq!(ws_url("localhost:8080", "/realtime"), "ws://localhost:8080/realtime");
    }
}
