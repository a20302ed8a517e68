//! Canonicalization of raw user input into scheme-qualified server URLs.

/// Turn whatever the user typed into a scheme-qualified server URL.
///
/// Total and idempotent: input that already carries an HTTP scheme passes
/// through unchanged, `localhost:<port>` gets plain `http://`, and everything
/// else is assumed to be a TLS host. Callers are expected to reject empty
/// input before calling.
pub fn normalize_server_url(input: &str) -> String {
    if input.starts_with("http://") || input.starts_with("https://") {
        return input.to_string();
    }
    if input.contains("localhost:") {
        return format!("http://{input}");
    }
    format!("https://{input}")
}
