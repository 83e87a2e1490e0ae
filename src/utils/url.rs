//! URL utilities for access-point address handling
//!
//! The management console publishes MCP access points under a `/mcp/` path
//! with an `http(s)` or `ws(s)` scheme; the discovery socket answers on the
//! sibling `/call/` path over WebSocket. These helpers keep that rewriting
//! in one place.

/// Normalize an address scheme to its WebSocket equivalent
///
/// `http`/`https` become `ws`/`wss`; addresses already carrying a WebSocket
/// scheme pass through untouched.
///
/// # Examples
///
/// ```
/// use mcp_broker::utils::url::normalize_ws_scheme;
///
/// assert_eq!(normalize_ws_scheme("https://host/call/"), "wss://host/call/");
/// assert_eq!(normalize_ws_scheme("http://host/call/"), "ws://host/call/");
/// assert_eq!(normalize_ws_scheme("wss://host/call/"), "wss://host/call/");
/// ```
pub fn normalize_ws_scheme(address: &str) -> String {
    if let Some(rest) = address.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = address.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        address.to_string()
    }
}

/// Resolve the call address for a published access-point address
///
/// Rewrites the first `/mcp/` path segment to `/call/` and normalizes the
/// scheme, so callers can pass the address exactly as the console hands it
/// out. Addresses already pointing at `/call/` are only scheme-normalized.
///
/// # Examples
///
/// ```
/// use mcp_broker::utils::url::call_address;
///
/// assert_eq!(
///     call_address("wss://host/xz/mcp/?token=abc"),
///     "wss://host/xz/call/?token=abc"
/// );
/// assert_eq!(
///     call_address("https://host/xz/call/?token=abc"),
///     "wss://host/xz/call/?token=abc"
/// );
/// ```
pub fn call_address(access_address: &str) -> String {
    let rewritten = access_address.replacen("/mcp/", "/call/", 1);
    normalize_ws_scheme(&rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_normalization_covers_http_variants() {
        assert_eq!(normalize_ws_scheme("https://a.example/x"), "wss://a.example/x");
        assert_eq!(normalize_ws_scheme("http://a.example/x"), "ws://a.example/x");
        assert_eq!(normalize_ws_scheme("ws://a.example/x"), "ws://a.example/x");
        assert_eq!(normalize_ws_scheme("wss://a.example/x"), "wss://a.example/x");
    }

    #[test]
    fn call_address_rewrites_only_the_first_mcp_segment() {
        assert_eq!(
            call_address("ws://host/xz/mcp/?token=mcp%2Fvalue"),
            "ws://host/xz/call/?token=mcp%2Fvalue"
        );
    }

    #[test]
    fn call_address_keeps_token_query_intact() {
        let resolved = call_address("https://host:8004/xz/mcp/?token=a%3Db%26c");
        assert_eq!(resolved, "wss://host:8004/xz/call/?token=a%3Db%26c");
    }

    #[test]
    fn call_address_passes_call_form_through() {
        assert_eq!(
            call_address("wss://host/xz/call/?token=abc"),
            "wss://host/xz/call/?token=abc"
        );
    }
}
