use url::Url;

use crate::error::SessionError;

const DEFAULT_PATH: &str = "/socket.io/";
const TRANSPORT_QUERY: &str = "EIO=4&transport=websocket";

/// Turns a server URL such as `http://localhost:5090` into the WebSocket URL
/// the Engine.IO transport is served on.
pub fn resolve(endpoint: &str) -> Result<Url, SessionError> {
    let invalid = |reason: String| SessionError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to '{scheme}'")))?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_PATH);
    }

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{TRANSPORT_QUERY}"),
        _ => TRANSPORT_QUERY.to_string(),
    };
    url.set_query(Some(&query));

    Ok(url)
}
