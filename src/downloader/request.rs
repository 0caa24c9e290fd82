use crate::error::CacheError;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;

/// A default, descriptive User-Agent, matching the pattern of announcing the crate name and
/// version so remote servers can identify well-behaved clients.
fn default_user_agent() -> String {
    format!(
        "pixelcache/{} (+https://docs.rs/pixelcache)",
        env!("CARGO_PKG_VERSION")
    )
}

fn build_headers(extra: &HashMap<String, String>) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(&default_user_agent())?,
    );
    for (k, v) in extra {
        let name = HeaderName::try_from(k.as_str())?;
        let value = HeaderValue::from_str(v)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Stream a GET request, invoking `on_progress(received, total)` as chunks arrive. `total` is
/// `None` when the server didn't send `Content-Length`.
pub async fn stream_get(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    headers: &HashMap<String, String>,
    mut on_progress: impl FnMut(u64, Option<u64>),
) -> Result<Vec<u8>, CacheError> {
    let header_map = build_headers(headers).map_err(|e| CacheError::Unknown(e.to_string()))?;

    tracing::debug!(url, "fetching remote image");

    let resp = client
        .get(url)
        .headers(header_map)
        .timeout(timeout)
        .send()
        .await
        .map_err(CacheError::from_reqwest)?;

    if !resp.status().is_success() {
        return Err(CacheError::InvalidResponse {
            status: resp.status().as_u16() as i32,
        });
    }

    let total = resp.content_length();
    let mut received: u64 = 0;
    let mut buf = Vec::with_capacity(total.unwrap_or(0) as usize);

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CacheError::from_reqwest)?;
        received += chunk.len() as u64;
        buf.extend_from_slice(&chunk);
        on_progress(received, total);
    }

    Ok(buf)
}
