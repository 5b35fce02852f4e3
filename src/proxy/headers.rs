//! Header merge, transport-header stripping, and target overrides.
//!
//! [`merge_headers`] is the one merge rule used in both directions: inbound
//! headers onto an outbound request, and the primary's response headers
//! onto the caller's response. A name present in the source replaces every
//! value the target held for it.

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use hyper::header::HOST;

use crate::target::Target;

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "proxy-connection",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Overwrite `target` with every header named in `source`, keeping the rest.
///
/// Names compare case-insensitively. All of the source's values for a name
/// replace the target's values; nothing is appended to existing entries.
pub fn merge_headers<'a>(target: &'a mut HeaderMap, source: &HeaderMap) -> &'a mut HeaderMap {
    for name in source.keys() {
        let mut values = source.get_all(name).iter();
        if let Some(first) = values.next() {
            target.insert(name.clone(), first.clone());
        }
        for value in values {
            target.append(name.clone(), value.clone());
        }
    }
    target
}

/// Remove connection-scoped headers the HTTP stack re-derives per hop.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Outbound variant: also drops `host` and `content-length`, which are set
/// from the destination URI and the buffered body respectively.
pub fn strip_outbound_transport(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(HOST);
    headers.remove(hyper::header::CONTENT_LENGTH);
}

/// Apply a target's `Host` and header-override directives.
pub fn apply_overrides(headers: &mut HeaderMap, target: &Target) -> Result<(), http::Error> {
    for (key, value) in target.header_overrides() {
        let name = HeaderName::from_bytes(key.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        headers.insert(name, value);
    }

    if let Some(host) = target.host_override() {
        headers.insert(HOST, HeaderValue::from_str(host)?);
    }

    Ok(())
}
