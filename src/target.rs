//! Target descriptors parsed from configured URLs.
//!
//! A target URL carries more than a destination. Its query parameters are
//! override directives (`Method`, `Host`, or any header name) and a
//! fragment marker switches it to fixed-path mode, where the inbound
//! request path is ignored. Position 0 in the target list is the primary.

use url::Url;

const METHOD_KEY: &str = "Method";
const HOST_KEY: &str = "Host";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    fixed_path: bool,
    method: Option<String>,
    host: Option<String>,
    headers: Vec<(String, String)>,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw).map(Self::from_url)
    }

    #[must_use]
    pub fn from_url(url: Url) -> Self {
        let mut method = None;
        let mut host = None;
        let mut headers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                METHOD_KEY => {
                    if method.is_none() {
                        method = Some(value.into_owned());
                    }
                }
                HOST_KEY => host = Some(value.into_owned()),
                _ => headers.push((key.into_owned(), value.into_owned())),
            }
        }

        Self {
            fixed_path: url.fragment().is_some(),
            url,
            method,
            host,
            headers,
        }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// `host[:port]`, omitting the port when it is the scheme default.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        self.url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"))
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        self.url.path()
    }

    /// True when the URL carries a fragment marker (`#...`).
    #[must_use]
    pub const fn is_fixed_path(&self) -> bool {
        self.fixed_path
    }

    #[must_use]
    pub fn method_override(&self) -> Option<&str> {
        self.method.as_deref()
    }

    #[must_use]
    pub fn host_override(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Header overrides in URL order; a later entry for the same name wins.
    #[must_use]
    pub fn header_overrides(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.url, f)
    }
}
