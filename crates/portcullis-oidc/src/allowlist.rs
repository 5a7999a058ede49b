//! Return URL allow-list.

use url::Url;

/// Permitted post-login destinations.
///
/// A URL is allowed when some entry has the same scheme, host and port and
/// the entry's path is a segment-wise prefix of the URL's path.
#[derive(Debug, Clone, Default)]
pub struct ReturnAllowList {
    prefixes: Vec<Url>,
}

impl ReturnAllowList {
    /// Creates an allow-list from URL prefixes.
    #[must_use]
    pub fn new(prefixes: Vec<Url>) -> Self {
        Self { prefixes }
    }

    /// Checks a URL against the list.
    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        self.prefixes.iter().any(|prefix| {
            prefix.scheme() == url.scheme()
                && prefix.host_str() == url.host_str()
                && prefix.port_or_known_default() == url.port_or_known_default()
                && path_has_prefix(url.path(), prefix.path())
        })
    }

    /// Returns `url` if allowed, otherwise `fallback`.
    #[must_use]
    pub fn resolve(&self, url: Url, fallback: &Url) -> Url {
        if self.allows(&url) {
            url
        } else {
            tracing::debug!(rejected = %url, "return URL not allow-listed, using default");
            fallback.clone()
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix) || path == prefix.trim_end_matches('/');
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
