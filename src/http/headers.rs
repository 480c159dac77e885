//! Header storage shared by requests and responses.
//!
//! Headers live in one ordered list of `(name, value)` pairs. A static table
//! maps well-known header names to a [`HeaderCategory`], which only decides
//! the order headers are emitted in; it never changes where a value is kept.

use std::fmt;

/// Semantic grouping of well-known header names.
///
/// Declaration order is the serialization order used by
/// [`HeaderTable::get_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderCategory {
    Authentication,
    Caching,
    Conditionals,
    ConnectionManagement,
    ContentNegotiation,
    Controls,
    Cookies,
    Cors,
    Downloads,
    IntegrityDigests,
    MessageBody,
    Proxies,
    RangeRequests,
    Redirects,
    RequestContext,
    ResponseContext,
    Security,
    FetchMetadata,
    ServerSentEvents,
    TransferCoding,
    WebSockets,
    /// Anything not in the known-name table.
    Other,
}

impl HeaderCategory {
    /// Looks up the category of a header name. Matching is case-sensitive,
    /// so `content-type` lands in [`HeaderCategory::Other`].
    pub fn of(name: &str) -> Self {
        use HeaderCategory::*;

        match name {
            "WWW-Authenticate" | "Authorization" | "Proxy-Authenticate"
            | "Proxy-Authorization" => Authentication,

            "Age" | "Cache-Control" | "Clear-Site-Data" | "Expires" | "No-Vary-Search" => Caching,

            "Last-Modified" | "ETag" | "If-Match" | "If-None-Match" | "If-Modified-Since"
            | "If-Unmodified-Since" | "Vary" => Conditionals,

            "Connection" | "Keep-Alive" => ConnectionManagement,

            "Accept" | "Accept-Encoding" | "Accept-Language" | "Accept-Patch" | "Accept-Post" => {
                ContentNegotiation
            }

            "Expect" | "Max-Forwards" => Controls,

            "Cookie" | "Set-Cookie" => Cookies,

            "Access-Control-Allow-Credentials"
            | "Access-Control-Allow-Headers"
            | "Access-Control-Allow-Methods"
            | "Access-Control-Allow-Origin"
            | "Access-Control-Expose-Headers"
            | "Access-Control-Max-Age"
            | "Access-Control-Request-Headers"
            | "Access-Control-Request-Method"
            | "Origin"
            | "Timing-Allow-Origin" => Cors,

            "Content-Disposition" => Downloads,

            "Content-Digest" | "Repr-Digest" | "Want-Content-Digest" | "Want-Repr-Digest" => {
                IntegrityDigests
            }

            "Content-Length" | "Content-Type" | "Content-Encoding" | "Content-Language"
            | "Content-Location" => MessageBody,

            "Forwarded" | "Via" => Proxies,

            "Accept-Ranges" | "Range" | "If-Range" | "Content-Range" => RangeRequests,

            "Location" | "Refresh" => Redirects,

            "From" | "Host" | "Referer" | "Referrer-Policy" | "User-Agent" => RequestContext,

            "Allow" | "Server" | "Date" => ResponseContext,

            "Cross-Origin-Embedder-Policy"
            | "Cross-Origin-Opener-Policy"
            | "Cross-Origin-Resource-Policy"
            | "Content-Security-Policy"
            | "Content-Security-Policy-Report-Only"
            | "Permissions-Policy"
            | "Reporting-Endpoints"
            | "Strict-Transport-Security"
            | "Upgrade-Insecure-Requests"
            | "X-Content-Type-Options"
            | "X-Frame-Options"
            | "X-Permitted-Cross-Domain-Policies"
            | "X-Powered-By"
            | "X-XSS-Protection" => Security,

            "Sec-Fetch-Site" | "Sec-Fetch-Mode" | "Sec-Fetch-User" | "Sec-Fetch-Dest"
            | "Sec-Purpose" | "Service-Worker-Navigation-Preload" => FetchMetadata,

            "Report-To" => ServerSentEvents,

            "Transfer-Encoding" | "TE" | "Trailer" => TransferCoding,

            "Sec-WebSocket-Accept" => WebSockets,

            _ => Other,
        }
    }

    /// Whether this name appears in the known-name table.
    pub fn is_known(self) -> bool {
        self != HeaderCategory::Other
    }
}

/// Ordered header map with last-write-wins semantics.
///
/// A name is stored at most once. Overwriting a name keeps the slot where it
/// was first inserted, so serialization order is stable across updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored for `name`, or `None` if it was never set.
    ///
    /// An explicitly empty header comes back as `Some("")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Stores `value` under `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Removes `name`, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category the table files `name` under.
    pub fn category(&self, name: &str) -> HeaderCategory {
        HeaderCategory::of(name)
    }

    /// Every stored header, grouped by category and in insertion order within
    /// each category. This is the order headers are written to the wire.
    pub fn get_all(&self) -> Vec<(&str, &str)> {
        let mut all: Vec<(HeaderCategory, &str, &str)> = self
            .entries
            .iter()
            .map(|(name, value)| (HeaderCategory::of(name), name.as_str(), value.as_str()))
            .collect();

        // sort_by_key is stable, insertion order survives inside a category
        all.sort_by_key(|(category, _, _)| *category);

        all.into_iter().map(|(_, name, value)| (name, value)).collect()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = HeaderTable::new();
        for (name, value) in iter {
            table.set(name, value);
        }
        table
    }
}

impl fmt::Display for HeaderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.get_all() {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}
