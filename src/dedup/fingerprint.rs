// src/dedup/fingerprint.rs
//! Fingerprints: a stable key per story, derived from the canonical source
//! URL when it identifies an article, otherwise from a hash of the
//! normalized headline.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::types::StoryFragment;

/// Query parameters that only carry campaign/tracking state.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "mc_cid", "mc_eid", "_hsenc", "_hsmi", "mkt_tok", "cmpid", "ref_src",
];

/// Bytes of the SHA-256 digest kept for content fingerprints.
const CONTENT_HASH_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `None` when the fragment has neither a usable URL nor headline text.
    pub fn for_fragment(fragment: &StoryFragment) -> Option<Self> {
        if let Some(url) = fragment.source_url.as_deref().and_then(normalize_url) {
            return Some(Self(format!("url:{url}")));
        }
        Self::from_headline(&fragment.headline)
    }

    pub fn from_headline(headline: &str) -> Option<Self> {
        let norm = normalize_headline(headline);
        if norm.is_empty() {
            return None;
        }
        Some(Self(format!("text:{}", content_hash(&norm))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        self.0.starts_with("url:")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Canonical form of an article URL.
///
/// Lowercases scheme and host, drops a leading `www.`, the fragment, tracking
/// parameters and trailing slashes, and sorts the remaining query pairs.
/// Returns `None` for URLs that cannot identify an article: unparseable,
/// non-http(s), or a bare site root without a query.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();

    let path = parsed.path().trim_end_matches('/');

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if path.is_empty() && pairs.is_empty() {
        return None;
    }

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            ser.append_pair(k, v);
        }
        format!("?{}", ser.finish())
    };

    Some(format!("{scheme}://{host}{port}{path}{query}"))
}

/// Lowercase, decode entities, drop markup and punctuation, collapse whitespace.
pub fn normalize_headline(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    let decoded = html_escape::decode_html_entities(s);
    let decoded = re_tags.replace_all(&decoded, " ");
    let mut out = String::with_capacity(decoded.len());
    let mut last_was_space = true;
    for ch in decoded.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn content_hash(text: &str) -> String {
    use std::fmt::Write as _;
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(CONTENT_HASH_BYTES * 2);
    for b in digest.iter().take(CONTENT_HASH_BYTES) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
