//! Document URI normalization and identity.
//!
//! Every URI that enters the crawler frontier is absolute, hierarchical and free of query,
//! fragment and user information. Document ids are derived from that normalized form so that
//! independent crawlers sharing a store compute identical fragment indices.

use url::Url;
use uuid::Uuid;

use crate::error::DtsError;

/// Normalize a document location. Opaque URIs (`mailto:`, `urn:`, ...) are rejected.
pub fn normalize_document_uri(uri: &Url) -> Result<Url, DtsError> {
    if uri.cannot_be_a_base() {
        return Err(DtsError::InvalidUri(format!(
            "{uri} is opaque and cannot identify a document"
        )));
    }
    let mut normalized = uri.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    if !normalized.username().is_empty() || normalized.password().is_some() {
        normalized
            .set_username("")
            .and_then(|_| normalized.set_password(None))
            .map_err(|_| DtsError::InvalidUri(format!("{uri}: user information cannot be removed")))?;
    }
    Ok(normalized)
}

/// Parse and normalize a document location given as text.
pub fn parse_document_uri(text: &str) -> Result<Url, DtsError> {
    let uri = Url::parse(text.trim())
        .map_err(|e| DtsError::InvalidUri(format!("'{text}' is not an absolute URI: {e}")))?;
    normalize_document_uri(&uri)
}

/// Split a resolved href into its normalized document URI and its pointer.
pub fn split_href(href: &Url) -> Result<(Url, String), DtsError> {
    let pointer = href.fragment().unwrap_or_default().to_string();
    Ok((normalize_document_uri(href)?, pointer))
}

/// The deterministic document id used as the prefix of every fragment index.
pub fn document_id(uri: &Url) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, uri.as_str().as_bytes())
        .simple()
        .to_string()
}

/// True if `value` parses as an absolute URI.
pub fn is_absolute_uri(value: &str) -> bool {
    Url::parse(value).is_ok()
}
