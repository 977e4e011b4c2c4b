use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use url::Url;

/// Why a URI left the frontier without being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Another crawler holds the claim.
    ClaimDenied,
    /// The store already contains the document.
    AlreadyPresent,
}

/// Progress notifications emitted by a [crate::codec::DiscoveryCrawler] when it is given a
/// sender. Consumers are free to drop the receiver; send failures are logged, not raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DtsEvent {
    DocumentClaimed(Url),
    /// Document, number of fragments persisted
    DocumentParsed(Url, usize),
    DocumentSkipped(Url, SkipReason),
    /// Document, failure reason
    DocumentFailed(Url, String),
    /// Document, number of relationships persisted
    RelationshipsStored(Url, usize),
    /// Explored, pending, failed counts
    CrawlFinished(usize, usize, usize),
}

impl DtsEvent {
    pub fn document(&self) -> Option<&Url> {
        match self {
            DtsEvent::DocumentClaimed(uri)
            | DtsEvent::DocumentParsed(uri, _)
            | DtsEvent::DocumentSkipped(uri, _)
            | DtsEvent::DocumentFailed(uri, _)
            | DtsEvent::RelationshipsStored(uri, _) => Some(uri),
            DtsEvent::CrawlFinished(..) => None,
        }
    }
}

impl Display for DtsEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DtsEvent::DocumentClaimed(uri) => write!(f, "DocumentClaimed({uri})"),
            DtsEvent::DocumentParsed(uri, n) => write!(f, "DocumentParsed({uri}, {n} fragments)"),
            DtsEvent::DocumentSkipped(uri, reason) => {
                write!(f, "DocumentSkipped({uri}, {reason:?})")
            }
            DtsEvent::DocumentFailed(uri, reason) => write!(f, "DocumentFailed({uri}): {reason}"),
            DtsEvent::RelationshipsStored(uri, n) => {
                write!(f, "RelationshipsStored({uri}, {n})")
            }
            DtsEvent::CrawlFinished(explored, pending, failed) => write!(
                f,
                "CrawlFinished(explored: {explored}, pending: {pending}, failed: {failed})"
            ),
        }
    }
}
