use std::{io, num::ParseIntError};

use quick_xml::events::attributes::AttrError;
use rust_decimal::Error as DecimalError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::watch::error::RecvError;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DtsError {
    /// Illegal XLink attribute combination or nesting. Fails the containing document.
    #[error("XLink syntax error: {0}")]
    LinkSyntax(String),
    /// Structurally invalid XML or a rejected attribute value. Fails the containing document.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A locator target could not be found in the store.
    #[error("Resolution error: {0}")]
    Resolution(String),
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl DtsError {
    /// True for errors that abandon the document being parsed.
    pub fn is_document_fatal(&self) -> bool {
        matches!(
            self,
            DtsError::LinkSyntax(_)
                | DtsError::Validation(_)
                | DtsError::Io(_)
                | DtsError::NotFound(_)
                | DtsError::InvalidUri(_)
        )
    }
}

impl From<toml::de::Error> for DtsError {
    fn from(src: toml::de::Error) -> DtsError {
        DtsError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for DtsError {
    fn from(src: toml::ser::Error) -> DtsError {
        DtsError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for DtsError {
    fn from(src: JsonError) -> DtsError {
        DtsError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for DtsError {
    fn from(src: UrlParseError) -> DtsError {
        DtsError::InvalidUri(format!("{src}"))
    }
}

impl From<io::Error> for DtsError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => DtsError::NotFound(format!("{x}")),
            _ => DtsError::Io(format!("IOError ({}): {x}", x.kind())),
        }
    }
}

impl From<quick_xml::Error> for DtsError {
    fn from(x: quick_xml::Error) -> Self {
        DtsError::Validation(format!("Malformed XML: {x}"))
    }
}

impl From<AttrError> for DtsError {
    fn from(x: AttrError) -> Self {
        DtsError::Validation(format!("Malformed XML attribute: {x}"))
    }
}

impl From<DecimalError> for DtsError {
    fn from(x: DecimalError) -> Self {
        DtsError::Validation(format!("Invalid decimal value: {x}"))
    }
}

impl From<ParseIntError> for DtsError {
    fn from(x: ParseIntError) -> Self {
        DtsError::Validation(format!("Invalid integer value: {x}"))
    }
}

impl From<RecvError> for DtsError {
    fn from(x: RecvError) -> Self {
        DtsError::Store(format!("Loader monitor closed: {x}"))
    }
}
