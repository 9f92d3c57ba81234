//! `Sec-WebSocket-Extensions` header values (RFC 6455 Section 9.1).
//!
//! Only permessage-deflate is implemented, see [`deflate`]. This module
//! parses and renders the header grammar:
//! `name; param1=value1; param2, other-extension`.

pub mod deflate;

use std::fmt;

use crate::error::{Error, Result};

/// Registered name of the compression extension (RFC 7692).
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// A single extension parameter, `name` or `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    pub name: String,
    /// `None` for flag parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse `param=value` or `param`. Quoted values are unquoted.
    pub fn parse(s: &str) -> Self {
        match s.trim().split_once('=') {
            Some((name, value)) => Self::new(name.trim(), value.trim().trim_matches('"')),
            None => Self::flag(s.trim()),
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One extension with its parameters, as offered by a client or accepted by
/// a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    pub name: String,
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// The offer this crate sends and accepts: permessage-deflate without
    /// context takeover in either direction.
    #[must_use]
    pub fn deflate_no_context_takeover() -> Self {
        Self {
            name: PERMESSAGE_DEFLATE.to_string(),
            params: vec![
                ExtensionParam::flag("server_no_context_takeover"),
                ExtensionParam::flag("client_no_context_takeover"),
            ],
        }
    }

    /// Parse `extension-name; param1=value1; param2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if the extension name is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(Error::InvalidExtension("empty extension name".into()));
        }

        Ok(Self {
            name: name.to_string(),
            params: parts
                .filter(|p| !p.trim().is_empty())
                .map(ExtensionParam::parse)
                .collect(),
        })
    }

    /// Parse a comma-separated header value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if any element is invalid.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    #[must_use]
    pub fn is_deflate(&self) -> bool {
        self.name.eq_ignore_ascii_case(PERMESSAGE_DEFLATE)
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, "; {param}")?;
        }
        Ok(())
    }
}

/// `true` when any of the header values offers permessage-deflate.
///
/// Malformed values are skipped rather than rejected.
pub fn offers_deflate<'a>(values: impl IntoIterator<Item = &'a str>) -> bool {
    values
        .into_iter()
        .filter_map(|v| ExtensionOffer::parse_header(v).ok())
        .flatten()
        .any(|offer| offer.is_deflate())
}
