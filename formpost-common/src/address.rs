use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Unable to parse address {0:?}: {1}")]
    Parse(String, String),

    #[error("Expected exactly one mailbox in {0:?}")]
    NotSingle(String),

    #[error("Address {0:?} has no domain part")]
    MissingDomain(String),
}

/// A single validated mailbox, optionally with a display name
///
/// Serialized as its display form (`Jo Bloggs <jo@example.com>`), so
/// configuration files can write addresses as plain strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    pub display_name: Option<String>,
    pub addr: String,
}

impl Address {
    /// Parse `user@example.com` or `Name <user@example.com>`.
    ///
    /// Group syntax and lists are rejected; this is meant for a single form
    /// field or a single configured recipient.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        let list = mailparse::addrparse(trimmed)
            .map_err(|e| AddressError::Parse(trimmed.to_string(), e.to_string()))?;

        let [mailparse::MailAddr::Single(single)] = list.as_slice() else {
            return Err(AddressError::NotSingle(trimmed.to_string()));
        };

        match single.addr.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self {
                display_name: single.display_name.clone(),
                addr: single.addr.clone(),
            }),
            _ => Err(AddressError::MissingDomain(trimmed.to_string())),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) if name.contains(|c: char| SPECIALS.contains(&c)) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.addr)
            }
            Some(name) => write!(f, "{name} <{}>", self.addr),
            None => f.write_str(&self.addr),
        }
    }
}

// Characters that force a display name to be quoted (RFC 5322 specials)
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}
