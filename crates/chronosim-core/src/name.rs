//! Hierarchical names.
//!
//! A [`Name`] is an ordered list of opaque byte [`Component`]s, written in URI
//! form as `/a/b/c`. Sync prefixes, user prefixes, session names and data
//! names are all `Name`s.
//!
//! # URI form
//!
//! - Bytes outside `ALPHA / DIGIT / "-" / "." / "_" / "~"` are written as
//!   `%XX` (upper-case hex)
//! - A component made only of periods carries three extra periods, so the
//!   empty component is `...`
//! - The empty name is `/`
//! - An `ndn:` scheme prefix is accepted and ignored when parsing

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a name URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// A `%` escape was truncated or not followed by two hex digits.
    #[error("invalid percent escape in component {component:?}")]
    InvalidEscape {
        /// The offending component as written.
        component: String,
    },

    /// A component of one or two periods has no valid decoding.
    #[error("illegal component {component:?}")]
    IllegalComponent {
        /// The offending component as written.
        component: String,
    },
}

/// A single name component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component(Vec<u8>);

impl Component {
    /// Build a component from raw bytes.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Encode `number` as an NDN nonNegativeInteger (1, 2, 4 or 8 bytes,
    /// big-endian).
    pub fn from_number(number: u64) -> Self {
        let bytes = number.to_be_bytes();
        let len = if number <= u64::from(u8::MAX) {
            1
        } else if number <= u64::from(u16::MAX) {
            2
        } else if number <= u64::from(u32::MAX) {
            4
        } else {
            8
        };
        Self(bytes[8 - len..].to_vec())
    }

    /// Decode a nonNegativeInteger component. Returns `None` for any length
    /// other than 1, 2, 4 or 8 bytes.
    pub fn to_number(&self) -> Option<u64> {
        match self.0.len() {
            1 | 2 | 4 | 8 => Some(self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))),
            _ => None,
        }
    }

    /// Raw component bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse one component from its escaped URI form.
    fn from_escaped(text: &str) -> Result<Self, NameError> {
        if !text.is_empty() && text.bytes().all(|b| b == b'.') {
            if text.len() < 3 {
                return Err(NameError::IllegalComponent { component: text.to_string() });
            }
            return Ok(Self(vec![b'.'; text.len() - 3]));
        }

        let raw = text.as_bytes();
        let mut value = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'%' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok());
                let byte = hex
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| NameError::InvalidEscape { component: text.to_string() })?;
                value.push(byte);
                i += 3;
            } else {
                value.push(raw[i]);
                i += 1;
            }
        }
        Ok(Self(value))
    }
}

impl From<&str> for Component {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| *b == b'.') {
            // Covers the empty component too.
            write!(f, "...")?;
            for _ in 0..self.0.len() {
                write!(f, ".")?;
            }
            return Ok(());
        }

        for byte in &self.0 {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", char::from(*byte))?;
            } else {
                write!(f, "%{byte:02X}")?;
            }
        }
        Ok(())
    }
}

/// An ordered sequence of components.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The empty name `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a name from URI form.
    pub fn from_uri(uri: &str) -> Result<Self, NameError> {
        let path = uri.trim().strip_prefix("ndn:").unwrap_or_else(|| uri.trim());
        let components = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(Component::from_escaped)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True for the empty name.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    /// Iterate over the components.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Append one component.
    #[must_use]
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Append a nonNegativeInteger component.
    #[must_use]
    pub fn append_number(self, number: u64) -> Self {
        self.append(Component::from_number(number))
    }

    /// `self` followed by every component of `suffix`.
    ///
    /// This is how a routable user prefix is derived: routing prefix first,
    /// user prefix second.
    #[must_use]
    pub fn concat(&self, suffix: &Self) -> Self {
        let mut components = Vec::with_capacity(self.len() + suffix.len());
        components.extend_from_slice(&self.components);
        components.extend_from_slice(&suffix.components);
        Self { components }
    }

    /// True if every component of `self` matches the start of `other`.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.components.starts_with(&self.components)
    }

    /// The name without its last component.
    #[must_use]
    pub fn parent(&self) -> Self {
        let keep = self.components.len().saturating_sub(1);
        Self { components: self.components[..keep].to_vec() }
    }

    /// The last component, if any.
    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

impl FromIterator<Component> for Name {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self { components: iter.into_iter().collect() }
    }
}
