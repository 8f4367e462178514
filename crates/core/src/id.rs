// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes and run-id validation

use thiserror::Error;

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Errors from identifier validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("run id is empty")]
    Empty,
    #[error("run id contains invalid character {0:?}")]
    InvalidChar(char),
    #[error("run id contains a path traversal sequence")]
    Traversal,
    #[error("run id starts with a dot")]
    LeadingDot,
}

define_id! {
    /// Identifier of one pipeline run.
    ///
    /// Format: `{pipeline}-{YYYYMMDD}-{HHMMSS}-{xxxx}`. Run ids name
    /// filesystem entries (workspaces, pidfiles), so construction from
    /// untrusted input must go through [`RunId::validate`].
    pub struct RunId;
}

define_id! {
    /// Identifier of a step within a pipeline definition.
    pub struct StepId;
}

impl RunId {
    /// Validate that an id is safe to embed in filesystem paths.
    ///
    /// Accepts `[A-Za-z0-9._-]+`; rejects empty ids, `..` sequences,
    /// and leading dots. Path separators fail the charset check.
    pub fn validate(id: &str) -> Result<(), IdError> {
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.starts_with('.') {
            return Err(IdError::LeadingDot);
        }
        if id.contains("..") {
            return Err(IdError::Traversal);
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(IdError::InvalidChar(c));
        }
        Ok(())
    }

    /// Validate and wrap an externally supplied id.
    pub fn parse(id: &str) -> Result<Self, IdError> {
        Self::validate(id)?;
        Ok(Self::new(id))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
