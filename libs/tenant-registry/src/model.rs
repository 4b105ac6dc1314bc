//! Core identifiers shared by every registry component.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A tenant scope: a small non-negative integer owning at most one cached
/// service record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(u32);

impl TenantId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for TenantId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of the external component backing a tenant's service.
///
/// The `package` part names the owning package tracked by the package
/// lifecycle feed; `name` addresses the concrete component inside it.
/// The canonical textual form is `package/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId {
    pub package: String,
    pub name: String,
}

impl ComponentId {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComponentIdParseError {
    #[error("component id `{input}` is missing the `package/name` separator")]
    MissingSeparator { input: String },

    #[error("component id `{input}` has an empty package or name part")]
    EmptyPart { input: String },
}

impl FromStr for ComponentId {
    type Err = ComponentIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((package, name)) = s.split_once('/') else {
            return Err(ComponentIdParseError::MissingSeparator {
                input: s.to_owned(),
            });
        };
        if package.is_empty() || name.is_empty() {
            return Err(ComponentIdParseError::EmptyPart {
                input: s.to_owned(),
            });
        }
        Ok(Self::new(package, name))
    }
}
