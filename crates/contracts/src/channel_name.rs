//! ChannelName - key of a time-stamp channel.
//!
//! Names arrive from configuration records and are shared between the
//! registry map, the channel itself and every log line, so the text lives
//! behind an `Arc<str>`. [`ChannelName::parse`] is the single gate for
//! names coming from outside: the config validator and the registry both
//! go through it.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ContractError;

/// Name the configuration layer writes before the real one is known
pub const PLACEHOLDER_CHANNEL_NAME: &str = "Unknown";

/// Channel key, compared and hashed exactly like the underlying `str`.
///
/// ```
/// use contracts::ChannelName;
///
/// let name = ChannelName::parse("  GIGE:CAM1 ").unwrap();
/// assert_eq!(name, "GIGE:CAM1");
/// assert!(ChannelName::parse("Unknown").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    /// Trim `raw` and reject blank or placeholder names.
    ///
    /// # Errors
    /// [`ContractError::ChannelNameUnavailable`]
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let name = raw.trim();
        if name.is_empty() || name == PLACEHOLDER_CHANNEL_NAME {
            return Err(ContractError::ChannelNameUnavailable {
                name: name.to_string(),
            });
        }
        Ok(Self::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ChannelName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `HashMap<ChannelName, _>` be queried with `&str`
impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for ChannelName {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl PartialEq<str> for ChannelName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ChannelName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelName({:?})", &*self.0)
    }
}

impl Serialize for ChannelName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChannelName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}
