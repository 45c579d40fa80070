//! Stable `(source, uid)` identity used as the permanent accumulation key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Separator between source id and feed UID in the textual form.
pub const IDENTITY_SEPARATOR: &str = "::";

/// Identity of a definition: the source it came from plus the UID that source gave it.
///
/// UIDs are only unique within a source, so the pair is the key. The textual
/// form is `source::uid`; source ids must not contain `::`, UIDs may.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    source_id: String,
    uid: String,
}

impl Identity {
    pub fn new(source_id: impl Into<String>, uid: impl Into<String>) -> Self {
        Identity {
            source_id: source_id.into(),
            uid: uid.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.source_id, IDENTITY_SEPARATOR, self.uid)
    }
}

impl FromStr for Identity {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(IDENTITY_SEPARATOR) {
            Some((source, uid)) if !source.is_empty() && !uid.is_empty() => {
                Ok(Identity::new(source, uid))
            }
            _ => Err(ArchiveError::Config(format!(
                "Invalid event identity '{}'. Expected <source>::<uid>",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Identity {
    type Error = ArchiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}
