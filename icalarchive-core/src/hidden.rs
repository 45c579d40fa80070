//! Manual hide marks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// The set of identities a user has hidden by hand.
///
/// A mark applies to every instance of the identity and survives re-fetches.
/// Persisted as `{"hidden": ["source::uid", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenMarks {
    #[serde(default)]
    hidden: BTreeSet<Identity>,
}

impl HiddenMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_hidden(&self, identity: &Identity) -> bool {
        self.hidden.contains(identity)
    }

    /// Returns true if the mark changed.
    pub fn hide(&mut self, identity: Identity) -> bool {
        self.hidden.insert(identity)
    }

    /// Returns true if the mark changed.
    pub fn show(&mut self, identity: &Identity) -> bool {
        self.hidden.remove(identity)
    }

    pub fn set(&mut self, identity: Identity, hidden: bool) -> bool {
        if hidden {
            self.hide(identity)
        } else {
            self.show(&identity)
        }
    }

    /// Flip the mark, returning the new hidden state.
    pub fn toggle(&mut self, identity: Identity) -> bool {
        let hidden = !self.is_hidden(&identity);
        self.set(identity, hidden);
        hidden
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.hidden.iter()
    }

    pub fn len(&self) -> usize {
        self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hidden.is_empty()
    }
}

impl FromIterator<Identity> for HiddenMarks {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        HiddenMarks {
            hidden: iter.into_iter().collect(),
        }
    }
}
