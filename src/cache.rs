use std::collections::HashMap;

use crate::types::{ListKind, User};

/// Per-session cache of previously fetched relationship lists.
///
/// The cache is immutable: `add_following`/`add_follower` return a new
/// cache with the entry for that `(username, kind)` key fully replaced,
/// never merged. The façade swaps the whole cache on update, so readers
/// never observe a half-updated one.
///
/// Keys are usernames; entries are only ever written from a structured
/// [`User`] reference, since two spellings of the same handle would
/// collide incorrectly under a weaker key.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: HashMap<(String, ListKind), Vec<User>>,
}

impl ResultCache {
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_following(&self, user: &User, list: Vec<User>) -> Self {
        self.insert(user, ListKind::Following, list)
    }

    #[must_use]
    pub fn add_follower(&self, user: &User, list: Vec<User>) -> Self {
        self.insert(user, ListKind::Follower, list)
    }

    /// The stored list for this user and kind; empty if never fetched.
    pub fn lookup(&self, user: &User, kind: ListKind) -> &[User] {
        self.entries
            .get(&(user.username.clone(), kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn insert(&self, user: &User, kind: ListKind, list: Vec<User>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert((user.username.clone(), kind), list);
        Self { entries }
    }
}
