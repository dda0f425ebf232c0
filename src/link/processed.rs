use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Upper bound on remembered keys, independent of roster eviction.
pub const MAX_PROCESSED: usize = 500;

/// `"<steamID>_<eosID>"` for one player session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerKey(String);

impl PlayerKey {
    pub fn new(steam_id: &str, eos_id: &str) -> Self {
        PlayerKey(format!("{}_{}", steam_id, eos_id))
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Insertion-ordered set of keys whose link has already been attempted.
#[derive(Debug)]
pub struct ProcessedKeys {
    members: HashSet<PlayerKey>,
    /// Oldest first
    order: VecDeque<PlayerKey>,
    cap: usize,
}

impl Default for ProcessedKeys {
    fn default() -> Self {
        Self::with_cap(MAX_PROCESSED)
    }
}

impl ProcessedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        ProcessedKeys {
            members: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    pub fn contains(&self, key: &PlayerKey) -> bool {
        self.members.contains(key)
    }

    /// Record `key`. Returns `false` if it was already present.
    ///
    /// Going over the cap drops the oldest keys until the set is back at the cap.
    pub fn insert(&mut self, key: PlayerKey) -> bool {
        if !self.members.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }

    /// Drop every key not in `present`. Returns how many were evicted.
    pub fn retain_present(&mut self, present: &HashSet<PlayerKey>) -> usize {
        let before = self.order.len();
        self.order.retain(|k| present.contains(k));
        self.members.retain(|k| present.contains(k));
        before - self.order.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
