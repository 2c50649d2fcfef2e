use std::fmt;

use serde::{Deserialize, Serialize};

/// Consumer classes that can ask for frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Requester {
    /// Background keep-alive issued by the arbiter itself
    Idle,
    /// Remote API client
    Api,
    /// Web stream
    Web,
    /// Local display path
    Display,
}

impl Requester {
    pub const ALL: [Requester; 4] = [
        Requester::Idle,
        Requester::Api,
        Requester::Web,
        Requester::Display,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Set of requesters.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RequesterSet {
    members: [bool; Requester::ALL.len()],
}

impl RequesterSet {
    pub const fn new() -> Self {
        Self {
            members: [false; Requester::ALL.len()],
        }
    }

    /// Returns `true` if the requester was not already present.
    pub fn insert(&mut self, requester: Requester) -> bool {
        !std::mem::replace(&mut self.members[requester.index()], true)
    }

    /// Returns `true` if the requester was present.
    pub fn remove(&mut self, requester: Requester) -> bool {
        std::mem::replace(&mut self.members[requester.index()], false)
    }

    pub fn contains(&self, requester: Requester) -> bool {
        self.members[requester.index()]
    }

    pub fn union(&self, other: &RequesterSet) -> RequesterSet {
        let mut out = *self;
        for requester in other.iter() {
            out.insert(requester);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        !self.members.iter().any(|&m| m)
    }

    pub fn len(&self) -> usize {
        self.members.iter().filter(|&&m| m).count()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn iter(&self) -> impl Iterator<Item = Requester> + '_ {
        Requester::ALL
            .into_iter()
            .filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Requester> for RequesterSet {
    fn from_iter<I: IntoIterator<Item = Requester>>(iter: I) -> Self {
        let mut set = RequesterSet::new();
        for requester in iter {
            set.insert(requester);
        }
        set
    }
}

impl fmt::Debug for RequesterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
