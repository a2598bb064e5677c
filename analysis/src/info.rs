//! Per-value alias metadata.

use std::collections::BTreeSet;
use std::fmt;

/// One alias set: an equivalence class of values that may refer to
/// overlapping mutable storage. Symbols are minted fresh by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AliasSymbol(pub(crate) u32);

impl fmt::Display for AliasSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alias::{}", self.0)
    }
}

/// Alias-set membership of a value: a set of symbols, plus the wildcard flag
/// for values that may overlap with anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasInfo {
    sets: BTreeSet<AliasSymbol>,
    wildcard: bool,
}

impl AliasInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wildcard() -> Self {
        Self { sets: BTreeSet::new(), wildcard: true }
    }

    pub fn from_symbol(symbol: AliasSymbol) -> Self {
        let mut info = Self::new();
        info.add_set(symbol);
        info
    }

    pub fn sets(&self) -> &BTreeSet<AliasSymbol> {
        &self.sets
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Neither members nor the wildcard flag.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty() && !self.wildcard
    }

    pub fn add_set(&mut self, symbol: AliasSymbol) {
        self.sets.insert(symbol);
    }

    pub fn union_with(&mut self, other: &AliasInfo) {
        self.sets.extend(other.sets.iter().copied());
        self.wildcard |= other.wildcard;
    }

    /// May storage reachable through `self` overlap storage reachable
    /// through `other`? Wildcards overlap with every non-empty info.
    pub fn may_overlap(&self, other: &AliasInfo) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.wildcard || other.wildcard {
            return true;
        }
        self.sets.intersection(&other.sets).next().is_some()
    }
}
