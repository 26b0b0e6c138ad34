//! Configuration profile sets.
//!
//! A [`ProfileSet`] is a subset of the profile universe (GLOSSARY:
//! every configuration profile id declared in DeploymentOptionSection,
//! plus the implicit "no profile" sentinel for VMs that declare none).
//! The factorization engine in [`super::item`] never reasons about the
//! literal `ALL` XML sentinel directly — it always works with the
//! concrete set of profiles a value applies to, and only decides
//! whether that set happens to equal the whole universe at emit time.

use std::collections::BTreeSet;
use std::fmt;

/// The synthetic profile id used for VMs that declare no configuration
/// profiles at all (GLOSSARY: "the implicit 'no profile' sentinel").
pub const NO_PROFILE: &str = "";

/// A subset of the profile universe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProfileSet(BTreeSet<String>);

impl ProfileSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn single(id: impl Into<String>) -> Self {
        let mut s = BTreeSet::new();
        s.insert(id.into());
        Self(s)
    }

    pub fn from_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Parse the comma-separated `configuration="a,b,c"` attribute
    /// value.
    pub fn parse_configuration_attr(value: &str) -> Self {
        Self(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Render the `configuration` attribute value, or `None` if this
    /// set covers the whole universe (the `ALL` case omits the
    /// attribute entirely).
    pub fn to_configuration_attr(&self, universe: &ProfileSet) -> Option<String> {
        if self.is_all(universe) {
            None
        } else {
            Some(self.ids().collect::<Vec<_>>().join(","))
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_all(&self, universe: &ProfileSet) -> bool {
        self == universe
    }

    pub fn union(&self, other: &ProfileSet) -> ProfileSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &ProfileSet) -> ProfileSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn difference(&self, other: &ProfileSet) -> ProfileSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    pub fn intersects(&self, other: &ProfileSet) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Whether every id in `self` also appears in `other`.
    pub fn is_subset(&self, other: &ProfileSet) -> bool {
        self.difference(other).is_empty()
    }

    pub fn insert(&mut self, id: impl Into<String>) {
        self.0.insert(id.into());
    }

    pub fn remove(&mut self, id: &str) {
        self.0.remove(id);
    }
}

impl fmt::Display for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.ids().collect::<Vec<_>>().join(","))
    }
}

impl FromIterator<String> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::from_ids(iter)
    }
}
