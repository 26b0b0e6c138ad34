//! Logical hardware items and the attribute-value factorization engine.
//!
//! This is the hardest subsystem in the crate (spec §4.3): a flat list
//! of OVF `Item` elements is grouped by `(ResourceType, InstanceID)`
//! into [`LogicalItem`]s, each of which tracks, per child element name,
//! an [`AttributeMap`] recording which value applies under which
//! configuration profiles.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hardware::profile::ProfileSet;

/// CIM RASD `ResourceType` values relevant to OVF hardware editing.
/// Anything not listed round-trips through `Other(code)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Other(u32),
    Cpu,
    Memory,
    IdeController,
    ScsiController,
    Ethernet,
    CdDrive,
    DiskDrive,
    SerialPort,
    UsbController,
}

impl ResourceType {
    pub fn from_code(code: u32) -> Self {
        match code {
            3 => ResourceType::Cpu,
            4 => ResourceType::Memory,
            5 => ResourceType::IdeController,
            6 => ResourceType::ScsiController,
            10 => ResourceType::Ethernet,
            15 | 16 => ResourceType::CdDrive,
            17 => ResourceType::DiskDrive,
            21 => ResourceType::SerialPort,
            23 => ResourceType::UsbController,
            other => ResourceType::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            ResourceType::Cpu => 3,
            ResourceType::Memory => 4,
            ResourceType::IdeController => 5,
            ResourceType::ScsiController => 6,
            ResourceType::Ethernet => 10,
            ResourceType::CdDrive => 15,
            ResourceType::DiskDrive => 17,
            ResourceType::SerialPort => 21,
            ResourceType::UsbController => 23,
            ResourceType::Other(code) => code,
        }
    }

    pub fn is_controller(self) -> bool {
        matches!(self, ResourceType::IdeController | ResourceType::ScsiController)
    }
}

/// A mapping from profile-set to value for one hardware attribute
/// (element name), maintained as a pairwise-disjoint partition of the
/// profile universe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeMap {
    entries: Vec<(ProfileSet, String)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A single value that applies under the whole given profile set.
    pub fn uniform(scope: ProfileSet, value: impl Into<String>) -> Self {
        Self {
            entries: vec![(scope, value.into())],
        }
    }

    pub fn entries(&self) -> &[(ProfileSet, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a raw (profile-set, value) contribution during ingest.
    /// Does not normalize; call [`AttributeMap::normalize`] once all
    /// contributions for this attribute have been added.
    pub fn push_raw(&mut self, scope: ProfileSet, value: impl Into<String>) {
        if !scope.is_empty() {
            self.entries.push((scope, value.into()));
        }
    }

    pub fn value_for(&self, profile: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s.contains(profile))
            .map(|(_, v)| v.as_str())
    }

    /// The value covering an entire shard (a shard is always a subset
    /// of exactly one entry's scope — see [`compute_shards`]).
    pub fn value_for_shard(&self, shard: &ProfileSet) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| shard.is_subset(s))
            .map(|(_, v)| v.as_str())
    }

    /// The `value_replace_wildcards` update algorithm (spec §4.3.3):
    /// after this call, every profile in `target` resolves to
    /// `new_value`, every profile outside `target` keeps its prior
    /// value, and the map is normalized to the minimal entry count.
    pub fn set(&mut self, target: &ProfileSet, new_value: impl Into<String>) {
        let new_value = new_value.into();
        let mut next = Vec::with_capacity(self.entries.len() + 1);
        for (scope, value) in self.entries.drain(..) {
            if scope.intersects(target) {
                let remainder = scope.difference(target);
                if !remainder.is_empty() {
                    next.push((remainder, value));
                }
            } else {
                next.push((scope, value));
            }
        }
        next.push((target.clone(), new_value));
        self.entries = next;
        self.normalize();
    }

    /// Remove `target` from this attribute's coverage entirely (used
    /// by delete-all-other-profiles and NIC/profile teardown); the
    /// dropped profiles simply stop appearing in any entry.
    pub fn drop_profiles(&mut self, target: &ProfileSet) {
        let mut next = Vec::with_capacity(self.entries.len());
        for (scope, value) in self.entries.drain(..) {
            let remainder = scope.difference(target);
            if !remainder.is_empty() {
                next.push((remainder, value));
            }
        }
        self.entries = next;
    }

    /// Relabel every entry's scope as if `profile` were the entire
    /// universe — used by delete-all-other-profiles once every other
    /// profile has been dropped.
    pub fn relabel_as_all(&mut self, new_universe: &ProfileSet) {
        for (scope, _) in &mut self.entries {
            *scope = new_universe.clone();
        }
        self.normalize();
    }

    /// Merge entries that share a value (by union of their profile
    /// sets) and drop any entry left with an empty scope. This is the
    /// "factorization minimality" invariant: after normalization no two
    /// entries share a value.
    pub fn normalize(&mut self) {
        let mut merged: Vec<(ProfileSet, String)> = Vec::with_capacity(self.entries.len());
        for (scope, value) in self.entries.drain(..) {
            if scope.is_empty() {
                continue;
            }
            if let Some(existing) = merged.iter_mut().find(|(_, v)| *v == value) {
                existing.0 = existing.0.union(&scope);
            } else {
                merged.push((scope, value));
            }
        }
        self.entries = merged;
    }

    /// Validate the profile-set-partition invariant: entries are
    /// pairwise disjoint. (Union-equals-universe is a property of a
    /// *complete* logical item, checked at the section level, since an
    /// attribute that a VM simply doesn't use never appears here.)
    pub fn check_disjoint(&self) -> Result<()> {
        for i in 0..self.entries.len() {
            for j in (i + 1)..self.entries.len() {
                if self.entries[i].0.intersects(&self.entries[j].0) {
                    return Err(Error::internal(format!(
                        "attribute map entries {} and {} overlap",
                        i, j
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One conceptual piece of virtual hardware, aggregating every `Item`
/// XML element that shares its `InstanceID`.
#[derive(Debug, Clone)]
pub struct LogicalItem {
    pub instance_id: u32,
    pub resource_type: ResourceType,
    /// child element name (`VirtualQuantity`, `Connection`, ...) to its
    /// per-profile attribute map.
    pub attributes: BTreeMap<String, AttributeMap>,
}

impl LogicalItem {
    pub fn new(instance_id: u32, resource_type: ResourceType) -> Self {
        Self {
            instance_id,
            resource_type,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttributeMap> {
        self.attributes.get(name)
    }

    pub fn attr_mut(&mut self, name: &str) -> &mut AttributeMap {
        self.attributes.entry(name.to_string()).or_default()
    }

    pub fn value_for(&self, name: &str, profile: &str) -> Option<&str> {
        self.attr(name).and_then(|m| m.value_for(profile))
    }

    /// Set `name` to `new_value` under every profile in `target`.
    pub fn set_value(&mut self, name: &str, target: &ProfileSet, new_value: impl Into<String>) {
        self.attr_mut(name).set(target, new_value);
    }

    /// The parent controller's InstanceID, if this item has a `Parent`
    /// child element with a value parseable as an integer (disk drives
    /// and CD-ROMs only).
    pub fn parent_instance_id(&self, profile: &str) -> Option<u32> {
        self.value_for("Parent", profile).and_then(|v| v.parse().ok())
    }

    /// Every profile-set that appears across any attribute of this
    /// item — the set of shards a full emission must split into.
    pub fn shards(&self, universe: &ProfileSet) -> Vec<ProfileSet> {
        let maps: Vec<&AttributeMap> = self.attributes.values().collect();
        compute_shards(universe, &maps)
    }
}

/// Compute the common refinement ("join") of several attribute maps'
/// partitions of `universe`: the coarsest partition such that every
/// shard is a subset of exactly one entry in every map.
pub fn compute_shards(universe: &ProfileSet, maps: &[&AttributeMap]) -> Vec<ProfileSet> {
    let mut shards = vec![universe.clone()];
    for map in maps {
        if map.is_empty() {
            continue;
        }
        let mut next = Vec::new();
        for shard in &shards {
            let mut remainder = shard.clone();
            for (scope, _) in map.entries() {
                if remainder.is_empty() {
                    break;
                }
                let part = remainder.intersection(scope);
                if !part.is_empty() {
                    next.push(part.clone());
                    remainder = remainder.difference(&part);
                }
            }
            if !remainder.is_empty() {
                next.push(remainder);
            }
        }
        shards = next;
    }
    shards.retain(|s| !s.is_empty());
    shards
}

/// Substitute a `{N}` or `{}` wildcard in an element value with a
/// sequence counter. `{}` starts the sequence at 0; `{N}` starts it at
/// the literal integer `N`. `index` is the zero-based position of this
/// item within the sequence of items sharing the template.
pub fn materialize_wildcard(template: &str, index: u32) -> String {
    if let Some(start) = template.find('{') {
        if let Some(end_rel) = template[start..].find('}') {
            let end = start + end_rel;
            let inner = &template[start + 1..end];
            let base: u32 = inner.parse().unwrap_or(0);
            let mut out = String::with_capacity(template.len());
            out.push_str(&template[..start]);
            out.push_str(&(base + index).to_string());
            out.push_str(&template[end + 1..]);
            return out;
        }
    }
    template.to_string()
}
