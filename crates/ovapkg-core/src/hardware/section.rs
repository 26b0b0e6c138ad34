//! The virtual hardware section: flat `Item` elements in, logical
//! items out, and the high-level edit operations that work against the
//! logical-item model (spec §4.3.4, §4.3.5).

use std::collections::HashMap;

use crate::descriptor::xmltree::{Element, Node};
use crate::error::{Error, Result};
use crate::hardware::item::{materialize_wildcard, LogicalItem, ResourceType};
use crate::hardware::profile::ProfileSet;

/// One NIC's named pattern dependency: `ElementName` re-materializes
/// when `Connection` changes, but only if the caller never overrode
/// `ElementName` to something unrelated to the network name.
fn apply_connection_dependency(
    item: &mut LogicalItem,
    target: &ProfileSet,
    old_connection: Option<&str>,
    new_connection: &str,
) {
    let Some(old) = old_connection else {
        return;
    };
    let still_matches = item
        .attr("ElementName")
        .map(|m| target.ids().all(|p| m.value_for(p) == Some(old)))
        .unwrap_or(false);
    if still_matches {
        item.set_value("ElementName", target, new_connection.to_string());
    }
}

fn split_trailing_digits(s: &str) -> Option<(&str, u64, usize)> {
    let digit_start = s
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    if digit_start == s.len() {
        return None;
    }
    let digits = &s[digit_start..];
    let num: u64 = digits.parse().ok()?;
    Some((&s[..digit_start], num, digits.len()))
}

fn infer_numeric_sequence_next(names: &[String]) -> Option<String> {
    let last = names.last()?;
    let (prefix, num, width) = split_trailing_digits(last)?;
    Some(format!("{prefix}{:0width$}", num + 1, width = width))
}

/// A virtual hardware section: the logical-item view of a
/// `VirtualHardwareSection`'s flat `Item` list.
#[derive(Debug, Clone, Default)]
pub struct HardwareSection {
    items: Vec<LogicalItem>,
}

impl HardwareSection {
    pub fn items(&self) -> &[LogicalItem] {
        &self.items
    }

    pub fn item(&self, instance_id: u32) -> Option<&LogicalItem> {
        self.items.iter().find(|i| i.instance_id == instance_id)
    }

    pub fn item_mut(&mut self, instance_id: u32) -> Option<&mut LogicalItem> {
        self.items.iter_mut().find(|i| i.instance_id == instance_id)
    }

    pub fn items_of_type(&self, rt: ResourceType) -> impl Iterator<Item = &LogicalItem> {
        self.items.iter().filter(move |i| i.resource_type == rt)
    }

    pub fn nic_items(&self) -> impl Iterator<Item = &LogicalItem> {
        self.items_of_type(ResourceType::Ethernet)
    }

    pub fn max_instance_id(&self) -> u32 {
        self.items.iter().map(|i| i.instance_id).max().unwrap_or(0)
    }

    fn next_instance_id(&self) -> u32 {
        self.max_instance_id() + 1
    }

    /// Group flat `Item` elements by `(ResourceType, InstanceID)` and
    /// build the per-attribute profile-set maps (spec §4.3.2).
    pub fn ingest(section: &Element, universe: &ProfileSet) -> Result<Self> {
        let mut order: Vec<(u32, u32)> = Vec::new();
        let mut groups: HashMap<(u32, u32), Vec<(&Element, Option<ProfileSet>)>> = HashMap::new();

        for item_el in section.child_elements().filter(|e| e.local_name() == "Item") {
            let resource_type = item_el
                .child_local("ResourceType")
                .map(|e| e.text())
                .ok_or_else(|| Error::invalid_input("Item missing ResourceType"))?
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid_input("Item ResourceType is not numeric"))?;
            let instance_id = item_el
                .child_local("InstanceID")
                .map(|e| e.text())
                .ok_or_else(|| Error::invalid_input("Item missing InstanceID"))?
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid_input("Item InstanceID is not numeric"))?;
            let scope = item_el
                .attr("configuration")
                .map(ProfileSet::parse_configuration_attr);

            let key = (resource_type, instance_id);
            if !groups.contains_key(&key) {
                order.push(key);
            }
            groups.entry(key).or_default().push((item_el, scope));
        }

        let mut items = Vec::with_capacity(order.len());
        for key @ (resource_code, instance_id) in order {
            let group = &groups[&key];
            let explicit_union = group
                .iter()
                .filter_map(|(_, s)| s.clone())
                .fold(ProfileSet::empty(), |acc, s| acc.union(&s));
            let implicit_scope = universe.difference(&explicit_union);

            let mut logical = LogicalItem::new(instance_id, ResourceType::from_code(resource_code));
            for (el, scope) in group {
                let item_scope = scope.clone().unwrap_or_else(|| implicit_scope.clone());
                if item_scope.is_empty() {
                    continue;
                }
                for child in el.child_elements() {
                    let local = child.local_name();
                    if local == "ResourceType" || local == "InstanceID" {
                        continue;
                    }
                    logical
                        .attr_mut(&child.name)
                        .push_raw(item_scope.clone(), child.text());
                }
            }
            for map in logical.attributes.values_mut() {
                map.normalize();
            }
            items.push(logical);
        }
        items.sort_by_key(|i| i.instance_id);
        Ok(Self { items })
    }

    /// Split every logical item into its shards and emit one `Item`
    /// element per shard (spec §4.3.4).
    pub fn emit(&self, universe: &ProfileSet) -> Vec<Element> {
        let mut counters: HashMap<(ResourceType, String), u32> = HashMap::new();
        let mut out = Vec::new();

        for item in &self.items {
            // Assign each wildcard-templated attribute one sequence
            // index for the whole logical item (spec §4.3.3:
            // substituted per-item), before splitting into shards —
            // every shard of this item reuses the same index rather
            // than advancing the counter again.
            let mut item_indices: HashMap<&str, u32> = HashMap::new();
            for (name, map) in &item.attributes {
                if map.entries().iter().any(|(_, v)| v.contains('{')) {
                    let counter = counters.entry((item.resource_type, name.clone())).or_insert(0);
                    item_indices.insert(name.as_str(), *counter);
                    *counter += 1;
                }
            }

            let mut shards = item.shards(universe);
            shards.sort_by_key(|s| s.ids().next().map(str::to_string).unwrap_or_default());

            for shard in &shards {
                let mut el = Element::new("Item");
                if let Some(cfg) = shard.to_configuration_attr(universe) {
                    el.set_attr("configuration", cfg);
                }

                let mut rt_el = Element::new("ResourceType");
                rt_el.set_text(item.resource_type.code().to_string());
                el.push_child(Node::Element(rt_el));

                let mut id_el = Element::new("InstanceID");
                id_el.set_text(item.instance_id.to_string());
                el.push_child(Node::Element(id_el));

                for (name, map) in &item.attributes {
                    let Some(value) = map.value_for_shard(shard) else {
                        continue;
                    };
                    let materialized = match item_indices.get(name.as_str()) {
                        Some(index) => materialize_wildcard(value, *index),
                        None => value.to_string(),
                    };
                    let mut child = Element::new(name.clone());
                    child.set_text(materialized);
                    el.push_child(Node::Element(child));
                }

                out.push(el);
            }
        }
        out
    }

    fn ensure_item_of_type(
        &mut self,
        rt: ResourceType,
        synth: impl FnOnce(u32) -> LogicalItem,
    ) -> &mut LogicalItem {
        if let Some(idx) = self.items.iter().position(|it| it.resource_type == rt) {
            return &mut self.items[idx];
        }
        let id = self.next_instance_id();
        self.items.push(synth(id));
        self.items.last_mut().unwrap()
    }

    /// Set CPU count under `target` profiles, creating a CPU item with
    /// platform-neutral defaults if none exists yet.
    pub fn set_cpu_count(&mut self, target: &ProfileSet, universe: &ProfileSet, count: u32) {
        let item = self.ensure_item_of_type(ResourceType::Cpu, |id| {
            let mut it = LogicalItem::new(id, ResourceType::Cpu);
            it.set_value("ElementName", universe, "CPU");
            it.set_value("VirtualQuantity", universe, "1");
            it.set_value("AllocationUnits", universe, "hertz * 10^6");
            it
        });
        item.set_value("VirtualQuantity", target, count.to_string());
    }

    /// Set RAM in megabytes under `target` profiles.
    pub fn set_memory_mb(&mut self, target: &ProfileSet, universe: &ProfileSet, megabytes: u64) {
        let item = self.ensure_item_of_type(ResourceType::Memory, |id| {
            let mut it = LogicalItem::new(id, ResourceType::Memory);
            it.set_value("ElementName", universe, "Memory");
            it.set_value("VirtualQuantity", universe, "0");
            it.set_value("AllocationUnits", universe, "byte * 2^20");
            it
        });
        item.set_value("VirtualQuantity", target, megabytes.to_string());
    }

    /// Set serial port count under `target`, adding/removing items.
    pub fn set_serial_count(&mut self, universe: &ProfileSet, count: usize) {
        let current: Vec<u32> = self.items_of_type(ResourceType::SerialPort).map(|i| i.instance_id).collect();
        if count > current.len() {
            for _ in 0..(count - current.len()) {
                let id = self.next_instance_id();
                let mut it = LogicalItem::new(id, ResourceType::SerialPort);
                it.set_value("ElementName", universe, "Serial Port");
                self.items.push(it);
            }
        } else {
            for id in current.iter().rev().take(current.len() - count) {
                self.items.retain(|i| i.instance_id != *id);
            }
        }
    }

    /// Infer the next network name in a discernible numeric sequence
    /// among existing NIC `Connection` values, falling back to the
    /// default network name (spec §4.3.5).
    fn infer_next_network_name(&self) -> String {
        let mut names: Vec<(u32, String)> = self
            .nic_items()
            .filter_map(|i| i.attr("Connection").map(|m| (i.instance_id, m)))
            .filter_map(|(id, m)| m.entries().first().map(|(_, v)| (id, v.clone())))
            .collect();
        names.sort_by_key(|(id, _)| *id);
        let names: Vec<String> = names.into_iter().map(|(_, n)| n).collect();
        infer_numeric_sequence_next(&names).unwrap_or_else(|| "VM Network".to_string())
    }

    /// Add one NIC, assigning the next InstanceID and a network name
    /// (explicit, inferred sequence, or default).
    pub fn add_nic(&mut self, universe: &ProfileSet, network: Option<&str>) -> u32 {
        let network_name = network
            .map(str::to_string)
            .unwrap_or_else(|| self.infer_next_network_name());
        let id = self.next_instance_id();
        let mut item = LogicalItem::new(id, ResourceType::Ethernet);
        item.set_value("ElementName", universe, format!("Network adapter {id}"));
        item.set_value("Connection", universe, network_name);
        item.set_value("AutomaticAllocation", universe, "true");
        self.items.push(item);
        id
    }

    /// Remove the NIC with the given InstanceID.
    pub fn remove_nic(&mut self, instance_id: u32) -> Result<()> {
        let before = self.items.len();
        self.items
            .retain(|i| !(i.resource_type == ResourceType::Ethernet && i.instance_id == instance_id));
        if self.items.len() == before {
            return Err(Error::not_found("nic", instance_id.to_string()));
        }
        Ok(())
    }

    /// Set the NIC count under `target`, adding or removing NICs to
    /// reach it.
    pub fn set_nic_count(&mut self, universe: &ProfileSet, count: usize, networks: Option<&[String]>) -> Result<()> {
        let current: Vec<u32> = self.nic_items().map(|i| i.instance_id).collect();
        if count > current.len() {
            for _ in 0..(count - current.len()) {
                self.add_nic(universe, None);
            }
        } else if count < current.len() {
            for id in current.iter().rev().take(current.len() - count) {
                self.remove_nic(*id)?;
            }
        }
        if let Some(names) = networks {
            self.set_nic_networks(names, universe)?;
        }
        Ok(())
    }

    /// Assign network names to existing NICs in InstanceID order; if
    /// fewer names than NICs are given, the last name covers the rest.
    pub fn set_nic_networks(&mut self, names: &[String], universe: &ProfileSet) -> Result<()> {
        let Some(last_name) = names.last() else {
            return Err(Error::invalid_input("no network names provided"));
        };
        let nic_ids: Vec<u32> = self.nic_items().map(|i| i.instance_id).collect();
        for (idx, id) in nic_ids.iter().enumerate() {
            let name = names.get(idx).unwrap_or(last_name).clone();
            let Some(pos) = self.items.iter().position(|i| i.instance_id == *id) else {
                continue;
            };
            let old_connection = self.items[pos]
                .attr("Connection")
                .and_then(|m| m.entries().first().map(|(_, v)| v.clone()));
            self.items[pos].set_value("Connection", universe, name.clone());
            apply_connection_dependency(&mut self.items[pos], universe, old_connection.as_deref(), &name);
        }
        Ok(())
    }

    /// Attach (or replace) a disk-drive item under `controller_instance_id`
    /// at `address_on_parent`, pointing at `host_resource` (a
    /// `ovf:/disk/<diskId>` reference string).
    pub fn add_disk_item(
        &mut self,
        controller_instance_id: u32,
        address_on_parent: &str,
        host_resource: &str,
        universe: &ProfileSet,
    ) -> Result<u32> {
        let controller_exists = self
            .items
            .iter()
            .any(|i| i.instance_id == controller_instance_id && i.resource_type.is_controller());
        if !controller_exists {
            return Err(Error::not_found("controller", controller_instance_id.to_string()));
        }

        let existing = self.items.iter().position(|i| {
            i.resource_type == ResourceType::DiskDrive
                && i.attr("Parent")
                    .map(|m| m.entries().iter().any(|(_, v)| v == &controller_instance_id.to_string()))
                    .unwrap_or(false)
                && i.attr("AddressOnParent")
                    .map(|m| m.entries().iter().any(|(_, v)| v == address_on_parent))
                    .unwrap_or(false)
        });

        if let Some(idx) = existing {
            let id = self.items[idx].instance_id;
            self.items[idx].set_value("HostResource", universe, host_resource.to_string());
            return Ok(id);
        }

        let id = self.next_instance_id();
        let mut item = LogicalItem::new(id, ResourceType::DiskDrive);
        item.set_value("Parent", universe, controller_instance_id.to_string());
        item.set_value("AddressOnParent", universe, address_on_parent.to_string());
        item.set_value("HostResource", universe, host_resource.to_string());
        item.set_value("ElementName", universe, format!("Hard disk {id}"));
        self.items.push(item);
        Ok(id)
    }

    /// Attach (or replace) a CD-ROM drive item under
    /// `controller_instance_id` at `address_on_parent`, referencing a
    /// file directly (`ovf:/file/<fileId>`) rather than a `DiskSection`
    /// entry — the bootstrap-config delivery path (spec §4.5).
    pub fn add_cdrom_item(
        &mut self,
        controller_instance_id: u32,
        address_on_parent: &str,
        host_resource: &str,
        universe: &ProfileSet,
    ) -> Result<u32> {
        let controller_exists = self
            .items
            .iter()
            .any(|i| i.instance_id == controller_instance_id && i.resource_type.is_controller());
        if !controller_exists {
            return Err(Error::not_found("controller", controller_instance_id.to_string()));
        }

        let existing = self.items.iter().position(|i| {
            i.resource_type == ResourceType::CdDrive
                && i.attr("Parent")
                    .map(|m| m.entries().iter().any(|(_, v)| v == &controller_instance_id.to_string()))
                    .unwrap_or(false)
                && i.attr("AddressOnParent")
                    .map(|m| m.entries().iter().any(|(_, v)| v == address_on_parent))
                    .unwrap_or(false)
        });

        if let Some(idx) = existing {
            let id = self.items[idx].instance_id;
            self.items[idx].set_value("HostResource", universe, host_resource.to_string());
            return Ok(id);
        }

        let id = self.next_instance_id();
        let mut item = LogicalItem::new(id, ResourceType::CdDrive);
        item.set_value("Parent", universe, controller_instance_id.to_string());
        item.set_value("AddressOnParent", universe, address_on_parent.to_string());
        item.set_value("HostResource", universe, host_resource.to_string());
        item.set_value("ElementName", universe, "CD/DVD Drive".to_string());
        self.items.push(item);
        Ok(id)
    }

    /// All `AddressOnParent` values currently in use by items attached
    /// to `controller_instance_id`, regardless of resource type.
    pub fn used_addresses(&self, controller_instance_id: u32) -> std::collections::HashSet<String> {
        self.items
            .iter()
            .filter(|i| {
                i.attr("Parent")
                    .map(|m| m.entries().iter().any(|(_, v)| v == &controller_instance_id.to_string()))
                    .unwrap_or(false)
            })
            .filter_map(|i| i.attr("AddressOnParent"))
            .flat_map(|m| m.entries().iter().map(|(_, v)| v.clone()))
            .collect()
    }

    /// Turn the disk-drive item backed by `host_resource` into an
    /// empty placeholder (used when the file it refers to is removed).
    pub fn clear_disk_host_resource(&mut self, host_resource: &str, universe: &ProfileSet) {
        for item in &mut self.items {
            if item.resource_type != ResourceType::DiskDrive {
                continue;
            }
            let matches = item
                .attr("HostResource")
                .map(|m| m.entries().iter().any(|(_, v)| v == host_resource))
                .unwrap_or(false);
            if matches {
                item.attr_mut("HostResource").drop_profiles(universe);
            }
        }
    }

    /// Drop every profile but `keep`, relabeling `keep`'s entries as
    /// covering the whole (now-singleton) universe (spec §4.3.5).
    pub fn delete_all_other_profiles(&mut self, keep: &str, universe: &ProfileSet) {
        let keep_set = ProfileSet::single(keep);
        let drop_set = universe.difference(&keep_set);
        for item in &mut self.items {
            for map in item.attributes.values_mut() {
                map.drop_profiles(&drop_set);
                map.relabel_as_all(&keep_set);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::xmltree;

    fn universe() -> ProfileSet {
        ProfileSet::from_ids(["1CPU-4GB".to_string(), "2CPU-4GB".to_string()])
    }

    fn sample_section() -> Element {
        let xml = br#"<VirtualHardwareSection>
  <Item configuration="1CPU-4GB">
    <ResourceType>3</ResourceType>
    <InstanceID>1</InstanceID>
    <VirtualQuantity>1</VirtualQuantity>
  </Item>
  <Item configuration="2CPU-4GB">
    <ResourceType>3</ResourceType>
    <InstanceID>1</InstanceID>
    <VirtualQuantity>2</VirtualQuantity>
  </Item>
  <Item>
    <ResourceType>4</ResourceType>
    <InstanceID>2</InstanceID>
    <VirtualQuantity>4096</VirtualQuantity>
  </Item>
  <Item>
    <ResourceType>6</ResourceType>
    <InstanceID>3</InstanceID>
    <ElementName>SCSI Controller</ElementName>
  </Item>
</VirtualHardwareSection>"#;
        xmltree::parse(xml).unwrap().0
    }

    #[test]
    fn test_ingest_splits_scoped_cpu_item() {
        let section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let cpu = section.item(1).unwrap();
        assert_eq!(cpu.resource_type, ResourceType::Cpu);
        assert_eq!(cpu.value_for("VirtualQuantity", "1CPU-4GB"), Some("1"));
        assert_eq!(cpu.value_for("VirtualQuantity", "2CPU-4GB"), Some("2"));
    }

    #[test]
    fn test_ingest_unscoped_item_covers_all() {
        let section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let mem = section.item(2).unwrap();
        assert_eq!(mem.value_for("VirtualQuantity", "1CPU-4GB"), Some("4096"));
        assert_eq!(mem.value_for("VirtualQuantity", "2CPU-4GB"), Some("4096"));
    }

    #[test]
    fn test_emit_collapses_uniform_attribute_no_configuration() {
        let section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let items = section.emit(&universe());
        let mem_item = items
            .iter()
            .find(|e| e.child_local("InstanceID").unwrap().text() == "2")
            .unwrap();
        assert!(mem_item.attr("configuration").is_none());
    }

    #[test]
    fn test_emit_round_trip_cpu_split() {
        let section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let items = section.emit(&universe());
        let cpu_items: Vec<_> = items
            .iter()
            .filter(|e| e.child_local("InstanceID").unwrap().text() == "1")
            .collect();
        assert_eq!(cpu_items.len(), 2);
        for item in cpu_items {
            assert!(item.attr("configuration").is_some());
        }
    }

    #[test]
    fn test_set_cpu_count_creates_item_when_absent() {
        let mut section = HardwareSection::default();
        section.set_cpu_count(&universe(), &universe(), 1);
        let cpu = section.items_of_type(ResourceType::Cpu).next().unwrap();
        assert_eq!(cpu.value_for("VirtualQuantity", "1CPU-4GB"), Some("1"));
    }

    #[test]
    fn test_add_nic_infers_numeric_sequence() {
        let mut section = HardwareSection::default();
        section.add_nic(&universe(), Some("GigabitEthernet1"));
        let second = section.add_nic(&universe(), None);
        assert_eq!(
            section.item(second).unwrap().value_for("Connection", "1CPU-4GB"),
            Some("GigabitEthernet2")
        );
    }

    #[test]
    fn test_add_nic_falls_back_to_default_network() {
        let mut section = HardwareSection::default();
        let id = section.add_nic(&universe(), None);
        assert_eq!(
            section.item(id).unwrap().value_for("Connection", "1CPU-4GB"),
            Some("VM Network")
        );
    }

    #[test]
    fn test_remove_nic_not_found() {
        let mut section = HardwareSection::default();
        assert!(matches!(section.remove_nic(99), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_set_nic_networks_short_list_fills_remaining() {
        let mut section = HardwareSection::default();
        section.add_nic(&universe(), Some("A"));
        section.add_nic(&universe(), Some("B"));
        section.add_nic(&universe(), Some("C"));
        section
            .set_nic_networks(&["Mgmt".to_string()], &universe())
            .unwrap();
        for item in section.nic_items() {
            assert_eq!(item.value_for("Connection", "1CPU-4GB"), Some("Mgmt"));
        }
    }

    #[test]
    fn test_set_nic_networks_rematerializes_element_name() {
        let mut section = HardwareSection::default();
        let id = section.add_nic(&universe(), Some("GigabitEthernet1"));
        section.item_mut(id).unwrap().set_value(
            "ElementName",
            &universe(),
            "GigabitEthernet1".to_string(),
        );
        section
            .set_nic_networks(&["GigabitEthernet2".to_string()], &universe())
            .unwrap();
        assert_eq!(
            section.item(id).unwrap().value_for("ElementName", "1CPU-4GB"),
            Some("GigabitEthernet2")
        );
    }

    #[test]
    fn test_add_disk_item_attaches_to_controller() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let id = section
            .add_disk_item(3, "1", "ovf:/disk/disk2", &universe())
            .unwrap();
        let disk = section.item(id).unwrap();
        assert_eq!(disk.value_for("Parent", "1CPU-4GB"), Some("3"));
        assert_eq!(disk.value_for("AddressOnParent", "1CPU-4GB"), Some("1"));
    }

    #[test]
    fn test_add_disk_item_missing_controller_errors() {
        let mut section = HardwareSection::default();
        assert!(matches!(
            section.add_disk_item(99, "0", "ovf:/disk/disk0", &universe()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_add_disk_item_replaces_existing_at_same_address() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let first = section
            .add_disk_item(3, "0", "ovf:/disk/disk0", &universe())
            .unwrap();
        let second = section
            .add_disk_item(3, "0", "ovf:/disk/disk1", &universe())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            section.item(first).unwrap().value_for("HostResource", "1CPU-4GB"),
            Some("ovf:/disk/disk1")
        );
    }

    #[test]
    fn test_add_cdrom_item_attaches_to_controller() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let id = section
            .add_cdrom_item(3, "0", "ovf:/file/config-iso", &universe())
            .unwrap();
        let cdrom = section.item(id).unwrap();
        assert_eq!(cdrom.resource_type, ResourceType::CdDrive);
        assert_eq!(cdrom.value_for("HostResource", "1CPU-4GB"), Some("ovf:/file/config-iso"));
    }

    #[test]
    fn test_used_addresses_tracks_disk_drives() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        section
            .add_disk_item(3, "0", "ovf:/disk/disk0", &universe())
            .unwrap();
        let used = section.used_addresses(3);
        assert!(used.contains("0"));
    }

    #[test]
    fn test_delete_all_other_profiles_collapses_to_single_universe() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        section.delete_all_other_profiles("1CPU-4GB", &universe());
        let new_universe = ProfileSet::single("1CPU-4GB");
        let cpu = section.item(1).unwrap();
        assert_eq!(cpu.value_for("VirtualQuantity", "1CPU-4GB"), Some("1"));
        let shards = cpu.shards(&new_universe);
        assert_eq!(shards.len(), 1);
        assert!(shards[0].is_all(&new_universe));
    }

    #[test]
    fn test_instance_ids_are_monotonic_across_additions() {
        let mut section = HardwareSection::ingest(&sample_section(), &universe()).unwrap();
        let before_max = section.max_instance_id();
        let nic_id = section.add_nic(&universe(), None);
        assert!(nic_id > before_max);
    }

    #[test]
    fn test_wildcard_materializes_once_per_item_across_shards() {
        let xml = br#"<VirtualHardwareSection>
  <Item configuration="1CPU-4GB">
    <ResourceType>10</ResourceType>
    <InstanceID>1</InstanceID>
    <ElementName>Ethernet0/{}</ElementName>
    <Connection>MgmtNet</Connection>
  </Item>
  <Item configuration="2CPU-4GB">
    <ResourceType>10</ResourceType>
    <InstanceID>1</InstanceID>
    <ElementName>Ethernet0/{}</ElementName>
    <Connection>DataNet</Connection>
  </Item>
  <Item>
    <ResourceType>10</ResourceType>
    <InstanceID>2</InstanceID>
    <ElementName>Ethernet0/{}</ElementName>
    <Connection>SharedNet</Connection>
  </Item>
</VirtualHardwareSection>"#;
        let (root, _) = xmltree::parse(xml).unwrap();
        let section = HardwareSection::ingest(&root, &universe()).unwrap();

        let items = section.emit(&universe());
        let first_nic_shards: Vec<&Element> = items
            .iter()
            .filter(|e| e.child_local("InstanceID").unwrap().text() == "1")
            .collect();
        assert_eq!(first_nic_shards.len(), 2, "Connection split should still force two shards");
        let names: Vec<String> = first_nic_shards
            .iter()
            .map(|e| e.child_local("ElementName").unwrap().text())
            .collect();
        assert_eq!(
            names[0], names[1],
            "the same logical item must materialize its wildcard identically across every shard"
        );
        assert_eq!(names[0], "Ethernet0/0");

        let second_nic = items
            .iter()
            .find(|e| e.child_local("InstanceID").unwrap().text() == "2")
            .unwrap();
        assert_eq!(second_nic.child_local("ElementName").unwrap().text(), "Ethernet0/1");
    }
}
