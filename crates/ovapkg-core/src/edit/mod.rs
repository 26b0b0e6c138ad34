//! High-level edit operations over a [`Descriptor`] (spec.md §4.3.5,
//! §4.4, §4.5): add-disk, add-file, remove-file, edit-hardware,
//! edit-product, edit-properties, inject-config.
//!
//! These are free functions rather than `Descriptor` methods: the
//! descriptor module must not depend on this one (the dependency runs
//! the other way), so the dispatch named "`apply_edit`" in spec.md
//! §4.2 lives here instead.

use crate::descriptor::disks::DiskEntry;
use crate::descriptor::product::PropertyType;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::hardware::item::ResourceType;
use crate::hardware::profile::ProfileSet;
use crate::platform;
use crate::session::{Session, Warning, WarningCategory};

/// A batch of hardware-level changes under a single target profile
/// (or every profile, if `profile` is `None`).
#[derive(Debug, Clone, Default)]
pub struct HardwareEdit {
    pub profile: Option<String>,
    pub cpus: Option<u32>,
    pub memory_mb: Option<u64>,
    pub nic_count: Option<usize>,
    pub nic_networks: Option<Vec<String>>,
    pub serial_count: Option<usize>,
    /// Collapse the deployment to a single profile, dropping all others
    /// (spec §4.3.5 delete-all-other-profiles).
    pub delete_other_profiles: Option<String>,
}

fn resolve_target(descriptor: &Descriptor, profile: Option<&str>) -> Result<(ProfileSet, ProfileSet)> {
    let universe = descriptor.profile_universe();
    let target = match profile {
        Some(id) if !universe.contains(id) => return Err(Error::not_found("profile", id)),
        Some(id) => ProfileSet::single(id),
        None => universe.clone(),
    };
    Ok((target, universe))
}

fn sync_networks_to_nics(descriptor: &mut Descriptor) {
    let used: std::collections::HashSet<String> = descriptor
        .hardware
        .nic_items()
        .filter_map(|i| i.attr("Connection"))
        .flat_map(|m| m.entries().iter().map(|(_, v)| v.clone()))
        .collect();
    for name in &used {
        descriptor.networks.ensure(name);
    }
    descriptor.networks.retain_used(&used);
}

/// Apply a batch of hardware edits, surfacing platform-bounds warnings
/// through the session's confirmation callback (spec §4.3.5, §4.5).
pub fn apply_hardware_edit(descriptor: &mut Descriptor, edit: &HardwareEdit, session: &mut Session) -> Result<()> {
    let (target, universe) = resolve_target(descriptor, edit.profile.as_deref())?;
    let platform = platform::lookup(descriptor.product.as_ref().and_then(|p| p.class.as_deref()));

    if let Some(cpus) = edit.cpus {
        if let Some(message) = platform.validate_cpu_count(cpus).map_err(Error::invalid_input)? {
            session.confirm(Warning::new(WarningCategory::PlatformBounds, message))?;
        }
        descriptor.hardware.set_cpu_count(&target, &universe, cpus);
    }

    if let Some(memory_mb) = edit.memory_mb {
        if let Some(message) = platform.validate_memory_mb(memory_mb).map_err(Error::invalid_input)? {
            session.confirm(Warning::new(WarningCategory::PlatformBounds, message))?;
        }
        descriptor.hardware.set_memory_mb(&target, &universe, memory_mb);
    }

    if let Some(nic_count) = edit.nic_count {
        if let Some(message) = platform
            .validate_nic_count(nic_count as u32)
            .map_err(Error::invalid_input)?
        {
            session.confirm(Warning::new(WarningCategory::PlatformBounds, message))?;
        }
        descriptor
            .hardware
            .set_nic_count(&universe, nic_count, edit.nic_networks.as_deref())?;
        sync_networks_to_nics(descriptor);
    } else if let Some(names) = &edit.nic_networks {
        descriptor.hardware.set_nic_networks(names, &universe)?;
        sync_networks_to_nics(descriptor);
    }

    if let Some(serial_count) = edit.serial_count {
        if let Some(max) = platform.max_serial_count() {
            if serial_count as u32 > max {
                session.confirm(Warning::new(
                    WarningCategory::PlatformBounds,
                    format!(
                        "{} supports at most {max} serial ports, requested {serial_count}",
                        platform.product_class()
                    ),
                ))?;
            }
        }
        descriptor.hardware.set_serial_count(&universe, serial_count);
    }

    if let Some(keep) = &edit.delete_other_profiles {
        if !universe.contains(keep) {
            return Err(Error::not_found("profile", keep.clone()));
        }
        descriptor.hardware.delete_all_other_profiles(keep, &universe);
        descriptor.deployment.retain_only(keep);
    }

    Ok(())
}

/// Set product identity fields on the primary `ProductSection`,
/// creating one if the descriptor has none yet (spec §4.4 edit-product).
pub fn edit_product(
    descriptor: &mut Descriptor,
    product: Option<String>,
    vendor: Option<String>,
    version: Option<String>,
    full_version: Option<String>,
    class: Option<String>,
) {
    let section = descriptor
        .product
        .get_or_insert_with(crate::descriptor::product::ProductSection::default);
    section.set_product_info(product, vendor, version, full_version, class);
}

/// Apply a batch of `(key, value, type)` property edits (spec §4.4
/// edit-properties): creates missing properties with default type
/// `string`, validates against qualifiers, and is idempotent.
pub fn edit_properties(descriptor: &mut Descriptor, properties: &[(String, String, Option<PropertyType>)]) -> Result<()> {
    let section = descriptor
        .product
        .get_or_insert_with(crate::descriptor::product::ProductSection::default);
    for (key, value, type_) in properties {
        section.set_property(key, value.clone(), *type_)?;
    }
    Ok(())
}

/// Add a file to `References`, returning its final (possibly
/// disambiguated) file-id. Replacing an existing id requires `replace`
/// (spec §4.4 add-file).
pub fn add_file(
    descriptor: &mut Descriptor,
    id_base: &str,
    href: &str,
    size: Option<u64>,
    replace: bool,
) -> Result<String> {
    let id = if replace {
        id_base.to_string()
    } else {
        descriptor.references.unique_id(id_base)
    };
    descriptor.references.add_file(id.clone(), href, size, replace)?;
    Ok(id)
}

/// Remove a file by id and/or href (spec §4.4 remove-file): errors if
/// the single identifier given matches nothing, or if both are given
/// but resolve to different entries. Detaches (does not delete) any
/// `Disk` referencing it and clears any disk-drive item's
/// `HostResource` that pointed at the removed disk.
pub fn remove_file(descriptor: &mut Descriptor, id: Option<&str>, href: Option<&str>) -> Result<()> {
    let resolved_id = match (id, href) {
        (Some(id), Some(href)) => {
            let entry = descriptor
                .references
                .file(id)
                .ok_or_else(|| Error::not_found("file", id))?;
            if entry.href != href {
                return Err(Error::invalid_input(format!(
                    "file id '{id}' and href '{href}' refer to different entries"
                )));
            }
            id.to_string()
        }
        (Some(id), None) => {
            descriptor
                .references
                .file(id)
                .ok_or_else(|| Error::not_found("file", id))?;
            id.to_string()
        }
        (None, Some(href)) => descriptor
            .references
            .file_by_href(href)
            .ok_or_else(|| Error::not_found("file", href))?
            .id
            .clone(),
        (None, None) => return Err(Error::invalid_input("remove-file requires an id or an href")),
    };

    descriptor.references.remove_file(&resolved_id)?;

    let universe = descriptor.profile_universe();
    let affected_disks: Vec<String> = descriptor
        .disks
        .disks()
        .iter()
        .filter(|d| d.file_ref.as_deref() == Some(resolved_id.as_str()))
        .map(|d| d.disk_id.clone())
        .collect();
    descriptor.disks.detach_file_ref(&resolved_id);
    for disk_id in affected_disks {
        let host_resource = format!("ovf:/disk/{disk_id}");
        descriptor.hardware.clear_disk_host_resource(&host_resource, &universe);
    }

    Ok(())
}

/// Parameters for adding a disk (spec §4.3.5 add-disk, §8 scenario 4).
#[derive(Debug, Clone)]
pub struct AddDiskSpec {
    pub disk_id_base: String,
    pub href: String,
    pub size: Option<u64>,
    pub capacity: String,
    pub capacity_allocation_units: Option<String>,
    pub format: Option<String>,
    /// Explicit controller InstanceID, or `None` to use the platform
    /// default controller type.
    pub controller_instance_id: Option<u32>,
    /// Explicit address on the controller, or `None` to pick the first
    /// unused one.
    pub address_on_parent: Option<String>,
}

/// Attach a new disk: creates `File` and `Disk` entries and a
/// disk-drive hardware item, replacing any existing item already at
/// the chosen (controller, address) (spec §4.3.5).
pub fn add_disk(descriptor: &mut Descriptor, spec: AddDiskSpec) -> Result<u32> {
    let universe = descriptor.profile_universe();
    let platform = platform::lookup(descriptor.product.as_ref().and_then(|p| p.class.as_deref()));

    let controller_instance_id = match spec.controller_instance_id {
        Some(id) => id,
        None => {
            let wanted = platform.default_disk_controller();
            descriptor
                .hardware
                .items_of_type(wanted)
                .next()
                .map(|i| i.instance_id)
                .ok_or_else(|| Error::not_found("controller", format!("{wanted:?}")))?
        }
    };

    let address_on_parent = match spec.address_on_parent {
        Some(a) => a,
        None => {
            let used = descriptor.hardware.used_addresses(controller_instance_id);
            (0u32..)
                .map(|n| n.to_string())
                .find(|a| !used.contains(a))
                .expect("unbounded address search always finds a free slot")
        }
    };

    let file_id = descriptor.references.unique_id(&spec.disk_id_base);
    descriptor.references.add_file(file_id.clone(), spec.href.clone(), spec.size, true)?;

    let disk_id = descriptor.disks.unique_id(&spec.disk_id_base);
    descriptor.disks.add_disk(DiskEntry {
        disk_id: disk_id.clone(),
        file_ref: Some(file_id),
        capacity: spec.capacity,
        capacity_allocation_units: spec.capacity_allocation_units,
        format: spec.format,
        populated_size: None,
    });

    let host_resource = format!("ovf:/disk/{disk_id}");
    descriptor
        .hardware
        .add_disk_item(controller_instance_id, &address_on_parent, &host_resource, &universe)
}

/// Attach a caller-supplied bootstrap-config image (already synthesized
/// by the external ISO/FAT-image collaborator named in spec.md §1) as a
/// package member, wiring it to a CD-ROM or hard-disk drive per the
/// platform's bootstrap medium (spec §4.5).
pub fn inject_config(descriptor: &mut Descriptor, href: &str, size: Option<u64>) -> Result<()> {
    let universe = descriptor.profile_universe();
    let platform = platform::lookup(descriptor.product.as_ref().and_then(|p| p.class.as_deref()));

    let file_id = descriptor.references.unique_id("config");
    descriptor.references.add_file(file_id.clone(), href, size, true)?;

    match platform.bootstrap_medium() {
        platform::BootstrapMedium::CdRom => {
            let controller_instance_id = descriptor
                .hardware
                .items_of_type(ResourceType::IdeController)
                .next()
                .map(|i| i.instance_id)
                .ok_or_else(|| Error::not_found("controller", "IdeController"))?;
            let used = descriptor.hardware.used_addresses(controller_instance_id);
            let address = (0u32..)
                .map(|n| n.to_string())
                .find(|a| !used.contains(a))
                .expect("unbounded address search always finds a free slot");
            let host_resource = format!("ovf:/file/{file_id}");
            descriptor
                .hardware
                .add_cdrom_item(controller_instance_id, &address, &host_resource, &universe)?;
        }
        platform::BootstrapMedium::HardDisk => {
            let spec = AddDiskSpec {
                disk_id_base: "bootstrap-config".to_string(),
                href: href.to_string(),
                size,
                capacity: "1".to_string(),
                capacity_allocation_units: Some("byte * 2^20".to_string()),
                format: None,
                controller_instance_id: None,
                address_on_parent: None,
            };
            add_disk(descriptor, spec)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn sample_descriptor() -> Descriptor {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1" xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1" xmlns:rasd="http://example/rasd">
  <References>
    <File ovf:id="file1" ovf:href="disk1.vmdk" ovf:size="1024"/>
  </References>
  <DiskSection>
    <Disk ovf:diskId="vmdisk1" ovf:fileRef="file1" ovf:capacity="40" ovf:capacityAllocationUnits="byte * 2^30"/>
  </DiskSection>
  <NetworkSection>
    <Network ovf:name="VM Network"/>
  </NetworkSection>
  <DeploymentOptionSection>
    <Configuration ovf:id="1CPU-4GB" ovf:default="true"><Label>1 vCPU</Label></Configuration>
    <Configuration ovf:id="2CPU-4GB"><Label>2 vCPU</Label></Configuration>
  </DeploymentOptionSection>
  <VirtualSystem ovf:id="vm">
    <VirtualHardwareSection>
      <Item configuration="1CPU-4GB">
        <rasd:ResourceType>3</rasd:ResourceType>
        <rasd:InstanceID>1</rasd:InstanceID>
        <rasd:VirtualQuantity>1</rasd:VirtualQuantity>
      </Item>
      <Item configuration="2CPU-4GB">
        <rasd:ResourceType>3</rasd:ResourceType>
        <rasd:InstanceID>1</rasd:InstanceID>
        <rasd:VirtualQuantity>2</rasd:VirtualQuantity>
      </Item>
      <Item>
        <rasd:ResourceType>4</rasd:ResourceType>
        <rasd:InstanceID>2</rasd:InstanceID>
        <rasd:VirtualQuantity>4096</rasd:VirtualQuantity>
      </Item>
      <Item>
        <rasd:ResourceType>6</rasd:ResourceType>
        <rasd:InstanceID>3</rasd:InstanceID>
        <rasd:ElementName>SCSI Controller</rasd:ElementName>
      </Item>
      <Item>
        <rasd:ResourceType>17</rasd:ResourceType>
        <rasd:InstanceID>4</rasd:InstanceID>
        <rasd:Parent>3</rasd:Parent>
        <rasd:AddressOnParent>0</rasd:AddressOnParent>
        <rasd:HostResource>ovf:/disk/vmdisk1</rasd:HostResource>
      </Item>
    </VirtualHardwareSection>
    <ProductSection ovf:class="com.cisco.csr1000v">
      <Product>CSR1000V</Product>
    </ProductSection>
  </VirtualSystem>
</Envelope>"#;
        Descriptor::parse(xml).unwrap()
    }

    #[test]
    fn test_edit_hardware_scoped_cpu_and_memory() {
        let mut descriptor = sample_descriptor();
        let mut session = Session::forced();
        apply_hardware_edit(
            &mut descriptor,
            &HardwareEdit {
                profile: Some("1CPU-4GB".to_string()),
                cpus: Some(1),
                memory_mb: Some(8192),
                ..Default::default()
            },
            &mut session,
        )
        .unwrap();

        let cpu = descriptor.hardware.item(1).unwrap();
        assert_eq!(cpu.value_for("VirtualQuantity", "1CPU-4GB"), Some("1"));
        assert_eq!(cpu.value_for("VirtualQuantity", "2CPU-4GB"), Some("2"));

        let memory = descriptor
            .hardware
            .items_of_type(ResourceType::Memory)
            .next()
            .unwrap();
        assert_eq!(memory.value_for("VirtualQuantity", "1CPU-4GB"), Some("8192"));
        assert_eq!(memory.value_for("VirtualQuantity", "2CPU-4GB"), Some("4096"));
    }

    #[test]
    fn test_edit_hardware_out_of_bounds_cpu_requires_confirmation() {
        let mut descriptor = sample_descriptor();
        let mut session = Session::new(Box::new(|_| false));
        let result = apply_hardware_edit(
            &mut descriptor,
            &HardwareEdit {
                cpus: Some(3),
                ..Default::default()
            },
            &mut session,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_edit_hardware_unknown_profile_is_not_found() {
        let mut descriptor = sample_descriptor();
        let mut session = Session::forced();
        let result = apply_hardware_edit(
            &mut descriptor,
            &HardwareEdit {
                profile: Some("missing".to_string()),
                cpus: Some(1),
                ..Default::default()
            },
            &mut session,
        );
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_delete_other_profiles_collapses_deployment() {
        let mut descriptor = sample_descriptor();
        let mut session = Session::forced();
        apply_hardware_edit(
            &mut descriptor,
            &HardwareEdit {
                delete_other_profiles: Some("1CPU-4GB".to_string()),
                ..Default::default()
            },
            &mut session,
        )
        .unwrap();
        assert_eq!(descriptor.deployment.profiles().len(), 1);
        assert_eq!(descriptor.deployment.profiles()[0].id, "1CPU-4GB");
    }

    #[test]
    fn test_edit_product_sets_fields() {
        let mut descriptor = sample_descriptor();
        edit_product(
            &mut descriptor,
            Some("New Product".to_string()),
            None,
            None,
            None,
            None,
        );
        assert_eq!(descriptor.product.as_ref().unwrap().product.as_deref(), Some("New Product"));
    }

    #[test]
    fn test_edit_properties_creates_and_is_idempotent() {
        let mut descriptor = sample_descriptor();
        let props = vec![("mgmt-ipv4-addr".to_string(), "10.1.1.100/24".to_string(), None)];
        edit_properties(&mut descriptor, &props).unwrap();
        let once = descriptor.product.clone();
        edit_properties(&mut descriptor, &props).unwrap();
        assert_eq!(
            descriptor.product.as_ref().unwrap().property("mgmt-ipv4-addr"),
            once.as_ref().unwrap().property("mgmt-ipv4-addr")
        );
    }

    #[test]
    fn test_add_file_then_remove_file() {
        let mut descriptor = sample_descriptor();
        let id = add_file(&mut descriptor, "extra", "extra.txt", Some(10), false).unwrap();
        assert!(descriptor.references.file(&id).is_some());
        remove_file(&mut descriptor, Some(&id), None).unwrap();
        assert!(descriptor.references.file(&id).is_none());
    }

    #[test]
    fn test_remove_file_not_found() {
        let mut descriptor = sample_descriptor();
        let result = remove_file(&mut descriptor, Some("nope"), None);
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_remove_file_mismatched_id_and_href_errors() {
        let mut descriptor = sample_descriptor();
        let result = remove_file(&mut descriptor, Some("file1"), Some("other.vmdk"));
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_remove_file_detaches_disk_drive() {
        let mut descriptor = sample_descriptor();
        remove_file(&mut descriptor, Some("file1"), None).unwrap();
        assert_eq!(descriptor.disks.disk("vmdisk1").unwrap().file_ref, None);
        let drive = descriptor.hardware.item(4).unwrap();
        assert_eq!(drive.value_for("HostResource", "1CPU-4GB"), None);
    }

    #[test]
    fn test_add_disk_attaches_to_explicit_controller_and_address() {
        let mut descriptor = sample_descriptor();
        let id = add_disk(
            &mut descriptor,
            AddDiskSpec {
                disk_id_base: "vmdisk2".to_string(),
                href: "disk2.vmdk".to_string(),
                size: Some(2048),
                capacity: "80".to_string(),
                capacity_allocation_units: Some("byte * 2^30".to_string()),
                format: None,
                controller_instance_id: Some(3),
                address_on_parent: Some("1".to_string()),
            },
        )
        .unwrap();
        let drive = descriptor.hardware.item(id).unwrap();
        assert_eq!(drive.value_for("Parent", "1CPU-4GB"), Some("3"));
        assert_eq!(drive.value_for("AddressOnParent", "1CPU-4GB"), Some("1"));
        assert!(id > 4);
    }

    #[test]
    fn test_add_disk_picks_first_unused_address() {
        let mut descriptor = sample_descriptor();
        let id = add_disk(
            &mut descriptor,
            AddDiskSpec {
                disk_id_base: "vmdisk2".to_string(),
                href: "disk2.vmdk".to_string(),
                size: None,
                capacity: "80".to_string(),
                capacity_allocation_units: None,
                format: None,
                controller_instance_id: Some(3),
                address_on_parent: None,
            },
        )
        .unwrap();
        let drive = descriptor.hardware.item(id).unwrap();
        assert_eq!(drive.value_for("AddressOnParent", "1CPU-4GB"), Some("1"));
    }

    #[test]
    fn test_inject_config_attaches_cdrom_for_csr1000v() {
        let mut descriptor = sample_descriptor();
        inject_config(&mut descriptor, "iosxe_config.iso", Some(4096)).unwrap();
        let cdrom = descriptor
            .hardware
            .items_of_type(ResourceType::CdDrive)
            .next()
            .unwrap();
        assert!(cdrom.value_for("HostResource", "1CPU-4GB").unwrap().starts_with("ovf:/file/"));
    }
}
