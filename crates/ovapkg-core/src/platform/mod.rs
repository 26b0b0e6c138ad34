//! Platform registry: product-class-specific defaults and hardware
//! bounds (spec §4.5). "Inheritance of platform classes" in the source
//! becomes a trait with one implementation per product-class, held by
//! key in a static registry; [`Unknown`] is the default.

use crate::hardware::item::ResourceType;

/// Where bootstrap configuration is delivered to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMedium {
    CdRom,
    HardDisk,
}

/// The outcome of validating a hardware value against a platform's
/// bounds: `Ok(None)` if within bounds, `Ok(Some(message))` if a
/// warning should be raised (still allowed, pending confirmation).
pub type Validation = Result<Option<String>, String>;

/// Platform-specific defaults and validation for one product-class.
pub trait Platform: Send + Sync {
    fn product_class(&self) -> &'static str;

    /// Default NIC `ResourceSubType` (e.g. `"E1000"`, `"VMXNET3"`).
    fn default_nic_subtype(&self) -> &'static str {
        "E1000"
    }

    /// Allowed CPU counts, `None` meaning unrestricted.
    fn allowed_cpu_counts(&self) -> Option<&'static [u32]> {
        None
    }

    /// Allowed RAM range in megabytes, inclusive, `None` meaning
    /// unrestricted.
    fn allowed_memory_mb_range(&self) -> Option<(u64, u64)> {
        None
    }

    fn max_nic_count(&self) -> Option<u32> {
        None
    }

    fn max_serial_count(&self) -> Option<u32> {
        None
    }

    fn bootstrap_medium(&self) -> BootstrapMedium {
        BootstrapMedium::CdRom
    }

    /// Filename template for bootstrap config (may contain `{}`, same
    /// wildcard convention as hardware element values).
    fn bootstrap_filename(&self) -> &'static str {
        "config.iso"
    }

    /// Validate a CPU count, returning a warning message if it falls
    /// outside the platform's allowed set.
    fn validate_cpu_count(&self, count: u32) -> Validation {
        match self.allowed_cpu_counts() {
            Some(allowed) if !allowed.contains(&count) => Ok(Some(format!(
                "{} does not typically support {count} vCPUs (allowed: {allowed:?})",
                self.product_class()
            ))),
            _ => Ok(None),
        }
    }

    /// Validate a RAM size in megabytes.
    fn validate_memory_mb(&self, megabytes: u64) -> Validation {
        match self.allowed_memory_mb_range() {
            Some((min, max)) if megabytes < min || megabytes > max => Ok(Some(format!(
                "{} allows {min}-{max}MB RAM, got {megabytes}MB",
                self.product_class()
            ))),
            _ => Ok(None),
        }
    }

    /// Validate a NIC count against this platform's maximum.
    fn validate_nic_count(&self, count: u32) -> Validation {
        match self.max_nic_count() {
            Some(max) if count > max => Ok(Some(format!(
                "{} supports at most {max} NICs, requested {count}",
                self.product_class()
            ))),
            _ => Ok(None),
        }
    }

    /// Preferred controller resource type for a newly attached disk.
    fn default_disk_controller(&self) -> ResourceType {
        ResourceType::ScsiController
    }
}

/// The permissive default for any unrecognized product-class.
pub struct Unknown;

impl Platform for Unknown {
    fn product_class(&self) -> &'static str {
        "unknown"
    }
}

/// Cisco CSR1000V cloud router: the platform named in spec.md's
/// worked example.
pub struct Csr1000v;

impl Platform for Csr1000v {
    fn product_class(&self) -> &'static str {
        "com.cisco.csr1000v"
    }

    fn default_nic_subtype(&self) -> &'static str {
        "E1000"
    }

    fn allowed_cpu_counts(&self) -> Option<&'static [u32]> {
        Some(&[1, 2, 4, 8])
    }

    fn allowed_memory_mb_range(&self) -> Option<(u64, u64)> {
        Some((2048, 16384))
    }

    fn max_nic_count(&self) -> Option<u32> {
        Some(10)
    }

    fn max_serial_count(&self) -> Option<u32> {
        Some(1)
    }

    fn bootstrap_medium(&self) -> BootstrapMedium {
        BootstrapMedium::CdRom
    }

    fn bootstrap_filename(&self) -> &'static str {
        "iosxe_config.txt"
    }

    fn default_disk_controller(&self) -> ResourceType {
        ResourceType::IdeController
    }
}

/// Look up a platform by its ProductSection product-class string,
/// falling back to [`Unknown`] for anything not registered.
pub fn lookup(product_class: Option<&str>) -> Box<dyn Platform> {
    match product_class {
        Some("com.cisco.csr1000v") => Box::new(Csr1000v),
        _ => Box::new(Unknown),
    }
}
