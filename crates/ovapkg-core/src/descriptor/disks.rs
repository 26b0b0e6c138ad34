//! The `DiskSection`: virtual disk metadata, each optionally backed by
//! a file in [`super::references::References`].

use crate::descriptor::xmltree::Element;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    pub disk_id: String,
    pub file_ref: Option<String>,
    pub capacity: String,
    pub capacity_allocation_units: Option<String>,
    pub format: Option<String>,
    pub populated_size: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiskSection {
    disks: Vec<DiskEntry>,
}

fn local_attr<'a>(el: &'a Element, local: &str) -> Option<&'a str> {
    el.attrs
        .iter()
        .find(|(k, _)| k.split(':').last() == Some(local))
        .map(|(_, v)| v.as_str())
}

impl DiskSection {
    pub fn parse(section: &Element) -> Result<Self> {
        let mut disks = Vec::new();
        for disk_el in section.child_elements().filter(|e| e.local_name() == "Disk") {
            let disk_id = local_attr(disk_el, "diskId")
                .ok_or_else(|| Error::invalid_input("Disk element missing ovf:diskId"))?
                .to_string();
            let capacity = local_attr(disk_el, "capacity")
                .ok_or_else(|| Error::invalid_input("Disk element missing ovf:capacity"))?
                .to_string();
            disks.push(DiskEntry {
                disk_id,
                file_ref: local_attr(disk_el, "fileRef").map(str::to_string),
                capacity,
                capacity_allocation_units: local_attr(disk_el, "capacityAllocationUnits").map(str::to_string),
                format: local_attr(disk_el, "format").map(str::to_string),
                populated_size: local_attr(disk_el, "populatedSize").map(str::to_string),
            });
        }
        Ok(Self { disks })
    }

    pub fn emit(&self) -> Element {
        let mut section = Element::new("DiskSection");
        for disk in &self.disks {
            let mut el = Element::new("Disk");
            el.set_attr("ovf:diskId", disk.disk_id.clone());
            el.set_attr("ovf:capacity", disk.capacity.clone());
            if let Some(units) = &disk.capacity_allocation_units {
                el.set_attr("ovf:capacityAllocationUnits", units.clone());
            }
            if let Some(fileref) = &disk.file_ref {
                el.set_attr("ovf:fileRef", fileref.clone());
            }
            if let Some(format) = &disk.format {
                el.set_attr("ovf:format", format.clone());
            }
            if let Some(pop) = &disk.populated_size {
                el.set_attr("ovf:populatedSize", pop.clone());
            }
            el.sort_attrs_alphabetically();
            section.push_child(crate::descriptor::xmltree::Node::Element(el));
        }
        section
    }

    pub fn disks(&self) -> &[DiskEntry] {
        &self.disks
    }

    pub fn disk(&self, disk_id: &str) -> Option<&DiskEntry> {
        self.disks.iter().find(|d| d.disk_id == disk_id)
    }

    pub fn add_disk(&mut self, entry: DiskEntry) {
        self.disks.push(entry);
    }

    pub fn remove_disk(&mut self, disk_id: &str) -> Result<DiskEntry> {
        let pos = self
            .disks
            .iter()
            .position(|d| d.disk_id == disk_id)
            .ok_or_else(|| Error::not_found("disk", disk_id))?;
        Ok(self.disks.remove(pos))
    }

    /// Detach every disk referencing `file_id`, leaving it as an empty
    /// placeholder (used when the backing file is removed).
    pub fn detach_file_ref(&mut self, file_id: &str) {
        for disk in &mut self.disks {
            if disk.file_ref.as_deref() == Some(file_id) {
                disk.file_ref = None;
            }
        }
    }

    pub fn unique_id(&self, base: &str) -> String {
        if self.disk(base).is_none() {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if self.disk(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::xmltree;

    #[test]
    fn test_parse_disk_section() {
        let xml = br#"<DiskSection><Disk ovf:diskId="vmdisk1" ovf:fileRef="file1" ovf:capacity="40" ovf:capacityAllocationUnits="byte * 2^30" ovf:format="http://example/vmdk"/></DiskSection>"#;
        let (root, _) = xmltree::parse(xml).unwrap();
        let section = DiskSection::parse(&root).unwrap();
        let disk = section.disk("vmdisk1").unwrap();
        assert_eq!(disk.file_ref.as_deref(), Some("file1"));
        assert_eq!(disk.capacity, "40");
    }

    #[test]
    fn test_detach_file_ref() {
        let mut section = DiskSection::default();
        section.add_disk(DiskEntry {
            disk_id: "d1".into(),
            file_ref: Some("f1".into()),
            capacity: "10".into(),
            capacity_allocation_units: None,
            format: None,
            populated_size: None,
        });
        section.detach_file_ref("f1");
        assert_eq!(section.disk("d1").unwrap().file_ref, None);
    }

    #[test]
    fn test_remove_disk_not_found() {
        let mut section = DiskSection::default();
        assert!(matches!(section.remove_disk("missing"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_emit_round_trip() {
        let mut section = DiskSection::default();
        section.add_disk(DiskEntry {
            disk_id: "d1".into(),
            file_ref: Some("f1".into()),
            capacity: "10".into(),
            capacity_allocation_units: Some("byte * 2^30".into()),
            format: Some("fmt".into()),
            populated_size: None,
        });
        let el = section.emit();
        let reparsed = DiskSection::parse(&el).unwrap();
        assert_eq!(reparsed.disk("d1").unwrap().capacity, "10");
    }

    #[test]
    fn test_emit_attrs_are_alphabetical() {
        let mut section = DiskSection::default();
        section.add_disk(DiskEntry {
            disk_id: "d1".into(),
            file_ref: Some("f1".into()),
            capacity: "10".into(),
            capacity_allocation_units: Some("byte * 2^30".into()),
            format: Some("fmt".into()),
            populated_size: Some("5".into()),
        });
        let el = section.emit();
        let disk_el = el.child("Disk").unwrap();
        let keys: Vec<&str> = disk_el.attrs.iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_by_key(|k| k.split(':').last().unwrap_or(k));
        assert_eq!(keys, sorted);
    }
}
