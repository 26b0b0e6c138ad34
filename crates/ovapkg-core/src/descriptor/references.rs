//! The `References` section: every file the package carries alongside
//! the descriptor, keyed by a package-unique file-id.

use crate::descriptor::xmltree::Element;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: String,
    pub href: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct References {
    files: Vec<FileEntry>,
}

impl References {
    pub fn parse(section: &Element) -> Result<Self> {
        let mut files = Vec::new();
        for file_el in section.child_elements().filter(|e| e.local_name() == "File") {
            let id = file_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("id"))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::invalid_input("File element missing ovf:id"))?;
            let href = file_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("href"))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::invalid_input("File element missing ovf:href"))?;
            let size = file_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("size"))
                .and_then(|(_, v)| v.parse().ok());
            files.push(FileEntry { id, href, size });
        }
        Ok(Self { files })
    }

    pub fn emit(&self) -> Element {
        let mut section = Element::new("References");
        for file in &self.files {
            let mut el = Element::new("File");
            el.set_attr("ovf:id", file.id.clone());
            el.set_attr("ovf:href", file.href.clone());
            if let Some(size) = file.size {
                el.set_attr("ovf:size", size.to_string());
            }
            el.sort_attrs_alphabetically();
            section.push_child(crate::descriptor::xmltree::Node::Element(el));
        }
        section
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn file(&self, id: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn file_by_href(&self, href: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.href == href)
    }

    /// Add a new file entry, or replace an existing one sharing the
    /// same id if `replace` is set. `id` collision without `replace`
    /// is a conflict (spec §4.4 "add file").
    pub fn add_file(&mut self, id: impl Into<String>, href: impl Into<String>, size: Option<u64>, replace: bool) -> Result<()> {
        let id = id.into();
        if let Some(pos) = self.files.iter().position(|f| f.id == id) {
            if !replace {
                return Err(Error::conflict(format!("file id '{id}' already exists")));
            }
            self.files[pos] = FileEntry { id, href: href.into(), size };
            return Ok(());
        }
        self.files.push(FileEntry { id, href: href.into(), size });
        Ok(())
    }

    pub fn remove_file(&mut self, id: &str) -> Result<FileEntry> {
        let pos = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| Error::not_found("file", id))?;
        Ok(self.files.remove(pos))
    }

    /// A file-id not currently in use, derived from `base` by
    /// appending a numeric suffix if needed.
    pub fn unique_id(&self, base: &str) -> String {
        if self.file(base).is_none() {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if self.file(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}
