//! The `NetworkSection`: named virtual networks NICs connect to.

use crate::descriptor::xmltree::{Element, Node};
use crate::error::Result;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSection {
    networks: Vec<NetworkEntry>,
}

impl NetworkSection {
    pub fn parse(section: &Element) -> Result<Self> {
        let mut networks = Vec::new();
        for net_el in section.child_elements().filter(|e| e.local_name() == "Network") {
            let name = net_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("name"))
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let description = net_el.child_local("Description").map(|e| e.text());
            networks.push(NetworkEntry { name, description });
        }
        Ok(Self { networks })
    }

    pub fn emit(&self) -> Element {
        let mut section = Element::new("NetworkSection");
        for net in &self.networks {
            let mut el = Element::new("Network");
            el.set_attr("ovf:name", net.name.clone());
            if let Some(desc) = &net.description {
                let mut desc_el = Element::new("Description");
                desc_el.set_text(desc.clone());
                el.push_child(Node::Element(desc_el));
            }
            el.sort_attrs_alphabetically();
            section.push_child(Node::Element(el));
        }
        section
    }

    pub fn networks(&self) -> &[NetworkEntry] {
        &self.networks
    }

    pub fn contains(&self, name: &str) -> bool {
        self.networks.iter().any(|n| n.name == name)
    }

    /// Ensure a network named `name` exists, creating a bare one (no
    /// description) if not.
    pub fn ensure(&mut self, name: &str) {
        if !self.contains(name) {
            self.networks.push(NetworkEntry {
                name: name.to_string(),
                description: None,
            });
        }
    }

    /// Drop every network not referenced by `used` (spec §4.3.5: "Unused
    /// Networks are deleted").
    pub fn retain_used(&mut self, used: &HashSet<String>) {
        self.networks.retain(|n| used.contains(&n.name));
    }
}
