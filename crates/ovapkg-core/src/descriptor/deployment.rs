//! `DeploymentOptionSection`: the configuration profiles a VM exposes,
//! and the source of the hardware engine's profile universe.

use crate::descriptor::xmltree::{Element, Node};
use crate::error::Result;
use crate::hardware::profile::{ProfileSet, NO_PROFILE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationProfile {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentOptions {
    profiles: Vec<ConfigurationProfile>,
}

impl DeploymentOptions {
    pub fn parse(section: &Element) -> Result<Self> {
        let mut profiles = Vec::new();
        for cfg_el in section.child_elements().filter(|e| e.local_name() == "Configuration") {
            let id = cfg_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("id"))
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let is_default = cfg_el
                .attrs
                .iter()
                .find(|(k, _)| k.split(':').last() == Some("default"))
                .map(|(_, v)| v == "true")
                .unwrap_or(false);
            profiles.push(ConfigurationProfile {
                id,
                label: cfg_el.child_local("Label").map(|e| e.text()),
                description: cfg_el.child_local("Description").map(|e| e.text()),
                is_default,
            });
        }
        Ok(Self { profiles })
    }

    pub fn emit(&self) -> Element {
        let mut section = Element::new("DeploymentOptionSection");
        for profile in &self.profiles {
            let mut el = Element::new("Configuration");
            el.set_attr("ovf:id", profile.id.clone());
            if profile.is_default {
                el.set_attr("ovf:default", "true");
            }
            if let Some(label) = &profile.label {
                let mut label_el = Element::new("Label");
                label_el.set_text(label.clone());
                el.push_child(Node::Element(label_el));
            }
            if let Some(desc) = &profile.description {
                let mut desc_el = Element::new("Description");
                desc_el.set_text(desc.clone());
                el.push_child(Node::Element(desc_el));
            }
            el.sort_attrs_alphabetically();
            section.push_child(Node::Element(el));
        }
        section
    }

    pub fn profiles(&self) -> &[ConfigurationProfile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.iter().any(|p| p.id == id)
    }

    /// The full profile universe: declared profile ids, or the
    /// implicit "no profile" sentinel if none are declared.
    pub fn universe(&self) -> ProfileSet {
        if self.profiles.is_empty() {
            ProfileSet::single(NO_PROFILE)
        } else {
            ProfileSet::from_ids(self.profiles.iter().map(|p| p.id.clone()))
        }
    }

    /// Drop every profile but `keep`, making it the sole (default)
    /// profile (spec §4.3.5 delete-all-other-profiles).
    pub fn retain_only(&mut self, keep: &str) {
        self.profiles.retain(|p| p.id == keep);
        if let Some(p) = self.profiles.first_mut() {
            p.is_default = true;
        }
    }
}
