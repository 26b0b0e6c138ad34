//! The OVF descriptor: parsed XML tree plus typed section handles.
//!
//! Known sections are lifted into [`references::References`],
//! [`disks::DiskSection`], [`network::NetworkSection`],
//! [`deployment::DeploymentOptions`], [`hardware::HardwareSection`]
//! (re-exported from [`crate::hardware`]) and [`product::ProductSection`].
//! Everything else in the envelope stays in the generic
//! [`xmltree::Element`] tree and round-trips untouched.

pub mod deployment;
pub mod disks;
pub mod network;
pub mod product;
pub mod references;
pub mod xmltree;

use xmltree::{Element, Node};

use crate::error::{Error, Result};
use crate::hardware::{HardwareSection, ProfileSet};

use deployment::DeploymentOptions;
use disks::DiskSection;
use network::NetworkSection;
use product::ProductSection;
use references::References;

/// The OVF specification version in effect, detected from the
/// envelope namespace. Parsing and serialization never attempt to
/// convert between versions (spec.md Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvfVersion {
    V0_9,
    V1,
    V2,
}

impl OvfVersion {
    /// The manifest digest algorithm mandated for this version
    /// (spec.md §6: SHA-1 for 0.x/1.x, SHA-256 for 2.x).
    pub fn manifest_algorithm(self) -> &'static str {
        match self {
            OvfVersion::V0_9 | OvfVersion::V1 => "SHA1",
            OvfVersion::V2 => "SHA256",
        }
    }
}

fn detect_version(root: &Element) -> OvfVersion {
    for (key, value) in &root.attrs {
        let local = key.split(':').last().unwrap_or(key);
        if local == "xmlns" || key.starts_with("xmlns:") {
            if value.contains("envelope/2") {
                return OvfVersion::V2;
            }
            if value.contains("envelope/0.9") || value.contains("/0.9/") {
                return OvfVersion::V0_9;
            }
        }
    }
    OvfVersion::V1
}

/// The parsed descriptor and its typed section handles.
pub struct Descriptor {
    root: Element,
    decl: Option<String>,
    pub version: OvfVersion,
    pub references: References,
    pub disks: DiskSection,
    pub networks: NetworkSection,
    pub deployment: DeploymentOptions,
    pub hardware: HardwareSection,
    pub product: Option<ProductSection>,
}

impl Descriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (root, decl) = xmltree::parse(bytes)?;
        if root.local_name() != "Envelope" {
            return Err(Error::invalid_input("descriptor root element is not Envelope"));
        }
        let version = detect_version(&root);

        let references = root
            .child_local("References")
            .map(References::parse)
            .transpose()?
            .unwrap_or_default();
        let disks = root
            .child_local("DiskSection")
            .map(DiskSection::parse)
            .transpose()?
            .unwrap_or_default();
        let networks = root
            .child_local("NetworkSection")
            .map(NetworkSection::parse)
            .transpose()?
            .unwrap_or_default();
        let deployment = root
            .child_local("DeploymentOptionSection")
            .map(DeploymentOptions::parse)
            .transpose()?
            .unwrap_or_default();

        let virtual_system = root
            .child_local("VirtualSystem")
            .ok_or_else(|| Error::invalid_input("descriptor missing VirtualSystem"))?;
        let hw_section = virtual_system
            .child_local("VirtualHardwareSection")
            .ok_or_else(|| Error::invalid_input("VirtualSystem missing VirtualHardwareSection"))?;

        let universe = deployment.universe();
        let hardware = HardwareSection::ingest(hw_section, &universe)?;
        let product = virtual_system
            .child_local("ProductSection")
            .map(ProductSection::parse)
            .transpose()?;

        tracing::debug!(
            version = ?version,
            items = hardware.items().len(),
            profiles = universe.len(),
            "parsed descriptor"
        );

        Ok(Self {
            root,
            decl,
            version,
            references,
            disks,
            networks,
            deployment,
            hardware,
            product,
        })
    }

    /// The full configuration-profile universe (spec.md GLOSSARY).
    pub fn profile_universe(&self) -> ProfileSet {
        self.deployment.universe()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut root = self.root.clone();

        replace_or_insert_child(&mut root, "References", self.references.emit());
        replace_or_insert_child(&mut root, "DiskSection", self.disks.emit());
        replace_or_insert_child(&mut root, "NetworkSection", self.networks.emit());
        if !self.deployment.is_empty() {
            replace_or_insert_child(&mut root, "DeploymentOptionSection", self.deployment.emit());
        }

        let universe = self.deployment.universe();
        let Some(vs) = root
            .children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|e| e.local_name() == "VirtualSystem")
        else {
            return Err(Error::invalid_input("descriptor missing VirtualSystem"));
        };

        let items = self.hardware.emit(&universe);
        replace_hardware_items(vs, items);
        if let Some(product) = &self.product {
            replace_or_insert_child(vs, "ProductSection", product.emit());
        }

        xmltree::serialize(&root, self.decl.as_deref())
    }
}

fn replace_or_insert_child(parent: &mut Element, local_name: &str, new_el: Element) {
    if let Some(pos) = parent
        .children
        .iter()
        .position(|n| matches!(n, Node::Element(e) if e.local_name() == local_name))
    {
        parent.children[pos] = Node::Element(new_el);
    } else {
        parent.push_child(Node::Element(new_el));
    }
}

fn replace_hardware_items(vs: &mut Element, items: Vec<Element>) {
    let Some(hw) = vs
        .children
        .iter_mut()
        .filter_map(Node::as_element_mut)
        .find(|e| e.local_name() == "VirtualHardwareSection")
    else {
        return;
    };
    hw.retain_children(|n| !matches!(n, Node::Element(e) if e.local_name() == "Item"));
    for item in items {
        hw.push_child(Node::Element(item));
    }
}
