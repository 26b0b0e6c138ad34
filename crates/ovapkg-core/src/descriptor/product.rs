//! `ProductSection`: product identity and environment properties.

use crate::descriptor::xmltree::{Element, Node};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Boolean,
    Int,
}

impl PropertyType {
    pub fn parse(s: &str) -> Self {
        match s {
            "boolean" => PropertyType::Boolean,
            "int" | "int8" | "int16" | "int32" | "int64" => PropertyType::Int,
            _ => PropertyType::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Boolean => "boolean",
            PropertyType::Int => "int",
        }
    }
}

/// A qualifier restricting a property's legal values (`ovf:qualifiers`
/// attribute, e.g. `MaxLen(255)` or `ValueMap(a,b,c)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    MaxLen(usize),
    ValueMap(Vec<String>),
}

fn parse_qualifiers(raw: &str) -> Vec<Qualifier> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if let Some(inner) = part.strip_prefix("MaxLen(").and_then(|s| s.strip_suffix(')')) {
            if let Ok(n) = inner.parse() {
                out.push(Qualifier::MaxLen(n));
            }
        } else if let Some(inner) = part.strip_prefix("ValueMap(").and_then(|s| s.strip_suffix(')')) {
            out.push(Qualifier::ValueMap(
                inner.split(';').map(str::trim).map(str::to_string).collect(),
            ));
        }
    }
    out
}

fn render_qualifiers(qualifiers: &[Qualifier]) -> Option<String> {
    if qualifiers.is_empty() {
        return None;
    }
    let parts: Vec<String> = qualifiers
        .iter()
        .map(|q| match q {
            Qualifier::MaxLen(n) => format!("MaxLen({n})"),
            Qualifier::ValueMap(values) => format!("ValueMap({})", values.join(";")),
        })
        .collect();
    Some(parts.join(","))
}

fn validate(value: &str, qualifiers: &[Qualifier]) -> Result<()> {
    for qualifier in qualifiers {
        match qualifier {
            Qualifier::MaxLen(max) => {
                if value.chars().count() > *max {
                    return Err(Error::invalid_input(format!(
                        "value exceeds MaxLen({max}): '{value}'"
                    )));
                }
            }
            Qualifier::ValueMap(allowed) => {
                if !allowed.iter().any(|a| a == value) {
                    return Err(Error::invalid_input(format!(
                        "value '{value}' is not one of {allowed:?}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub type_: PropertyType,
    /// `None` distinguishes "unset" from a literal empty string.
    pub value: Option<String>,
    pub user_configurable: bool,
    pub password: bool,
    pub qualifiers: Vec<Qualifier>,
    pub label: Option<String>,
    pub description: Option<String>,
}

impl Property {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_: PropertyType::String,
            value: None,
            user_configurable: false,
            password: false,
            qualifiers: Vec::new(),
            label: None,
            description: None,
        }
    }

    /// Set the value, applying qualifier validation first.
    pub fn set_value(&mut self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        validate(&value, &self.qualifiers)?;
        self.value = Some(value);
        Ok(())
    }
}

fn local_attr<'a>(el: &'a Element, local: &str) -> Option<&'a str> {
    el.attrs
        .iter()
        .find(|(k, _)| k.split(':').last() == Some(local))
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, Default)]
pub struct ProductSection {
    pub class: Option<String>,
    pub product: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub full_version: Option<String>,
    pub product_url: Option<String>,
    pub vendor_url: Option<String>,
    properties: Vec<Property>,
}

impl ProductSection {
    pub fn parse(section: &Element) -> Result<Self> {
        let class = local_attr(section, "class").map(str::to_string);
        let product = section.child_local("Product").map(|e| e.text());
        let vendor = section.child_local("Vendor").map(|e| e.text());
        let version = section.child_local("Version").map(|e| e.text());
        let full_version = section.child_local("FullVersion").map(|e| e.text());
        let product_url = section.child_local("ProductUrl").map(|e| e.text());
        let vendor_url = section.child_local("VendorUrl").map(|e| e.text());

        let mut properties = Vec::new();
        for prop_el in section.child_elements().filter(|e| e.local_name() == "Property") {
            let key = local_attr(prop_el, "key")
                .ok_or_else(|| Error::invalid_input("Property element missing ovf:key"))?
                .to_string();
            let type_ = PropertyType::parse(local_attr(prop_el, "type").unwrap_or("string"));
            let value = local_attr(prop_el, "value").map(str::to_string);
            let user_configurable = local_attr(prop_el, "userConfigurable") == Some("true");
            let password = local_attr(prop_el, "password") == Some("true");
            let qualifiers = local_attr(prop_el, "qualifiers").map(parse_qualifiers).unwrap_or_default();
            let label = prop_el.child_local("Label").map(|e| e.text());
            let description = prop_el.child_local("Description").map(|e| e.text());
            properties.push(Property {
                key,
                type_,
                value,
                user_configurable,
                password,
                qualifiers,
                label,
                description,
            });
        }

        Ok(Self {
            class,
            product,
            vendor,
            version,
            full_version,
            product_url,
            vendor_url,
            properties,
        })
    }

    pub fn emit(&self) -> Element {
        let mut section = Element::new("ProductSection");
        if let Some(class) = &self.class {
            section.set_attr("ovf:class", class.clone());
        }
        for (name, value) in [
            ("Product", &self.product),
            ("Vendor", &self.vendor),
            ("Version", &self.version),
            ("FullVersion", &self.full_version),
            ("ProductUrl", &self.product_url),
            ("VendorUrl", &self.vendor_url),
        ] {
            if let Some(value) = value {
                let mut el = Element::new(name);
                el.set_text(value.clone());
                section.push_child(Node::Element(el));
            }
        }
        for prop in &self.properties {
            let mut el = Element::new("Property");
            el.set_attr("ovf:key", prop.key.clone());
            el.set_attr("ovf:type", prop.type_.as_str());
            if let Some(value) = &prop.value {
                el.set_attr("ovf:value", value.clone());
            }
            if prop.user_configurable {
                el.set_attr("ovf:userConfigurable", "true");
            }
            if prop.password {
                el.set_attr("ovf:password", "true");
            }
            if let Some(qualifiers) = render_qualifiers(&prop.qualifiers) {
                el.set_attr("ovf:qualifiers", qualifiers);
            }
            if let Some(label) = &prop.label {
                let mut label_el = Element::new("Label");
                label_el.set_text(label.clone());
                el.push_child(Node::Element(label_el));
            }
            if let Some(desc) = &prop.description {
                let mut desc_el = Element::new("Description");
                desc_el.set_text(desc.clone());
                el.push_child(Node::Element(desc_el));
            }
            el.sort_attrs_alphabetically();
            section.push_child(Node::Element(el));
        }
        section
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    pub fn set_product_info(
        &mut self,
        product: Option<String>,
        vendor: Option<String>,
        version: Option<String>,
        full_version: Option<String>,
        class: Option<String>,
    ) {
        if product.is_some() {
            self.product = product;
        }
        if vendor.is_some() {
            self.vendor = vendor;
        }
        if version.is_some() {
            self.version = version;
        }
        if full_version.is_some() {
            self.full_version = full_version;
        }
        if class.is_some() {
            self.class = class;
        }
    }

    /// Set a property value, validating against its qualifiers;
    /// creates the property with default type `string` if absent.
    pub fn set_property(&mut self, key: &str, value: String, type_: Option<PropertyType>) -> Result<()> {
        if let Some(pos) = self.properties.iter().position(|p| p.key == key) {
            if let Some(type_) = type_ {
                self.properties[pos].type_ = type_;
            }
            self.properties[pos].set_value(value)
        } else {
            let mut prop = Property::new(key);
            prop.type_ = type_.unwrap_or(PropertyType::String);
            prop.set_value(value)?;
            self.properties.push(prop);
            Ok(())
        }
    }
}
