//! Virtual hardware: the configuration-profile factorization engine.
//!
//! [`profile::ProfileSet`] is the currency the rest of this module
//! trades in; [`item::LogicalItem`] aggregates the flat `Item` XML
//! elements that share an InstanceID; [`section::HardwareSection`]
//! drives ingest, emit, and the high-level edit operations.

pub mod item;
pub mod profile;
pub mod section;

pub use item::{LogicalItem, ResourceType};
pub use profile::ProfileSet;
pub use section::HardwareSection;
