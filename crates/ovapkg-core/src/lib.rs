//! ovapkg core library
//!
//! Provides the typed OVF descriptor model, the OVF-directory/OVA-TAR
//! package container, and the hardware edit operations built on top of
//! them.
//!
//! # Modules
//!
//! - `error` - Error types and Result alias
//! - `session` - Per-invocation confirmation/cancellation/workspace state
//! - `hardware` - Configuration-profile factorization engine
//! - `descriptor` - Parsed OVF envelope and its typed sections
//! - `platform` - Product-class hardware defaults and bounds
//! - `package` - OVF-directory vs OVA-TAR container handling
//! - `edit` - High-level edit operations over a `Descriptor`

pub mod descriptor;
pub mod edit;
pub mod error;
pub mod hardware;
pub mod package;
pub mod platform;
pub mod session;

pub use descriptor::Descriptor;
pub use error::{Error, Result};
pub use package::{Form, Package, PackageInfo};
pub use session::Session;
