//! Package: the OVF-directory-vs-OVA-TAR abstraction.
//!
//! Loads by probing the input path, streams member bytes without full
//! extraction for the TAR form (via a read-only [`memmap2::Mmap`]),
//! verifies and regenerates the manifest, and writes atomically
//! through a sibling scratch file when the output would overwrite an
//! open input (spec.md §4.1).

pub mod manifest;
pub mod tar;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::session::{Session, Warning, WarningCategory, Workspace};

use manifest::DigestAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Directory,
    Tar,
}

/// Read-only summary returned by [`Package::info`].
#[derive(Debug, Clone, Default)]
pub struct PackageInfo {
    pub product: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub profiles: Vec<String>,
    pub disks: Vec<String>,
    pub networks: Vec<String>,
    pub files: Vec<String>,
}

/// A loaded OVF package: either an exploded directory or an OVA TAR
/// archive, read via a zero-copy memory map.
pub struct Package {
    form: Form,
    path: PathBuf,
    descriptor_name: String,
    member_order: Vec<String>,
    mmap: Option<memmap2::Mmap>,
    tar_entries: Vec<tar::TarEntry>,
}

fn find_ovf_in_dir(dir: &Path) -> Result<String> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(e, dir))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, dir))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_ascii_lowercase().ends_with(".ovf") {
            return Ok(name);
        }
    }
    Err(Error::invalid_input(format!(
        "no .ovf descriptor found in directory '{}'",
        dir.display()
    )))
}

impl Package {
    /// Open a package, probing `path`: a directory or a bare `.ovf`
    /// file is DIRECTORY form; anything else is scanned as a TAR
    /// archive for its first `.ovf`-suffixed entry (spec.md §4.1
    /// relaxes the "descriptor must be first" rule for read
    /// compatibility).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.is_dir() {
            let descriptor_name = find_ovf_in_dir(path)?;
            return Ok(Self {
                form: Form::Directory,
                path: path.to_path_buf(),
                descriptor_name,
                member_order: Vec::new(),
                mmap: None,
                tar_entries: Vec::new(),
            });
        }

        let is_bare_descriptor = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("ovf"))
            .unwrap_or(false);
        if is_bare_descriptor {
            let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let descriptor_name = path
                .file_name()
                .ok_or_else(|| Error::invalid_input("descriptor path has no filename"))?
                .to_string_lossy()
                .to_string();
            return Ok(Self {
                form: Form::Directory,
                path: dir,
                descriptor_name,
                member_order: Vec::new(),
                mmap: None,
                tar_entries: Vec::new(),
            });
        }

        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| Error::io(e, path))?;
        let entries = tar::parse_entries(&mmap)?;
        let descriptor_name = entries
            .iter()
            .find(|e| e.name.to_ascii_lowercase().ends_with(".ovf"))
            .map(|e| e.name.clone())
            .ok_or_else(|| Error::invalid_input("no .ovf entry found in TAR archive"))?;
        if entries.iter().position(|e| e.name == descriptor_name) != Some(0) {
            tracing::warn!(descriptor = %descriptor_name, "descriptor is not the first TAR entry");
        }
        let member_order = entries.iter().map(|e| e.name.clone()).collect();

        tracing::debug!(path = %path.display(), members = entries.len(), "opened OVA package");

        Ok(Self {
            form: Form::Tar,
            path: path.to_path_buf(),
            descriptor_name,
            member_order,
            mmap: Some(mmap),
            tar_entries: entries,
        })
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor_name(&self) -> &str {
        &self.descriptor_name
    }

    pub fn member_names(&self) -> &[String] {
        &self.member_order
    }

    /// Read one member's bytes in full. For DIRECTORY form this opens
    /// the sibling file; for TAR form it slices the memory-mapped
    /// archive.
    pub fn read_member(&self, name: &str) -> Result<Vec<u8>> {
        match self.form {
            Form::Directory => {
                let full = self.path.join(name);
                std::fs::read(&full).map_err(|e| Error::io(e, full))
            }
            Form::Tar => {
                let mmap = self
                    .mmap
                    .as_ref()
                    .ok_or_else(|| Error::internal("TAR package opened without a memory map"))?;
                let entry = self
                    .tar_entries
                    .iter()
                    .find(|e| e.name == name)
                    .ok_or_else(|| Error::not_found("member", name))?;
                Ok(mmap[entry.offset..entry.offset + entry.size as usize].to_vec())
            }
        }
    }

    pub fn read_descriptor(&self) -> Result<Vec<u8>> {
        self.read_member(&self.descriptor_name)
    }

    fn manifest_member_name(&self) -> Option<String> {
        match self.form {
            Form::Tar => self.member_order.iter().find(|n| n.ends_with(".mf")).cloned(),
            Form::Directory => {
                std::fs::read_dir(&self.path).ok().and_then(|mut entries| {
                    entries.find_map(|e| {
                        let e = e.ok()?;
                        let name = e.file_name().to_string_lossy().to_string();
                        name.ends_with(".mf").then_some(name)
                    })
                })
            }
        }
    }

    /// Parse the manifest (if one is present) and compare its
    /// checksums against the members as currently stored. Returns an
    /// empty list if there is no manifest, or one entry per mismatch
    /// (spec.md §4.1: this is a warning, not a failure).
    pub fn verify_manifest(&self) -> Result<Vec<manifest::Mismatch>> {
        let Some(manifest_name) = self.manifest_member_name() else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8(self.read_member(&manifest_name)?)
            .map_err(|_| Error::invalid_input("manifest is not valid UTF-8"))?;
        let entries = manifest::parse(&text)?;

        let mut members = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Ok(data) = self.read_member(&entry.filename) {
                members.push((entry.filename.clone(), data));
            }
        }
        Ok(manifest::verify(&entries, &members))
    }

    /// Whether `target_path` resolves (by symlink/hardlink/path
    /// normalization) to this package's currently-open input.
    pub fn targets_self(&self, target_path: &Path) -> bool {
        match (std::fs::canonicalize(&self.path), std::fs::canonicalize(target_path)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Write a package out: computes the manifest, writes through a
    /// sibling scratch file when `self_overwrite` is set (routing
    /// around the open input), and lays out TAR entries in the
    /// mandated order (descriptor, manifest, then files in
    /// `References` order).
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        target_path: &Path,
        form: Form,
        self_overwrite: bool,
        descriptor_name: &str,
        descriptor_bytes: &[u8],
        file_members: &[(String, Vec<u8>)],
        algorithm: DigestAlgorithm,
        session: &mut Session,
    ) -> Result<()> {
        session.cancellation().check()?;

        let manifest_members: Vec<(String, Vec<u8>)> = std::iter::once((descriptor_name.to_string(), descriptor_bytes.to_vec()))
            .chain(file_members.iter().cloned())
            .collect();
        let manifest_text = manifest::generate(algorithm, &manifest_members);

        let workspace = if self_overwrite {
            Some(Workspace::sibling_of(target_path)?)
        } else {
            None
        };
        let write_target = workspace
            .as_ref()
            .map(|w| w.path().join("output"))
            .unwrap_or_else(|| target_path.to_path_buf());

        match form {
            Form::Tar => {
                let file = std::fs::File::create(&write_target).map_err(|e| Error::io(e, &write_target))?;
                let mut writer = std::io::BufWriter::new(file);
                tar::write_entry(&mut writer, descriptor_name, descriptor_bytes, 0)?;
                tar::write_entry(&mut writer, "manifest.mf", manifest_text.as_bytes(), 0)?;
                for (name, data) in file_members {
                    session.cancellation().check()?;
                    tar::write_entry(&mut writer, name, data, 0)?;
                }
                tar::write_end_marker(&mut writer)?;
                writer.flush().map_err(Error::io_simple)?;
            }
            Form::Directory => {
                std::fs::create_dir_all(&write_target).map_err(|e| Error::io(e, &write_target))?;
                std::fs::write(write_target.join(descriptor_name), descriptor_bytes)
                    .map_err(|e| Error::io(e, &write_target))?;
                std::fs::write(write_target.join("manifest.mf"), manifest_text.as_bytes())
                    .map_err(|e| Error::io(e, &write_target))?;
                for (name, data) in file_members {
                    session.cancellation().check()?;
                    std::fs::write(write_target.join(name), data).map_err(|e| Error::io(e, &write_target))?;
                }
            }
        }

        if workspace.is_some() {
            if target_path.exists() && form == Form::Directory {
                std::fs::remove_dir_all(target_path).map_err(|e| Error::io(e, target_path))?;
            }
            std::fs::rename(&write_target, target_path).map_err(|e| Error::io(e, target_path))?;
        }

        tracing::debug!(target = %target_path.display(), members = file_members.len(), "wrote package");
        Ok(())
    }

    /// A read-only summary for the `info` CLI command: product
    /// identity, configuration profiles, disks, networks and files.
    /// Not a type spec.md §3 names explicitly, but required for the
    /// `info` command (spec.md §6) to mean anything.
    pub fn info(&self) -> Result<PackageInfo> {
        let descriptor = crate::descriptor::Descriptor::parse(&self.read_descriptor()?)?;
        Ok(PackageInfo {
            product: descriptor.product.as_ref().and_then(|p| p.product.clone()),
            vendor: descriptor.product.as_ref().and_then(|p| p.vendor.clone()),
            version: descriptor.product.as_ref().and_then(|p| p.version.clone()),
            profiles: descriptor.deployment.profiles().iter().map(|p| p.id.clone()).collect(),
            disks: descriptor.disks.disks().iter().map(|d| d.disk_id.clone()).collect(),
            networks: descriptor.networks.networks().iter().map(|n| n.name.clone()).collect(),
            files: descriptor.references.files().iter().map(|f| f.id.clone()).collect(),
        })
    }

    /// Raise a space-shortfall warning if a (caller-supplied) estimate
    /// of available bytes falls short of what the write needs.
    pub fn check_space(
        required_bytes: u64,
        available_bytes: u64,
        session: &mut Session,
    ) -> Result<()> {
        if available_bytes < required_bytes {
            session.confirm(Warning::new(
                WarningCategory::SpaceShortfall,
                format!("{required_bytes} bytes required, only {available_bytes} available"),
            ))?;
        }
        Ok(())
    }
}
