//! ovapkg CLI - edit OVF/OVA virtual appliance packages.
//!
//! A thin clap shell over `ovapkg-core`: this binary owns argument
//! parsing, confirmation prompting, and helper-tool discovery; all
//! descriptor/package semantics live in the core library (spec.md §1
//! treats the CLI as an external collaborator, not part of the core).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ovapkg_core::descriptor::product::PropertyType;
use ovapkg_core::edit::{self, AddDiskSpec, HardwareEdit};
use ovapkg_core::package::manifest::DigestAlgorithm;
use ovapkg_core::{Descriptor, Error, Form, Package, Session};

#[derive(Parser)]
#[command(name = "ovapkg")]
#[command(version, about = "Edit OVF/OVA virtual appliance packages", long_about = None)]
struct Cli {
    /// Input package: an OVF directory, a bare .ovf file, or an OVA.
    package: PathBuf,

    /// Write the result to this path instead of overwriting the input.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Auto-confirm every warning (platform bounds, manifest mismatch, space).
    #[arg(long, global = true)]
    force: bool,

    /// Suppress non-error output.
    #[arg(long, global = true)]
    quiet: bool,

    /// Emit info-level progress logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit debug-level progress logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of the package's product, profiles, disks, and networks.
    Info,

    /// Attach a new disk to a controller.
    AddDisk {
        /// Path to the disk image file to add as a package member.
        file: PathBuf,
        /// Virtual capacity, e.g. "40".
        #[arg(long)]
        capacity: String,
        #[arg(long)]
        capacity_units: Option<String>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        controller: Option<u32>,
        #[arg(long)]
        address: Option<String>,
    },

    /// Add a file to the package's References without attaching it to any hardware item.
    AddFile {
        file: PathBuf,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        replace: bool,
    },

    /// Remove a file (and detach any disk referencing it) by id or href.
    RemoveFile {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        href: Option<String>,
    },

    /// Edit CPU/memory/NIC/serial hardware, optionally scoped to one configuration profile.
    EditHardware {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        cpus: Option<u32>,
        #[arg(long)]
        memory_mb: Option<u64>,
        #[arg(long)]
        nic_count: Option<usize>,
        #[arg(long, value_delimiter = ',')]
        nic_networks: Option<Vec<String>>,
        #[arg(long)]
        serial_count: Option<usize>,
        /// Collapse the deployment to a single configuration profile, dropping the rest.
        #[arg(long)]
        delete_other_profiles: Option<String>,
    },

    /// Edit product identity fields.
    EditProduct {
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        full_version: Option<String>,
        #[arg(long)]
        class: Option<String>,
    },

    /// Set environment property values, `key=value` pairs.
    EditProperties {
        #[arg(required = true)]
        properties: Vec<String>,
    },

    /// Attach a pre-built bootstrap-config image to the platform's bootstrap medium.
    InjectConfig { file: PathBuf },

    /// Deploy the package to an ESXi host (external collaborator; not implemented by the core).
    Deploy {
        #[command(subcommand)]
        target: DeployTarget,
    },

    /// Verify (and report paths to) the helper tools the core's capability lookups expect.
    InstallHelpers,
}

#[derive(Subcommand)]
enum DeployTarget {
    Esxi {
        host: String,
        #[arg(long)]
        datastore: Option<String>,
    },
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn make_session(force: bool, quiet: bool) -> Session {
    if force {
        Session::forced()
    } else {
        Session::new(Box::new(move |warning| {
            if !quiet {
                eprintln!("warning: {}", warning.message);
            }
            true
        }))
    }
}

fn parse_property(raw: &str) -> anyhow::Result<(String, String, Option<PropertyType>)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("malformed property '{raw}', expected key=value"))?;
    Ok((key.to_string(), value.to_string(), None))
}

fn run(cli: Cli) -> Result<(), Error> {
    let package = Package::open(&cli.package)?;
    let mut session = make_session(cli.force, cli.quiet);

    match cli.command {
        Commands::Info => {
            let info = package.info()?;
            println!("product:  {}", info.product.as_deref().unwrap_or("(none)"));
            println!("vendor:   {}", info.vendor.as_deref().unwrap_or("(none)"));
            println!("version:  {}", info.version.as_deref().unwrap_or("(none)"));
            println!("profiles: {}", info.profiles.join(", "));
            println!("disks:    {}", info.disks.join(", "));
            println!("networks: {}", info.networks.join(", "));
            println!("files:    {}", info.files.join(", "));
            return Ok(());
        }
        Commands::InstallHelpers => {
            for tool in ["qemu-img", "mkisofs", "fatdisk", "vmdktool", "isoinfo", "ovftool"] {
                match which::which(tool) {
                    Ok(path) => println!("{tool}: {}", path.display()),
                    Err(_) => println!("{tool}: not found"),
                }
            }
            return Ok(());
        }
        Commands::Deploy { target } => {
            let DeployTarget::Esxi { host, .. } = target;
            return Err(Error::capability(format!("esxi deployment to '{host}'")));
        }
        _ => {}
    }

    let mut descriptor = Descriptor::parse(&package.read_descriptor()?)?;

    match cli.command {
        Commands::AddDisk {
            file,
            capacity,
            capacity_units,
            format,
            controller,
            address,
        } => {
            let href = file
                .file_name()
                .ok_or_else(|| Error::invalid_input("disk file path has no filename"))?
                .to_string_lossy()
                .to_string();
            let size = std::fs::metadata(&file).ok().map(|m| m.len());
            let base = file.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "disk".to_string());
            edit::add_disk(
                &mut descriptor,
                AddDiskSpec {
                    disk_id_base: base,
                    href,
                    size,
                    capacity,
                    capacity_allocation_units: capacity_units,
                    format,
                    controller_instance_id: controller,
                    address_on_parent: address,
                },
            )?;
        }
        Commands::AddFile { file, id, replace } => {
            let href = file
                .file_name()
                .ok_or_else(|| Error::invalid_input("file path has no filename"))?
                .to_string_lossy()
                .to_string();
            let size = std::fs::metadata(&file).ok().map(|m| m.len());
            let base = id.unwrap_or_else(|| href.clone());
            edit::add_file(&mut descriptor, &base, &href, size, replace)?;
        }
        Commands::RemoveFile { id, href } => {
            edit::remove_file(&mut descriptor, id.as_deref(), href.as_deref())?;
        }
        Commands::EditHardware {
            profile,
            cpus,
            memory_mb,
            nic_count,
            nic_networks,
            serial_count,
            delete_other_profiles,
        } => {
            edit::apply_hardware_edit(
                &mut descriptor,
                &HardwareEdit {
                    profile,
                    cpus,
                    memory_mb,
                    nic_count,
                    nic_networks,
                    serial_count,
                    delete_other_profiles,
                },
                &mut session,
            )?;
        }
        Commands::EditProduct {
            product,
            vendor,
            version,
            full_version,
            class,
        } => {
            edit::edit_product(&mut descriptor, product, vendor, version, full_version, class);
        }
        Commands::EditProperties { properties } => {
            let parsed: Vec<_> = properties
                .iter()
                .map(|raw| parse_property(raw).map_err(|e| Error::invalid_input(e.to_string())))
                .collect::<Result<_, _>>()?;
            edit::edit_properties(&mut descriptor, &parsed)?;
        }
        Commands::InjectConfig { file } => {
            let href = file
                .file_name()
                .ok_or_else(|| Error::invalid_input("config file path has no filename"))?
                .to_string_lossy()
                .to_string();
            let size = std::fs::metadata(&file).ok().map(|m| m.len());
            edit::inject_config(&mut descriptor, &href, size)?;
        }
        Commands::Info | Commands::InstallHelpers | Commands::Deploy { .. } => unreachable!(),
    }

    let descriptor_bytes = descriptor.serialize()?;
    let target_path = cli.output.as_deref().unwrap_or(&cli.package);
    let self_overwrite = package.targets_self(target_path);

    let file_members: Vec<(String, Vec<u8>)> = descriptor
        .references
        .files()
        .iter()
        .filter_map(|f| package.read_member(&f.href).ok().map(|data| (f.href.clone(), data)))
        .collect();

    let algorithm = match descriptor.version.manifest_algorithm() {
        "SHA256" => DigestAlgorithm::Sha256,
        _ => DigestAlgorithm::Sha1,
    };

    let progress = (!cli.quiet).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_message(format!("writing {}", target_path.display()));
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    });

    Package::write(
        target_path,
        package.form(),
        self_overwrite,
        package.descriptor_name(),
        &descriptor_bytes,
        &file_members,
        algorithm,
        &mut session,
    )?;

    if let Some(bar) = progress {
        bar.finish_with_message(format!("wrote {}", target_path.display()));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(err @ (Error::InvalidInput { .. } | Error::NotFound { .. } | Error::Conflict { .. })) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
        Err(err @ (Error::Capability { .. } | Error::Environmental { .. } | Error::Io { .. })) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(Error::Cancelled) => {
            eprintln!("cancelled");
            ExitCode::from(1)
        }
        Err(err @ Error::Internal { .. }) => {
            eprintln!("internal error: {err}");
            ExitCode::from(3)
        }
    }
}
