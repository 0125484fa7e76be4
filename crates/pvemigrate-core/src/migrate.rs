//! Migration orchestrator.
//!
//! This module drives the full migration in order:
//! 1. Export the source VM to an OVA with `ovftool`
//! 2. Unpack the OVA, verify its manifest and read the OVF descriptor
//! 3. Convert the single disk to raw and install the guest agent
//! 4. Detect the source firmware over ssh
//! 5. Create the destination VM and import the disk
//! 6. Clean the working directory
//! 7. Add an EFI variable disk for UEFI guests
//!
//! Every step stops the run on failure. Partially created destination state
//! and working files are left in place for the operator to inspect.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts;
use crate::command::{check_prerequisites, ToolRunner, REQUIRED_TOOLS};
use crate::config::{self, Environment, MigrationConfig};
use crate::convert;
use crate::error::{Error, Result};
use crate::export;
use crate::manifest;
use crate::ova;
use crate::ovf::{self, OvfSummary};
use crate::prompt::Prompter;
use crate::proxmox::{self, VmSpec};
use crate::vmx::{self, Firmware};
use crate::workdir::{self, DEFAULT_WORK_DIR};

/// Memory given to the destination VM when the descriptor has none.
pub const DEFAULT_MEMORY_MB: u64 = 2048;
/// Cores given to the destination VM when the descriptor has none.
pub const DEFAULT_CORES: u32 = 2;

/// Tunables that are not part of the operator-supplied configuration.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Directory for the OVA and its extracted files.
    pub work_dir: PathBuf,
    /// Proxmox bridge for `net0`.
    pub bridge: String,
    /// LVM thin pool the EFI volume is carved from.
    pub thin_pool: String,
    /// Memory override in megabytes.
    pub memory_mb: Option<u64>,
    /// Core count override.
    pub cores: Option<u32>,
    /// Whether to check the OVA manifest before converting.
    pub verify_manifest: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            bridge: "vmbr0".to_string(),
            thin_pool: "pve/data".to_string(),
            memory_mb: None,
            cores: None,
            verify_manifest: true,
        }
    }
}

/// Phase of the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Exporting the source VM with ovftool.
    Export,
    /// Extracting the OVA.
    Unpack,
    /// Checking manifest digests.
    Verify,
    /// Converting the disk to raw.
    Convert,
    /// Installing the guest agent.
    GuestAgent,
    /// Reading the source firmware.
    Firmware,
    /// Creating the destination VM.
    CreateVm,
    /// Importing and attaching the disk.
    ImportDisk,
    /// Removing working files.
    Cleanup,
    /// Creating the EFI variable disk.
    EfiDisk,
    /// Migration complete.
    Complete,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MigrationPhase::Export => "Exporting",
            MigrationPhase::Unpack => "Unpacking",
            MigrationPhase::Verify => "Verifying",
            MigrationPhase::Convert => "Converting",
            MigrationPhase::GuestAgent => "Installing guest agent",
            MigrationPhase::Firmware => "Detecting firmware",
            MigrationPhase::CreateVm => "Creating VM",
            MigrationPhase::ImportDisk => "Importing disk",
            MigrationPhase::Cleanup => "Cleaning up",
            MigrationPhase::EfiDisk => "Adding EFI disk",
            MigrationPhase::Complete => "Complete",
        };
        write!(f, "{}", name)
    }
}

/// Progress information for the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationProgress {
    /// Current phase.
    pub phase: MigrationPhase,
    /// Bytes processed in this phase, where the phase moves data.
    pub bytes_processed: u64,
    /// Total bytes for this phase, zero when not measured.
    pub bytes_total: u64,
}

impl MigrationProgress {
    pub fn new(phase: MigrationPhase) -> Self {
        Self {
            phase,
            bytes_processed: 0,
            bytes_total: 0,
        }
    }
}

/// Type alias for the progress callback function.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send>;

/// Outcome of a completed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub vm_id: u32,
    pub vm_name: String,
    pub firmware: Firmware,
    pub memory_mb: u64,
    pub cores: u32,
    pub storage: String,
}

fn size_destination(
    config: &MigrationConfig,
    options: &MigrationOptions,
    summary: &OvfSummary,
    firmware: Firmware,
) -> VmSpec {
    VmSpec {
        vm_id: config.vm_id,
        name: config.vm_name.clone(),
        memory_mb: options
            .memory_mb
            .or(summary.memory_mb)
            .unwrap_or(DEFAULT_MEMORY_MB),
        cores: options.cores.or(summary.cpus).unwrap_or(DEFAULT_CORES),
        bridge: options.bridge.clone(),
        vlan_tag: config.vlan_tag,
        firmware,
    }
}

fn read_descriptor(work_dir: &Path) -> Result<OvfSummary> {
    let descriptor = artifacts::find_descriptor(work_dir)?;
    match ovf::parse_ovf(&descriptor) {
        Ok(summary) => Ok(summary),
        Err(e) => {
            tracing::warn!("could not read {}, using defaults: {e}", descriptor.display());
            Ok(OvfSummary::default())
        }
    }
}

/// The extracted disk must be one the descriptor references.
///
/// A descriptor that lists no disk files is not checked.
fn check_disk_reference(disk: &Path, summary: &OvfSummary) -> Result<()> {
    let referenced: Vec<&str> = summary
        .files
        .iter()
        .map(String::as_str)
        .filter(|href| {
            Path::new(href)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("vmdk"))
        })
        .collect();
    if referenced.is_empty() {
        return Ok(());
    }

    let name = disk.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let listed = referenced
        .iter()
        .any(|href| Path::new(href).file_name().and_then(|n| n.to_str()) == Some(name));
    if listed {
        Ok(())
    } else {
        Err(Error::ova(format!(
            "{} is not referenced by the descriptor (expected {})",
            name,
            referenced.join(", ")
        )))
    }
}

/// Migrate the VM described by `config`.
pub fn migrate(
    config: &MigrationConfig,
    options: &MigrationOptions,
    runner: &mut dyn ToolRunner,
    prompter: &mut dyn Prompter,
    progress_callback: Option<ProgressCallback>,
) -> Result<MigrationReport> {
    let report = |progress: MigrationProgress| {
        if let Some(ref callback) = progress_callback {
            callback(progress);
        }
    };
    let work_dir = options.work_dir.as_path();

    workdir::ensure(work_dir)?;

    report(MigrationProgress::new(MigrationPhase::Export));
    let ova_file = export::export_ova(runner, prompter, config, work_dir)?;

    let ova_size = fs::metadata(&ova_file).map(|m| m.len()).unwrap_or(0);
    report(MigrationProgress {
        phase: MigrationPhase::Unpack,
        bytes_processed: 0,
        bytes_total: ova_size,
    });
    let mut on_bytes = |bytes_processed: u64| {
        report(MigrationProgress {
            phase: MigrationPhase::Unpack,
            bytes_processed,
            bytes_total: ova_size,
        })
    };
    let mut created = ova::unpack(&ova_file, work_dir, Some(&mut on_bytes))?;
    created.push(ova_file.clone());

    if options.verify_manifest {
        if let Some(mf) = artifacts::find_manifest(work_dir)? {
            report(MigrationProgress::new(MigrationPhase::Verify));
            let verified = manifest::verify(&mf)?;
            tracing::info!(verified, "Manifest verified");
        } else {
            tracing::info!("OVA has no manifest, skipping verification");
        }
    }

    let summary = read_descriptor(work_dir)?;
    let disk = artifacts::find_disk(work_dir)?;
    check_disk_reference(&disk, &summary)?;
    let raw = artifacts::raw_path(&disk);
    created.push(raw.clone());

    report(MigrationProgress::new(MigrationPhase::Convert));
    convert::convert_to_raw(runner, &disk, &raw)?;

    report(MigrationProgress::new(MigrationPhase::GuestAgent));
    convert::install_guest_agent(runner, &raw)?;

    report(MigrationProgress::new(MigrationPhase::Firmware));
    let firmware = vmx::detect_remote_firmware(runner, config);

    let spec = size_destination(config, options, &summary, firmware);

    report(MigrationProgress::new(MigrationPhase::CreateVm));
    proxmox::create_vm(runner, &spec)?;

    report(MigrationProgress::new(MigrationPhase::ImportDisk));
    proxmox::import_disk(runner, config.vm_id, &raw, &config.storage)?;

    report(MigrationProgress::new(MigrationPhase::Cleanup));
    workdir::cleanup(work_dir, &created)?;

    if firmware == Firmware::Uefi {
        report(MigrationProgress::new(MigrationPhase::EfiDisk));
        proxmox::add_efi_disk(runner, config.vm_id, &options.thin_pool, &config.storage)?;
    }

    report(MigrationProgress::new(MigrationPhase::Complete));
    tracing::info!(vm_id = config.vm_id, "Migration complete");

    Ok(MigrationReport {
        vm_id: spec.vm_id,
        vm_name: spec.name,
        firmware,
        memory_mb: spec.memory_mb,
        cores: spec.cores,
        storage: config.storage.clone(),
    })
}

/// Check prerequisites, gather configuration, then migrate.
///
/// Missing tools abort before anything is prompted for or changed.
pub fn run(
    env: &Environment,
    options: &MigrationOptions,
    runner: &mut dyn ToolRunner,
    prompter: &mut dyn Prompter,
    progress_callback: Option<ProgressCallback>,
) -> Result<MigrationReport> {
    check_prerequisites(&*runner, REQUIRED_TOOLS)?;
    let config = config::collect(env, prompter, runner)?;
    tracing::debug!(?config, "configuration collected");
    migrate(&config, options, runner, prompter, progress_callback)
}
