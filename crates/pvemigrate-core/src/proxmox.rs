//! Proxmox VE management through `qm` and `lvcreate`.

use std::collections::BTreeSet;
use std::path::Path;

use crate::command::{ToolCommand, ToolRunner};
use crate::error::Result;
use crate::vmx::Firmware;

/// Size of the logical volume backing the UEFI variable store.
pub const EFI_DISK_SIZE: &str = "4M";

/// Settings for the destination VM shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub vm_id: u32,
    pub name: String,
    pub memory_mb: u64,
    pub cores: u32,
    pub bridge: String,
    pub vlan_tag: u16,
    pub firmware: Firmware,
}

/// Parse the VMID column of `qm list` output.
///
/// The header line and anything that does not start with a number are
/// skipped.
pub fn parse_vm_ids(output: &str) -> BTreeSet<u32> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|first| first.parse::<u32>().ok())
        .collect()
}

/// IDs of every VM currently defined on this node.
pub fn list_vm_ids(runner: &mut dyn ToolRunner) -> Result<BTreeSet<u32>> {
    let output = runner.output(&ToolCommand::new("qm").arg("list"))?;
    Ok(parse_vm_ids(&output))
}

/// Name of the `n`th disk volume Proxmox allocates for `vm_id`.
pub fn disk_volume(vm_id: u32, n: u32) -> String {
    format!("vm-{}-disk-{}", vm_id, n)
}

pub fn create_vm_command(spec: &VmSpec) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("create")
        .arg(spec.vm_id.to_string())
        .args(["--name", spec.name.as_str()])
        .args(["--memory".to_string(), spec.memory_mb.to_string()])
        .args(["--cores".to_string(), spec.cores.to_string()])
        .arg("--net0")
        .arg(format!("virtio,bridge={},tag={}", spec.bridge, spec.vlan_tag))
        .args(["--bootdisk", "scsi0"])
        .args(["--scsihw", "virtio-scsi-single"])
        .args(["--bios", spec.firmware.qm_bios()])
}

pub fn enable_agent_command(vm_id: u32) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("set")
        .arg(vm_id.to_string())
        .args(["--agent", "1"])
}

pub fn import_disk_command(vm_id: u32, raw: &Path, storage: &str) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("importdisk")
        .arg(vm_id.to_string())
        .path_arg(raw)
        .arg(storage)
}

pub fn attach_disk_command(vm_id: u32, storage: &str) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("set")
        .arg(vm_id.to_string())
        .arg("--scsi0")
        .arg(format!("{}:{}", storage, disk_volume(vm_id, 0)))
}

pub fn enable_discard_command(vm_id: u32, storage: &str) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("set")
        .arg(vm_id.to_string())
        .arg("--scsi0")
        .arg(format!("{}:{},discard=on", storage, disk_volume(vm_id, 0)))
}

pub fn create_efi_volume_command(vm_id: u32, thin_pool: &str) -> ToolCommand {
    ToolCommand::new("lvcreate")
        .args(["-V", EFI_DISK_SIZE, "-T", thin_pool, "-n"])
        .arg(disk_volume(vm_id, 1))
}

pub fn attach_efi_disk_command(vm_id: u32, storage: &str) -> ToolCommand {
    ToolCommand::new("qm")
        .arg("set")
        .arg(vm_id.to_string())
        .arg("--efidisk0")
        .arg(format!(
            "{}:{},size={},efitype=4m,pre-enrolled-keys=1",
            storage,
            disk_volume(vm_id, 1),
            EFI_DISK_SIZE
        ))
}

/// Create the VM shell and enable the guest agent channel.
pub fn create_vm(runner: &mut dyn ToolRunner, spec: &VmSpec) -> Result<()> {
    tracing::info!(
        vm_id = spec.vm_id,
        name = %spec.name,
        bios = spec.firmware.qm_bios(),
        "Creating destination VM"
    );
    runner.run(&create_vm_command(spec))?;
    runner.run(&enable_agent_command(spec.vm_id))
}

/// Import the raw image into `storage`, attach it as `scsi0` and enable discard.
pub fn import_disk(runner: &mut dyn ToolRunner, vm_id: u32, raw: &Path, storage: &str) -> Result<()> {
    tracing::info!(vm_id, storage, raw = %raw.display(), "Importing disk");
    runner.run(&import_disk_command(vm_id, raw, storage))?;
    runner.run(&attach_disk_command(vm_id, storage))?;
    runner.run(&enable_discard_command(vm_id, storage))
}

/// Create and attach the UEFI variable store disk.
pub fn add_efi_disk(
    runner: &mut dyn ToolRunner,
    vm_id: u32,
    thin_pool: &str,
    storage: &str,
) -> Result<()> {
    tracing::info!(vm_id, thin_pool, "Creating EFI disk");
    runner.run(&create_efi_volume_command(vm_id, thin_pool))?;
    runner.run(&attach_efi_disk_command(vm_id, storage))
}
