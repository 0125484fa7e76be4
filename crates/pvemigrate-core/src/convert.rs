//! Disk conversion and guest agent injection.

use std::path::Path;

use crate::command::{ToolCommand, ToolRunner};
use crate::error::Result;

/// Package installed into the guest so Proxmox can talk to it.
pub const GUEST_AGENT_PACKAGE: &str = "qemu-guest-agent";

pub fn convert_command(vmdk: &Path, raw: &Path) -> ToolCommand {
    ToolCommand::new("qemu-img")
        .args(["convert", "-f", "vmdk", "-O", "raw"])
        .path_arg(vmdk)
        .path_arg(raw)
}

pub fn install_agent_command(raw: &Path) -> ToolCommand {
    ToolCommand::new("virt-customize")
        .arg("-a")
        .path_arg(raw)
        .args(["--install", GUEST_AGENT_PACKAGE])
}

/// Convert a VMDK into a flat raw image.
///
/// Equivalent to: `qemu-img convert -f vmdk -O raw <vmdk> <raw>`
pub fn convert_to_raw(runner: &mut dyn ToolRunner, vmdk: &Path, raw: &Path) -> Result<()> {
    tracing::info!(
        src = %vmdk.display(),
        dst = %raw.display(),
        "Converting disk to raw"
    );
    runner.run(&convert_command(vmdk, raw))
}

/// Install the QEMU guest agent into the raw image offline.
pub fn install_guest_agent(runner: &mut dyn ToolRunner, raw: &Path) -> Result<()> {
    tracing::info!(image = %raw.display(), "Installing {GUEST_AGENT_PACKAGE}");
    runner.run(&install_agent_command(raw))
}
