//! Source VM configuration (`.vmx`) inspection.
//!
//! The `.vmx` file lives on the ESXi datastore and is read over `ssh`; only
//! the firmware setting is needed to decide how the destination VM boots.

use std::collections::HashMap;
use std::fmt;

use crate::command::{ToolCommand, ToolRunner};
use crate::config::MigrationConfig;

/// Boot firmware of the source VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firmware {
    /// UEFI firmware; the destination needs an EFI variable disk.
    Uefi,
    /// Legacy BIOS.
    Seabios,
}

impl Firmware {
    /// Classify VMX content: `firmware = "efi"` means UEFI, anything else BIOS.
    pub fn detect(vmx_content: &str) -> Self {
        let raw = parse_key_value_pairs(vmx_content);
        match raw.get("firmware") {
            Some(value) if value.eq_ignore_ascii_case("efi") => Firmware::Uefi,
            _ => Firmware::Seabios,
        }
    }

    /// Value for `qm create --bios`.
    pub fn qm_bios(&self) -> &'static str {
        match self {
            Firmware::Uefi => "ovmf",
            Firmware::Seabios => "seabios",
        }
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Firmware::Uefi => write!(f, "uefi"),
            Firmware::Seabios => write!(f, "seabios"),
        }
    }
}

/// Parse key-value pairs from VMX content.
///
/// Handles both quoted and unquoted values:
/// - `key = "value"` -> ("key", "value")
/// - `key = value` -> ("key", "value")
///
/// Keys are lowercased; VMX keys are case-insensitive.
pub fn parse_key_value_pairs(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();

            let value = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                &value[1..value.len() - 1]
            } else {
                value
            };

            map.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    map
}

/// Datastore path of the VM's `.vmx` file on the ESXi host.
pub fn remote_vmx_path(datastore: &str, vm_name: &str) -> String {
    format!("/vmfs/volumes/{0}/{1}/{1}.vmx", datastore, vm_name)
}

pub fn fetch_vmx_command(config: &MigrationConfig) -> ToolCommand {
    ToolCommand::new("ssh")
        .args(["-o", "StrictHostKeyChecking=no"])
        .arg(format!("{}@{}", config.esxi_username, config.esxi_server))
        .arg("cat")
        .arg(remote_vmx_path(&config.esxi_datastore, &config.vm_name))
}

/// Determine the source VM's firmware by reading its `.vmx` over ssh.
///
/// A failed ssh session is not fatal: the VM is treated as BIOS-booted.
pub fn detect_remote_firmware(runner: &mut dyn ToolRunner, config: &MigrationConfig) -> Firmware {
    match runner.output(&fetch_vmx_command(config)) {
        Ok(content) => {
            let firmware = Firmware::detect(&content);
            tracing::info!(%firmware, "Detected source firmware");
            firmware
        }
        Err(e) => {
            tracing::warn!("could not read source VMX, assuming seabios: {e}");
            Firmware::Seabios
        }
    }
}
