//! Export of the source VM to an OVA with `ovftool`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::command::{ToolCommand, ToolRunner};
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::prompt::{confirm, Prompter};

/// Location of the exported archive inside the working directory.
pub fn ova_path(work_dir: &Path, vm_name: &str) -> PathBuf {
    work_dir.join(format!("{}.ova", vm_name))
}

/// Percent-encode everything outside the URL unreserved set.
///
/// Credentials are embedded in the `vi://` locator, so characters such as
/// `@`, `:` or `/` in a password would otherwise break it.
fn encode_userinfo(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub fn ovftool_command(config: &MigrationConfig, output: &Path) -> ToolCommand {
    let locator = |password: &str| {
        format!(
            "vi://{}:{}@{}/{}",
            encode_userinfo(&config.esxi_username),
            password,
            config.esxi_server,
            config.vm_name
        )
    };

    ToolCommand::new("ovftool")
        .args([
            "--sourceType=VI",
            "--acceptAllEulas",
            "--noSSLVerify",
            "--skipManifestCheck",
            "--diskMode=thick",
        ])
        .arg(format!("--name={}", config.vm_name))
        .secret_arg(locator(&encode_userinfo(&config.esxi_password)), locator("****"))
        .path_arg(output)
}

/// Export the source VM into `work_dir`, returning the OVA path.
///
/// An existing OVA is only replaced after the operator agrees; refusing
/// aborts before `ovftool` runs. The export is verified to have produced a
/// non-empty archive.
pub fn export_ova(
    runner: &mut dyn ToolRunner,
    prompter: &mut dyn Prompter,
    config: &MigrationConfig,
    work_dir: &Path,
) -> Result<PathBuf> {
    let output = ova_path(work_dir, &config.vm_name);

    if output.exists() {
        let question = format!("{} already exists. Overwrite it?", output.display());
        if !confirm(prompter, &question)? {
            return Err(Error::ExportDeclined);
        }
        fs::remove_file(&output).map_err(|e| Error::io(e, &output))?;
    }

    tracing::info!(
        server = %config.esxi_server,
        vm = %config.vm_name,
        output = %output.display(),
        "Exporting VM to OVA"
    );
    runner.run(&ovftool_command(config, &output))?;

    let size = fs::metadata(&output)
        .map_err(|e| Error::io(e, &output))?
        .len();
    if size == 0 {
        return Err(Error::command("ovftool", format!("{} is empty", output.display())));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(password: &str) -> MigrationConfig {
        MigrationConfig {
            esxi_server: "esxi01.lab".into(),
            esxi_username: "root".into(),
            esxi_password: password.into(),
            esxi_datastore: "datastore1".into(),
            vm_name: "web01".into(),
            vlan_tag: 80,
            vm_id: 120,
            storage: "local-lvm".into(),
        }
    }

    #[test]
    fn test_encode_userinfo() {
        assert_eq!(encode_userinfo("plain-Pass_1.~"), "plain-Pass_1.~");
        assert_eq!(encode_userinfo("p@ss:w/rd"), "p%40ss%3Aw%2Frd");
        assert_eq!(encode_userinfo("é"), "%C3%A9");
    }

    #[test]
    fn test_ovftool_command_masks_password() {
        let cmd = ovftool_command(&config("s3cr@t"), Path::new("/var/vm-migration/web01.ova"));
        assert_eq!(
            cmd.get_args()[6],
            "vi://root:s3cr%40t@esxi01.lab/web01"
        );
        let shown = cmd.to_string();
        assert!(!shown.contains("s3cr"));
        assert!(shown.contains("vi://root:****@esxi01.lab/web01"));
        assert!(shown.ends_with("/var/vm-migration/web01.ova"));
    }

    #[test]
    fn test_short_password_masks_only_userinfo() {
        let cmd = ovftool_command(&config("a"), Path::new("/var/vm-migration/a.ova"));
        assert_eq!(
            cmd.to_string(),
            "ovftool --sourceType=VI --acceptAllEulas --noSSLVerify --skipManifestCheck \
             --diskMode=thick --name=web01 vi://root:****@esxi01.lab/web01 /var/vm-migration/a.ova"
        );
    }

    #[test]
    fn test_ova_path() {
        assert_eq!(
            ova_path(Path::new("/var/vm-migration"), "web01"),
            PathBuf::from("/var/vm-migration/web01.ova")
        );
    }
}
