//! Shared fixtures for migration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use pvemigrate_core::{Error, LinePrompter, MigrationConfig, Result, ToolCommand, ToolRunner};

pub const QM_LIST: &str = "      VMID NAME                 STATUS     MEM(MB)    BOOTDISK(GB) PID
       100 dns01                running    1024              16.00 1423
       101 web-old              stopped    2048              32.00 0
";

pub const OVF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1"
    xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1"
    xmlns:rasd="http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData">
  <References>
    <File ovf:href="web01-disk1.vmdk" ovf:id="file1"/>
  </References>
  <VirtualSystem ovf:id="web01">
    <VirtualHardwareSection>
      <Item>
        <rasd:ResourceType>3</rasd:ResourceType>
        <rasd:VirtualQuantity>4</rasd:VirtualQuantity>
      </Item>
      <Item>
        <rasd:AllocationUnits>byte * 2^20</rasd:AllocationUnits>
        <rasd:ResourceType>4</rasd:ResourceType>
        <rasd:VirtualQuantity>6144</rasd:VirtualQuantity>
      </Item>
    </VirtualHardwareSection>
  </VirtualSystem>
</Envelope>
"#;

pub const VMX_UEFI: &str = "displayName = \"web01\"\nfirmware = \"efi\"\n";
pub const VMX_BIOS: &str = "displayName = \"web01\"\nguestOS = \"ubuntu-64\"\n";

/// Build an OVA archive from `(name, data)` pairs.
pub fn ova_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// The default export: a descriptor and one disk.
pub fn single_disk_ova() -> Vec<u8> {
    ova_archive(&[("web01.ovf", OVF.as_bytes()), ("web01-disk1.vmdk", b"vmdk-data")])
}

pub fn config() -> MigrationConfig {
    MigrationConfig {
        esxi_server: "esxi01.lab".into(),
        esxi_username: "root".into(),
        esxi_password: "hunter2".into(),
        esxi_datastore: "datastore1".into(),
        vm_name: "web01".into(),
        vlan_tag: 80,
        vm_id: 120,
        storage: "local-lvm".into(),
    }
}

pub fn prompter(input: &str) -> LinePrompter<Cursor<Vec<u8>>, Vec<u8>> {
    LinePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

/// Records every command and simulates the external tools.
pub struct FakeRunner {
    pub commands: Vec<ToolCommand>,
    pub missing: HashSet<String>,
    /// Commands whose display form starts with one of these fail.
    pub failing: Vec<String>,
    pub ova: Vec<u8>,
    pub vmx: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        let mut outputs = BTreeMap::new();
        outputs.insert("qm list".to_string(), QM_LIST.to_string());
        Self {
            commands: Vec::new(),
            missing: HashSet::new(),
            failing: Vec::new(),
            ova: single_disk_ova(),
            vmx: Some(VMX_BIOS.to_string()),
            outputs,
        }
    }

    pub fn with_vmx(mut self, vmx: &str) -> Self {
        self.vmx = Some(vmx.to_string());
        self
    }

    pub fn failing(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.to_string());
        self
    }

    /// Display form of every recorded command.
    pub fn lines(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.to_string()).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.lines().iter().any(|l| l.starts_with(prefix))
    }

    fn check(&self, cmd: &ToolCommand) -> Result<()> {
        let line = cmd.to_string();
        if self.failing.iter().any(|f| line.starts_with(f.as_str())) {
            return Err(Error::command(cmd.program(), "exit status: 1"));
        }
        Ok(())
    }

    fn last_path(cmd: &ToolCommand) -> PathBuf {
        PathBuf::from(cmd.get_args().last().expect("path argument"))
    }
}

impl ToolRunner for FakeRunner {
    fn is_available(&self, program: &str) -> bool {
        !self.missing.contains(program)
    }

    fn run(&mut self, cmd: &ToolCommand) -> Result<()> {
        self.commands.push(cmd.clone());
        self.check(cmd)?;
        match cmd.program() {
            "ovftool" => fs::write(Self::last_path(cmd), &self.ova)?,
            "qemu-img" => fs::write(Self::last_path(cmd), b"raw-data")?,
            _ => {}
        }
        Ok(())
    }

    fn output(&mut self, cmd: &ToolCommand) -> Result<String> {
        self.commands.push(cmd.clone());
        self.check(cmd)?;
        if cmd.program() == "ssh" {
            return self
                .vmx
                .clone()
                .ok_or_else(|| Error::command("ssh", "connection refused"));
        }
        Ok(self.outputs.get(&cmd.to_string()).cloned().unwrap_or_default())
    }
}

pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}
