//! Migration configuration acquisition.
//!
//! Every value is taken from its environment variable when set and valid,
//! otherwise the operator is asked for it. Empty answers fall back to the
//! field default; a missing or invalid answer is asked again until a usable
//! one arrives or input runs out.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::command::ToolRunner;
use crate::error::{Error, Result};
use crate::prompt::Prompter;
use crate::proxmox;

/// Description of a single configuration value.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Environment variable consulted before prompting.
    pub env: &'static str,
    /// Question shown to the operator.
    pub prompt: &'static str,
    /// Value used when the operator answers with an empty line.
    pub default: Option<&'static str>,
    /// Regex the value must match in full.
    pub pattern: Option<&'static str>,
    /// Whether the value must stay out of logs.
    pub secret: bool,
}

pub const ESXI_SERVER: Field = Field {
    env: "ESXI_SERVER",
    prompt: "ESXi server hostname or IP",
    default: None,
    pattern: None,
    secret: false,
};

pub const ESXI_USERNAME: Field = Field {
    env: "ESXI_USERNAME",
    prompt: "ESXi username",
    default: Some("root"),
    pattern: None,
    secret: false,
};

pub const ESXI_PASSWORD: Field = Field {
    env: "ESXI_PASSWORD",
    prompt: "ESXi password",
    default: None,
    pattern: None,
    secret: true,
};

pub const ESXI_DATASTORE: Field = Field {
    env: "ESXI_DATASTORE",
    prompt: "ESXi datastore holding the VM",
    default: Some("datastore1"),
    pattern: None,
    secret: false,
};

pub const VM_NAME: Field = Field {
    env: "VM_NAME",
    prompt: "Name of the VM to migrate",
    default: None,
    pattern: Some(r"^[A-Za-z0-9._-]+$"),
    secret: false,
};

pub const VLAN_TAG: Field = Field {
    env: "VLAN_TAG",
    prompt: "VLAN tag",
    default: None,
    pattern: Some(r"^[0-9]{1,4}$"),
    secret: false,
};

pub const VM_ID: Field = Field {
    env: "VM_ID",
    prompt: "Proxmox VM ID",
    default: None,
    pattern: Some(r"^[0-9]{3,}$"),
    secret: false,
};

pub const STORAGE_TYPE: Field = Field {
    env: "STORAGE_TYPE",
    prompt: "Proxmox storage for the disk",
    default: Some("local-lvm"),
    pattern: None,
    secret: false,
};

/// Lowest VM ID Proxmox hands out.
pub const FIRST_VM_ID: u32 = 100;

impl Field {
    /// Check `value` against the field's pattern.
    fn validate(&self, value: &str) -> Result<std::result::Result<(), String>> {
        if value.is_empty() {
            return Ok(Err(format!("{} is required.", self.prompt)));
        }
        if let Some(pattern) = self.pattern {
            let re = Regex::new(pattern)
                .map_err(|e| Error::config(format!("bad pattern for {}: {}", self.env, e)))?;
            if !re.is_match(value) {
                return Ok(Err(format!("'{}' is not a valid {}.", value, self.prompt)));
            }
        }
        Ok(Ok(()))
    }
}

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Everything the migration needs to know from the operator.
#[derive(Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub esxi_server: String,
    pub esxi_username: String,
    pub esxi_password: String,
    pub esxi_datastore: String,
    pub vm_name: String,
    pub vlan_tag: u16,
    pub vm_id: u32,
    pub storage: String,
}

impl std::fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("esxi_server", &self.esxi_server)
            .field("esxi_username", &self.esxi_username)
            .field("esxi_password", &"****")
            .field("esxi_datastore", &self.esxi_datastore)
            .field("vm_name", &self.vm_name)
            .field("vlan_tag", &self.vlan_tag)
            .field("vm_id", &self.vm_id)
            .field("storage", &self.storage)
            .finish()
    }
}

/// Obtain a value for `field`, consulting `env` first.
///
/// `check` applies rules beyond the field pattern; its error message is
/// shown to the operator before asking again.
pub fn acquire<F>(
    field: &Field,
    default: Option<&str>,
    env: &Environment,
    prompter: &mut dyn Prompter,
    check: F,
) -> Result<String>
where
    F: Fn(&str) -> std::result::Result<(), String>,
{
    let default = default.or(field.default);

    if let Some(value) = env.get(field.env) {
        match field.validate(value)?.and_then(|_| check(value)) {
            Ok(()) => return Ok(value.to_string()),
            Err(reason) => {
                tracing::warn!("ignoring {}: {}", field.env, reason);
                prompter.notify(&reason)?;
            }
        }
    }

    loop {
        let answer = prompter
            .ask(field.prompt, default)?
            .ok_or_else(|| Error::prompt(format!("no value given for {}", field.env)))?;

        let value = if answer.is_empty() {
            default.unwrap_or_default().to_string()
        } else {
            answer
        };

        match field.validate(&value)?.and_then(|_| check(&value)) {
            Ok(()) => {
                if !field.secret {
                    tracing::debug!("{} = {}", field.env, value);
                }
                return Ok(value);
            }
            Err(reason) => prompter.notify(&reason)?,
        }
    }
}

fn any(_: &str) -> std::result::Result<(), String> {
    Ok(())
}

/// Check a VLAN tag is within the 802.1Q usable range.
pub fn check_vlan(value: &str) -> std::result::Result<(), String> {
    match value.parse::<u16>() {
        Ok(tag) if (1..=4094).contains(&tag) => Ok(()),
        _ => Err(format!("VLAN tag {} is outside 1-4094.", value)),
    }
}

/// Check a VM ID is numeric and not already taken.
pub fn check_vm_id(taken: &BTreeSet<u32>, value: &str) -> std::result::Result<(), String> {
    match value.parse::<u32>() {
        Ok(id) if id < FIRST_VM_ID => Err(format!(
            "VM ID {} is below {}, the lowest ID Proxmox accepts.",
            id, FIRST_VM_ID
        )),
        Ok(id) if taken.contains(&id) => Err(format!(
            "VM ID {} is already in use. Please choose another.",
            id
        )),
        Ok(_) => Ok(()),
        Err(_) => Err(format!("VM ID {} is not a valid number.", value)),
    }
}

/// Lowest ID at or above [`FIRST_VM_ID`] not present in `taken`.
pub fn next_free_vm_id(taken: &BTreeSet<u32>) -> u32 {
    (FIRST_VM_ID..)
        .find(|id| !taken.contains(id))
        .unwrap_or(FIRST_VM_ID)
}

/// Gather the full migration configuration.
///
/// Queries `qm list` so the VM ID default is free and taken IDs are refused.
pub fn collect(
    env: &Environment,
    prompter: &mut dyn Prompter,
    runner: &mut dyn ToolRunner,
) -> Result<MigrationConfig> {
    let esxi_server = acquire(&ESXI_SERVER, None, env, prompter, any)?;
    let esxi_username = acquire(&ESXI_USERNAME, None, env, prompter, any)?;
    let esxi_password = acquire(&ESXI_PASSWORD, None, env, prompter, any)?;
    let esxi_datastore = acquire(&ESXI_DATASTORE, None, env, prompter, any)?;
    let vm_name = acquire(&VM_NAME, None, env, prompter, any)?;
    let vlan_tag = acquire(&VLAN_TAG, None, env, prompter, check_vlan)?;

    let taken = proxmox::list_vm_ids(runner)?;
    let suggested = next_free_vm_id(&taken).to_string();
    let vm_id = acquire(&VM_ID, Some(suggested.as_str()), env, prompter, |v| {
        check_vm_id(&taken, v)
    })?;

    let storage = acquire(&STORAGE_TYPE, None, env, prompter, any)?;

    Ok(MigrationConfig {
        esxi_server,
        esxi_username,
        esxi_password,
        esxi_datastore,
        vm_name,
        vlan_tag: vlan_tag
            .parse()
            .map_err(|_| Error::config(format!("invalid VLAN tag {}", vlan_tag)))?,
        vm_id: vm_id
            .parse()
            .map_err(|_| Error::config(format!("invalid VM ID {}", vm_id)))?,
        storage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::LinePrompter;
    use std::io::Cursor;

    fn prompter(input: &str) -> LinePrompter<Cursor<Vec<u8>>, Vec<u8>> {
        LinePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_env_value_wins() {
        let env = Environment::from_pairs([("ESXI_SERVER", "esxi01.lab")]);
        let mut p = prompter("");
        let value = acquire(&ESXI_SERVER, None, &env, &mut p, any).unwrap();
        assert_eq!(value, "esxi01.lab");
        assert!(p.into_output().is_empty());
    }

    #[test]
    fn test_empty_env_value_is_unset() {
        let env = Environment::from_pairs([("ESXI_SERVER", "   ")]);
        assert_eq!(env.get("ESXI_SERVER"), None);
    }

    #[test]
    fn test_required_without_default_reprompts() {
        let env = Environment::default();
        let mut p = prompter("\n\nesxi02\n");
        let value = acquire(&ESXI_SERVER, None, &env, &mut p, any).unwrap();
        assert_eq!(value, "esxi02");
        let out = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(out.matches("ESXi server hostname or IP:").count(), 3);
        assert_eq!(out.matches("is required").count(), 2);
    }

    #[test]
    fn test_empty_answer_takes_default() {
        let env = Environment::default();
        let mut p = prompter("\n");
        let value = acquire(&STORAGE_TYPE, None, &env, &mut p, any).unwrap();
        assert_eq!(value, "local-lvm");
    }

    #[test]
    fn test_pattern_mismatch_reprompts() {
        let env = Environment::default();
        let mut p = prompter("abc\n12\n");
        let value = acquire(&VM_ID, None, &env, &mut p, any).unwrap_err();
        assert!(matches!(value, Error::Prompt { .. }));

        let mut p = prompter("abc\n12\n4321\n");
        assert_eq!(acquire(&VM_ID, None, &env, &mut p, any).unwrap(), "4321");
    }

    #[test]
    fn test_invalid_env_value_falls_back_to_prompt() {
        let env = Environment::from_pairs([("VLAN_TAG", "9999")]);
        let mut p = prompter("80\n");
        let value = acquire(&VLAN_TAG, None, &env, &mut p, check_vlan).unwrap();
        assert_eq!(value, "80");
    }

    #[test]
    fn test_taken_vm_id_is_never_accepted() {
        let taken: BTreeSet<u32> = [100, 101, 205].into_iter().collect();
        let env = Environment::from_pairs([("VM_ID", "205")]);
        let mut p = prompter("100\n101\n206\n");
        let value = acquire(&VM_ID, None, &env, &mut p, |v| check_vm_id(&taken, v)).unwrap();
        assert_eq!(value, "206");

        let out = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(out.matches("already in use").count(), 3);
    }

    #[test]
    fn test_vm_id_below_first_is_refused() {
        let taken = BTreeSet::new();
        let env = Environment::default();
        let mut p = prompter("099\n000\n100\n");
        let value = acquire(&VM_ID, None, &env, &mut p, |v| check_vm_id(&taken, v)).unwrap();
        assert_eq!(value, "100");

        let out = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(out.matches("lowest ID Proxmox accepts").count(), 2);
    }

    #[test]
    fn test_end_of_input_is_error() {
        let env = Environment::default();
        let mut p = prompter("");
        let err = acquire(&VM_NAME, None, &env, &mut p, any).unwrap_err();
        assert!(err.to_string().contains("VM_NAME"));
    }

    #[test]
    fn test_next_free_vm_id() {
        assert_eq!(next_free_vm_id(&BTreeSet::new()), 100);
        let taken: BTreeSet<u32> = [100, 101, 103].into_iter().collect();
        assert_eq!(next_free_vm_id(&taken), 102);
    }

    #[test]
    fn test_check_vlan_range() {
        assert!(check_vlan("1").is_ok());
        assert!(check_vlan("4094").is_ok());
        assert!(check_vlan("0").is_err());
        assert!(check_vlan("4095").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = MigrationConfig {
            esxi_server: "esxi01".into(),
            esxi_username: "root".into(),
            esxi_password: "hunter2".into(),
            esxi_datastore: "datastore1".into(),
            vm_name: "web01".into(),
            vlan_tag: 80,
            vm_id: 120,
            storage: "local-lvm".into(),
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
