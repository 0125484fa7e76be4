//! pvemigrate Core Library
//!
//! This crate provides the core functionality for moving a single VMware
//! ESXi virtual machine onto a Proxmox VE host.
//!
//! # Overview
//!
//! The source VM is exported to an OVA with `ovftool`, its disk is converted
//! to raw with `qemu-img`, the QEMU guest agent is installed with
//! `virt-customize`, and the destination VM is built with `qm`. UEFI guests
//! additionally get an EFI variable volume from `lvcreate`. The main entry
//! point is [`run`], which checks prerequisites, gathers configuration and
//! calls [`migrate`].
//!
//! # Modules
//!
//! - [`error`] - Error types and Result alias
//! - [`command`] - External tool invocation seam
//! - [`prompt`] - Operator prompts
//! - [`config`] - Environment and interactive configuration
//! - [`export`] - OVA export with ovftool
//! - [`ova`] - OVA archive extraction
//! - [`manifest`] - OVA manifest verification
//! - [`ovf`] - OVF descriptor reading
//! - [`artifacts`] - Locating extracted descriptor and disk files
//! - [`convert`] - Raw conversion and guest agent injection
//! - [`vmx`] - Source firmware detection
//! - [`proxmox`] - Destination VM management
//! - [`workdir`] - Working directory handling
//! - [`migrate`] - Orchestrator tying the steps together

pub mod artifacts;
pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod manifest;
pub mod migrate;
pub mod ova;
pub mod ovf;
pub mod prompt;
pub mod proxmox;
pub mod vmx;
pub mod workdir;

pub use error::{Error, Result};

pub use command::{SystemRunner, ToolCommand, ToolRunner, REQUIRED_TOOLS};
pub use config::{Environment, MigrationConfig};
pub use migrate::{
    migrate, run, MigrationOptions, MigrationPhase, MigrationProgress, MigrationReport,
    ProgressCallback,
};
pub use prompt::{LinePrompter, Prompter};
pub use vmx::Firmware;
