//! pvemigrate CLI - Move a VMware ESXi VM onto a Proxmox VE host.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use pvemigrate_core::workdir::DEFAULT_WORK_DIR;
use pvemigrate_core::{
    Environment, Firmware, LinePrompter, MigrationOptions, MigrationPhase, MigrationProgress,
    MigrationReport, ProgressCallback, SystemRunner,
};

/// Migrate a single VM from VMware ESXi to Proxmox VE.
///
/// Connection details and VM settings are read from ESXI_SERVER,
/// ESXI_USERNAME, ESXI_PASSWORD, ESXI_DATASTORE, VM_NAME, VLAN_TAG, VM_ID and
/// STORAGE_TYPE. Anything not set is asked for interactively.
#[derive(Parser)]
#[command(name = "pvemigrate")]
#[command(version, about)]
struct Cli {
    /// Directory for the exported OVA and its extracted files.
    ///
    /// The default directory is emptied after the import. Any other
    /// directory only loses the files this run created.
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    /// Proxmox bridge for the VM's network interface.
    #[arg(long, default_value = "vmbr0")]
    bridge: String,

    /// LVM thin pool for the EFI variable disk.
    #[arg(long, default_value = "pve/data")]
    thin_pool: String,

    /// Memory in MB, instead of the value from the OVF descriptor.
    #[arg(long)]
    memory: Option<u64>,

    /// CPU cores, instead of the value from the OVF descriptor.
    #[arg(long)]
    cores: Option<u32>,

    /// Skip checking the OVA manifest digests.
    #[arg(long)]
    no_verify_manifest: bool,

    /// Increase log verbosity.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors, and hide progress output.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn options(&self) -> MigrationOptions {
        MigrationOptions {
            work_dir: self.work_dir.clone(),
            bridge: self.bridge.clone(),
            thin_pool: self.thin_pool.clone(),
            memory_mb: self.memory,
            cores: self.cores,
            verify_manifest: !self.no_verify_manifest,
        }
    }

    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

/// Install the tracing subscriber.
///
/// RUST_LOG takes precedence over the verbosity flags.
fn install_tracing(default_level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let format = fmt::format().without_time().with_target(false).compact();

    let fmt_layer = fmt::layer()
        .event_format(format)
        .with_writer(io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

/// Progress callback drawing a byte bar while the OVA is unpacked.
fn unpack_progress() -> Result<ProgressCallback> {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
        .progress_chars("#>-");
    let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
    pb.set_style(style);

    Ok(Box::new(move |progress: MigrationProgress| match progress.phase {
        MigrationPhase::Unpack => {
            if pb.is_hidden() && !pb.is_finished() {
                pb.set_draw_target(ProgressDrawTarget::stderr());
            }
            pb.set_length(progress.bytes_total);
            pb.set_position(progress.bytes_processed);
        }
        _ => {
            if !pb.is_hidden() && !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
    }))
}

fn print_summary(report: &MigrationReport) {
    println!();
    println!("Migration complete");
    println!("------------------");
    println!("VM:        {} ({})", report.vm_name, report.vm_id);
    println!("Memory:    {} MB", report.memory_mb);
    println!("Cores:     {}", report.cores);
    println!("Storage:   {}", report.storage);
    println!(
        "Firmware:  {}{}",
        report.firmware,
        if report.firmware == Firmware::Uefi {
            " (EFI disk attached)"
        } else {
            ""
        }
    );
}

fn run(cli: &Cli) -> Result<()> {
    let env = Environment::from_process();
    let options = cli.options();
    let mut runner = SystemRunner::new();
    let stdin = io::stdin();
    let mut prompter = LinePrompter::new(stdin.lock(), io::stdout());

    let callback = if cli.quiet {
        None
    } else {
        Some(unpack_progress()?)
    };

    let report = pvemigrate_core::run(&env, &options, &mut runner, &mut prompter, callback)
        .map_err(|e| {
            if !matches!(e, pvemigrate_core::Error::MissingTools { .. }) {
                tracing::info!(
                    "working files, if any, were left in {}",
                    options.work_dir.display()
                );
            }
            e
        })?;

    if !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.log_level());

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
