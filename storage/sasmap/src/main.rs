// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command-line utility mapping the disks behind SAS expanders to the drive
//! bays of their enclosures. Also dumps per-phy DISCOVER results, toggles the
//! phys wired to a bay and reads the mpi3mr controller inventory.

mod render;

use std::path::PathBuf;

use anyhow::Context;
use clap::ArgGroup;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use sas_topology::DiagnosticSink;
use sas_topology::DiscoveryConfig;
use sas_topology::ExpanderRegistry;
use sas_topology::LabelStyle;
use sas_topology::SessionOpener;
use sas_topology::Topology;
use sas_topology::TracingSink;
use smp_transport::TransportKind;

use render::DeviceRow;

const LOG_ENV: &str = "SASMAP_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "sasmap",
    about = "SAS enclosure slot mapping utility",
    version,
    long_about = None,
    disable_help_subcommand = true
)]
struct Cli {
    /// Log more (-v for debug, -vv for trace and frame dumps)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(flatten)]
    roots: RootArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct RootArgs {
    /// The sysfs mount [default: /sys]
    #[arg(long, value_name = "DIR", env = "SASMAP_SYSFS_ROOT", global = true)]
    sysfs_root: Option<PathBuf>,
    /// The directory holding the bsg nodes [default: /dev/bsg]
    #[arg(long, value_name = "DIR", env = "SASMAP_BSG_ROOT", global = true)]
    bsg_root: Option<PathBuf>,
    /// The directory holding the mpt control node [default: /dev]
    #[arg(long, value_name = "DIR", env = "SASMAP_DEV_ROOT", global = true)]
    dev_root: Option<PathBuf>,
    /// Timeout of each SMP exchange in milliseconds [default: 20000]
    #[arg(
        long,
        value_name = "MS",
        global = true,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    timeout_ms: Option<u32>,
}

impl RootArgs {
    fn config(&self) -> DiscoveryConfig {
        let mut config = DiscoveryConfig::default();
        if let Some(root) = &self.sysfs_root {
            config.sysfs_root = root.clone();
        }
        if let Some(root) = &self.bsg_root {
            config.bsg_root = root.clone();
        }
        if let Some(root) = &self.dev_root {
            config.dev_root = root.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the SCSI devices with their type, block device and wwid
    #[command(name = "list")]
    List,
    /// Map the devices to enclosure slots
    #[command(name = "slots")]
    Slots(SlotsArgs),
    /// Print the DISCOVER result of every expander phy
    #[command(name = "discover")]
    Discover(DiscoverArgs),
    /// Disable or enable the expander phys wired to slots
    #[command(name = "phy")]
    Phy(PhyArgs),
    /// Print the mpi3mr controller inventory
    #[command(name = "info")]
    Info,
}

/// Nodes that can reach the slot phys.
#[derive(ValueEnum, Copy, Clone, PartialEq, Eq, Debug, Default)]
enum SlotTransport {
    /// bsg expander nodes
    #[default]
    Bsg,
    /// mpi3mr controller nodes
    Mpi3mr,
}

/// Every SMP transport.
#[derive(ValueEnum, Copy, Clone, PartialEq, Eq, Debug, Default)]
enum TransportArg {
    /// bsg expander nodes
    #[default]
    Bsg,
    /// the legacy mpt control node
    Mpt,
    /// mpi3mr controller nodes
    Mpi3mr,
}

impl From<TransportArg> for TransportKind {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Bsg => TransportKind::PassthroughV4,
            TransportArg::Mpt => TransportKind::LegacyIoctl,
            TransportArg::Mpi3mr => TransportKind::VendorPacket,
        }
    }
}

#[derive(ValueEnum, Copy, Clone, PartialEq, Eq, Debug, Default)]
enum LabelArg {
    /// the last 16 characters of the wwid
    Wwid,
    /// slot number and block device
    #[default]
    Block,
    /// slot number and SCSI address
    Name,
}

impl From<LabelArg> for LabelStyle {
    fn from(value: LabelArg) -> Self {
        match value {
            LabelArg::Wwid => LabelStyle::Wwid,
            LabelArg::Block => LabelStyle::Block,
            LabelArg::Name => LabelStyle::Name,
        }
    }
}

#[derive(Args, Debug, Default)]
struct SlotsArgs {
    /// Nodes used for slot discovery
    #[arg(long, value_enum, default_value_t)]
    transport: SlotTransport,
    /// How the slots are labelled
    #[arg(long, value_enum, default_value_t)]
    label: LabelArg,
}

#[derive(Args, Debug, Default)]
struct DiscoverArgs {
    /// Nodes the expanders are reached through
    #[arg(long, value_enum, default_value_t)]
    transport: TransportArg,
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("action").required(true).args(["disable", "enable"])))]
struct PhyArgs {
    /// Slot number, starting at 1; may be repeated
    #[arg(
        long = "slot",
        value_name = "N",
        required = true,
        num_args = 1..,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    slots: Vec<u32>,
    /// Disable the phys
    #[arg(long)]
    disable: bool,
    /// Enable the phys
    #[arg(long)]
    enable: bool,
    /// Nodes used for slot discovery and phy control
    #[arg(long, value_enum, default_value_t)]
    transport: SlotTransport,
}

impl PhyArgs {
    /// The slot indices, counted from 0.
    fn slot_indices(&self) -> Vec<usize> {
        self.slots.iter().map(|&slot| slot as usize - 1).collect()
    }
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var(LOG_ENV).is_ok() {
        EnvFilter::from_env(LOG_ENV)
    } else {
        let level = match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        EnvFilter::default().add_directive(level.into())
    };

    tracing_subscriber::fmt()
        .log_internal_errors(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.roots.config();
    tracing::debug!(?config, "discovery configuration");
    let mut sink = TracingSink;

    match cli.command {
        Command::List => list(&config),
        Command::Slots(args) => {
            let topology = map_slots(&config, args.transport, &mut sink);
            println!("{}", render::slot_table(&topology, args.label.into()));
            Ok(())
        }
        Command::Discover(args) => discover(&config, args.transport.into(), &mut sink),
        Command::Phy(args) => {
            let topology = map_slots(&config, args.transport, &mut sink);
            sas_topology::set_phy_disabled(
                &topology,
                &args.slot_indices(),
                args.disable,
                &mut SessionOpener::new(&config),
                &mut sink,
            );
            Ok(())
        }
        Command::Info => info(&config, &mut sink),
    }
}

fn list(config: &DiscoveryConfig) -> anyhow::Result<()> {
    let root = config.scsi_devices_root();
    let devices = scsi_sysfs::list_scsi_devices(&root)
        .with_context(|| format!("failed to list scsi devices in {}", root.display()))?;

    let mut rows = Vec::with_capacity(devices.len());
    for device in devices {
        let dir = root.join(&device.name);
        let read = |what: &str| format!("failed to read the {what} of {}", device.name);
        let device_type = scsi_sysfs::read_device_type(&dir).with_context(|| read("type"))?;
        let wwid = scsi_sysfs::read_sysfs_attribute(&dir, "wwid").with_context(|| read("wwid"))?;
        let block =
            scsi_sysfs::block_device_name(&dir).with_context(|| read("block device"))?;
        rows.push(DeviceRow {
            type_name: device_type.map_or("-", scsi_sysfs::scsi_device_type_name),
            block: block.unwrap_or_default(),
            wwid: wwid.unwrap_or_default(),
            name: device.name,
        });
    }
    println!("{}", render::device_list(&rows));
    Ok(())
}

/// Scans sysfs and attaches the DISCOVER results of the slot phys.
fn map_slots(
    config: &DiscoveryConfig,
    transport: SlotTransport,
    sink: &mut dyn DiagnosticSink,
) -> Topology {
    let mut topology = sas_topology::scan_scsi_topology(config, sink);
    let mut opener = SessionOpener::new(config);
    match transport {
        SlotTransport::Bsg => sas_topology::slot_discover(&mut topology, config, &mut opener, sink),
        SlotTransport::Mpi3mr => {
            sas_topology::mpi3mr_slot_discover(&mut topology, config, &mut opener, sink);
        }
    }
    topology
}

fn discover(
    config: &DiscoveryConfig,
    kind: TransportKind,
    sink: &mut dyn DiagnosticSink,
) -> anyhow::Result<()> {
    // controller nodes are walked per expander registered in sysfs
    let topology = sas_topology::scan_scsi_topology(config, sink);
    let reports = sas_topology::full_discover(
        config,
        kind,
        &topology.expanders,
        &mut SessionOpener::new(config),
        sink,
    );
    if reports.is_empty() {
        anyhow::bail!("no expander reachable through {kind} nodes");
    }
    println!("{}", render::expander_reports(&reports));
    Ok(())
}

fn info(config: &DiscoveryConfig, sink: &mut dyn DiagnosticSink) -> anyhow::Result<()> {
    let mut expanders = ExpanderRegistry::new(&config.layout);
    let inventory = sas_topology::mpi3mr_inventory(
        config,
        &mut expanders,
        &mut SessionOpener::new(config),
        sink,
    );
    if inventory.is_empty() {
        anyhow::bail!("no mpi3mr controller found in {}", config.bsg_root.display());
    }
    println!("{}", sas_topology::render_inventory(&inventory));
    Ok(())
}
