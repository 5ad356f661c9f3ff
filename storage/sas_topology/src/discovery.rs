// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The SMP passes: per-phy discovery into the slot table, full expander
//! walks and phy enable/disable.

use crate::DiagnosticSink;
use crate::DiscoveryConfig;
use crate::Topology;
use crate::TransportOpener;
use crate::describe;
use crate::mapping::MappingError;
use crate::mapping::assign_expander;
use crate::registry::ExpanderRegistry;
use smp_protocol::PhyDiscoveryRecord;
use smp_protocol::ReportGeneral;
use smp_protocol::SmpError;
use smp_transport::SmpTransport;
use smp_transport::TransportKind;
use std::path::Path;
use std::path::PathBuf;

/// Phys queried per expander by slot discovery.
const SLOT_DISCOVERY_PHYS: u8 = 32;

/// The outcome of walking every phy of one expander.
#[derive(Debug, Clone, Default)]
pub struct ExpanderReport {
    /// The node the expander was reached through.
    pub path: PathBuf,
    /// The SAS address targeted, for controller nodes.
    pub target: Option<u64>,
    /// The REPORT GENERAL response; `None` when it failed.
    pub general: Option<ReportGeneral>,
    /// The expander SAS address from the DISCOVER responses.
    pub expander_sas_address: u64,
    /// Every decoded DISCOVER response.
    pub records: Vec<PhyDiscoveryRecord>,
    /// The printable summary: the enclosure line, then one line per phy.
    pub lines: Vec<String>,
}

/// Where a DISCOVER loop goes after a request.
enum Step {
    Record(PhyDiscoveryRecord),
    Vacant,
    Skip,
    Stop,
}

/// Sends DISCOVER for `phy` and sorts the failures.
///
/// A missing phy ends the walk quietly. A transport failure ends the walk
/// with a diagnostic. Any other failure skips only this phy, with a
/// diagnostic unless the phy is vacant.
fn discover_step<T: SmpTransport + ?Sized>(
    transport: &mut T,
    path: &Path,
    phy: u8,
    table_to_table: bool,
    sink: &mut dyn DiagnosticSink,
) -> Step {
    match smp_protocol::discover(transport, phy, table_to_table) {
        Ok(record) => Step::Record(record),
        Err(err) if err.is_no_phy() => Step::Stop,
        Err(err) if err.is_phy_vacant() => Step::Vacant,
        Err(SmpError::FunctionResult(result)) => {
            sink.report(format!("{}: phy {phy}: {result}", path.display()));
            Step::Skip
        }
        Err(err) => {
            sink.report(format!(
                "{}: discover phy {phy} failed: {}",
                path.display(),
                describe(&err)
            ));
            match err {
                SmpError::Transport(_) | SmpError::TransportStatus(_) => Step::Stop,
                _ => Step::Skip,
            }
        }
    }
}

fn track_expander_address(current: &mut u64, record: &PhyDiscoveryRecord) {
    let address = record.expander_sas_address;
    if address == 0 || *current == address {
        return;
    }
    if *current != 0 {
        tracing::warn!(
            previous = format_args!("{:#x}", *current),
            current = format_args!("{address:#x}"),
            phy = record.requested_phy,
            "expander sas address changing"
        );
    }
    *current = address;
}

/// Walks one expander: REPORT GENERAL, then DISCOVER on each of its phys.
fn walk_expander<T: SmpTransport + ?Sized>(
    transport: &mut T,
    path: &Path,
    target: Option<u64>,
    sink: &mut dyn DiagnosticSink,
) -> ExpanderReport {
    let mut report = ExpanderReport {
        path: path.to_owned(),
        target,
        ..ExpanderReport::default()
    };
    let general = match smp_protocol::report_general(transport) {
        Ok(general) => general,
        Err(err) => {
            sink.report(format!(
                "{}: report general failed: {}",
                path.display(),
                describe(&err)
            ));
            return report;
        }
    };
    report.general = Some(general);
    report.lines.push(format!(
        "  Enclosure Logical Identifier: {:x}",
        general.enclosure_logical_id
    ));

    for phy in 0..general.phy_count {
        let record = match discover_step(transport, path, phy, general.table_to_table, sink) {
            Step::Record(record) => record,
            Step::Vacant => {
                report.lines.push(PhyDiscoveryRecord::vacant_summary(phy));
                continue;
            }
            Step::Skip => continue,
            Step::Stop => break,
        };
        track_expander_address(&mut report.expander_sas_address, &record);
        if let Some(line) = record.summary() {
            report.lines.push(line);
        }
        report.records.push(record);
    }
    tracing::debug!(
        path = %path.display(),
        phys = report.records.len(),
        "expander walked"
    );
    report
}

/// Lists the control nodes for `kind`, reporting a failure as a diagnostic.
pub(crate) fn control_nodes(
    config: &DiscoveryConfig,
    kind: TransportKind,
    sink: &mut dyn DiagnosticSink,
) -> Vec<PathBuf> {
    let root = match kind {
        TransportKind::PassthroughV4 | TransportKind::VendorPacket => &config.bsg_root,
        TransportKind::LegacyIoctl => &config.dev_root,
    };
    match smp_transport::list_control_nodes(root, kind) {
        Ok(nodes) => nodes,
        Err(err) => {
            sink.report(format!(
                "cannot list {} nodes in {}: {}",
                kind,
                root.display(),
                describe(&err)
            ));
            Vec::new()
        }
    }
}

/// Opens `path`, reporting a failure as a diagnostic.
pub(crate) fn open_node<O: TransportOpener>(
    opener: &mut O,
    path: &Path,
    kind: TransportKind,
    sink: &mut dyn DiagnosticSink,
) -> Option<O::Transport> {
    match opener.open(path, kind) {
        Ok(transport) => Some(transport),
        Err(err) => {
            sink.report(describe(&err));
            None
        }
    }
}

/// Walks every expander reachable through `kind` nodes.
///
/// bsg expander nodes are walked once each. Controller nodes are walked once
/// per expander registered in `expanders`, targeting its SAS address.
pub fn full_discover<O: TransportOpener>(
    config: &DiscoveryConfig,
    kind: TransportKind,
    expanders: &ExpanderRegistry,
    opener: &mut O,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ExpanderReport> {
    let mut reports = Vec::new();
    for path in control_nodes(config, kind, sink) {
        let Some(mut transport) = open_node(opener, &path, kind, sink) else {
            continue;
        };
        match kind {
            TransportKind::PassthroughV4 => {
                reports.push(walk_expander(&mut transport, &path, None, sink));
            }
            TransportKind::LegacyIoctl | TransportKind::VendorPacket => {
                for (_, expander) in expanders.iter() {
                    let wwid = expander.world_wide_id64;
                    if wwid == 0 {
                        continue;
                    }
                    transport.set_target(wwid);
                    reports.push(walk_expander(&mut transport, &path, Some(wwid), sink));
                }
            }
        }
    }
    reports
}

/// Runs DISCOVER on every bsg expander node and records the results in
/// `topology`.
pub fn slot_discover<O: TransportOpener>(
    topology: &mut Topology,
    config: &DiscoveryConfig,
    opener: &mut O,
    sink: &mut dyn DiagnosticSink,
) {
    let kind = TransportKind::PassthroughV4;
    for path in control_nodes(config, kind, sink) {
        if let Some(mut transport) = open_node(opener, &path, kind, sink) {
            discover_slots(&mut transport, &path, topology, sink);
        }
    }
}

/// Runs DISCOVER on phys 0..32 of the current target.
///
/// The first phy attached to an initiator is the HBA link and binds `path`
/// to the expander. Every other phy reporting a device slot number is
/// recorded in that slot.
pub(crate) fn discover_slots<T: SmpTransport + ?Sized>(
    transport: &mut T,
    path: &Path,
    topology: &mut Topology,
    sink: &mut dyn DiagnosticSink,
) {
    let mut expander_sas_address = 0;
    for phy in 0..SLOT_DISCOVERY_PHYS {
        let record = match discover_step(transport, path, phy, false, sink) {
            Step::Record(record) => record,
            Step::Vacant => {
                tracing::debug!(phy, "phy vacant");
                continue;
            }
            Step::Skip => continue,
            Step::Stop => break,
        };
        track_expander_address(&mut expander_sas_address, &record);

        match record.attached {
            Some(attached) if attached.is_initiator() => {
                if let Some(name) = attached.device_name.filter(|&name| name != 0) {
                    bind_hba_link(topology, path, transport.kind(), name, record, sink);
                }
            }
            _ => store_slot_record(topology, record, sink),
        }
    }
}

fn bind_hba_link(
    topology: &mut Topology,
    path: &Path,
    kind: TransportKind,
    initiator_name: u64,
    record: PhyDiscoveryRecord,
    sink: &mut dyn DiagnosticSink,
) {
    let index = assign_expander(record.expander_sas_address);
    if topology
        .expanders
        .get(index)
        .is_some_and(|entry| entry.attached_initiator_name.is_some())
    {
        return;
    }
    let ordinal = match kind {
        TransportKind::PassthroughV4 => None,
        TransportKind::LegacyIoctl | TransportKind::VendorPacket => {
            smp_transport::controller_ordinal(path)
        }
    };
    let Some(entry) = topology.expanders.bind(index, path, kind, ordinal) else {
        sink.report(format!(
            "{}: {}",
            path.display(),
            MappingError::ExpanderOutOfRange(index)
        ));
        return;
    };
    if entry.world_wide_id64 == 0 {
        entry.world_wide_id64 = record.expander_sas_address;
    }
    entry.attached_initiator_name = Some(initiator_name);
    tracing::debug!(
        path = %path.display(),
        index,
        initiator = format_args!("{initiator_name:#x}"),
        "bound expander"
    );
    entry.last_discovery = Some(record);
}

fn store_slot_record(
    topology: &mut Topology,
    record: PhyDiscoveryRecord,
    sink: &mut dyn DiagnosticSink,
) {
    let Some(dsn) = record.device_slot_number else {
        tracing::trace!(phy = record.phy_id, "no device slot number");
        return;
    };
    let layout = topology.layout;
    let expander = assign_expander(record.expander_sas_address);
    let dsn = usize::from(dsn);
    if expander >= layout.expanders || dsn >= layout.slots_per_expander {
        sink.report(format!(
            "phy {} of expander {:#x} reports slot {dsn}, outside the slot table",
            record.phy_id, record.expander_sas_address
        ));
        return;
    }
    topology
        .slots
        .set_discovery(expander * layout.slots_per_expander + dsn, record);
}

/// Disables, or with `disable` false re-enables, the expander phys wired to
/// the slot indices in `slots`.
///
/// Slots need a phy recorded by slot discovery, which also bound the node
/// reaching their expander.
pub fn set_phy_disabled<O: TransportOpener>(
    topology: &Topology,
    slots: &[usize],
    disable: bool,
    opener: &mut O,
    sink: &mut dyn DiagnosticSink,
) {
    for &slot in slots {
        let Some(phy) = topology.slots.get(slot).and_then(|entry| entry.phy_id()) else {
            sink.report(format!("slot {slot}: no phy recorded"));
            continue;
        };
        let index = slot / topology.layout.slots_per_expander;
        let expander = topology.expanders.expander_or_default(index);
        let (Some(path), Some(kind)) = (
            expander.bound_transport_path.as_deref(),
            expander.bound_transport_kind,
        ) else {
            sink.report(format!("slot {slot}: expander {index} has no transport"));
            continue;
        };
        let Some(mut transport) = open_node(opener, path, kind, sink) else {
            continue;
        };
        transport.set_target(expander.world_wide_id64);
        tracing::info!(slot, phy, disable, path = %path.display(), "phy control");
        smp_protocol::phy_control(&mut transport, phy, disable);
    }
}
