// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! mpi3mr controller inventory and slot discovery through the controller.

use crate::DiagnosticSink;
use crate::DiscoveryConfig;
use crate::Topology;
use crate::TransportOpener;
use crate::describe;
use crate::discovery::control_nodes;
use crate::discovery::discover_slots;
use crate::discovery::open_node;
use crate::mapping::MappingError;
use crate::mapping::assign_expander;
use crate::registry::ExpanderRegistry;
use mpi_defs::mpi3mr::AdapterInfo;
use mpi_defs::mpi3mr::fixed_str;
use smp_protocol::ReportManufacturer;
use smp_protocol::SmpError;
use smp_protocol::vendor;
use smp_protocol::vendor::IocFacts;
use smp_protocol::vendor::SES_BUFFER_LEN;
use smp_transport::SmpTransport;
use smp_transport::TransportError;
use smp_transport::TransportKind;
use smp_transport::VendorPacketTransport;
use std::fmt;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;

/// Controllers inventoried at most.
const MAX_CONTROLLERS: usize = 4;

/// The page address that starts a configuration page walk.
const FIRST_PAGE_FORM: u32 = 0xffff;

/// An enclosure reported by enclosure page 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosureInfo {
    /// The enclosure logical identifier.
    pub logical_id: u64,
    /// Device handle of the enclosure processor.
    pub sep_dev_handle: u16,
    /// READ BUFFER data of the enclosure processor; `None` when the read
    /// failed.
    pub ses_buffer: Option<[u8; SES_BUFFER_LEN]>,
}

/// An expander reported by SAS expander page 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpanderInfo {
    /// The expander SAS address.
    pub sas_address: u64,
    /// The expander's device handle.
    pub dev_handle: u16,
    /// REPORT MANUFACTURER INFORMATION; `None` when it failed.
    pub manufacturer: Option<ReportManufacturer>,
}

/// What an mpi3mr controller reports about itself and its expanders.
#[derive(Debug, Clone)]
pub struct ControllerInventory {
    /// The control node.
    pub path: PathBuf,
    /// The driver's adapter information.
    pub adapter: Option<AdapterInfo>,
    /// The IOC facts.
    pub facts: Option<IocFacts>,
    /// Enclosures with an enclosure processor, in page walk order.
    pub enclosures: Vec<EnclosureInfo>,
    /// Expanders, in page walk order.
    pub expanders: Vec<ExpanderInfo>,
}

impl ControllerInventory {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            adapter: None,
            facts: None,
            enclosures: Vec::new(),
            expanders: Vec::new(),
        }
    }

    /// The driver name and version from the adapter information.
    pub fn driver(&self) -> Option<(String, String)> {
        let info = &self.adapter.as_ref()?.driver_info;
        Some((
            fixed_str(&info.driver_name),
            fixed_str(&info.driver_version),
        ))
    }

    /// Writes the summary of expander `index`. Expanders pair up with the
    /// enclosures by walk order.
    fn write_expander(
        &self,
        f: &mut fmt::Formatter<'_>,
        index: usize,
        expander: &ExpanderInfo,
    ) -> fmt::Result {
        let enclosure = self.enclosures.get(index);
        let logical_id = enclosure.map_or(0, |enclosure| enclosure.logical_id);
        let ses = enclosure
            .and_then(|enclosure| enclosure.ses_buffer)
            .unwrap_or([0; SES_BUFFER_LEN]);
        let firmware = expander
            .manufacturer
            .as_ref()
            .map_or_else(|| "unknown".to_owned(), ReportManufacturer::firmware_version);
        write!(
            f,
            "ELI ({logical_id:X}) FW: {firmware} MFG: {:02X}:{:02X}",
            ses[12], ses[13]
        )
    }
}

impl Display for ControllerInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.adapter {
            Some(info) => {
                let location = info.pci_location;
                write!(
                    f,
                    "HBA (PCIAddr {:02X}:{:02X}:{:02X}.{:02X})",
                    info.pci_seg_id,
                    location.bus(),
                    location.device(),
                    location.function()
                )?;
            }
            None => write!(f, "HBA ({})", self.path.display())?,
        }
        if let Some(facts) = &self.facts {
            let fw = facts.fw_version;
            write!(
                f,
                ", Firmware Version: {}.{}.{}.{}-{:05}-{:05}, MPI Version: {}.{}",
                fw.gen_major,
                fw.gen_minor,
                fw.phase_major,
                fw.phase_minor,
                fw.customer_id,
                fw.build_num,
                facts.mpi_version.major,
                facts.mpi_version.minor
            )?;
        }
        for (pair, expanders) in self.expanders.chunks(2).enumerate() {
            f.write_str("\n")?;
            for (i, expander) in expanders.iter().enumerate() {
                if i > 0 {
                    f.write_str(",  ")?;
                }
                self.write_expander(f, pair * 2 + i, expander)?;
            }
        }
        Ok(())
    }
}

/// Renders the inventory of all controllers, led by the driver line of the
/// first.
pub fn render_inventory(controllers: &[ControllerInventory]) -> String {
    let mut lines = Vec::new();
    if let Some((name, version)) = controllers.first().and_then(ControllerInventory::driver) {
        lines.push(format!("{name}, Driver Version: {version}"));
    }
    lines.extend(controllers.iter().map(ToString::to_string));
    lines.join("\n")
}

fn vendor_interface<T: SmpTransport>(
    transport: &mut T,
) -> Result<&mut dyn VendorPacketTransport, SmpError> {
    transport
        .as_vendor()
        .ok_or(SmpError::Transport(TransportError::Unsupported))
}

fn reported<T>(
    result: Result<T, SmpError>,
    path: &Path,
    what: &str,
    sink: &mut dyn DiagnosticSink,
) -> Option<T> {
    result
        .map_err(|err| {
            sink.report(format!(
                "{}: {what} failed: {}",
                path.display(),
                describe(&err)
            ));
        })
        .ok()
}

fn read_controller<T: SmpTransport>(
    transport: &mut T,
    path: &Path,
    max_expanders: usize,
    sink: &mut dyn DiagnosticSink,
) -> ControllerInventory {
    let mut controller = ControllerInventory::new(path);
    controller.adapter = reported(
        vendor_interface(transport).and_then(vendor::get_adapter_info),
        path,
        "adapter info",
        sink,
    );
    controller.facts = reported(
        vendor_interface(transport).and_then(vendor::get_ioc_facts),
        path,
        "ioc facts",
        sink,
    );

    let mut form = FIRST_PAGE_FORM;
    for _ in 0..=max_expanders {
        let page = match vendor_interface(transport)
            .and_then(|iface| vendor::enclosure_page0(iface, form))
        {
            Ok(page) => page,
            Err(err) => {
                tracing::debug!(
                    form,
                    error = &err as &dyn std::error::Error,
                    "enclosure page walk ended"
                );
                break;
            }
        };
        if page.enclosure_logical_id == 0 {
            break;
        }
        if page.sep_dev_handle != 0 && controller.enclosures.len() < max_expanders {
            let ses_buffer = reported(
                vendor_interface(transport)
                    .and_then(|iface| vendor::read_ses_buffer(iface, page.sep_dev_handle)),
                path,
                "ses read buffer",
                sink,
            );
            controller.enclosures.push(EnclosureInfo {
                logical_id: page.enclosure_logical_id,
                sep_dev_handle: page.sep_dev_handle,
                ses_buffer,
            });
        }
        form = u32::from(page.enclosure_handle);
    }

    let mut form = FIRST_PAGE_FORM;
    for _ in 0..max_expanders {
        let page = match vendor_interface(transport)
            .and_then(|iface| vendor::sas_expander_page0(iface, form))
        {
            Ok(page) => page,
            Err(err) => {
                tracing::debug!(
                    form,
                    error = &err as &dyn std::error::Error,
                    "expander page walk ended"
                );
                break;
            }
        };
        if page.sas_address == 0 {
            break;
        }
        transport.set_target(page.sas_address);
        let manufacturer = reported(
            smp_protocol::report_manufacturer(transport),
            path,
            "report manufacturer",
            sink,
        );
        controller.expanders.push(ExpanderInfo {
            sas_address: page.sas_address,
            dev_handle: page.dev_handle,
            manufacturer,
        });
        form = u32::from(page.dev_handle);
    }
    controller
}

/// Reads adapter information, IOC facts, enclosures and expanders from each
/// mpi3mr controller node, binding each expander found to its node in
/// `expanders`.
pub fn mpi3mr_inventory<O: TransportOpener>(
    config: &DiscoveryConfig,
    expanders: &mut ExpanderRegistry,
    opener: &mut O,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ControllerInventory> {
    let kind = TransportKind::VendorPacket;
    let mut inventory = Vec::new();
    for path in control_nodes(config, kind, sink)
        .into_iter()
        .take(MAX_CONTROLLERS)
    {
        let Some(ordinal) = smp_transport::controller_ordinal(&path) else {
            sink.report(format!(
                "{}: {}",
                path.display(),
                TransportError::ControllerOrdinal { path: path.clone() }
            ));
            continue;
        };
        let Some(mut transport) = open_node(opener, &path, kind, sink) else {
            continue;
        };
        let controller = read_controller(&mut transport, &path, config.layout.expanders, sink);

        for expander in &controller.expanders {
            let index = assign_expander(expander.sas_address);
            match expanders.bind(index, &path, kind, Some(ordinal)) {
                Some(entry) => {
                    if entry.world_wide_id64 == 0 {
                        entry.world_wide_id64 = expander.sas_address;
                    }
                }
                None => sink.report(format!(
                    "{}: {}",
                    path.display(),
                    MappingError::ExpanderOutOfRange(index)
                )),
            }
        }
        inventory.push(controller);
    }
    inventory
}

/// Takes the controller inventory, then runs slot discovery on each expander
/// through the controller node it was found on.
pub fn mpi3mr_slot_discover<O: TransportOpener>(
    topology: &mut Topology,
    config: &DiscoveryConfig,
    opener: &mut O,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ControllerInventory> {
    let inventory = mpi3mr_inventory(config, &mut topology.expanders, opener, sink);

    let bound: Vec<_> = topology
        .expanders
        .iter()
        .filter(|(_, entry)| entry.bound_transport_kind == Some(TransportKind::VendorPacket))
        .filter_map(|(_, entry)| {
            Some((entry.bound_transport_path.clone()?, entry.world_wide_id64))
        })
        .collect();
    for (path, wwid) in bound {
        let Some(mut transport) = open_node(opener, &path, TransportKind::VendorPacket, sink)
        else {
            continue;
        };
        transport.set_target(wwid);
        discover_slots(&mut transport, &path, topology, sink);
    }
    inventory
}
