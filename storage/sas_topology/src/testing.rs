// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fake transports for the discovery passes.

use crate::TransportOpener;
use mpi_defs::mpi3::MPI3_CONFIG_ACTION_PAGE_HEADER;
use mpi_defs::mpi3::MPI3_CONFIG_PAGETYPE_ENCLOSURE;
use smp_transport::SmpExchange;
use smp_transport::SmpTransport;
use smp_transport::TransportError;
use smp_transport::TransportKind;
use smp_transport::VendorCommand;
use smp_transport::VendorPacketTransport;
use smp_transport::VendorReply;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

/// A simulated expander answering REPORT GENERAL, REPORT MANUFACTURER,
/// DISCOVER and PHY CONTROL.
#[derive(Debug, Clone, Default)]
pub struct FakeExpander {
    pub sas_address: u64,
    pub enclosure_logical_id: u64,
    /// One DISCOVER response body per phy; phys past the end do not
    /// exist.
    pub phys: Vec<PhyReply>,
}

#[derive(Debug, Clone)]
pub enum PhyReply {
    Frame(Vec<u8>),
    Result(u8),
}

impl FakeExpander {
    pub fn new(sas_address: u64) -> Self {
        Self {
            sas_address,
            enclosure_logical_id: sas_address & !0xff,
            phys: Vec::new(),
        }
    }

    /// Adds a phy attached to an end device, reporting `slot`.
    pub fn with_disk(mut self, sas_address: u64, slot: Option<u8>) -> Self {
        let phy = self.phys.len() as u8;
        let mut rp = self.discover_frame(phy);
        rp[12] = 0x10;
        rp[13] = 0x0a;
        rp[15] = 0x08;
        rp[24..32].copy_from_slice(&sas_address.to_be_bytes());
        rp[108] = slot.unwrap_or(0xff);
        self.phys.push(PhyReply::Frame(rp));
        self
    }

    /// Adds a phy attached to the HBA.
    pub fn with_initiator(mut self, device_name: u64) -> Self {
        let phy = self.phys.len() as u8;
        let mut rp = self.discover_frame(phy);
        rp[12] = 0x10;
        rp[13] = 0x0b;
        rp[14] = 0x0e;
        rp[24..32].copy_from_slice(&(device_name + 1).to_be_bytes());
        rp[52..60].copy_from_slice(&device_name.to_be_bytes());
        self.phys.push(PhyReply::Frame(rp));
        self
    }

    /// Adds a phy answering with a function result.
    pub fn with_result(mut self, result: u8) -> Self {
        self.phys.push(PhyReply::Result(result));
        self
    }

    fn discover_frame(&self, phy: u8) -> Vec<u8> {
        let mut rp = vec![0u8; 120];
        rp[..4].copy_from_slice(&[0x41, 0x10, 0x00, 0x1b]);
        rp[9] = phy;
        rp[16..24].copy_from_slice(&self.sas_address.to_be_bytes());
        rp[108] = 0xff;
        rp
    }

    fn answer(&self, request: &[u8]) -> Vec<u8> {
        match request.get(1).copied().unwrap_or(0) {
            0x00 => {
                let mut rp = vec![0u8; 32];
                rp[..4].copy_from_slice(&[0x41, 0x00, 0x00, 0x07]);
                rp[9] = self.phys.len() as u8;
                rp[12..20].copy_from_slice(&self.enclosure_logical_id.to_be_bytes());
                rp
            }
            0x01 => {
                let mut rp = vec![0u8; 60];
                rp[..4].copy_from_slice(&[0x41, 0x01, 0x00, 0x0e]);
                rp[12..20].copy_from_slice(b"LSI     ");
                rp[20..36].copy_from_slice(b"SAS40xx         ");
                rp[36..40].copy_from_slice(b"3011");
                rp
            }
            0x10 => {
                let phy = request.get(9).copied().unwrap_or(0) as usize;
                match self.phys.get(phy) {
                    Some(PhyReply::Frame(rp)) => rp.clone(),
                    Some(PhyReply::Result(result)) => vec![0x41, 0x10, *result, 0],
                    None => vec![0x41, 0x10, 0x10, 0],
                }
            }
            function => vec![0x41, function, 0, 0],
        }
    }
}

/// What the fake nodes saw.
#[derive(Debug, Default)]
pub struct Journal {
    pub opened: Vec<PathBuf>,
    /// (node, target, request)
    pub requests: Vec<(PathBuf, u64, Vec<u8>)>,
    pub vendor: Vec<(PathBuf, String)>,
}

/// A controller node answering mpi3mr management commands.
#[derive(Debug, Clone, Default)]
pub struct FakeController {
    pub adapter_info: Vec<u8>,
    pub ioc_facts: Vec<u8>,
    /// Enclosure page 0 bodies, looked up by form.
    pub enclosure_pages: HashMap<u32, Vec<u8>>,
    /// SAS expander page 0 bodies, looked up by form.
    pub expander_pages: HashMap<u32, Vec<u8>>,
    /// SES buffers by device handle.
    pub ses: HashMap<u16, Vec<u8>>,
}

/// Serves [`FakeExpander`]s and [`FakeController`]s by node path.
#[derive(Debug, Clone, Default)]
pub struct FakeOpener {
    /// Expanders reachable on each node; bsg nodes have one.
    pub nodes: HashMap<PathBuf, Vec<FakeExpander>>,
    pub controllers: HashMap<PathBuf, FakeController>,
    pub fail_open: HashSet<PathBuf>,
    pub journal: Arc<Mutex<Journal>>,
}

impl FakeOpener {
    pub fn opened(&self) -> Vec<PathBuf> {
        self.journal.lock().unwrap().opened.clone()
    }

    pub fn requests(&self) -> Vec<(PathBuf, u64, Vec<u8>)> {
        self.journal.lock().unwrap().requests.clone()
    }

    pub fn vendor_commands(&self) -> Vec<(PathBuf, String)> {
        self.journal.lock().unwrap().vendor.clone()
    }
}

pub struct FakeTransport {
    path: PathBuf,
    kind: TransportKind,
    target: u64,
    expanders: Vec<FakeExpander>,
    controller: Option<FakeController>,
    journal: Arc<Mutex<Journal>>,
}

impl TransportOpener for FakeOpener {
    type Transport = FakeTransport;

    fn open(
        &mut self,
        path: &Path,
        kind: TransportKind,
    ) -> Result<FakeTransport, TransportError> {
        if self.fail_open.contains(path) {
            return Err(TransportError::Open {
                path: path.to_owned(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        self.journal.lock().unwrap().opened.push(path.to_owned());
        Ok(FakeTransport {
            path: path.to_owned(),
            kind,
            target: 0,
            expanders: self.nodes.get(path).cloned().unwrap_or_default(),
            controller: self.controllers.get(path).cloned(),
            journal: self.journal.clone(),
        })
    }
}

impl FakeTransport {
    fn expander(&self) -> Option<&FakeExpander> {
        match self.kind {
            TransportKind::PassthroughV4 => self.expanders.first(),
            _ => self
                .expanders
                .iter()
                .find(|expander| expander.sas_address == self.target),
        }
    }
}

impl SmpTransport for FakeTransport {
    fn send(&mut self, exchange: &mut SmpExchange<'_>) -> Result<(), TransportError> {
        self.journal.lock().unwrap().requests.push((
            self.path.clone(),
            self.target,
            exchange.request.to_vec(),
        ));
        let Some(expander) = self.expander() else {
            return Err(TransportError::Unsupported);
        };
        let rp = expander.answer(exchange.request);
        let n = rp.len().min(exchange.response.len());
        exchange.response[..n].copy_from_slice(&rp[..n]);
        exchange.actual_response_len = Some(n);
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn set_target(&mut self, sas_address: u64) {
        self.target = sas_address;
    }

    fn as_vendor(&mut self) -> Option<&mut dyn VendorPacketTransport> {
        if self.controller.is_some() {
            Some(self as &mut dyn VendorPacketTransport)
        } else {
            None
        }
    }
}

impl VendorPacketTransport for FakeTransport {
    fn submit(
        &mut self,
        command: &VendorCommand<'_>,
        data_in: &mut [u8],
    ) -> Result<VendorReply, TransportError> {
        let controller = self.controller.as_ref().ok_or(TransportError::Unsupported)?;
        let (label, reply) = match command {
            VendorCommand::AdapterInfo => ("adapter info".to_owned(), Some(&controller.adapter_info)),
            VendorCommand::IocFacts => ("ioc facts".to_owned(), Some(&controller.ioc_facts)),
            VendorCommand::Config(request) if request.action == MPI3_CONFIG_ACTION_PAGE_HEADER => {
                // headers are not inspected; any 8 bytes will do
                return Ok(VendorReply {
                    response_len: data_in.len(),
                    transport_status: 0,
                });
            }
            VendorCommand::Config(request) => {
                let pages = if request.page_type == MPI3_CONFIG_PAGETYPE_ENCLOSURE {
                    &controller.enclosure_pages
                } else {
                    &controller.expander_pages
                };
                (
                    format!("page {:#x} form {:#x}", request.page_type, request.page_address),
                    pages.get(&request.page_address),
                )
            }
            VendorCommand::ScsiIo(request) => (
                format!("scsi io {:#x}", request.dev_handle),
                controller.ses.get(&request.dev_handle),
            ),
            VendorCommand::AllTargetInfo | VendorCommand::SmpPassthrough { .. } => {
                return Err(TransportError::Unsupported);
            }
        };
        self.journal
            .lock()
            .unwrap()
            .vendor
            .push((self.path.clone(), label));

        let Some(reply) = reply else {
            return Ok(VendorReply {
                response_len: 0,
                transport_status: 1,
            });
        };
        let n = reply.len().min(data_in.len());
        data_in[..n].copy_from_slice(&reply[..n]);
        Ok(VendorReply {
            response_len: n,
            transport_status: 0,
        })
    }
}
