// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel transports for SAS Management Protocol exchanges.
//!
//! An SMP frame can reach an expander three ways on Linux:
//!
//! * the generic bsg passthrough on `/dev/bsg/expander-*` nodes,
//! * the legacy `MPT2COMMAND`/`MPTCOMMAND` ioctl on the mpt control node,
//! * the mpi3mr bsg packet on `/dev/bsg/mpi3mrctl*`, which also carries the
//!   controller's own management commands.
//!
//! [`TransportSession`] owns one open node and implements [`SmpTransport`]
//! for all of them. The mpi3mr management commands are reached through
//! [`SmpTransport::as_vendor`].

mod bsg;
#[cfg(target_os = "linux")]
mod ioctl;
mod mpi3mr;
mod mpt;

pub use mpi3mr::PacketPlan;
pub use mpi3mr::build_packet;

use mpi_defs::mpi3;
use mpi_defs::mpt::IocStatus;
use mpi_defs::mpt::SasStatus;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening a node or moving a frame through it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The node could not be opened for read/write.
    #[error("failed to open {}", .path.display())]
    Open {
        /// The node.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The node could not be inspected.
    #[error("failed to stat {}", .path.display())]
    Stat {
        /// The node.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The node is not an mpt control device.
    #[error("{} is not an mpt control node (major {major}, minor {minor})", .path.display())]
    DeviceIdentity {
        /// The node.
        path: PathBuf,
        /// Major device number, zero when the node is not a character device.
        major: u64,
        /// Minor device number, zero when the node is not a character device.
        minor: u64,
    },
    /// The ioctl itself failed.
    #[cfg(target_os = "linux")]
    #[error("{name} ioctl failed")]
    Ioctl {
        /// The ioctl.
        name: &'static str,
        /// The errno.
        #[source]
        source: nix::Error,
    },
    /// The controller rejected the SMP passthrough.
    #[error("smp passthrough failed: {}", status_text(.ioc_status, .sas_status))]
    SasStatus {
        /// The masked IOC status.
        ioc_status: IocStatus,
        /// The SAS status.
        sas_status: SasStatus,
        /// IOC log information.
        log_info: u32,
    },
    /// The node name does not end in a usable controller number.
    #[error("{} does not name a controller number", .path.display())]
    ControllerOrdinal {
        /// The node.
        path: PathBuf,
    },
    /// A buffer does not fit the length field describing it.
    #[error("transfer of {0} bytes does not fit the request")]
    RequestTooLarge(usize),
    /// The transport cannot carry this exchange on this platform or node.
    #[error("operation not supported by the transport")]
    Unsupported,
}

fn status_text(ioc_status: &IocStatus, sas_status: &SasStatus) -> String {
    if *sas_status != SasStatus::SUCCESS {
        match sas_status.description() {
            Some(text) => text.to_owned(),
            None => format!("unrecognized SAS (SMP) error {:#x}", sas_status.0),
        }
    } else {
        match ioc_status.description() {
            Some(text) => format!("{text} (IOCStatus)"),
            None => format!("IOCStatus={:#x}", ioc_status.0),
        }
    }
}

/// Converts a buffer length to a kernel length field.
fn xfer_len(len: usize) -> Result<u32, TransportError> {
    u32::try_from(len).map_err(|_| TransportError::RequestTooLarge(len))
}

/// The kind of kernel interface behind a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Generic bsg passthrough, `struct sg_io_v4`.
    PassthroughV4,
    /// Legacy mpt control node ioctl.
    LegacyIoctl,
    /// mpi3mr bsg packet.
    VendorPacket,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::PassthroughV4 => "bsg",
            TransportKind::LegacyIoctl => "mpt",
            TransportKind::VendorPacket => "mpi3mr",
        })
    }
}

/// One SMP request/response exchange.
///
/// Both buffers include room for the trailing CRC, which nobody computes.
#[derive(Debug)]
pub struct SmpExchange<'a> {
    /// The request frame.
    pub request: &'a [u8],
    /// Receives the response frame.
    pub response: &'a mut [u8],
    /// Bytes the transport reports as received, when it knows.
    pub actual_response_len: Option<usize>,
    /// Non-zero when the kernel reported a driver, transport or device
    /// failure.
    pub transport_status: u32,
}

impl<'a> SmpExchange<'a> {
    /// A fresh exchange over the two buffers.
    pub fn new(request: &'a [u8], response: &'a mut [u8]) -> Self {
        Self {
            request,
            response,
            actual_response_len: None,
            transport_status: 0,
        }
    }
}

/// Moves SMP frames to the currently targeted expander.
pub trait SmpTransport {
    /// Performs one exchange, filling the response buffer and the status
    /// fields of `exchange`.
    fn send(&mut self, exchange: &mut SmpExchange<'_>) -> Result<(), TransportError>;

    /// The kernel interface in use.
    fn kind(&self) -> TransportKind;

    /// Sets the SAS address subsequent exchanges are routed to. bsg
    /// expander nodes are bound to one expander and ignore it.
    fn set_target(&mut self, sas_address: u64);

    /// The controller management interface, for transports that have one.
    fn as_vendor(&mut self) -> Option<&mut dyn VendorPacketTransport> {
        None
    }
}

/// A command carried by an mpi3mr bsg packet.
#[derive(Debug, Copy, Clone)]
pub enum VendorCommand<'a> {
    /// Driver command: adapter information.
    AdapterInfo,
    /// Driver command: device handle to target map.
    AllTargetInfo,
    /// IOC facts request.
    IocFacts,
    /// Configuration page request.
    Config(&'a mpi3::ConfigRequest),
    /// SCSI I/O request to a device handle.
    ScsiIo(&'a mpi3::ScsiIoRequest),
    /// SMP passthrough to an expander.
    SmpPassthrough {
        /// The expander.
        sas_address: u64,
        /// The SMP request frame.
        request: &'a [u8],
    },
}

/// The outcome of a vendor packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VendorReply {
    /// Valid bytes of the data-in buffer, derived per command.
    pub response_len: usize,
    /// First non-zero of driver, transport and device status.
    pub transport_status: u32,
}

/// Submits mpi3mr bsg packets.
pub trait VendorPacketTransport {
    /// Submits `command`, receiving its data into `data_in`.
    fn submit(
        &mut self,
        command: &VendorCommand<'_>,
        data_in: &mut [u8],
    ) -> Result<VendorReply, TransportError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Backend {
    Bsg,
    Mpt(mpt::Opcode),
    Mpi3mr,
}

/// An open transport node.
///
/// The node is closed when the session is dropped or explicitly
/// [closed](Self::close).
#[derive(Debug)]
pub struct TransportSession {
    path: PathBuf,
    file: fs_err::File,
    backend: Backend,
    controller_ordinal: u8,
    target: u64,
    timeout_ms: u32,
}

impl TransportSession {
    /// Opens `path` as a `kind` transport.
    pub fn open(path: impl AsRef<Path>, kind: TransportKind) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let file = fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_owned(),
                source,
            })?;

        let backend = match kind {
            TransportKind::PassthroughV4 => Backend::Bsg,
            TransportKind::LegacyIoctl => Backend::Mpt(mpt::identify(path, file.file())?),
            TransportKind::VendorPacket => Backend::Mpi3mr,
        };

        let controller_ordinal = match kind {
            TransportKind::PassthroughV4 => 0,
            TransportKind::LegacyIoctl | TransportKind::VendorPacket => controller_ordinal(path)
                .ok_or_else(|| TransportError::ControllerOrdinal {
                    path: path.to_owned(),
                })?,
        };
        tracing::debug!(
            path = %path.display(),
            %kind,
            controller_ordinal,
            "opened transport"
        );

        Ok(Self {
            path: path.to_owned(),
            file,
            backend,
            controller_ordinal,
            target: 0,
            timeout_ms: mpi_defs::bsg::DEFAULT_TIMEOUT_MS,
        })
    }

    /// The node this session was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The controller ordinal handed to the driver.
    pub fn controller_ordinal(&self) -> u8 {
        self.controller_ordinal
    }

    /// The current target SAS address.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Sets the per-exchange timeout.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    /// Closes the node.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "closing transport");
    }
}

impl SmpTransport for TransportSession {
    fn send(&mut self, exchange: &mut SmpExchange<'_>) -> Result<(), TransportError> {
        match self.backend {
            Backend::Bsg => bsg::send(self.file.file(), exchange, self.timeout_ms),
            Backend::Mpt(opcode) => mpt::send(
                self.file.file(),
                opcode,
                self.controller_ordinal,
                self.target,
                exchange,
            ),
            Backend::Mpi3mr => {
                let reply = mpi3mr::submit(
                    self.file.file(),
                    self.controller_ordinal,
                    self.timeout_ms,
                    &VendorCommand::SmpPassthrough {
                        sas_address: self.target,
                        request: exchange.request,
                    },
                    exchange.response,
                )?;
                exchange.actual_response_len = Some(reply.response_len);
                exchange.transport_status = reply.transport_status;
                Ok(())
            }
        }
    }

    fn kind(&self) -> TransportKind {
        match self.backend {
            Backend::Bsg => TransportKind::PassthroughV4,
            Backend::Mpt(_) => TransportKind::LegacyIoctl,
            Backend::Mpi3mr => TransportKind::VendorPacket,
        }
    }

    fn set_target(&mut self, sas_address: u64) {
        if sas_address == 0 && self.backend != Backend::Bsg {
            tracing::debug!(
                path = %self.path.display(),
                "this transport typically needs the SAS address of the target"
            );
        }
        self.target = sas_address;
    }

    fn as_vendor(&mut self) -> Option<&mut dyn VendorPacketTransport> {
        match self.backend {
            Backend::Mpi3mr => Some(self as &mut dyn VendorPacketTransport),
            Backend::Bsg | Backend::Mpt(_) => None,
        }
    }
}

impl VendorPacketTransport for TransportSession {
    fn submit(
        &mut self,
        command: &VendorCommand<'_>,
        data_in: &mut [u8],
    ) -> Result<VendorReply, TransportError> {
        if self.backend != Backend::Mpi3mr {
            return Err(TransportError::Unsupported);
        }
        mpi3mr::submit(
            self.file.file(),
            self.controller_ordinal,
            self.timeout_ms,
            command,
            data_in,
        )
    }
}

/// The controller ordinal encoded in a node name's trailing digits
/// (`mpi3mrctl1` is controller 1). Names without trailing digits are
/// controller 0. Returns `None` when the digits do not fit an ordinal.
pub fn controller_ordinal(path: &Path) -> Option<u8> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Some(0);
    };
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[stem.len()..];
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// Lists the control nodes of `kind` under `root`.
///
/// * bsg expander nodes (`expander-H:N`), sorted by name.
/// * mpt control nodes (`mpt3ctl`), in directory order.
/// * mpi3mr control nodes (`mpi3mrctlN`), excluding links and
///   directories, sorted by name.
pub fn list_control_nodes(root: &Path, kind: TransportKind) -> io::Result<Vec<PathBuf>> {
    let entries = match kind {
        TransportKind::PassthroughV4 => {
            let mut entries = scsi_sysfs::list_entries(root, |entry| {
                entry.name.contains("expander-") && entry.name.contains(':')
            })?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            entries
        }
        TransportKind::LegacyIoctl => {
            scsi_sysfs::list_entries(root, |entry| entry.name.contains("mpt3ctl"))?
        }
        TransportKind::VendorPacket => {
            let mut entries = scsi_sysfs::list_entries(root, |entry| {
                !entry.kind.is_dir_or_link() && entry.name.contains("mpi3mrctl")
            })?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            entries
        }
    };
    Ok(entries.into_iter().map(|entry| root.join(entry.name)).collect())
}

#[cfg(not(target_os = "linux"))]
mod ioctl {
    use crate::TransportError;
    use crate::mpt::IoctlBlock;
    use crate::mpt::Opcode;
    use mpi_defs::bsg::SgIoV4;
    use std::fs::File;
    use std::io;

    pub(crate) fn sg_io(_file: &File, _hdr: &mut SgIoV4) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    pub(crate) fn mpt_command(
        _file: &File,
        _opcode: Opcode,
        _block: &mut IoctlBlock,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    pub(crate) fn char_device_numbers(_file: &File) -> io::Result<Option<(u64, u64)>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn ordinals() {
        assert_eq!(controller_ordinal(Path::new("/dev/bsg/mpi3mrctl1")), Some(1));
        assert_eq!(controller_ordinal(Path::new("/dev/bsg/mpi3mrctl12")), Some(12));
        assert_eq!(controller_ordinal(Path::new("/dev/mpt3ctl")), Some(0));
        assert_eq!(controller_ordinal(Path::new("/dev/bsg/mpi3mrctl300")), None);
        assert_eq!(controller_ordinal(Path::new("/dev/bsg/ctl999")), None);
        assert_eq!(controller_ordinal(Path::new("/")), Some(0));
    }

    #[test]
    fn kind_names() {
        assert_eq!(TransportKind::PassthroughV4.to_string(), "bsg");
        assert_eq!(TransportKind::LegacyIoctl.to_string(), "mpt");
        assert_eq!(TransportKind::VendorPacket.to_string(), "mpi3mr");
    }

    #[test]
    fn control_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in [
            "expander-2:1",
            "expander-2:0",
            "expander-0",
            "0:0:5:0",
            "mpi3mrctl1",
            "mpi3mrctl0",
            "mpt3ctl",
        ] {
            fs::write(root.join(name), b"").unwrap();
        }
        fs::create_dir(root.join("mpi3mrctl9")).unwrap();

        let names = |kind| {
            list_control_nodes(root, kind)
                .unwrap()
                .into_iter()
                .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(TransportKind::PassthroughV4),
            ["expander-2:0", "expander-2:1"]
        );
        assert_eq!(names(TransportKind::LegacyIoctl), ["mpt3ctl"]);
        assert_eq!(
            names(TransportKind::VendorPacket),
            ["mpi3mrctl0", "mpi3mrctl1"]
        );
    }

    #[test]
    fn open_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("expander-0:0");
        let err = TransportSession::open(&missing, TransportKind::PassthroughV4).unwrap_err();
        assert!(matches!(err, TransportError::Open { ref path, .. } if *path == missing));

        let regular = dir.path().join("mpt3ctl");
        fs::write(&regular, b"").unwrap();
        let err = TransportSession::open(&regular, TransportKind::LegacyIoctl).unwrap_err();
        assert!(matches!(
            err,
            TransportError::DeviceIdentity { .. } | TransportError::Unsupported
        ));

        let overflowing = dir.path().join("mpi3mrctl300");
        fs::write(&overflowing, b"").unwrap();
        let err = TransportSession::open(&overflowing, TransportKind::VendorPacket).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ControllerOrdinal { ref path } if *path == overflowing
        ));
    }

    #[test]
    fn open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("mpi3mrctl2");
        fs::write(&node, b"").unwrap();
        let mut session = TransportSession::open(&node, TransportKind::VendorPacket).unwrap();
        assert_eq!(session.kind(), TransportKind::VendorPacket);
        assert_eq!(session.controller_ordinal(), 2);
        session.set_target(0x5000_c500_0000_003f);
        assert_eq!(session.target(), 0x5000_c500_0000_003f);
        assert!(session.as_vendor().is_some());
        session.close();

        let node = dir.path().join("expander-0:0");
        fs::write(&node, b"").unwrap();
        let mut session = TransportSession::open(&node, TransportKind::PassthroughV4).unwrap();
        assert!(session.as_vendor().is_none());
    }

    #[test]
    fn status_messages() {
        let err = TransportError::SasStatus {
            ioc_status: IocStatus::SAS_SMP_REQUEST_FAILED,
            sas_status: SasStatus::UTC_BAD_DEST,
            log_info: 0,
        };
        assert_eq!(
            err.to_string(),
            "smp passthrough failed: unable to connect (bad destination)"
        );
        let err = TransportError::SasStatus {
            ioc_status: IocStatus::SAS_SMP_DATA_OVERRUN,
            sas_status: SasStatus::SUCCESS,
            log_info: 0,
        };
        assert_eq!(
            err.to_string(),
            "smp passthrough failed: SMP data overrun (IOCStatus)"
        );
        let err = TransportError::SasStatus {
            ioc_status: IocStatus(0x4),
            sas_status: SasStatus(0x7f),
            log_info: 0,
        };
        assert_eq!(
            err.to_string(),
            "smp passthrough failed: unrecognized SAS (SMP) error 0x7f"
        );
    }
}
