// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! mpi3mr controller management commands.
//!
//! Every command checks the length the driver reports against the size of
//! the structure it fills and fails with [`SmpError::LengthMismatch`]
//! otherwise.

use crate::SmpError;
use crate::allocate_response;
use crate::trace_frame;
use mpi_defs::mpi3;
use mpi_defs::mpi3::ComponentImageVersion;
use mpi_defs::mpi3::ConfigPageHeader;
use mpi_defs::mpi3::ConfigRequest;
use mpi_defs::mpi3::EnclosurePage0;
use mpi_defs::mpi3::IocFactsData;
use mpi_defs::mpi3::Mpi3Function;
use mpi_defs::mpi3::Mpi3Version;
use mpi_defs::mpi3::SasExpanderPage0;
use mpi_defs::mpi3::ScsiIoRequest;
use mpi_defs::mpi3mr::AdapterInfo;
use mpi_defs::mpi3mr::AllTargetInfo;
use smp_transport::VendorCommand;
use smp_transport::VendorPacketTransport;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Length of the SES buffer read from each enclosure processor.
pub const SES_BUFFER_LEN: usize = 60;

fn check_len(expected: usize, actual: usize) -> Result<(), SmpError> {
    if expected != actual {
        return Err(SmpError::LengthMismatch { expected, actual });
    }
    Ok(())
}

fn submit<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    command: &VendorCommand<'_>,
    data_in: &mut [u8],
) -> Result<usize, SmpError> {
    let reply = transport.submit(command, data_in)?;
    if reply.transport_status != 0 {
        return Err(SmpError::TransportStatus(reply.transport_status));
    }
    Ok(reply.response_len)
}

fn read_struct<V, T>(transport: &mut V, command: &VendorCommand<'_>) -> Result<T, SmpError>
where
    V: VendorPacketTransport + ?Sized,
    T: FromBytes + IntoBytes + Immutable + KnownLayout,
{
    let mut value = T::new_zeroed();
    let len = submit(transport, command, value.as_mut_bytes())?;
    check_len(size_of::<T>(), len)?;
    Ok(value)
}

/// Reads the driver's adapter information.
pub fn get_adapter_info<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
) -> Result<AdapterInfo, SmpError> {
    read_struct(transport, &VendorCommand::AdapterInfo)
}

/// Reads the driver's device handle to target map.
pub fn get_all_target_info<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
) -> Result<AllTargetInfo, SmpError> {
    read_struct(transport, &VendorCommand::AllTargetInfo)
}

/// The controller personality from the IOC facts flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Personality {
    /// Enhanced HBA.
    Ehba,
    /// RAID with DDR.
    RaidDdr,
    /// A reserved encoding.
    Other(u32),
}

impl Personality {
    fn from_flags(flags: u32) -> Self {
        match flags & mpi3::MPI3_IOCFACTS_FLAGS_PERSONALITY_MASK {
            mpi3::MPI3_IOCFACTS_FLAGS_PERSONALITY_EHBA => Self::Ehba,
            mpi3::MPI3_IOCFACTS_FLAGS_PERSONALITY_RAID_DDR => Self::RaidDdr,
            other => Self::Other(other),
        }
    }
}

/// The IOC facts kept for the controller inventory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IocFacts {
    /// IOC number.
    pub ioc_number: u8,
    /// Controller personality.
    pub personality: Personality,
    /// Supported MPI version.
    pub mpi_version: Mpi3Version,
    /// Firmware version.
    pub fw_version: ComponentImageVersion,
    /// Product id.
    pub product_id: u16,
    /// Reply frame size in bytes.
    pub reply_frame_size: u32,
    /// Maximum SAS expanders.
    pub max_sas_expanders: u16,
    /// Maximum enclosures.
    pub max_enclosures: u16,
}

impl From<&IocFactsData> for IocFacts {
    fn from(data: &IocFactsData) -> Self {
        Self {
            ioc_number: data.ioc_number,
            personality: Personality::from_flags(data.flags),
            mpi_version: data.mpi_version,
            fw_version: data.fw_version,
            product_id: data.product_id,
            reply_frame_size: u32::from(data.reply_frame_size) * 4,
            max_sas_expanders: data.max_sas_expanders,
            max_enclosures: data.max_enclosures,
        }
    }
}

/// Issues IOC FACTS.
pub fn get_ioc_facts<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
) -> Result<IocFacts, SmpError> {
    let data: IocFactsData = read_struct(transport, &VendorCommand::IocFacts)?;
    let facts = IocFacts::from(&data);
    tracing::debug!(
        ioc_number = facts.ioc_number,
        product_id = facts.product_id,
        personality = ?facts.personality,
        "ioc facts"
    );
    Ok(facts)
}

/// Reads page 0 of `page_type` at `form`: a PAGE_HEADER read followed by a
/// READ_CURRENT of the whole page.
pub fn get_config_page<V, T>(transport: &mut V, page_type: u8, form: u32) -> Result<T, SmpError>
where
    V: VendorPacketTransport + ?Sized,
    T: FromBytes + IntoBytes + Immutable + KnownLayout,
{
    let mut request = ConfigRequest {
        function: Mpi3Function::CONFIG.0,
        action: mpi3::MPI3_CONFIG_ACTION_PAGE_HEADER,
        page_type,
        page_number: 0,
        page_address: form,
        page_length: 0,
        ..ConfigRequest::new_zeroed()
    };
    let header: ConfigPageHeader = read_struct(transport, &VendorCommand::Config(&request))?;
    tracing::trace!(
        page_type,
        form,
        page_version = header.page_version,
        page_length = header.page_length,
        "config page header"
    );

    request.action = mpi3::MPI3_CONFIG_ACTION_READ_CURRENT;
    request.page_length =
        u16::try_from(size_of::<T>()).map_err(|_| SmpError::Resource(size_of::<T>()))?;
    read_struct(transport, &VendorCommand::Config(&request))
}

/// Reads enclosure page 0 at `form`.
pub fn enclosure_page0<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    form: u32,
) -> Result<EnclosurePage0, SmpError> {
    let page: EnclosurePage0 =
        get_config_page(transport, mpi3::MPI3_CONFIG_PAGETYPE_ENCLOSURE, form)?;
    tracing::debug!(
        enclosure_logical_id = format_args!("{:#x}", page.enclosure_logical_id),
        enclosure_handle = page.enclosure_handle,
        sep_dev_handle = page.sep_dev_handle,
        "enclosure page 0"
    );
    Ok(page)
}

/// Reads SAS expander page 0 at `form`.
pub fn sas_expander_page0<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    form: u32,
) -> Result<SasExpanderPage0, SmpError> {
    let page: SasExpanderPage0 =
        get_config_page(transport, mpi3::MPI3_CONFIG_PAGETYPE_SAS_EXPANDER, form)?;
    tracing::debug!(
        sas_address = format_args!("{:#x}", page.sas_address),
        dev_handle = page.dev_handle,
        "sas expander page 0"
    );
    Ok(page)
}

/// Sends a read-direction SCSI command to the device `handle` and returns
/// `len` bytes of data.
pub fn scsi_io<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    handle: u16,
    cdb: &[u8],
    len: usize,
) -> Result<Vec<u8>, SmpError> {
    let mut request = ScsiIoRequest {
        function: Mpi3Function::SCSI_IO.0,
        dev_handle: handle,
        flags: mpi3::MPI3_SCSIIO_FLAGS_DATADIRECTION_READ,
        data_length: u32::try_from(len).map_err(|_| SmpError::Resource(len))?,
        ..ScsiIoRequest::new_zeroed()
    };
    let cdb_len = cdb.len().min(request.cdb.len());
    request.cdb[..cdb_len].copy_from_slice(&cdb[..cdb_len]);
    trace_frame("scsi io cdb", &request.cdb[..cdb_len]);

    let mut data = allocate_response(len)?;
    let actual = submit(transport, &VendorCommand::ScsiIo(&request), &mut data)?;
    check_len(len, actual)?;
    Ok(data)
}

/// Reads the SES buffer of the enclosure processor at `handle`.
pub fn read_ses_buffer<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    handle: u16,
) -> Result<[u8; SES_BUFFER_LEN], SmpError> {
    let data = scsi_io(
        transport,
        handle,
        &mpi3::read_buffer_cdb(SES_BUFFER_LEN as u16),
        SES_BUFFER_LEN,
    )?;
    let mut buffer = [0; SES_BUFFER_LEN];
    buffer.copy_from_slice(&data);
    Ok(buffer)
}

/// Sends an SMP frame to the expander at `sas_address` and returns the
/// response bytes the controller reported.
pub fn smp_passthrough<V: VendorPacketTransport + ?Sized>(
    transport: &mut V,
    sas_address: u64,
    request: &[u8],
    response_len: usize,
) -> Result<Vec<u8>, SmpError> {
    let mut response = allocate_response(response_len)?;
    let actual = submit(
        transport,
        &VendorCommand::SmpPassthrough {
            sas_address,
            request,
        },
        &mut response,
    )?;
    response.truncate(actual);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpi_defs::mpi3mr::fixed_str;
    use smp_transport::TransportError;
    use smp_transport::VendorReply;
    use std::collections::VecDeque;

    #[derive(Debug, PartialEq, Eq)]
    enum Sent {
        AdapterInfo,
        AllTargetInfo,
        IocFacts,
        Config {
            action: u8,
            page_type: u8,
            page_address: u32,
            page_length: u16,
        },
        ScsiIo {
            handle: u16,
            cdb: Vec<u8>,
        },
        Smp(u64),
    }

    /// Fills data-in from a script and reports the scripted length.
    #[derive(Default)]
    struct ScriptedVendor {
        replies: VecDeque<(Vec<u8>, usize)>,
        sent: Vec<Sent>,
    }

    impl VendorPacketTransport for ScriptedVendor {
        fn submit(
            &mut self,
            command: &VendorCommand<'_>,
            data_in: &mut [u8],
        ) -> Result<VendorReply, TransportError> {
            self.sent.push(match *command {
                VendorCommand::AdapterInfo => Sent::AdapterInfo,
                VendorCommand::AllTargetInfo => Sent::AllTargetInfo,
                VendorCommand::IocFacts => Sent::IocFacts,
                VendorCommand::Config(r) => Sent::Config {
                    action: r.action,
                    page_type: r.page_type,
                    page_address: r.page_address,
                    page_length: r.page_length,
                },
                VendorCommand::ScsiIo(r) => Sent::ScsiIo {
                    handle: r.dev_handle,
                    cdb: r.cdb[..9].to_vec(),
                },
                VendorCommand::SmpPassthrough { sas_address, .. } => Sent::Smp(sas_address),
            });
            let (data, response_len) = self
                .replies
                .pop_front()
                .ok_or(TransportError::Unsupported)?;
            let n = data.len().min(data_in.len());
            data_in[..n].copy_from_slice(&data[..n]);
            Ok(VendorReply {
                response_len,
                transport_status: 0,
            })
        }
    }

    #[test]
    fn adapter_info() {
        let mut info = AdapterInfo::new_zeroed();
        info.driver_info.driver_name[..6].copy_from_slice(b"mpi3mr");
        let mut vendor = ScriptedVendor::default();
        vendor
            .replies
            .push_back((info.as_bytes().to_vec(), size_of::<AdapterInfo>()));
        let info = get_adapter_info(&mut vendor).unwrap();
        assert_eq!(fixed_str(&info.driver_info.driver_name), "mpi3mr");
        assert_eq!(vendor.sent, [Sent::AdapterInfo]);
    }

    #[test]
    fn length_mismatch() {
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((Vec::new(), 100));
        let err = get_all_target_info(&mut vendor).unwrap_err();
        assert!(matches!(
            err,
            SmpError::LengthMismatch {
                expected: 1220,
                actual: 100
            }
        ));
    }

    #[test]
    fn ioc_facts() {
        let mut data = IocFactsData::new_zeroed();
        data.ioc_facts_data_length = 26;
        data.ioc_number = 1;
        data.flags = 0x8;
        data.reply_frame_size = 32;
        data.fw_version.gen_major = 8;
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((data.as_bytes().to_vec(), 104));
        let facts = get_ioc_facts(&mut vendor).unwrap();
        assert_eq!(facts.ioc_number, 1);
        assert_eq!(facts.personality, Personality::RaidDdr);
        assert_eq!(facts.reply_frame_size, 128);
        assert_eq!(facts.fw_version.gen_major, 8);
    }

    #[test]
    fn config_page_reads_header_first() {
        let mut page = SasExpanderPage0::new_zeroed();
        page.sas_address = 0x5000_c500_0000_003f;
        page.dev_handle = 0x11;
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((vec![0; 8], 8));
        vendor
            .replies
            .push_back((page.as_bytes().to_vec(), size_of::<SasExpanderPage0>()));

        let page = sas_expander_page0(&mut vendor, 0xffff).unwrap();
        assert_eq!(page.sas_address, 0x5000_c500_0000_003f);
        assert_eq!(page.dev_handle, 0x11);
        assert_eq!(
            vendor.sent,
            [
                Sent::Config {
                    action: 0,
                    page_type: 0x31,
                    page_address: 0xffff,
                    page_length: 0,
                },
                Sent::Config {
                    action: 2,
                    page_type: 0x31,
                    page_address: 0xffff,
                    page_length: 64,
                },
            ]
        );
    }

    #[test]
    fn config_header_failure_stops() {
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((vec![0; 8], 4));
        assert!(enclosure_page0(&mut vendor, 0xffff).is_err());
        assert_eq!(vendor.sent.len(), 1);
    }

    #[test]
    fn ses_buffer() {
        let mut reply = vec![0u8; SES_BUFFER_LEN];
        reply[12] = 0x0a;
        reply[13] = 0x0b;
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((reply, SES_BUFFER_LEN));
        let buffer = read_ses_buffer(&mut vendor, 0x1f).unwrap();
        assert_eq!(buffer[12..14], [0x0a, 0x0b]);
        assert_eq!(
            vendor.sent,
            [Sent::ScsiIo {
                handle: 0x1f,
                cdb: vec![0x3c, 0x01, 0xe6, 0xff, 0x0f, 0x00, 60, 0, 0],
            }]
        );
    }

    #[test]
    fn passthrough_truncates_to_reported_length() {
        let mut vendor = ScriptedVendor::default();
        vendor.replies.push_back((vec![0x41, 0x01, 0x00, 0x0e, 1, 2], 4));
        let rp = smp_passthrough(&mut vendor, 0x5000_c500_0000_003f, &[0x40, 1, 0, 0], 60)
            .unwrap();
        assert_eq!(rp, [0x41, 0x01, 0x00, 0x0e]);
        assert_eq!(vendor.sent, [Sent::Smp(0x5000_c500_0000_003f)]);
    }
}
