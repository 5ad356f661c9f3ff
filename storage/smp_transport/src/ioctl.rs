// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The ioctls behind the transports.

// UNSAFETY: unsafe needed to make ioctl calls.
#![expect(unsafe_code)]

use crate::TransportError;
use crate::mpt::IoctlBlock;
use crate::mpt::Opcode;
use mpi_defs::bsg::SgIoV4;
use mpi_defs::mpt::MptIoctlCommand;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::fs::MetadataExt;

nix::ioctl_readwrite_bad!(
    /// `SG_IO` on a bsg node, with a version 4 header.
    sg_io_v4,
    mpi_defs::bsg::SG_IO,
    SgIoV4
);

nix::ioctl_readwrite!(
    /// `MPT2COMMAND` defined by the mpt2sas/mpt3sas drivers.
    mpt2_command,
    mpi_defs::mpt::MPT2_MAGIC_NUMBER,
    mpi_defs::mpt::MPT_COMMAND_NR,
    MptIoctlCommand
);

nix::ioctl_readwrite!(
    /// `MPTCOMMAND` defined by the mptctl driver.
    mpt_command_legacy,
    mpi_defs::mpt::MPT_MAGIC_NUMBER,
    mpi_defs::mpt::MPT_COMMAND_NR,
    MptIoctlCommand
);

/// Issues `SG_IO`. The buffers `hdr` points at must stay alive and
/// unaliased until this returns.
pub(crate) fn sg_io(file: &File, hdr: &mut SgIoV4) -> Result<(), TransportError> {
    // SAFETY: hdr is a valid sg_io_v4 header. Every address in it refers to
    // a buffer of the stated length owned by the caller for the duration of
    // the call.
    unsafe {
        sg_io_v4(file.as_raw_fd(), hdr).map_err(|source| TransportError::Ioctl {
            name: "SG_IO",
            source,
        })?;
    }
    Ok(())
}

/// Issues the mpt passthrough ioctl on the command in `block`.
pub(crate) fn mpt_command(
    file: &File,
    opcode: Opcode,
    block: &mut IoctlBlock,
) -> Result<(), TransportError> {
    let fd = file.as_raw_fd();
    let command = block.as_mut_ptr();
    // SAFETY: the block is 8-byte aligned, starts with an mpt_ioctl_command
    // and holds the MPI request the driver reads past its end. The buffer
    // addresses in the command refer to live buffers owned by the caller.
    let result = unsafe {
        match opcode {
            Opcode::Mpt2Command => mpt2_command(fd, command),
            Opcode::MptCommand => mpt_command_legacy(fd, command),
        }
    };
    result.map_err(|source| TransportError::Ioctl {
        name: opcode.name(),
        source,
    })?;
    Ok(())
}

/// The major and minor numbers of `file`, or `None` when it is not a
/// character device.
pub(crate) fn char_device_numbers(file: &File) -> io::Result<Option<(u64, u64)>> {
    let metadata = file.metadata()?;
    if !metadata.file_type().is_char_device() {
        return Ok(None);
    }
    let rdev = metadata.rdev();
    Ok(Some((
        u64::from(nix::sys::stat::major(rdev)),
        u64::from(nix::sys::stat::minor(rdev)),
    )))
}
