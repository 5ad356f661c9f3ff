// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel and firmware structure layouts used to carry SMP and vendor
//! commands to SAS host adapters.
//!
//! * [`bsg`]: the Linux block SCSI generic `sg_io_v4` header.
//! * [`mpt`]: the legacy `mptctl` ioctl block and the MPI 1/2 SMP
//!   passthrough message.
//! * [`mpi3mr`]: the `mpi3mr` driver's bsg packet and driver command
//!   payloads.
//! * [`mpi3`]: MPI 3 request, reply and configuration page layouts.
//!
//! All multi-byte fields are little endian, matching the only hosts these
//! adapters are deployed on.

#![forbid(unsafe_code)]

pub mod bsg;
pub mod mpi3;
pub mod mpi3mr;
pub mod mpt;
