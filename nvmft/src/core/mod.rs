//!
//! core contains the primary abstractions around the NVMe protocol
//! primitives.

pub mod nvme;

pub use nvme::{Cap, Cc, Csts, CtrlrData, GenericStatusCode, NvmeStatus, Vs};
