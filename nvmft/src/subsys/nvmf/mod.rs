//!
//! The virtual controller core of the target. A subsystem gets at most one
//! live session; the session owns the controller registers and identify
//! data and keeps track of the connections a transport has bound to it.
//!
//! Transports hook in through the transport registry; the session itself
//! never interprets transport specific state.

use nix::errno::Errno;
use snafu::Snafu;

use crate::core::nvme::{NVME_CQE_SIZE, NVME_SQE_SIZE};

pub use session::{ConnType, Connection, CtrlrProps, Session};
pub use subsystem::{SubType, Subsystem};
pub use transport::{
    acceptor_start,
    acceptor_stop,
    fini_all,
    init_all,
    lookup,
    register,
    Transport,
};

pub mod fabric;
mod session;
mod subsystem;
mod transport;

/// queue depth granted to every virtual controller
pub const DEFAULT_MAX_QUEUE_DEPTH: u16 = 128;
/// in capsule data accepted on host to controller transfers
pub const IN_CAPSULE_DATA_MAX: u32 = 4096;
/// largest capsule a host may send, one SQE plus in capsule data
pub const H2C_MAX_MSG: u32 = NVME_SQE_SIZE as u32 + IN_CAPSULE_DATA_MAX;
/// largest capsule the controller sends back, a bare CQE
pub const C2H_MAX_MSG: u32 = NVME_CQE_SIZE as u32;
/// upper bound on a single data transfer
pub const MAX_RECV_DATA_XFER: u32 = 131_072;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Transport {} is already registered", name))]
    TransportExists { name: String },
    #[snafu(display("Failed to start transport {}: {}", name, source))]
    AcceptorStart { source: Errno, name: String },
    #[snafu(display("Failed to create subsystem for {} {}", nqn, msg))]
    CreateSubsystem { nqn: String, msg: String },
}
