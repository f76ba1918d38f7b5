//!
//! nvmft implements the session core of an NVMe-oF target. A remote host
//! that sends a Fabrics Connect gets a virtual controller bound to the
//! addressed subsystem. Once connected, the host drives the controller
//! through its enable and shutdown lifecycle with Property-Get and
//! Property-Set capsules against the CAP, VS, CC and CSTS registers.
//!
//! Transports deliver the capsules and own the connections; they plug in
//! through the transport port in [`subsys::nvmf`]. The data plane that
//! executes regular NVMe commands is not part of this crate.

#[macro_use]
extern crate log;

pub mod core;
pub mod logger;
pub mod subsys;
