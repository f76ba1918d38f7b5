//!
//! Main file to register additional subsystems

pub use config::{
    opts::{GetOpts, NvmfTgtConfig, NvmfTransportOpts},
    Config,
    Error as ConfigError,
};
pub use nvmf::{
    ConnType,
    Connection,
    Error as NvmfError,
    Session,
    SubType,
    Subsystem,
    Transport,
};

mod config;
pub mod nvmf;
