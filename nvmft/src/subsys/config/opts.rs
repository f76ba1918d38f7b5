//! Tunables of the target, grouped the way they are applied. Defaults can
//! be overridden from the environment before the config is first used.

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::subsys::nvmf::{
    DEFAULT_MAX_QUEUE_DEPTH,
    IN_CAPSULE_DATA_MAX,
    MAX_RECV_DATA_XFER,
};

pub trait GetOpts {
    fn get(&self) -> Self;
    fn set(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NvmfTgtConfig {
    /// name of the target to be created
    pub name: String,
    /// ceiling on the number of queues a host may bind to one controller
    pub max_queues_per_session: u16,
    /// transport options
    pub opts: NvmfTransportOpts,
}

impl Default for NvmfTgtConfig {
    fn default() -> Self {
        Self {
            name: "nvmft_target".to_string(),
            max_queues_per_session: try_from_env(
                "NVMF_MAX_QUEUES_PER_SESSION",
                4,
            ),
            opts: NvmfTransportOpts::default(),
        }
    }
}

impl GetOpts for NvmfTgtConfig {
    fn get(&self) -> Self {
        self.clone()
    }
}

/// Settings handed to every transport provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NvmfTransportOpts {
    /// max queue depth
    pub max_queue_depth: u16,
    /// encapsulated data size
    pub in_capsule_data_size: u32,
    /// max IO size
    pub max_io_size: u32,
    /// max admin queue depth per admin queue
    pub max_aq_depth: u32,
    /// num of shared buffers
    pub num_shared_buf: u32,
    /// cache size
    pub buf_cache_size: u32,
}

impl Default for NvmfTransportOpts {
    fn default() -> Self {
        Self {
            max_queue_depth: try_from_env(
                "NVMF_TCP_MAX_QUEUE_DEPTH",
                DEFAULT_MAX_QUEUE_DEPTH,
            ),
            in_capsule_data_size: IN_CAPSULE_DATA_MAX,
            max_io_size: MAX_RECV_DATA_XFER,
            max_aq_depth: 128,
            num_shared_buf: try_from_env("NVMF_TCP_NUM_SHARED_BUF", 2048),
            buf_cache_size: try_from_env("NVMF_TCP_BUF_CACHE_SIZE", 64),
        }
    }
}

impl GetOpts for NvmfTransportOpts {
    fn get(&self) -> Self {
        *self
    }
}

/// try to read an env variable or returns the default when not found
fn try_from_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    <T as FromStr>::Err: Debug + Display,
{
    std::env::var(name).map_or_else(
        |_| default,
        |v| {
            match v.parse::<T>() {
               Ok(val) => {
                   info!("Overriding {} value to '{}'", name, val);
                   val
               },
               Err(e) => {
                   error!("Invalid value: {} (error {}) specified for {}. Reverting to default ({})", v, e, name, default);
                   default
               }
            }
        },
    )
}
