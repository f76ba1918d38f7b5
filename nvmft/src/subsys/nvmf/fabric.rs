//! Capsule definitions for the Fabrics command set. Connect and the two
//! property commands are the only capsules the session core interprets,
//! everything else is dispatched by the transport to the NVMe command path.
//!
//! The command and data structures are wire exact so that the byte offsets
//! reported in error responses (the `ipo` field) match what a conformant
//! initiator expects.

use std::fmt;

use crate::core::nvme::{status_code_type, NvmeStatus};

/// Fabrics command set opcode
pub const FABRIC_OPC: u8 = 0x7f;

/// Fabrics command types
pub mod fctype {
    pub const PROPERTY_SET: u8 = 0x00;
    pub const CONNECT: u8 = 0x01;
    pub const PROPERTY_GET: u8 = 0x04;
}

/// property size attribute values
pub const PROP_SIZE_4: u8 = 0;
pub const PROP_SIZE_8: u8 = 1;

/// Fabrics command specific status codes
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FabricStatusCode {
    IncompatibleFormat = 0x80,
    ControllerBusy = 0x81,
    InvalidParam = 0x82,
    RestartDiscovery = 0x83,
    InvalidHost = 0x84,
}

impl NvmeStatus {
    pub fn fabric(sc: FabricStatusCode) -> Self {
        Self {
            sct: status_code_type::COMMAND_SPECIFIC,
            sc: sc as u8,
        }
    }
}

/// byte offsets of the fields an invalid parameter response may point at
pub const CONNECT_CMD_QID_OFFSET: u16 = 42;
pub const CONNECT_DATA_CNTLID_OFFSET: u16 = 16;
pub const CONNECT_DATA_SUBNQN_OFFSET: u16 = 256;

/// Connect command capsule (one submission queue entry)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FabricConnectCmd {
    pub opcode: u8,
    resv1: u8,
    pub cid: u16,
    pub fctype: u8,
    resv2: [u8; 19usize],
    pub sgl1: [u8; 16usize],
    pub recfmt: u16,
    pub qid: u16,
    pub sqsize: u16,
    pub cattr: u8,
    resv3: u8,
    pub kato: u32,
    resv4: [u8; 12usize],
}

impl Default for FabricConnectCmd {
    fn default() -> Self {
        let mut cmd: Self = unsafe { std::mem::zeroed() };
        cmd.opcode = FABRIC_OPC;
        cmd.fctype = fctype::CONNECT;
        cmd
    }
}

/// Connect data payload, carried in the capsule after the command
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FabricConnectData {
    pub hostid: [u8; 16usize],
    pub cntlid: u16,
    resv5: [u8; 238usize],
    subnqn: [u8; 256usize],
    hostnqn: [u8; 256usize],
    resv6: [u8; 256usize],
}

impl Default for FabricConnectData {
    fn default() -> Self {
        Self {
            ..unsafe { std::mem::zeroed() }
        }
    }
}

fn nqn_to_str(nqn: &[u8]) -> &str {
    let end = nqn.iter().position(|c| *c == 0).unwrap_or(nqn.len());
    std::str::from_utf8(&nqn[.. end]).unwrap_or("")
}

fn str_to_nqn(nqn: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    // leave at least one terminating NUL
    let len = bytes.len().min(nqn.len() - 1);
    nqn[.. len].copy_from_slice(&bytes[.. len]);
    for b in nqn[len ..].iter_mut() {
        *b = 0;
    }
}

impl FabricConnectData {
    pub fn subnqn(&self) -> &str {
        nqn_to_str(&self.subnqn)
    }

    pub fn set_subnqn(&mut self, nqn: &str) {
        str_to_nqn(&mut self.subnqn, nqn);
    }

    pub fn hostnqn(&self) -> &str {
        nqn_to_str(&self.hostnqn)
    }

    pub fn set_hostnqn(&mut self, nqn: &str) {
        str_to_nqn(&mut self.hostnqn, nqn);
    }
}

impl fmt::Debug for FabricConnectData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FabricConnectData")
            .field("cntlid", &format_args!("{:#06x}", self.cntlid))
            .field("subnqn", &self.subnqn())
            .field("hostnqn", &self.hostnqn())
            .finish()
    }
}

/// Connect response capsule. Which fields are meaningful depends on the
/// status: `cntlid` on success, `iattr` and `ipo` on an invalid parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FabricConnectRsp {
    pub cntlid: u16,
    /// 0 points into the command, 1 into the data payload
    pub iattr: u8,
    /// byte offset of the offending field
    pub ipo: u16,
    pub status: NvmeStatus,
}

/// Property-Get command capsule
#[derive(Debug, Default, Clone, Copy)]
pub struct FabricPropGetCmd {
    /// property size attribute
    pub attrib: u8,
    /// register offset
    pub ofst: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FabricPropGetRsp {
    pub value: u64,
    pub status: NvmeStatus,
}

/// Property-Set command capsule
#[derive(Debug, Default, Clone, Copy)]
pub struct FabricPropSetCmd {
    pub attrib: u8,
    pub ofst: u32,
    pub value: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FabricPropSetRsp {
    pub status: NvmeStatus,
}
