//! Wire level NVMe definitions: the controller register block, the identify
//! controller payload and completion status codes.
//!
//! The registers are bit packed. Each one is a newtype over the raw integer
//! with mask/shift accessors, so a value round trips through `raw()` without
//! losing bits.

use std::{fmt, ops::Range};

use bit_field::BitField;

/// size of a submission queue entry
pub const NVME_SQE_SIZE: usize = 64;
/// size of a completion queue entry
pub const NVME_CQE_SIZE: usize = 16;

/// byte offsets of the registers within the controller register block
pub const REG_CAP: u32 = 0x00;
pub const REG_VS: u32 = 0x08;
pub const REG_CC: u32 = 0x14;
pub const REG_CSTS: u32 = 0x1c;

/// CC.SHN and CSTS.SHST field values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShutdownNotification {
    None = 0x0,
    Normal = 0x1,
    Abrupt = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShutdownStatus {
    Normal = 0x0,
    Occurring = 0x1,
    Complete = 0x2,
}

/// Controller Capabilities register (64 bits, read only over fabrics)
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Cap(u64);

impl Cap {
    const MQES: Range<usize> = 0..16;
    const CQR: usize = 16;
    const AMS: Range<usize> = 17..19;
    const TO: Range<usize> = 24..32;
    const DSTRD: Range<usize> = 32..36;
    const CSS: Range<usize> = 37..45;
    /// NVM command set support is the first bit of CSS
    const CSS_NVM: usize = 37;
    const MPSMIN: Range<usize> = 48..52;
    const MPSMAX: Range<usize> = 52..56;

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn mqes(&self) -> u16 {
        self.0.get_bits(Self::MQES) as u16
    }

    pub fn set_mqes(&mut self, value: u16) {
        self.0.set_bits(Self::MQES, u64::from(value));
    }

    pub fn cqr(&self) -> bool {
        self.0.get_bit(Self::CQR)
    }

    pub fn set_cqr(&mut self, value: bool) {
        self.0.set_bit(Self::CQR, value);
    }

    pub fn ams(&self) -> u8 {
        self.0.get_bits(Self::AMS) as u8
    }

    pub fn set_ams(&mut self, value: u8) {
        self.0.set_bits(Self::AMS, u64::from(value));
    }

    pub fn to(&self) -> u8 {
        self.0.get_bits(Self::TO) as u8
    }

    pub fn set_to(&mut self, value: u8) {
        self.0.set_bits(Self::TO, u64::from(value));
    }

    pub fn dstrd(&self) -> u8 {
        self.0.get_bits(Self::DSTRD) as u8
    }

    pub fn set_dstrd(&mut self, value: u8) {
        self.0.set_bits(Self::DSTRD, u64::from(value));
    }

    pub fn css(&self) -> u8 {
        self.0.get_bits(Self::CSS) as u8
    }

    pub fn css_nvm(&self) -> bool {
        self.0.get_bit(Self::CSS_NVM)
    }

    pub fn set_css_nvm(&mut self, value: bool) {
        self.0.set_bit(Self::CSS_NVM, value);
    }

    pub fn mpsmin(&self) -> u8 {
        self.0.get_bits(Self::MPSMIN) as u8
    }

    pub fn set_mpsmin(&mut self, value: u8) {
        self.0.set_bits(Self::MPSMIN, u64::from(value));
    }

    pub fn mpsmax(&self) -> u8 {
        self.0.get_bits(Self::MPSMAX) as u8
    }

    pub fn set_mpsmax(&mut self, value: u8) {
        self.0.set_bits(Self::MPSMAX, u64::from(value));
    }
}

/// Version register
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vs(u32);

impl Vs {
    const TER: Range<usize> = 0..8;
    const MNR: Range<usize> = 8..16;
    const MJR: Range<usize> = 16..32;

    pub fn new(major: u16, minor: u8, tertiary: u8) -> Self {
        let mut vs = Self::default();
        vs.0.set_bits(Self::MJR, u32::from(major));
        vs.0.set_bits(Self::MNR, u32::from(minor));
        vs.0.set_bits(Self::TER, u32::from(tertiary));
        vs
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn major(&self) -> u16 {
        self.0.get_bits(Self::MJR) as u16
    }

    pub fn minor(&self) -> u8 {
        self.0.get_bits(Self::MNR) as u8
    }

    pub fn tertiary(&self) -> u8 {
        self.0.get_bits(Self::TER) as u8
    }
}

/// Controller Configuration register, the only register a host may write
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Cc(u32);

impl Cc {
    pub const EN: usize = 0;
    const CSS: Range<usize> = 4..7;
    const MPS: Range<usize> = 7..11;
    const AMS: Range<usize> = 11..14;
    pub const SHN: Range<usize> = 14..16;
    pub const IOSQES: Range<usize> = 16..20;
    pub const IOCQES: Range<usize> = 20..24;

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn en(&self) -> bool {
        self.0.get_bit(Self::EN)
    }

    pub fn set_en(&mut self, value: bool) {
        self.0.set_bit(Self::EN, value);
    }

    pub fn css(&self) -> u8 {
        self.0.get_bits(Self::CSS) as u8
    }

    pub fn mps(&self) -> u8 {
        self.0.get_bits(Self::MPS) as u8
    }

    pub fn ams(&self) -> u8 {
        self.0.get_bits(Self::AMS) as u8
    }

    pub fn shn(&self) -> u8 {
        self.0.get_bits(Self::SHN) as u8
    }

    pub fn set_shn(&mut self, value: u8) {
        self.0.set_bits(Self::SHN, u32::from(value));
    }

    pub fn iosqes(&self) -> u8 {
        self.0.get_bits(Self::IOSQES) as u8
    }

    pub fn set_iosqes(&mut self, value: u8) {
        self.0.set_bits(Self::IOSQES, u32::from(value));
    }

    pub fn iocqes(&self) -> u8 {
        self.0.get_bits(Self::IOCQES) as u8
    }

    pub fn set_iocqes(&mut self, value: u8) {
        self.0.set_bits(Self::IOCQES, u32::from(value));
    }
}

/// Controller Status register
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Csts(u32);

impl Csts {
    const RDY: usize = 0;
    const CFS: usize = 1;
    const SHST: Range<usize> = 2..4;

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn rdy(&self) -> bool {
        self.0.get_bit(Self::RDY)
    }

    pub fn set_rdy(&mut self, value: bool) {
        self.0.set_bit(Self::RDY, value);
    }

    pub fn cfs(&self) -> bool {
        self.0.get_bit(Self::CFS)
    }

    pub fn shst(&self) -> u8 {
        self.0.get_bits(Self::SHST) as u8
    }

    pub fn set_shst(&mut self, value: u8) {
        self.0.set_bits(Self::SHST, u32::from(value));
    }
}

/// NVMe status code types
pub mod status_code_type {
    pub const GENERIC: u8 = 0x0;
    pub const COMMAND_SPECIFIC: u8 = 0x1;
}

#[derive(Debug, Copy, Clone, Eq, PartialOrd, PartialEq)]
pub enum GenericStatusCode {
    Success = 0x00,
    InvalidOpcode = 0x01,
    InternalDeviceError = 0x06,
    AbortedRequested = 0x07,
}

/// Completion status as it ends up in the status field of a completion
/// queue entry. A default constructed status reports success.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NvmeStatus {
    /// status code type
    pub sct: u8,
    /// status code
    pub sc: u8,
}

impl NvmeStatus {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn generic(sc: GenericStatusCode) -> Self {
        Self {
            sct: status_code_type::GENERIC,
            sc: sc as u8,
        }
    }

    pub fn is_success(&self) -> bool {
        self.sct == status_code_type::GENERIC
            && self.sc == GenericStatusCode::Success as u8
    }
}

/// The Fabrics specific trailer of the identify controller payload. It
/// starts at byte offset 1792 and reports the capsule sizes the target
/// accepts, in units of 16 bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CtrlrDataNvmfSpecific {
    pub ioccsz: u32,
    pub iorcsz: u32,
    pub icdoff: u16,
    pub ctrattr: u8,
    pub msdbd: u8,
    pub resv: [u8; 244usize],
}

/// Identify controller payload. The layout is wire defined; reserved
/// ranges are kept as padding so the field offsets stay exact.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CtrlrData {
    pub vid: u16,
    pub ssvid: u16,
    pub sn: [u8; 20usize],
    pub mn: [u8; 40usize],
    pub fr: [u8; 8usize],
    pub rab: u8,
    pub ieee: [u8; 3usize],
    pub cmic: u8,
    pub mdts: u8,
    pub cntlid: u16,
    pub ver: u32,
    pub rtd3r: u32,
    pub rtd3e: u32,
    pub oaes: u32,
    pub resv96: [u8; 160usize],
    pub oacs: u16,
    pub acl: u8,
    pub aerl: u8,
    pub frmw: u8,
    pub lpa: u8,
    pub elpe: u8,
    pub npss: u8,
    pub avscc: u8,
    pub apsta: u8,
    pub wctemp: u16,
    pub cctemp: u16,
    pub mtfa: u16,
    pub hmpre: u32,
    pub hmmin: u32,
    pub tnvmcap: [u8; 16usize],
    pub unvmcap: [u8; 16usize],
    pub rpmbs: u32,
    pub resv316: [u8; 4usize],
    pub kas: u16,
    pub resv322: [u8; 190usize],
    pub sqes: u8,
    pub cqes: u8,
    pub maxcmd: u16,
    pub nn: u32,
    pub oncs: u16,
    pub fuses: u16,
    pub fna: u8,
    pub vwc: u8,
    pub awun: u16,
    pub awupf: u16,
    pub nvscc: u8,
    pub resv531: u8,
    pub acwu: u16,
    pub resv534: [u8; 2usize],
    pub sgls: u32,
    pub resv540: [u8; 1252usize],
    pub nvmf_specific: CtrlrDataNvmfSpecific,
    pub psd: [[u8; 32usize]; 32usize],
    pub vendor_specific: [u8; 1024usize],
}

impl Default for CtrlrData {
    fn default() -> Self {
        Self {
            ..unsafe { std::mem::zeroed() }
        }
    }
}

impl CtrlrData {
    /// extended data for get log page, bit 2 of LPA
    pub fn lpa_edlp(&self) -> bool {
        self.lpa.get_bit(2)
    }

    pub fn set_lpa_edlp(&mut self, value: bool) {
        self.lpa.set_bit(2, value);
    }

    /// keyed SGL data block descriptor support, bit 1 of SGLS
    pub fn sgls_keyed_sgl(&self) -> bool {
        self.sgls.get_bit(1)
    }

    pub fn set_sgls_keyed_sgl(&mut self, value: bool) {
        self.sgls.set_bit(1, value);
    }

    /// SGL offset support, bit 20 of SGLS
    pub fn sgls_sgl_offset(&self) -> bool {
        self.sgls.get_bit(20)
    }

    pub fn set_sgls_sgl_offset(&mut self, value: bool) {
        self.sgls.set_bit(20, value);
    }
}

impl fmt::Debug for CtrlrData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CtrlrData")
            .field("cntlid", &self.cntlid)
            .field("mdts", &self.mdts)
            .field("kas", &self.kas)
            .field("maxcmd", &self.maxcmd)
            .field("sgls", &self.sgls)
            .field("ioccsz", &self.nvmf_specific.ioccsz)
            .field("iorcsz", &self.nvmf_specific.iorcsz)
            .finish()
    }
}
