#![allow(dead_code)]

use std::{cell::Cell, rc::Rc};

use nix::errno::Errno;
use once_cell::sync::OnceCell;

use nvmft::{
    core::nvme::{CtrlrData, REG_CC},
    logger,
    subsys::{
        nvmf::fabric::{
            FabricConnectCmd,
            FabricConnectData,
            FabricConnectRsp,
            FabricPropGetCmd,
            FabricPropGetRsp,
            FabricPropSetCmd,
            FabricPropSetRsp,
            PROP_SIZE_4,
        },
        Connection,
        Session,
        Transport,
    },
};

pub static HOST_NQN: &str = "nqn.2014-08.org.nvmexpress:uuid:host-1";

static LOGGER: OnceCell<()> = OnceCell::new();

pub fn test_init() {
    LOGGER.get_or_init(|| logger::init("INFO"));
}

/// transport double that records every call made against it
pub struct MockTransport {
    name: &'static str,
    pub fail_init: Cell<bool>,
    pub fail_start: Cell<bool>,
    pub poll_result: Cell<Option<Errno>>,
    pub init_calls: Cell<u32>,
    pub fini_calls: Cell<u32>,
    pub start_calls: Cell<u32>,
    pub stop_calls: Cell<u32>,
    pub poll_calls: Cell<u32>,
    pub finish_calls: Cell<u32>,
}

impl MockTransport {
    pub fn new(name: &'static str) -> Rc<Self> {
        Rc::new(Self {
            name,
            fail_init: Cell::new(false),
            fail_start: Cell::new(false),
            poll_result: Cell::new(None),
            init_calls: Cell::new(0),
            fini_calls: Cell::new(0),
            start_calls: Cell::new(0),
            stop_calls: Cell::new(0),
            poll_calls: Cell::new(0),
            finish_calls: Cell::new(0),
        })
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&self) -> Result<(), Errno> {
        self.init_calls.set(self.init_calls.get() + 1);
        if self.fail_init.get() {
            return Err(Errno::EIO);
        }
        Ok(())
    }

    fn fini(&self) -> Result<(), Errno> {
        self.fini_calls.set(self.fini_calls.get() + 1);
        Ok(())
    }

    fn start(&self) -> Result<(), Errno> {
        self.start_calls.set(self.start_calls.get() + 1);
        if self.fail_start.get() {
            return Err(Errno::EADDRINUSE);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop_calls.set(self.stop_calls.get() + 1);
    }

    fn poll(&self, _conn: &Connection) -> Result<(), Errno> {
        self.poll_calls.set(self.poll_calls.get() + 1);
        match self.poll_result.get() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn finish(&self, _conn: &Connection) {
        self.finish_calls.set(self.finish_calls.get() + 1);
    }
}

pub fn connect_cmd(qid: u16, sqsize: u16) -> FabricConnectCmd {
    let mut cmd = FabricConnectCmd::default();
    cmd.qid = qid;
    cmd.sqsize = sqsize;
    cmd
}

pub fn connect_data(
    cntlid: u16,
    subnqn: &str,
    hostnqn: &str,
) -> FabricConnectData {
    let mut data = FabricConnectData::default();
    data.cntlid = cntlid;
    data.set_subnqn(subnqn);
    data.set_hostnqn(hostnqn);
    data
}

/// run a full connect capsule against the core
pub fn connect(
    conn: &Rc<Connection>,
    qid: u16,
    cntlid: u16,
    subnqn: &str,
) -> FabricConnectRsp {
    let cmd = connect_cmd(qid, 32);
    let data = connect_data(cntlid, subnqn, HOST_NQN);
    let mut rsp = FabricConnectRsp::default();
    Session::connect(conn, &cmd, &data, &mut rsp);
    rsp
}

pub fn prop_get(session: &Session, ofst: u32, attrib: u8) -> FabricPropGetRsp {
    let cmd = FabricPropGetCmd {
        attrib,
        ofst,
    };
    let mut rsp = FabricPropGetRsp::default();
    session.property_get(&cmd, &mut rsp);
    rsp
}

pub fn prop_set(
    session: &Session,
    ofst: u32,
    attrib: u8,
    value: u64,
) -> FabricPropSetRsp {
    let cmd = FabricPropSetCmd {
        attrib,
        ofst,
        value,
    };
    let mut rsp = FabricPropSetRsp::default();
    session.property_set(&cmd, &mut rsp);
    rsp
}

/// enable the controller with the queue entry sizes of a conformant host
pub fn enable(session: &Session) -> FabricPropSetRsp {
    // EN with IOSQES 6 (64 byte SQEs) and IOCQES 4 (16 byte CQEs)
    prop_set(session, REG_CC, PROP_SIZE_4, 0x0046_0001)
}

/// identify data of a backing controller, as a device plugin would hand
/// it over
pub fn sample_ctrlr_data() -> CtrlrData {
    let mut cdata = CtrlrData::default();
    cdata.vid = 0x1b4b;
    cdata.ssvid = 0x1b4b;
    cdata.sn[.. 8].copy_from_slice(b"NVMFT001");
    cdata.mn[.. 15].copy_from_slice(b"nvmft ctrl 0001");
    cdata.aerl = 3;
    cdata.cntlid = 7;
    cdata.mdts = 5;
    cdata.kas = 0;
    cdata.sqes = 0x66;
    cdata.cqes = 0x44;
    cdata.nn = 1;
    cdata
}
