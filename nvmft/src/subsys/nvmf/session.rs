//! The virtual controller bound to a subsystem. A session is created by the
//! first admin connect and from then on owns the controller registers, the
//! identify payload and the list of connections a transport bound to it.
//!
//! Everything in here runs on the reactor thread that polls the session, so
//! the state lives behind `Cell` and `RefCell` without any locking.

use std::{
    cell::{Cell, RefCell},
    fmt,
    fmt::{Debug, Formatter},
    rc::{Rc, Weak},
};

use bit_field::BitField;

use crate::{
    core::nvme::{
        Cap,
        Cc,
        Csts,
        CtrlrData,
        NvmeStatus,
        ShutdownNotification,
        ShutdownStatus,
        Vs,
        NVME_CQE_SIZE,
        NVME_SQE_SIZE,
        REG_CAP,
        REG_CC,
        REG_CSTS,
        REG_VS,
    },
    subsys::{
        config::Config,
        nvmf::{
            fabric::{
                FabricConnectCmd,
                FabricConnectData,
                FabricConnectRsp,
                FabricPropGetCmd,
                FabricPropGetRsp,
                FabricPropSetCmd,
                FabricPropSetRsp,
                FabricStatusCode,
                CONNECT_CMD_QID_OFFSET,
                CONNECT_DATA_CNTLID_OFFSET,
                CONNECT_DATA_SUBNQN_OFFSET,
                PROP_SIZE_4,
                PROP_SIZE_8,
            },
            subsystem::Subsystem,
            transport::Transport,
            C2H_MAX_MSG,
            DEFAULT_MAX_QUEUE_DEPTH,
            H2C_MAX_MSG,
            MAX_RECV_DATA_XFER,
        },
    },
};

/// queue flavour of a bound connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnType {
    AdminQueue,
    IoQueue,
}

/// A queue pair a transport accepted for us. The transport owns the object
/// and releases it again; the session only keeps a membership link plus the
/// queue flavour it was bound as.
pub struct Connection {
    transport: Rc<dyn Transport>,
    conn_type: Cell<ConnType>,
    session: RefCell<Weak<Session>>,
}

impl Connection {
    pub fn new(transport: Rc<dyn Transport>) -> Rc<Self> {
        Rc::new(Self {
            transport,
            conn_type: Cell::new(ConnType::AdminQueue),
            session: RefCell::new(Weak::new()),
        })
    }

    pub fn transport(&self) -> &Rc<dyn Transport> {
        &self.transport
    }

    pub fn conn_type(&self) -> ConnType {
        self.conn_type.get()
    }

    /// the session this connection was bound to, if any
    pub fn session(&self) -> Option<Rc<Session>> {
        self.session.borrow().upgrade()
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport.name())
            .field("conn_type", &self.conn_type.get())
            .finish()
    }
}

/// the registers of the virtual controller
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlrProps {
    pub cap: Cap,
    pub vs: Vs,
    pub cc: Cc,
    pub csts: Csts,
}

pub struct Session {
    subsys: Weak<Subsystem>,
    connections: RefCell<Vec<Weak<Connection>>>,
    num_connections: Cell<u16>,
    max_connections_allowed: u16,
    vcdata: RefCell<Box<CtrlrData>>,
    vcprop: RefCell<CtrlrProps>,
}

fn invalid_connect_cmd(rsp: &mut FabricConnectRsp, ipo: u16) {
    rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
    rsp.iattr = 0;
    rsp.ipo = ipo;
}

fn invalid_connect_data(rsp: &mut FabricConnectRsp, ipo: u16) {
    rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
    rsp.iattr = 1;
    rsp.ipo = ipo;
}

impl Session {
    fn new(subsystem: &Rc<Subsystem>) -> Self {
        let cfg = Config::get_or_init(Config::default);
        Self {
            subsys: Rc::downgrade(subsystem),
            connections: RefCell::new(Vec::new()),
            num_connections: Cell::new(0),
            max_connections_allowed: cfg.nvmf_tgt_conf.max_queues_per_session,
            vcdata: RefCell::new(Box::new(CtrlrData::default())),
            vcprop: RefCell::new(CtrlrProps::default()),
        }
    }

    /// Handle a fabrics connect capsule. The admin connect materializes the
    /// session, io connects attach to it. Every outcome, including all the
    /// ways a capsule can be malformed, ends up in `rsp`; failures leave no
    /// state behind.
    pub fn connect(
        conn: &Rc<Connection>,
        cmd: &FabricConnectCmd,
        data: &FabricConnectData,
        rsp: &mut FabricConnectRsp,
    ) {
        trace!(
            "recfmt {:#x} qid {} sqsize {}",
            cmd.recfmt,
            cmd.qid,
            cmd.sqsize
        );
        trace!("connect data: {:?}", data);

        let subsystem = match Subsystem::lookup(data.subnqn(), data.hostnqn())
        {
            Some(subsystem) => subsystem,
            None => {
                error!("could not find subsystem '{}'", data.subnqn());
                invalid_connect_data(rsp, CONNECT_DATA_SUBNQN_OFFSET);
                return;
            }
        };

        let session = if cmd.qid == 0 {
            conn.conn_type.set(ConnType::AdminQueue);
            trace!("connect admin queue for controller id {:#06x}", data.cntlid);

            if data.cntlid != 0xFFFF {
                // only the dynamic controller model is supported
                error!(
                    "connect with static controller id {:#06x} rejected",
                    data.cntlid
                );
                invalid_connect_data(rsp, CONNECT_DATA_CNTLID_OFFSET);
                return;
            }

            if subsystem.session().is_some() {
                error!("cannot connect to already connected controller");
                rsp.status =
                    NvmeStatus::fabric(FabricStatusCode::ControllerBusy);
                return;
            }

            let session = Rc::new(Session::new(&subsystem));
            // NVMe subsystems carry the identify data of their backing
            // controller, discovery subsystems do not
            match subsystem.ctrlr_data() {
                Some(cdata) => session.init_nvme_session_properties(cdata),
                None => session.init_discovery_session_properties(),
            }
            subsystem.set_session(&session);
            session
        } else {
            conn.conn_type.set(ConnType::IoQueue);
            trace!("connect io queue for controller id {:#06x}", data.cntlid);

            // cntlid 0 is the only controller this target hands out
            if data.cntlid != 0 {
                error!("unknown controller id {:#06x}", data.cntlid);
                invalid_connect_data(rsp, CONNECT_DATA_CNTLID_OFFSET);
                return;
            }

            let session = match subsystem.session() {
                Some(session) if session.vcprop.borrow().cc.en() => session,
                _ => {
                    error!("got io connect before controller was enabled");
                    invalid_connect_cmd(rsp, CONNECT_CMD_QID_OFFSET);
                    return;
                }
            };

            let cc = session.vcprop.borrow().cc;
            if 1usize << cc.iosqes() != NVME_SQE_SIZE {
                error!("got io connect with invalid iosqes {}", cc.iosqes());
                invalid_connect_cmd(rsp, CONNECT_CMD_QID_OFFSET);
                return;
            }

            if 1usize << cc.iocqes() != NVME_CQE_SIZE {
                error!("got io connect with invalid iocqes {}", cc.iocqes());
                invalid_connect_cmd(rsp, CONNECT_CMD_QID_OFFSET);
                return;
            }

            if session.num_connections.get()
                >= session.max_connections_allowed
            {
                error!(
                    "connection limit {} reached",
                    session.num_connections.get()
                );
                rsp.status =
                    NvmeStatus::fabric(FabricStatusCode::ControllerBusy);
                return;
            }
            session
        };

        session.num_connections.set(session.num_connections.get() + 1);
        session.connections.borrow_mut().insert(0, Rc::downgrade(conn));
        *conn.session.borrow_mut() = Rc::downgrade(&session);

        rsp.status = NvmeStatus::success();
        rsp.cntlid = 0;
        trace!("connect capsule response: cntlid = {:#06x}", rsp.cntlid);
    }

    /// unbind a connection from the session
    pub fn disconnect(&self, conn: &Rc<Connection>) {
        self.remove_link(Rc::as_ptr(conn));
    }

    fn remove_link(&self, target: *const Connection) {
        let mut connections = self.connections.borrow_mut();
        let before = connections.len();
        connections.retain(|link| link.as_ptr() != target);
        let removed = before - connections.len();
        if removed != 0 {
            self.num_connections
                .set(self.num_connections.get() - removed as u16);
        }
    }

    /// Tear the session down. Every connection still bound is disconnected
    /// and handed back to its transport, then the subsystem forgets about
    /// the session.
    pub fn destruct(&self) {
        if let Some(subsystem) = self.subsys.upgrade() {
            subsystem.clear_session();
        }

        loop {
            let link = match self.connections.borrow().first() {
                Some(link) => link.clone(),
                None => break,
            };
            self.remove_link(link.as_ptr());
            if let Some(conn) = link.upgrade() {
                conn.transport.finish(&conn);
            }
        }
    }

    /// Pump all bound connections once. A connection whose transport
    /// reports a failure is evicted; releasing the object afterwards is the
    /// transport's business.
    pub fn poll(&self) -> i32 {
        let connections = self.connections.borrow().clone();
        for link in connections {
            match link.upgrade() {
                Some(conn) => {
                    if let Err(errno) = conn.transport.poll(&conn) {
                        error!(
                            "transport poll failed ({}), closing connection",
                            errno
                        );
                        self.disconnect(&conn);
                    }
                }
                None => {
                    warn!("connection went away without a disconnect");
                    self.remove_link(link.as_ptr());
                }
            }
        }

        0
    }

    fn init_discovery_session_properties(&self) {
        let mut vcdata = self.vcdata.borrow_mut();
        vcdata.maxcmd = DEFAULT_MAX_QUEUE_DEPTH;
        // extended data for get log page supported
        vcdata.set_lpa_edlp(true);
        // one controller per subsystem, so its id is 0
        vcdata.cntlid = 0;
        vcdata.nvmf_specific.ioccsz = H2C_MAX_MSG / 16;
        vcdata.nvmf_specific.iorcsz = C2H_MAX_MSG / 16;
        // in capsule data starts directly after the SQE
        vcdata.nvmf_specific.icdoff = 0;
        // dynamic controller model
        vcdata.nvmf_specific.ctrattr = 0;
        // single SGL descriptor per capsule
        vcdata.nvmf_specific.msdbd = 1;
        vcdata.set_sgls_keyed_sgl(true);
        vcdata.set_sgls_sgl_offset(true);

        let mut prop = self.vcprop.borrow_mut();
        let mut cap = Cap::default();
        // contiguous queues required over fabrics
        cap.set_cqr(true);
        cap.set_mqes(vcdata.maxcmd - 1);
        cap.set_ams(0);
        // doorbell stride fixed to 0 over fabrics
        cap.set_dstrd(0);
        cap.set_css_nvm(true);
        // 2 ^ (12 + mpsmin) == 4k
        cap.set_mpsmin(0);
        cap.set_mpsmax(0);
        prop.cap = cap;
        prop.vs = Vs::new(1, 0, 0);
        prop.cc = Cc::default();
        // controller starts out not ready
        prop.csts = Csts::default();
    }

    fn init_nvme_session_properties(&self, cdata: &CtrlrData) {
        let mut vcdata = self.vcdata.borrow_mut();
        // the virtual controller presents the backing controller's identify
        // data with the fabrics relevant fields overridden
        **vcdata = *cdata;

        vcdata.aerl = 0;
        vcdata.cntlid = 0;
        vcdata.kas = 10;
        vcdata.maxcmd = DEFAULT_MAX_QUEUE_DEPTH;
        vcdata.mdts = (MAX_RECV_DATA_XFER / 4096) as u8;
        vcdata.set_sgls_keyed_sgl(true);
        vcdata.set_sgls_sgl_offset(true);

        vcdata.nvmf_specific.ioccsz = H2C_MAX_MSG / 16;
        vcdata.nvmf_specific.iorcsz = C2H_MAX_MSG / 16;
        vcdata.nvmf_specific.icdoff = 0;
        vcdata.nvmf_specific.ctrattr = 0;
        vcdata.nvmf_specific.msdbd = 1;

        trace!("ctrlr data: maxcmd {:#x}", vcdata.maxcmd);
        trace!("ext ctrlr data: ioccsz {:#x}", vcdata.nvmf_specific.ioccsz);
        trace!("ext ctrlr data: iorcsz {:#x}", vcdata.nvmf_specific.iorcsz);

        let mut prop = self.vcprop.borrow_mut();
        let mut cap = Cap::default();
        // queues are not contiguous
        cap.set_cqr(false);
        cap.set_mqes(vcdata.maxcmd - 1);
        cap.set_ams(0);
        // ready timeout, in 500 msec units
        cap.set_to(1);
        cap.set_dstrd(0);
        cap.set_css_nvm(true);
        cap.set_mpsmin(0);
        cap.set_mpsmax(0);
        prop.cap = cap;
        prop.vs = Vs::new(1, 0, 0);
        prop.cc = Cc::default();
        prop.csts = Csts::default();

        trace!("cap {:#018x}", prop.cap.raw());
        trace!("vs {:#x} cc {:#x} csts {:#x}", prop.vs.raw(), prop.cc.raw(), prop.csts.raw());
    }

    /// Handle a property get capsule. Reads of offsets without a descriptor
    /// or without a getter return zero with a good status.
    pub fn property_get(
        &self,
        cmd: &FabricPropGetCmd,
        rsp: &mut FabricPropGetRsp,
    ) {
        rsp.status = NvmeStatus::success();
        rsp.value = 0;

        trace!("property get size {} offset {:#x}", cmd.attrib, cmd.ofst);

        if cmd.attrib != PROP_SIZE_4 && cmd.attrib != PROP_SIZE_8 {
            error!("invalid property size attribute {}", cmd.attrib);
            rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
            return;
        }

        let prop = match find_prop(cmd.ofst) {
            Some(prop) => prop,
            None => return,
        };
        let get = match prop.get {
            Some(get) => get,
            None => return,
        };

        trace!("name: {}", prop.name);
        if cmd.attrib != prop.size {
            error!(
                "offset {:#x} size mismatch: cmd {}, prop {}",
                cmd.ofst, cmd.attrib, prop.size
            );
            rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
            return;
        }

        rsp.value = get(self);
        trace!("response value: {:#x}", rsp.value);
    }

    /// Handle a property set capsule. Only descriptors with a setter can be
    /// written; the setter decides whether the value is acceptable.
    pub fn property_set(
        &self,
        cmd: &FabricPropSetCmd,
        rsp: &mut FabricPropSetRsp,
    ) {
        rsp.status = NvmeStatus::success();

        trace!(
            "property set size {} offset {:#x} value {:#x}",
            cmd.attrib,
            cmd.ofst,
            cmd.value
        );

        let prop = match find_prop(cmd.ofst) {
            Some(prop) => prop,
            None => {
                error!("invalid offset {:#x}", cmd.ofst);
                rsp.status =
                    NvmeStatus::fabric(FabricStatusCode::InvalidParam);
                return;
            }
        };
        let set = match prop.set {
            Some(set) => set,
            None => {
                error!("property {} is read only", prop.name);
                rsp.status =
                    NvmeStatus::fabric(FabricStatusCode::InvalidParam);
                return;
            }
        };

        trace!("name: {}", prop.name);
        if cmd.attrib != prop.size {
            error!(
                "offset {:#x} size mismatch: cmd {}, prop {}",
                cmd.ofst, cmd.attrib, prop.size
            );
            rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
            return;
        }

        let mut value = cmd.value;
        if prop.size == PROP_SIZE_4 {
            value = u64::from(value as u32);
        }

        if !set(self, value) {
            rsp.status = NvmeStatus::fabric(FabricStatusCode::InvalidParam);
        }
    }

    pub fn num_connections(&self) -> u16 {
        self.num_connections.get()
    }

    /// length of the membership list, always equal to num_connections()
    pub fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }

    pub fn max_connections_allowed(&self) -> u16 {
        self.max_connections_allowed
    }

    pub fn subsystem(&self) -> Option<Rc<Subsystem>> {
        self.subsys.upgrade()
    }

    /// snapshot of the controller registers
    pub fn props(&self) -> CtrlrProps {
        *self.vcprop.borrow()
    }

    /// snapshot of the identify controller payload
    pub fn vcdata(&self) -> CtrlrData {
        **self.vcdata.borrow()
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let prop = self.vcprop.borrow();
        f.debug_struct("Session")
            .field(
                "subnqn",
                &self.subsys.upgrade().map(|s| s.subnqn().to_string()),
            )
            .field("num_connections", &self.num_connections.get())
            .field("cc", &format_args!("{:#010x}", prop.cc.raw()))
            .field("csts", &format_args!("{:#010x}", prop.csts.raw()))
            .finish()
    }
}

type PropGetFn = fn(&Session) -> u64;
type PropSetFn = fn(&Session, u64) -> bool;

/// descriptor of one register within the register block
struct Prop {
    ofst: u32,
    size: u8,
    name: &'static str,
    get: Option<PropGetFn>,
    set: Option<PropSetFn>,
}

static PROPS: [Prop; 4] = [
    Prop {
        ofst: REG_CAP,
        size: PROP_SIZE_8,
        name: "cap",
        get: Some(prop_get_cap),
        set: None,
    },
    Prop {
        ofst: REG_VS,
        size: PROP_SIZE_4,
        name: "vs",
        get: Some(prop_get_vs),
        set: None,
    },
    Prop {
        ofst: REG_CC,
        size: PROP_SIZE_4,
        name: "cc",
        get: Some(prop_get_cc),
        set: Some(prop_set_cc),
    },
    Prop {
        ofst: REG_CSTS,
        size: PROP_SIZE_4,
        name: "csts",
        get: Some(prop_get_csts),
        set: None,
    },
];

fn find_prop(ofst: u32) -> Option<&'static Prop> {
    PROPS.iter().find(|prop| prop.ofst == ofst)
}

fn prop_get_cap(session: &Session) -> u64 {
    session.vcprop.borrow().cap.raw()
}

fn prop_get_vs(session: &Session) -> u64 {
    u64::from(session.vcprop.borrow().vs.raw())
}

fn prop_get_cc(session: &Session) -> u64 {
    u64::from(session.vcprop.borrow().cc.raw())
}

fn prop_get_csts(session: &Session) -> u64 {
    u64::from(session.vcprop.borrow().csts.raw())
}

/// The CC write state machine. The new value is diffed against the current
/// one and each changed field is handled and cleared from the diff; any
/// leftover difference means a reserved bit was touched. All effects are
/// computed on copies first so a rejected write changes nothing at all.
fn prop_set_cc(session: &Session, value: u64) -> bool {
    let new = Cc::from_raw(value as u32);
    let mut prop = session.vcprop.borrow_mut();
    let mut cc = prop.cc;
    let mut csts = prop.csts;

    trace!("cur cc: {:#010x}", cc.raw());
    trace!("new cc: {:#010x}", new.raw());

    let mut diff = new.raw() ^ cc.raw();

    if diff.get_bit(Cc::EN) {
        if new.en() {
            debug!("property set cc enable");
            cc.set_en(true);
            csts.set_rdy(true);
        } else {
            error!("cc.en transition from 1 to 0 (reset) not implemented");
            return false;
        }
        diff.set_bit(Cc::EN, false);
    }

    if diff.get_bits(Cc::SHN) != 0 {
        let shn = new.shn();
        if shn == ShutdownNotification::Normal as u8
            || shn == ShutdownNotification::Abrupt as u8
        {
            debug!("property set cc shutdown {:#04b}", shn);
            cc.set_shn(shn);
            cc.set_en(false);
            csts.set_rdy(false);
            csts.set_shst(ShutdownStatus::Complete as u8);
        } else if shn == ShutdownNotification::None as u8 {
            cc.set_shn(0);
        } else {
            error!("property set cc: invalid shn value {:#04b}", shn);
            return false;
        }
        diff.set_bits(Cc::SHN, 0);
    }

    if diff.get_bits(Cc::IOSQES) != 0 {
        debug!(
            "property set iosqes = {} ({} bytes)",
            new.iosqes(),
            1u32 << new.iosqes()
        );
        cc.set_iosqes(new.iosqes());
        diff.set_bits(Cc::IOSQES, 0);
    }

    if diff.get_bits(Cc::IOCQES) != 0 {
        debug!(
            "property set iocqes = {} ({} bytes)",
            new.iocqes(),
            1u32 << new.iocqes()
        );
        cc.set_iocqes(new.iocqes());
        diff.set_bits(Cc::IOCQES, 0);
    }

    if diff != 0 {
        error!("property set cc toggled reserved bits {:#010x}", diff);
        return false;
    }

    prop.cc = cc;
    prop.csts = csts;
    true
}
