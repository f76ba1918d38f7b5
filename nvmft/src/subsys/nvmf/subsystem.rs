use std::{
    cell::{Cell, RefCell},
    fmt,
    fmt::{Debug, Display, Formatter},
    rc::Rc,
};

use crate::{
    core::nvme::CtrlrData,
    subsys::nvmf::{session::Session, Error},
};

thread_local! {
    static SUBSYSTEMS: RefCell<Vec<Rc<Subsystem>>> = RefCell::new(Vec::new());
}

#[derive(Debug, Clone, Copy, PartialOrd, PartialEq)]
pub enum SubType {
    Nvme,
    Discovery,
}

impl Display for SubType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            SubType::Nvme => write!(f, "NVMe"),
            SubType::Discovery => write!(f, "Discovery"),
        }
    }
}

/// A named storage target. Hosts address it by NQN in the connect data;
/// at most one session is bound to it at any time.
pub struct Subsystem {
    subnqn: String,
    subtype: SubType,
    /// identify data of the backing controller, NVMe subsystems only
    ctrlr_data: Option<Box<CtrlrData>>,
    allow_any_host: Cell<bool>,
    hosts: RefCell<Vec<String>>,
    session: RefCell<Option<Rc<Session>>>,
}

impl Subsystem {
    /// create a subsystem backed by a real controller and register it
    pub fn create(
        subnqn: &str,
        ctrlr_data: CtrlrData,
    ) -> Result<Rc<Self>, Error> {
        Self::add(Self::new(subnqn, SubType::Nvme, Some(ctrlr_data)))
    }

    /// create a discovery subsystem and register it
    pub fn create_discovery(subnqn: &str) -> Result<Rc<Self>, Error> {
        Self::add(Self::new(subnqn, SubType::Discovery, None))
    }

    fn new(
        subnqn: &str,
        subtype: SubType,
        ctrlr_data: Option<CtrlrData>,
    ) -> Self {
        Self {
            subnqn: subnqn.to_string(),
            subtype,
            ctrlr_data: ctrlr_data.map(Box::new),
            allow_any_host: Cell::new(true),
            hosts: RefCell::new(Vec::new()),
            session: RefCell::new(None),
        }
    }

    fn add(subsystem: Subsystem) -> Result<Rc<Self>, Error> {
        SUBSYSTEMS.with(|s| {
            let mut subsystems = s.borrow_mut();
            if subsystems.iter().any(|e| e.subnqn == subsystem.subnqn) {
                return Err(Error::CreateSubsystem {
                    nqn: subsystem.subnqn.clone(),
                    msg: "nqn already exists".into(),
                });
            }
            let subsystem = Rc::new(subsystem);
            subsystems.push(subsystem.clone());
            info!("registered {} subsystem {}", subsystem.subtype, subsystem.subnqn);
            Ok(subsystem)
        })
    }

    /// unregister the subsystem and tear down its session, if any
    pub fn destroy(&self) {
        if let Some(session) = self.session.borrow().as_ref() {
            session.destruct();
        }
        SUBSYSTEMS.with(|s| {
            s.borrow_mut().retain(|e| e.subnqn != self.subnqn);
        });
        debug!("destroyed subsystem {}", self.subnqn);
    }

    pub fn subnqn(&self) -> &str {
        &self.subnqn
    }

    pub fn subtype(&self) -> SubType {
        self.subtype
    }

    pub(crate) fn ctrlr_data(&self) -> Option<&CtrlrData> {
        self.ctrlr_data.as_deref()
    }

    /// allow any host to connect to the subsystem
    pub fn allow_any(&self, enable: bool) {
        self.allow_any_host.set(enable);
    }

    /// whitelist a host NQN, effective once allow_any(false) is set
    pub fn add_host(&self, hostnqn: &str) {
        self.hosts.borrow_mut().push(hostnqn.to_string());
    }

    fn host_allowed(&self, hostnqn: &str) -> bool {
        self.allow_any_host.get()
            || self.hosts.borrow().iter().any(|h| h == hostnqn)
    }

    pub fn session(&self) -> Option<Rc<Session>> {
        self.session.borrow().clone()
    }

    pub(crate) fn set_session(&self, session: &Rc<Session>) {
        *self.session.borrow_mut() = Some(session.clone());
    }

    pub(crate) fn clear_session(&self) {
        *self.session.borrow_mut() = None;
    }

    /// resolve a connect request to a subsystem. The host NQN is checked
    /// against the subsystem's host list, a host that is not allowed gets
    /// the same answer as an unknown subsystem NQN.
    pub fn lookup(subnqn: &str, hostnqn: &str) -> Option<Rc<Subsystem>> {
        SUBSYSTEMS.with(|s| {
            s.borrow()
                .iter()
                .find(|e| e.subnqn == subnqn && e.host_allowed(hostnqn))
                .cloned()
        })
    }

    pub fn first() -> Option<Rc<Subsystem>> {
        SUBSYSTEMS.with(|s| s.borrow().first().cloned())
    }
}

impl Debug for Subsystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Subsystem")
            .field("subnqn", &self.subnqn)
            .field("subtype", &self.subtype.to_string())
            .field("allow_any_host", &self.allow_any_host.get())
            .field("has_session", &self.session.borrow().is_some())
            .finish()
    }
}
