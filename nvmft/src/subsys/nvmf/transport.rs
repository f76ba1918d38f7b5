//!
//! The target can make use of several transports. Using different transports
//! allows us to switch between, say, TCP and RDMA. Providers register here
//! during single threaded startup; the core drives them only through the
//! operations below and never looks inside a provider.

use std::{cell::RefCell, rc::Rc};

use nix::errno::Errno;

use crate::subsys::nvmf::{session::Connection, Error};

/// The capability set a transport provider has to bring. Connection
/// objects are owned by the provider; `poll` and `finish` get handed the
/// connection they were created for.
pub trait Transport {
    fn name(&self) -> &'static str;
    /// one time initialization of the provider
    fn init(&self) -> Result<(), Errno>;
    fn fini(&self) -> Result<(), Errno>;
    /// start listening for new connections
    fn start(&self) -> Result<(), Errno>;
    fn stop(&self);
    /// make progress on one connection, nonblocking
    fn poll(&self, conn: &Connection) -> Result<(), Errno>;
    /// release the provider side of a connection
    fn finish(&self, conn: &Connection);
}

thread_local! {
    static TRANSPORTS: RefCell<Vec<Rc<dyn Transport>>> =
        RefCell::new(Vec::new());
}

/// register a transport provider under its name
pub fn register(transport: Rc<dyn Transport>) -> Result<(), Error> {
    TRANSPORTS.with(|t| {
        let mut transports = t.borrow_mut();
        if transports
            .iter()
            .any(|e| e.name().eq_ignore_ascii_case(transport.name()))
        {
            return Err(Error::TransportExists {
                name: transport.name().to_string(),
            });
        }
        debug!("registered transport {}", transport.name());
        transports.push(transport);
        Ok(())
    })
}

/// initialize every registered transport, returns how many came up
pub fn init_all() -> usize {
    TRANSPORTS.with(|t| {
        t.borrow()
            .iter()
            .filter(|e| match e.init() {
                Ok(_) => true,
                Err(errno) => {
                    warn!("{} transport init failed: {}", e.name(), errno);
                    false
                }
            })
            .count()
    })
}

/// finalize every registered transport, returns how many shut down clean
pub fn fini_all() -> usize {
    TRANSPORTS.with(|t| {
        t.borrow()
            .iter()
            .filter(|e| match e.fini() {
                Ok(_) => true,
                Err(errno) => {
                    warn!("{} transport fini failed: {}", e.name(), errno);
                    false
                }
            })
            .count()
    })
}

/// start accepting connections on all transports. The first one that
/// fails aborts the whole start.
pub fn acceptor_start() -> Result<(), Error> {
    TRANSPORTS.with(|t| {
        for transport in t.borrow().iter() {
            transport.start().map_err(|source| Error::AcceptorStart {
                source,
                name: transport.name().to_string(),
            })?;
        }
        Ok(())
    })
}

/// stop accepting connections, unconditionally on every transport
pub fn acceptor_stop() {
    TRANSPORTS.with(|t| {
        t.borrow().iter().for_each(|transport| transport.stop());
    })
}

/// look up a transport by name, case does not matter
pub fn lookup(name: &str) -> Option<Rc<dyn Transport>> {
    TRANSPORTS.with(|t| {
        t.borrow()
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
            .cloned()
    })
}
