use nix::errno::Errno;

use nvmft::{
    core::nvme::NvmeStatus,
    subsys::{Connection, Subsystem},
};

pub mod common;
use common::MockTransport;

#[test]
fn poll_pumps_every_connection() {
    common::test_init();
    let subsystem =
        Subsystem::create("nqn.nvm", common::sample_ctrlr_data()).unwrap();

    let transport = MockTransport::new("tcp");
    let admin = Connection::new(transport.clone());
    common::connect(&admin, 0, 0xFFFF, "nqn.nvm");
    let session = subsystem.session().unwrap();
    common::enable(&session);

    let io = Connection::new(transport.clone());
    common::connect(&io, 1, 0, "nqn.nvm");

    assert_eq!(session.poll(), 0);
    assert_eq!(transport.poll_calls.get(), 2);
    assert_eq!(session.num_connections(), 2);
}

#[test]
fn poll_evicts_failing_connection() {
    common::test_init();
    let subsystem =
        Subsystem::create("nqn.nvm", common::sample_ctrlr_data()).unwrap();

    let healthy = MockTransport::new("tcp");
    let admin = Connection::new(healthy.clone());
    common::connect(&admin, 0, 0xFFFF, "nqn.nvm");
    let session = subsystem.session().unwrap();
    common::enable(&session);

    let broken = MockTransport::new("rdma");
    let io = Connection::new(broken.clone());
    let rsp = common::connect(&io, 1, 0, "nqn.nvm");
    assert_eq!(rsp.status, NvmeStatus::success());
    assert_eq!(session.num_connections(), 2);

    broken.poll_result.set(Some(Errno::ECONNRESET));
    assert_eq!(session.poll(), 0);

    // the broken connection is unlinked, the healthy one stays bound
    assert_eq!(session.num_connections(), 1);
    assert_eq!(session.connection_count(), 1);
    assert_eq!(broken.poll_calls.get(), 1);
    // eviction does not release the connection, that is up to the transport
    assert_eq!(broken.finish_calls.get(), 0);

    // a later poll only sees the remaining connection
    assert_eq!(session.poll(), 0);
    assert_eq!(healthy.poll_calls.get(), 2);
    assert_eq!(broken.poll_calls.get(), 1);
}

#[test]
fn poll_drops_links_of_vanished_connections() {
    common::test_init();
    let subsystem =
        Subsystem::create("nqn.nvm", common::sample_ctrlr_data()).unwrap();

    let transport = MockTransport::new("tcp");
    let admin = Connection::new(transport.clone());
    common::connect(&admin, 0, 0xFFFF, "nqn.nvm");
    let session = subsystem.session().unwrap();
    common::enable(&session);

    let io = Connection::new(transport.clone());
    common::connect(&io, 1, 0, "nqn.nvm");
    assert_eq!(session.num_connections(), 2);

    // the transport dropped the connection without a disconnect
    drop(io);
    assert_eq!(session.poll(), 0);
    assert_eq!(session.num_connections(), 1);
    assert_eq!(session.connection_count(), 1);
}

#[test]
fn destruct_disconnects_and_finishes_all_connections() {
    common::test_init();
    let subsystem =
        Subsystem::create("nqn.nvm", common::sample_ctrlr_data()).unwrap();

    let transport = MockTransport::new("tcp");
    let admin = Connection::new(transport.clone());
    common::connect(&admin, 0, 0xFFFF, "nqn.nvm");
    let session = subsystem.session().unwrap();
    common::enable(&session);

    let io1 = Connection::new(transport.clone());
    let io2 = Connection::new(transport.clone());
    common::connect(&io1, 1, 0, "nqn.nvm");
    common::connect(&io2, 2, 0, "nqn.nvm");
    assert_eq!(session.num_connections(), 3);

    session.destruct();

    assert_eq!(session.num_connections(), 0);
    assert_eq!(session.connection_count(), 0);
    assert_eq!(transport.finish_calls.get(), 3);
    assert!(subsystem.session().is_none());

    // with the slot cleared a new admin connect may establish a session
    let fresh = Connection::new(transport);
    let rsp = common::connect(&fresh, 0, 0xFFFF, "nqn.nvm");
    assert_eq!(rsp.status, NvmeStatus::success());
    assert!(subsystem.session().is_some());
}

#[test]
fn subsystem_destroy_tears_down_session() {
    common::test_init();
    let subsystem = Subsystem::create_discovery("nqn.discovery").unwrap();

    let transport = MockTransport::new("tcp");
    let conn = Connection::new(transport.clone());
    common::connect(&conn, 0, 0xFFFF, "nqn.discovery");
    let session = subsystem.session().unwrap();

    subsystem.destroy();
    assert_eq!(session.num_connections(), 0);
    assert_eq!(transport.finish_calls.get(), 1);
    assert!(Subsystem::lookup("nqn.discovery", common::HOST_NQN).is_none());
}
