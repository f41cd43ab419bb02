mod common;

use std::{boxed::Box, cell::Cell, vec::Vec};

use common::{leak, TestHost};
use embassy_futures::join::join;
use embassy_time::{Duration, MockDriver};
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use serial_test::serial;
use wifi_txrx::{
    HttEvent, MacAddress, PeerMapEvent, PeerUnmapEvent, TxRx, TxRxConfig, TxRxError, TxRxResult,
};

type TestTxRx = TxRx<TestHost, 4, 8>;

const VDEV_ID: u32 = 0;
const ADDR: MacAddress = [0x00, 0x0c, 0x42, 0x12, 0x34, 0x56];

fn new_txrx() -> &'static TestTxRx {
    leak(TxRx::new(TestHost::default(), TxRxConfig::default()))
}

fn map(peer_id: u16) -> HttEvent {
    HttEvent::PeerMap(PeerMapEvent {
        vdev_id: VDEV_ID,
        addr: ADDR,
        peer_id,
    })
}

fn unmap(peer_id: u16) -> HttEvent {
    HttEvent::PeerUnmap(PeerUnmapEvent { peer_id })
}

fn peer_ids(txrx: &TestTxRx) -> Vec<usize> {
    txrx.with_peer(VDEV_ID, &ADDR, |peer| {
        peer.map(|peer| peer.peer_ids().iter().collect())
            .unwrap_or_default()
    })
}

#[test]
#[serial]
fn test_wait_for_peer_created() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();

    let txrx = new_txrx();
    txrx.peer_insert(VDEV_ID, ADDR).unwrap();

    let result = leak(Cell::new(None::<TxRxResult<()>>));
    spawner
        .spawn_local_obj(
            Box::new(async move {
                result.set(Some(txrx.wait_for_peer_created(VDEV_ID, &ADDR).await));
            })
            .into(),
        )
        .unwrap();
    executor.run_until_stalled();
    assert_eq!(result.get(), None);

    txrx.handle_event(&map(17));
    executor.run_until_stalled();
    assert_eq!(result.get(), Some(Ok(())));
    assert_eq!(peer_ids(txrx), [17]);
}

#[test]
#[serial]
fn test_wait_for_peer_created_timeout() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();
    let time = MockDriver::get();

    let txrx = new_txrx();
    txrx.peer_insert(VDEV_ID, ADDR).unwrap();

    let result = leak(Cell::new(None::<TxRxResult<()>>));
    spawner
        .spawn_local_obj(
            Box::new(async move {
                result.set(Some(txrx.wait_for_peer_created(VDEV_ID, &ADDR).await));
            })
            .into(),
        )
        .unwrap();
    executor.run_until_stalled();

    // A map for another peer doesn't satisfy the wait.
    txrx.peer_insert(VDEV_ID, [0x02, 0, 0, 0, 0, 1]).unwrap();
    txrx.handle_event(&HttEvent::PeerMap(PeerMapEvent {
        vdev_id: VDEV_ID,
        addr: [0x02, 0, 0, 0, 0, 1],
        peer_id: 3,
    }));
    executor.run_until_stalled();
    assert_eq!(result.get(), None);

    time.advance(Duration::from_secs(3));
    executor.run_until_stalled();
    assert_eq!(result.get(), Some(Err(TxRxError::TimedOut)));
}

#[test]
#[serial]
fn test_already_in_state() {
    let mut executor = LocalPool::new();
    let txrx = new_txrx();

    // A peer, that doesn't exist, counts as unmapped.
    let (deleted, unmapped) = executor.run_until(join(
        txrx.wait_for_peer_deleted(VDEV_ID, &ADDR),
        txrx.wait_for_peer_common(VDEV_ID, &ADDR, false, Duration::from_millis(10)),
    ));
    assert_eq!(deleted, Ok(()));
    assert_eq!(unmapped, Ok(()));
}

#[test]
#[serial]
fn test_handover() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();

    let txrx = new_txrx();
    txrx.peer_insert(VDEV_ID, ADDR).unwrap();
    txrx.handle_event(&map(5));
    txrx.handle_event(&map(9));
    assert_eq!(peer_ids(txrx), [5, 9]);

    let result = leak(Cell::new(None::<TxRxResult<()>>));
    spawner
        .spawn_local_obj(
            Box::new(async move {
                result.set(Some(txrx.wait_for_peer_deleted(VDEV_ID, &ADDR).await));
            })
            .into(),
        )
        .unwrap();
    executor.run_until_stalled();

    txrx.handle_event(&unmap(5));
    executor.run_until_stalled();
    assert_eq!(peer_ids(txrx), [9]);
    assert_eq!(result.get(), None);

    txrx.handle_event(&unmap(9));
    executor.run_until_stalled();
    assert!(peer_ids(txrx).is_empty());
    assert_eq!(result.get(), Some(Ok(())));
}

#[test]
fn test_unknown_events() {
    let txrx = new_txrx();
    assert_eq!(
        txrx.on_peer_map(&PeerMapEvent {
            vdev_id: VDEV_ID,
            addr: ADDR,
            peer_id: 1,
        }),
        Err(TxRxError::UnknownPeer)
    );

    txrx.peer_insert(VDEV_ID, ADDR).unwrap();
    txrx.handle_event(&map(1));
    assert_eq!(
        txrx.on_peer_unmap(&PeerUnmapEvent { peer_id: 2 }),
        Err(TxRxError::UnknownId)
    );
    assert_eq!(
        txrx.on_peer_map(&PeerMapEvent {
            vdev_id: VDEV_ID,
            addr: ADDR,
            peer_id: 4096,
        }),
        Err(TxRxError::PeerIdOutOfRange)
    );
    assert_eq!(peer_ids(txrx), [1]);
    assert_eq!(txrx.peer_find_by_id(1).unwrap().vdev_id(), VDEV_ID);
}

#[test]
fn test_registry_lifecycle() {
    let txrx = new_txrx();
    txrx.peer_insert(0, ADDR).unwrap();
    txrx.peer_insert(1, ADDR).unwrap();
    assert_eq!(txrx.peer_insert(0, ADDR), Err(TxRxError::PeerExists));

    txrx.handle_event(&map(2));
    let removed = txrx.peer_remove(0, &ADDR).unwrap();
    assert!(removed.peer_ids().contains(2));
    assert!(txrx.peer_find_by_id(2).is_none());

    assert_eq!(txrx.peer_cleanup(1), 1);
    assert_eq!(txrx.peer_cleanup(1), 0);
    assert_eq!(txrx.peer_count(), 0);
}

#[test]
#[serial]
fn test_cleanup_wakes_waiter() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();

    let txrx = new_txrx();
    txrx.peer_insert(VDEV_ID, ADDR).unwrap();
    txrx.handle_event(&map(1));

    let result = leak(Cell::new(None::<TxRxResult<()>>));
    spawner
        .spawn_local_obj(
            Box::new(async move {
                result.set(Some(txrx.wait_for_peer_deleted(VDEV_ID, &ADDR).await));
            })
            .into(),
        )
        .unwrap();
    executor.run_until_stalled();
    assert_eq!(result.get(), None);

    assert_eq!(txrx.peer_cleanup(VDEV_ID), 1);
    executor.run_until_stalled();
    assert_eq!(result.get(), Some(Ok(())));
}
