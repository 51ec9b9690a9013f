use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rrud::loopback::{LoopbackFabric, LoopbackPort};
use rrud::wqe::WqeFlags;
use rrud::*;

type Received = Arc<Mutex<Vec<Vec<u8>>>>;
type Completed = Arc<Mutex<Vec<(Sn, Result<(), WcStatus>)>>>;

struct Node {
    iface: Interface,
    port: LoopbackPort,
    received: Received,
}

fn small_config() -> UdConfig {
    UdConfig {
        tx_queue_len: 64,
        tx_bufs: 64,
        rx_queue_len: 16,
        rx_max_batch: 4,
        rx_bufs: 32,
        seg_size: 1024,
        ..Default::default()
    }
}

fn node(fabric: &LoopbackFabric, lid: Lid, gid: Option<Gid>, config: UdConfig) -> Node {
    let (hw, port) = fabric.open(lid, gid);
    let received = Received::default();
    let sink = received.clone();
    let iface = Interface::builder()
        .config(config)
        .on_recv(move |packet: &[u8], desc: RecvDesc| {
            sink.lock().unwrap().push(packet.to_vec());
            RxDisposition::Recycle(desc)
        })
        .build(hw)
        .unwrap();
    iface.init().unwrap();
    Node {
        iface,
        port,
        received,
    }
}

fn recorder(seen: &Completed) -> impl FnOnce(Sn, Result<(), WcStatus>) + Send + 'static {
    let seen = seen.clone();
    move |sn, st| seen.lock().unwrap().push((sn, st))
}

/// Progress until the transmit queue has all its credit back.
fn drain_tx(iface: &Interface) {
    let capacity = iface.config().tx_queue_len as usize;
    for _ in 0..1000 {
        if iface.tx_available() == capacity {
            return;
        }
        iface.progress();
    }
    panic!("transmit queue did not drain");
}

#[test]
fn test_send_recv() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(&fabric, 2, None, small_config());

    let ep = a.iface.connect(&b.iface.address()).unwrap();
    assert!(ep.is_connected_to(&b.iface.address()));
    assert!(!ep.is_connected_to(&a.iface.address()));

    ep.send_short(b"hdr:", b"short").unwrap();
    ep.send_short_iov(b"hdr:", &[b"i", b"o", b"v"]).unwrap();
    ep.send_buffered(b"hdr:", &[7u8; 600]).unwrap();
    let (_, len) = ep
        .send_buffered_with(b"hdr:", |buf| {
            buf[..6].copy_from_slice(b"packed");
            6
        })
        .unwrap();
    assert_eq!(len, 10);
    ep.send_ctl(b"ctl", WqeFlags::EMPTY).unwrap();

    assert_eq!(b.iface.progress(), 5);
    let received = b.received.lock().unwrap();
    assert_eq!(received[0], b"hdr:short");
    assert_eq!(received[1], b"hdr:iov");
    assert_eq!(received[2].len(), 604);
    assert_eq!(received[3], b"hdr:packed");
    assert_eq!(received[4], b"ctl");

    let stats = a.iface.stats();
    assert_eq!(stats.short_ops, 2);
    assert_eq!(stats.bcopy_ops, 2);
    assert_eq!(stats.ctl_ops, 1);
}

#[test]
fn test_credit_exhaustion_and_recovery() {
    let fabric = LoopbackFabric::new();
    let a = node(
        &fabric,
        1,
        None,
        UdConfig {
            tx_queue_len: 4,
            ..small_config()
        },
    );
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();

    for i in 0..4u64 {
        assert_eq!(ep.send_short(b"", &i.to_le_bytes()).unwrap(), i);
    }
    assert_eq!(a.iface.tx_available(), 0);
    assert!(matches!(ep.send_short(b"", b"fifth"), Err(UdError::NoResource)));
    assert_eq!(a.iface.stats().tx_no_resource, 1);
    assert_eq!(a.iface.state(), IfaceState::Active);

    drain_tx(&a.iface);
    assert_eq!(a.iface.tx_available(), 4);
    assert_eq!(ep.send_short(b"", b"fifth").unwrap(), 4);

    assert_eq!(b.iface.progress(), 5);
    assert_eq!(b.received.lock().unwrap().len(), 5);
}

#[test]
fn test_rx_batch_and_threshold() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(
        &fabric,
        2,
        None,
        UdConfig {
            rx_queue_len: 4,
            rx_max_batch: 4,
            rx_bufs: 8,
            ..small_config()
        },
    );
    assert_eq!(b.iface.rx_posted(), 4);
    assert_eq!(b.port.recv_posted(), 4);

    let ep = a.iface.connect(&b.iface.address()).unwrap();
    ep.send_short(b"", b"one").unwrap();
    ep.send_short(b"", b"two").unwrap();

    // Two free slots are less than a batch: no automatic replenishment.
    assert_eq!(b.iface.progress(), 2);
    assert_eq!(b.iface.rx_posted(), 2);

    assert_eq!(b.iface.replenish_rx(3).unwrap(), 2);
    assert_eq!(b.iface.rx_posted(), 4);
    assert_eq!(b.port.recv_posted(), 4);
    assert_eq!(b.iface.replenish_rx(3).unwrap(), 0);
}

#[test]
fn test_rx_queue_overrun_drops() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(
        &fabric,
        2,
        None,
        UdConfig {
            rx_queue_len: 4,
            rx_max_batch: 4,
            ..small_config()
        },
    );
    let ep = a.iface.connect(&b.iface.address()).unwrap();
    for _ in 0..6 {
        ep.send_short(b"", b"burst").unwrap();
    }
    assert_eq!(b.port.dropped(), 2);

    // One progress call harvests everything and refills the queue.
    assert_eq!(b.iface.progress(), 4);
    assert_eq!(b.iface.rx_posted(), 4);
}

#[test]
fn test_rx_validation_drops() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(
        &fabric,
        2,
        None,
        UdConfig {
            rx_queue_len: 4,
            rx_max_batch: 4,
            rx_bufs: 4,
            rx_min_len: 8,
            ..small_config()
        },
    );
    let ep = a.iface.connect(&b.iface.address()).unwrap();

    ep.send_short(b"", b"tiny").unwrap();
    assert_eq!(b.iface.progress(), 1);
    assert!(b.received.lock().unwrap().is_empty());
    assert_eq!(b.iface.stats().rx_dropped, 1);

    // The dropped buffer went back to the pool and can be posted again.
    assert_eq!(b.iface.rx_posted(), 3);
    assert_eq!(b.iface.replenish_rx(4).unwrap(), 1);

    ep.send_short(b"", b"long enough").unwrap();
    assert_eq!(b.iface.progress(), 1);
    assert_eq!(b.received.lock().unwrap().len(), 1);
}

#[test]
fn test_rx_grh_mismatch_drops() {
    let fabric = LoopbackFabric::new();
    let gid_a = Gid::from([0xa; 16]);
    let gid_b = Gid::from([0xb; 16]);
    let global = UdConfig {
        addressing: Addressing::Global,
        ..small_config()
    };
    let a = node(&fabric, 1, Some(gid_a), global);
    let b = node(&fabric, 1, Some(gid_b), small_config());

    // A local-addressing interface advertises no GID.
    assert!(b.iface.address().gid.is_none());
    assert!(matches!(
        a.iface.connect(&b.iface.address()),
        Err(UdError::InvalidParam(_))
    ));

    let peer = PeerAddress::new(b.iface.qp_num(), 1, Some(GrhAv::new(gid_b)));
    let ep = Endpoint::with_peer(a.iface.clone(), peer).unwrap();
    ep.send_short(b"", b"routed").unwrap();
    assert_eq!(b.iface.progress(), 1);
    assert!(b.received.lock().unwrap().is_empty());
    assert_eq!(b.iface.stats().rx_dropped, 1);
}

#[test]
fn test_rx_dgid_check() {
    let fabric = LoopbackFabric::new();
    let gid_a = Gid::from([0xa; 16]);
    let gid_b = Gid::from([0xb; 16]);
    let global = UdConfig {
        addressing: Addressing::Global,
        check_grh_dgid: true,
        ..small_config()
    };
    let a = node(&fabric, 1, Some(gid_a), global.clone());
    let b = node(&fabric, 1, Some(gid_b), global);

    let ep = a.iface.connect(&b.iface.address()).unwrap();
    assert!(ep.peer().is_global());

    a.port.corrupt_next_grh();
    ep.send_short(b"", b"misrouted").unwrap();
    ep.send_short(b"", b"routed").unwrap();
    assert_eq!(b.iface.progress(), 2);
    assert_eq!(b.iface.stats().rx_dropped, 1);
    assert_eq!(*b.received.lock().unwrap(), vec![b"routed".to_vec()]);
}

#[test]
fn test_invalid_params() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let ep = a.iface.connect(&a.iface.address()).unwrap();

    let big = vec![0u8; wqe::MAX_INLINE + 1];
    assert!(matches!(ep.send_short(b"", &big), Err(UdError::InvalidParam(_))));
    let huge = vec![0u8; 2048];
    assert!(matches!(ep.send_buffered(b"", &huge), Err(UdError::InvalidParam(_))));
    assert!(matches!(ep.send_ctl(&huge, WqeFlags::EMPTY), Err(UdError::InvalidParam(_))));

    let parts = [&b"x"[..]; wqe::MAX_INLINE_IOV + 1];
    assert!(matches!(ep.send_short_iov(b"", &parts), Err(UdError::InvalidParam(_))));

    assert_eq!(a.iface.tx_available(), 64);
    assert_eq!(a.iface.state(), IfaceState::Active);
}

#[test]
fn test_zcopy_completions_in_order() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();

    let mut mem = RegisteredMem::new(fabric.domain(), 256).unwrap();
    mem.get_mut(0..256).unwrap().fill(0x5a);
    let seen = Completed::default();

    let mut sns = Vec::new();
    for i in 0..5 {
        let iov = [mem.sge(i * 32..(i + 1) * 32).unwrap(), mem.sge(0..0).unwrap()];
        // SAFETY: `mem` lives until the end of the test.
        let InProgress(sn) = unsafe { ep.send_zerocopy(b"z", &iov, recorder(&seen)) }.unwrap();
        sns.push(sn);
    }

    drain_tx(&a.iface);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen.iter().map(|(sn, _)| *sn).collect::<Vec<_>>(), sns);
    assert!(seen.iter().all(|(_, st)| st.is_ok()));
    assert_eq!(a.iface.stats().zcopy_completions, 5);

    b.iface.progress();
    let received = b.received.lock().unwrap();
    assert_eq!(received.len(), 5);
    assert_eq!(received[0].len(), 33);
    assert!(received[0][1..].iter().all(|&x| x == 0x5a));
}

#[test]
fn test_completion_callback_may_send() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();
    let sent = Arc::new(Mutex::new(None));

    let ep2 = ep.clone();
    let slot = sent.clone();
    // SAFETY: no regions are referenced.
    unsafe {
        ep.send_zerocopy(b"first", &[], move |_, _| {
            *slot.lock().unwrap() = Some(ep2.send_short(b"", b"second").is_ok());
        })
    }
    .unwrap();

    // The completion fires outside the interface lock, so it can send.
    a.iface.progress();
    assert_eq!(*sent.lock().unwrap(), Some(true));
    b.iface.progress();
    assert_eq!(b.received.lock().unwrap().len(), 2);
}

#[test]
fn test_tx_error_drains_and_fails_once() {
    let fabric = LoopbackFabric::new();
    let (hw, port) = fabric.open(1, None);
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let a = Interface::builder()
        .config(small_config())
        .on_failure(move |e| {
            assert!(matches!(e, UdError::Fatal(WcStatus::RemAbortErr)));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build(hw)
        .unwrap();
    a.init().unwrap();
    let b = node(&fabric, 2, None, small_config());
    let ep = a.connect(&b.iface.address()).unwrap();
    let seen = Completed::default();

    port.fail_next_send(WcStatus::RemAbortErr);
    for _ in 0..3 {
        // SAFETY: no regions are referenced.
        unsafe { ep.send_zerocopy(b"z", &[], recorder(&seen)) }.unwrap();
    }

    a.progress();
    assert_eq!(a.state(), IfaceState::Draining);
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    // Sends are rejected without touching the queue.
    let available = a.tx_available();
    assert!(matches!(
        ep.send_short(b"", b"late"),
        Err(UdError::NotActive(IfaceState::Draining))
    ));
    assert_eq!(a.tx_available(), available);

    // The flushed sends are still harvested, each exactly once.
    for _ in 0..4 {
        a.progress();
    }
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    {
        let seen = seen.lock().unwrap();
        let statuses: Vec<_> = seen.iter().map(|(_, st)| *st).collect();
        assert_eq!(
            statuses,
            vec![
                Err(WcStatus::RemAbortErr),
                Err(WcStatus::WrFlushErr),
                Err(WcStatus::WrFlushErr)
            ]
        );
    }

    a.close();
    assert_eq!(a.state(), IfaceState::Closed);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[test]
fn test_post_failure_fails_interface() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let ep = a.iface.connect(&a.iface.address()).unwrap();

    a.port.fail_next_post(libc::ENOMEM);
    assert!(matches!(ep.send_short(b"", b"x"), Err(UdError::Io(_))));
    assert_eq!(a.iface.state(), IfaceState::Draining);
    assert_eq!(a.iface.tx_available(), 64);
}

#[test]
fn test_close_flushes_outstanding() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let ep = a.iface.connect(&a.iface.address()).unwrap();
    let seen = Completed::default();

    // SAFETY: no regions are referenced.
    unsafe { ep.send_zerocopy(b"z", &[], recorder(&seen)) }.unwrap();
    a.iface.close();
    a.iface.close();

    assert_eq!(*seen.lock().unwrap(), vec![(0, Err(WcStatus::WrFlushErr))]);
    assert_eq!(a.iface.tx_available(), 0);
    assert!(!a.port.is_open());
    assert!(matches!(
        ep.send_short(b"", b"x"),
        Err(UdError::NotActive(IfaceState::Closed))
    ));
    assert_eq!(a.iface.progress(), 0);
}

#[test]
fn test_held_buffers() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let (hw, _) = fabric.open(2, None);
    let held = Arc::new(Mutex::new(Vec::new()));
    let sink = held.clone();
    let b = Interface::builder()
        .config(small_config())
        .on_recv(move |_: &[u8], desc: RecvDesc| {
            sink.lock().unwrap().push(desc);
            RxDisposition::Held
        })
        .build(hw)
        .unwrap();
    b.init().unwrap();

    let ep = a.iface.connect(&b.address()).unwrap();
    ep.send_short(b"keep ", b"me").unwrap();
    assert_eq!(b.progress(), 1);
    assert_eq!(b.stats().rx_held, 1);

    let desc = held.lock().unwrap().pop().unwrap();
    assert_eq!(desc.len(), 7);
    assert_eq!(b.read_recv(&desc, |p| p.to_vec()), Some(b"keep me".to_vec()));
    assert_eq!(a.iface.read_recv(&desc, |p| p.len()), None);
    b.release_recv(desc).unwrap();
}

#[test]
fn test_async_progress_and_arm() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let (hw, port) = fabric.open(2, None);
    let events = Arc::new(AtomicUsize::new(0));
    let counter = events.clone();
    let received = Received::default();
    let sink = received.clone();
    let b = Interface::builder()
        .config(small_config())
        .on_recv(move |packet: &[u8], desc: RecvDesc| {
            sink.lock().unwrap().push(packet.to_vec());
            RxDisposition::Recycle(desc)
        })
        .on_event(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build(hw)
        .unwrap();
    b.init().unwrap();
    assert_eq!(port.rx_armed(), Some(true));

    let ep = a.iface.connect(&b.address()).unwrap();
    ep.send_short(b"", b"quiet").unwrap();
    assert_eq!(port.rx_events(), 0);
    ep.send_ctl(b"wake", WqeFlags::SOLICITED).unwrap();
    assert_eq!(port.rx_events(), 1);

    // Harvest, defer dispatch, and re-arm.
    assert_eq!(b.async_progress(), 2);
    assert_eq!(events.load(Ordering::SeqCst), 1);
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(port.rx_armed(), Some(true));
    assert!(matches!(b.arm_events(ArmFlags::RECV), Err(UdError::Busy)));

    // Deferred packets go first, without polling.
    assert_eq!(b.progress(), 2);
    assert_eq!(received.lock().unwrap().len(), 2);

    b.arm_events(ArmFlags::RECV | ArmFlags::SEND_COMP).unwrap();
    assert_eq!(port.rx_armed(), Some(false));
    assert_eq!(port.tx_armed(), Some(false));
}

#[test]
fn test_async_zcopy_completion_deferred() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let ep = a.iface.connect(&a.iface.address()).unwrap();
    let seen = Completed::default();

    // SAFETY: no regions are referenced.
    unsafe { ep.send_zerocopy(b"z", &[], recorder(&seen)) }.unwrap();
    a.iface.async_progress();
    assert!(seen.lock().unwrap().is_empty());
    assert!(matches!(
        a.iface.arm_events(ArmFlags::SEND_COMP),
        Err(UdError::Busy)
    ));

    assert!(a.iface.progress() >= 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_arm_requires_active() {
    let fabric = LoopbackFabric::new();
    let (hw, _) = fabric.open(1, None);
    let a = Interface::builder().config(small_config()).build(hw).unwrap();
    assert_eq!(a.state(), IfaceState::Uninitialized);
    assert!(matches!(
        a.arm_events(ArmFlags::RECV),
        Err(UdError::NotActive(IfaceState::Uninitialized))
    ));
    a.init().unwrap();
    assert!(matches!(a.init(), Err(UdError::InvalidParam(_))));
    assert_eq!(a.state(), IfaceState::Active);
    a.arm_events(ArmFlags::RECV_SIG).unwrap();
}

#[test]
fn test_second_init_keeps_sends_in_flight() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();
    let seen = Completed::default();

    let mem = RegisteredMem::new(fabric.domain(), 64).unwrap();
    let sge = mem.sge(0..8).unwrap();
    unsafe { ep.send_zerocopy(b"z", &[sge], recorder(&seen)).unwrap() };

    assert!(matches!(a.iface.init(), Err(UdError::InvalidParam(_))));
    assert_eq!(a.iface.state(), IfaceState::Active);
    assert!(seen.lock().unwrap().is_empty());

    drain_tx(&a.iface);
    assert_eq!(seen.lock().unwrap()[0].1, Ok(()));
    ep.send_short(b"", b"still up").unwrap();
}

#[test]
fn test_send_buffer_limit_recovers() {
    let fabric = LoopbackFabric::new();
    let a = node(
        &fabric,
        1,
        None,
        UdConfig {
            tx_queue_len: 64,
            tx_moderation: 64,
            tx_bufs: 8,
            ..small_config()
        },
    );
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();

    for i in 0..8u64 {
        ep.send_short(b"", &i.to_le_bytes()).unwrap();
    }
    assert!(matches!(ep.send_short(b"", b"ninth"), Err(UdError::NoResource)));
    assert_eq!(a.iface.tx_available(), 56);

    let mut sent = None;
    for _ in 0..1000 {
        a.iface.progress();
        if let Ok(sn) = ep.send_short(b"", b"ninth") {
            sent = Some(sn);
            break;
        }
    }
    assert_eq!(sent, Some(8));

    while b.iface.progress() > 0 {}
    assert_eq!(b.received.lock().unwrap().len(), 9);
}

#[test]
fn test_event_callback_needs_live_interface() {
    let fabric = LoopbackFabric::new();
    let (hw, _port) = fabric.open(1, None);
    let events = Arc::new(AtomicUsize::new(0));
    let counter = events.clone();
    let a = Interface::builder()
        .config(small_config())
        .on_event(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build(hw)
        .unwrap();

    assert_eq!(a.async_progress(), 0);
    assert_eq!(events.load(Ordering::SeqCst), 0);

    a.init().unwrap();
    a.async_progress();
    assert_eq!(events.load(Ordering::SeqCst), 1);

    a.close();
    assert_eq!(a.async_progress(), 0);
    assert_eq!(events.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_senders() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let b = node(&fabric, 2, None, small_config());
    let ep = a.iface.connect(&b.iface.address()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ep = ep.clone();
            thread::spawn(move || {
                let mut sns = Vec::new();
                while sns.len() < 50 {
                    match ep.send_short(b"", b"mt") {
                        Ok(sn) => sns.push(sn),
                        Err(UdError::NoResource) => {
                            ep.iface().progress();
                        }
                        Err(e) => panic!("send failed: {}", e),
                    }
                    let cap = ep.iface().config().tx_queue_len as usize;
                    assert!(ep.iface().tx_available() <= cap);
                }
                sns
            })
        })
        .collect();

    let mut all: Vec<Sn> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 200);
    assert_eq!(a.iface.stats().short_ops, 200);
}

#[test]
#[should_panic(expected = "re-entered")]
fn test_reentry_panics() {
    let fabric = LoopbackFabric::new();
    let a = node(&fabric, 1, None, small_config());
    let (hw, _) = fabric.open(2, None);
    let slot: Arc<Mutex<Option<Interface>>> = Arc::default();
    let me = slot.clone();
    let b = Interface::builder()
        .config(small_config())
        .on_recv(move |_: &[u8], desc: RecvDesc| {
            if let Some(iface) = me.lock().unwrap().as_ref() {
                iface.progress();
            }
            RxDisposition::Recycle(desc)
        })
        .build(hw)
        .unwrap();
    b.init().unwrap();
    *slot.lock().unwrap() = Some(b.clone());

    let ep = a.iface.connect(&b.address()).unwrap();
    ep.send_short(b"", b"boom").unwrap();
    b.progress();
}

#[test]
fn test_address_exchange() {
    let fabric = LoopbackFabric::new();
    let gid = Gid::from([3u8; 16]);
    let a = node(
        &fabric,
        7,
        Some(gid),
        UdConfig {
            addressing: Addressing::Global,
            ..small_config()
        },
    );
    let packed = a.iface.address().pack().unwrap();
    let addr = UdAddress::unpack(&packed).unwrap();
    assert_eq!(addr, a.iface.address());
    assert_eq!(addr.lid, 7);
    assert_eq!(addr.gid, Some(gid));
}

#[test]
fn test_global_addressing_needs_gid() {
    let fabric = LoopbackFabric::new();
    let (hw, _) = fabric.open(1, None);
    let ret = Interface::builder()
        .config(UdConfig {
            addressing: Addressing::Global,
            ..small_config()
        })
        .build(hw);
    assert!(matches!(ret, Err(UdError::InvalidParam(_))));

    let (hw, _) = fabric.open(1, None);
    let ret = Interface::builder()
        .config(UdConfig {
            tx_queue_len: 3,
            ..small_config()
        })
        .build(hw);
    assert!(matches!(ret, Err(UdError::Config(_))));
}
