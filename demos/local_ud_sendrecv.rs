use rrud::{loopback::LoopbackFabric, prelude::*};
use std::sync::mpsc::*;
use std::thread;

const ROUNDS: usize = 10000;

fn make_iface(
    fabric: &LoopbackFabric,
    lid: u16,
    tx: Option<SyncSender<Vec<u8>>>,
) -> anyhow::Result<Interface> {
    let (hw, _) = fabric.open(lid, None);
    let mut builder = Interface::builder().on_failure(|e| eprintln!("interface failed: {}", e));
    if let Some(tx) = tx {
        builder = builder.on_recv(move |packet: &[u8], desc: RecvDesc| {
            let _ = tx.try_send(packet.to_vec());
            RxDisposition::Recycle(desc)
        });
    }
    let iface = builder.build(hw)?;
    iface.init()?;
    Ok(iface)
}

fn client(fabric: LoopbackFabric, addr: Receiver<Vec<u8>>) -> anyhow::Result<()> {
    let iface = make_iface(&fabric, 1, None)?;
    let ep = iface.connect(&UdAddress::unpack(&addr.recv()?)?)?;

    // Send the greeting through a send buffer.
    ep.send_buffered(b"", "Hello, rrud!".as_bytes())?;

    // Then stream short messages, retrying whenever credit runs out.
    let clock = quanta::Clock::new();
    let start = clock.now();
    for i in 0..ROUNDS {
        let seq = (i as u64).to_le_bytes();
        loop {
            match ep.send_short(b"seq", &seq) {
                Ok(_) => break,
                Err(UdError::NoResource) => {
                    iface.progress();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    let elapsed = clock.now() - start;
    println!(
        "client: {} short sends in {:?} ({:.1} ns/send)",
        ROUNDS,
        elapsed,
        elapsed.as_nanos() as f64 / ROUNDS as f64
    );

    // Finish with a zero-copy send out of registered memory.
    let mem = RegisteredMem::new(fabric.domain(), 64)?;
    let sge = mem.sge(0..16).ok_or_else(|| anyhow::anyhow!("bad region"))?;
    let (done_tx, done_rx) = channel();
    // SAFETY: `mem` outlives the send; we wait for the completion below.
    unsafe {
        ep.send_zerocopy(b"bye", &[sge], move |sn, st| {
            let _ = done_tx.send((sn, st));
        })?;
    }
    let (sn, status) = loop {
        iface.progress();
        if let Ok(done) = done_rx.try_recv() {
            break done;
        }
    };
    println!("client: zero-copy send {} completed with {:?}", sn, status);
    println!("client: {}", serde_json::to_string(&iface.stats())?);
    iface.close();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let fabric = LoopbackFabric::new();
    let (addr_tx, addr_rx) = channel();
    let (pkt_tx, pkt_rx) = sync_channel(ROUNDS + 2);

    let server = make_iface(&fabric, 2, Some(pkt_tx))?;
    addr_tx.send(server.address().pack()?)?;

    let cli = {
        let fabric = fabric.clone();
        thread::spawn(move || client(fabric, addr_rx))
    };

    let mut received = 0;
    while received < ROUNDS + 2 {
        server.progress();
        while let Ok(packet) = pkt_rx.try_recv() {
            if received == 0 {
                println!("server: {}", String::from_utf8_lossy(&packet));
            }
            received += 1;
        }
        if cli.is_finished() && received < ROUNDS + 2 && server.progress() == 0 {
            break;
        }
    }
    println!("server: received {} packets", received);

    cli.join().unwrap()?;
    server.close();
    Ok(())
}
