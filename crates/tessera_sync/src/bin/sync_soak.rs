//! # Sync Soak
//!
//! Hammers one viewer session from many scene threads while a drain worker
//! and a fake transport run concurrently, then prints what came out.
//!
//! - 16 producer threads moving 2,000 prims
//! - kills issued mid-run; no update may follow a kill on the wire
//! - every message encoded into datagrams of at most `MAX_PACKET_SIZE`
//!
//! Usage: `sync_soak [config.toml]`. Log level comes from `RUST_LOG`.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tessera_core::{LocalId, Vector3};
use tessera_sync::{
    spawn_drain_worker, ChangeFlags, ChannelTransport, KillTarget, MessageKind, PrimSnapshot,
    SceneEntity, SnapshotEntity, SyncConfig, SyncResult, SyncSession, ThrottleCategory,
    TransportSignal, MAX_PACKET_SIZE,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const PRODUCERS: usize = 16;
const PRIMS: u32 = 2_000;
const MOVES_PER_PRODUCER: usize = 20_000;
const KILLS: u32 = 100;
const REGION_HANDLE: u64 = 0x0003_e800_0003_e800;

#[derive(Debug, Default)]
struct WireTotals {
    messages: u64,
    datagrams: u64,
    bytes: u64,
    oversize: u64,
    resurrections: u64,
}

fn main() -> SyncResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TESSERA SYNC - SESSION SOAK                              ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Producers:          {PRODUCERS}");
    println!("│ Prims:              {PRIMS}");
    println!("│ Moves per Producer: {MOVES_PER_PRODUCER}");
    println!("│ Max Queued:         {}", config.max_queued_updates);
    println!("│ Overflow Policy:    {:?}", config.overflow_policy);
    println!("│ Updates per Drain:  {}", config.updates_per_drain);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let viewer = Uuid::new_v4();
    let (transport, outbound) = ChannelTransport::unbounded();
    let (signal_tx, signal_rx) = crossbeam_channel::unbounded();

    // Closer prims are more urgent.
    let scorer = |_: &Uuid, entity: &dyn SceneEntity| {
        entity
            .snapshot()
            .map_or(f64::MAX, |s| f64::from(s.motion().position.length_squared()))
    };
    let session = Arc::new(
        SyncSession::new(viewer, REGION_HANDLE, config, Arc::new(transport))?.with_scorer(Arc::new(scorer)),
    );

    let prims: Arc<Vec<Arc<SnapshotEntity>>> = Arc::new(
        (1..=PRIMS)
            .map(|id| {
                Arc::new(SnapshotEntity::prim(PrimSnapshot {
                    local_id: LocalId(id),
                    full_id: Uuid::new_v4(),
                    crc: id,
                    scale: Vector3::new(0.5, 0.5, 0.5),
                    ..PrimSnapshot::default()
                }))
            })
            .collect(),
    );

    let worker = spawn_drain_worker(Arc::clone(&session), signal_rx)?;

    // Fake transport: encode every message and ask for more when done.
    let wire_signals = signal_tx.clone();
    let wire = thread::Builder::new().name("soak-wire".to_owned()).spawn(move || {
        let mut totals = WireTotals::default();
        let mut killed = HashSet::new();
        for delivery in outbound.iter() {
            totals.messages += 1;
            let message = delivery.message;
            if message.kind == MessageKind::KillObject {
                killed.extend(message.blocks.iter().map(tessera_sync::UpdateBlock::local_id));
            } else if message.blocks.iter().any(|b| killed.contains(&b.local_id())) {
                totals.resurrections += 1;
            }
            match message.encode_packets(MAX_PACKET_SIZE) {
                Ok(packets) => {
                    for packet in &packets {
                        totals.datagrams += 1;
                        totals.bytes += packet.len() as u64;
                        if packet.len() > MAX_PACKET_SIZE {
                            totals.oversize += 1;
                        }
                    }
                }
                Err(error) => tracing::error!(%error, "failed to encode message"),
            }
            // The session may already be shut down.
            let _ = wire_signals.send(TransportSignal::QueueEmpty(vec![ThrottleCategory::Task]));
        }
        totals
    })?;

    println!("Running...");
    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|index| {
            let session = Arc::clone(&session);
            let prims = Arc::clone(&prims);
            let signals = signal_tx.clone();
            thread::Builder::new()
                .name(format!("soak-producer-{index}"))
                .spawn(move || {
                    let mut rng = rand::thread_rng();
                    for step in 0..MOVES_PER_PRODUCER {
                        let prim = &prims[rng.gen_range(0..prims.len())];
                        prim.set_position(Vector3::new(
                            rng.gen_range(0.0..256.0),
                            rng.gen_range(0.0..256.0),
                            rng.gen_range(20.0..40.0),
                        ));
                        let flags = if rng.gen_bool(0.05) {
                            ChangeFlags::FULL_UPDATE
                        } else {
                            ChangeFlags::POSITION | ChangeFlags::VELOCITY
                        };
                        let entity: Arc<dyn SceneEntity> = Arc::<SnapshotEntity>::clone(prim);
                        if session.submit_update(&entity, flags).is_err() {
                            break;
                        }
                        if step % 64 == 0 {
                            let _ = signals.send(TransportSignal::QueueEmpty(vec![ThrottleCategory::Task]));
                        }
                    }
                })
        })
        .collect::<Result<_, _>>()?;

    thread::sleep(Duration::from_millis(50));
    let targets: Vec<_> = (1..=KILLS)
        .map(|id| KillTarget {
            local_id: LocalId(id),
            is_attachment: false,
        })
        .collect();
    session.kill_entities(&targets)?;

    for producer in producers {
        if producer.join().is_err() {
            tracing::error!("producer thread panicked");
        }
    }

    let _ = signal_tx.send(TransportSignal::Shutdown);
    if worker.join().is_err() {
        tracing::error!("drain worker panicked");
    }
    let stats = session.stats();
    drop(session);
    let totals = wire.join().unwrap_or_default();
    let elapsed = start.elapsed();

    println!();
    println!("┌─ QUEUE ─────────────────────────────────────────────────────────┐");
    println!("│ Enqueued:           {}", stats.enqueued);
    println!("│ Drained:            {}", stats.drained);
    println!("│ Drain Cycles:       {}", stats.drain_cycles);
    println!("│ Coalesced:          {}", stats.coalesced);
    println!("│ Shed:               {}", stats.shed);
    println!("│ Killed Drops:       {}", stats.killed_drops);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ BLOCKS ────────────────────────────────────────────────────────┐");
    println!("│ Terse:              {}", stats.terse_blocks);
    println!("│ Full:               {}", stats.full_blocks);
    println!("│ Compressed:         {}", stats.compressed_blocks);
    println!("│ Cached:             {}", stats.cached_blocks);
    println!("│ Kill:               {}", stats.kill_blocks);
    println!("│ Build Failures:     {}", stats.build_failures);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ WIRE ──────────────────────────────────────────────────────────┐");
    println!("│ Messages:           {}", totals.messages);
    println!("│ Datagrams:          {}", totals.datagrams);
    println!("│ Bytes:              {}", totals.bytes);
    println!("│ Oversize Datagrams: {}", totals.oversize);
    println!("│ Elapsed:            {:.2} s", elapsed.as_secs_f64());
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    if totals.resurrections == 0 && totals.oversize == 0 {
        println!("✓ No killed entity reappeared; every datagram fit.");
    } else {
        println!(
            "✗ {} update message(s) after a kill, {} oversize datagram(s)",
            totals.resurrections, totals.oversize
        );
    }
    Ok(())
}
