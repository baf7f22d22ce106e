//! Integration test for producers and the drain worker running concurrently.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tessera_core::{LocalId, Vector3};
use tessera_sync::{
    spawn_drain_worker, ChangeFlags, ChannelTransport, KillTarget, MessageKind, PrimSnapshot,
    SceneEntity, SnapshotEntity, SyncConfig, SyncSession, ThrottleCategory, TransportSignal,
};
use uuid::Uuid;

fn prim(id: u32) -> Arc<SnapshotEntity> {
    Arc::new(SnapshotEntity::prim(PrimSnapshot {
        local_id: LocalId(id),
        full_id: Uuid::from_u128(u128::from(id)),
        ..PrimSnapshot::default()
    }))
}

#[test]
fn test_concurrent_submit_and_drain() {
    let (transport, outbound) = ChannelTransport::unbounded();
    let (signals, signal_rx) = crossbeam_channel::unbounded();
    let session = Arc::new(
        SyncSession::new(Uuid::from_u128(1), 0, SyncConfig::default(), Arc::new(transport)).unwrap(),
    );
    let worker = spawn_drain_worker(Arc::clone(&session), signal_rx).unwrap();

    let threads = 8;
    let per_thread = 1_000u32;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let session = Arc::clone(&session);
            let signals = signals.clone();
            thread::spawn(move || {
                let entities: Vec<_> = (0..per_thread).map(|i| prim(t * per_thread + i + 1)).collect();
                for (i, entity) in entities.iter().enumerate() {
                    entity.set_position(Vector3::new(i as f32, 0.0, 22.0));
                    let shared: Arc<dyn SceneEntity> = Arc::clone(entity) as Arc<dyn SceneEntity>;
                    session.submit_update(&shared, ChangeFlags::POSITION).unwrap();
                    if i % 50 == 0 {
                        signals
                            .send(TransportSignal::QueueEmpty(vec![ThrottleCategory::Task]))
                            .unwrap();
                    }
                }
                entities
            })
        })
        .collect();

    // Entities stay alive until the worker has flushed.
    let alive: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    signals.send(TransportSignal::Shutdown).unwrap();
    worker.join().unwrap();

    let mut seen = HashSet::new();
    for delivery in outbound.try_iter() {
        assert_eq!(delivery.message.kind, MessageKind::ImprovedTerseObjectUpdate);
        assert!(delivery.message.blocks.len() <= SyncConfig::default().updates_per_drain);
        for block in &delivery.message.blocks {
            assert!(seen.insert(block.local_id()), "duplicate {:?}", block.local_id());
        }
    }
    assert_eq!(seen.len(), alive.len());
    assert_eq!(session.queue_len(), 0);

    let stats = session.stats();
    assert_eq!(stats.enqueued, u64::from(threads * per_thread));
    assert_eq!(stats.terse_blocks, stats.enqueued);
}

#[test]
fn test_kill_during_concurrent_submits() {
    let (transport, outbound) = ChannelTransport::unbounded();
    let session = Arc::new(
        SyncSession::new(Uuid::from_u128(2), 0, SyncConfig::default(), Arc::new(transport)).unwrap(),
    );
    let entities: Arc<Vec<_>> = Arc::new((1..=200).map(prim).collect());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            let entities = Arc::clone(&entities);
            thread::spawn(move || {
                for _ in 0..20 {
                    for entity in entities.iter() {
                        let shared: Arc<dyn SceneEntity> = Arc::clone(entity) as Arc<dyn SceneEntity>;
                        session.submit_update(&shared, ChangeFlags::POSITION).unwrap();
                    }
                }
            })
        })
        .collect();

    let drainer = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            for _ in 0..200 {
                session.process_entity_updates(Some(100)).unwrap();
            }
        })
    };

    let targets: Vec<_> = (1..=50)
        .map(|id| KillTarget {
            local_id: LocalId(id),
            is_attachment: false,
        })
        .collect();
    session.kill_entities(&targets).unwrap();

    for producer in producers {
        producer.join().unwrap();
    }
    drainer.join().unwrap();
    let late: Arc<dyn SceneEntity> = Arc::clone(&entities[0]) as Arc<dyn SceneEntity>;
    session.submit_update(&late, ChangeFlags::POSITION).unwrap();
    session.flush_all().unwrap();

    let mut killed = false;
    for delivery in outbound.try_iter() {
        if delivery.message.kind == MessageKind::KillObject {
            killed = true;
            continue;
        }
        if killed {
            for id in 1..=50 {
                assert!(!delivery.message.references(LocalId(id)), "entity {id} came back");
            }
        }
    }
    assert!(killed);
    assert!(session.stats().killed_drops > 0);
}
