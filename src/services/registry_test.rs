use super::*;
use std::sync::{Arc, Mutex};

const HALF_EXTENT: f64 = 5.0;
const SCALE: f64 = 0.8;

fn registry() -> SessionRegistry {
    SessionRegistry::new(HALF_EXTENT, SCALE)
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =============================================================================
// join
// =============================================================================

#[tokio::test]
async fn join_creates_participant_inside_spawn_square() {
    let reg = registry();
    for _ in 0..50 {
        let p = reg.join(Uuid::new_v4(), Some("Ann"), Some("#111"), |_, _| {}).await.unwrap();
        assert!(p.x.abs() <= HALF_EXTENT, "x out of spawn range: {}", p.x);
        assert!(p.z.abs() <= HALF_EXTENT, "z out of spawn range: {}", p.z);
    }
    assert_eq!(reg.snapshot().await.len(), 50);
}

#[tokio::test]
async fn join_keeps_requested_display_fields() {
    let reg = registry();
    let id = Uuid::new_v4();
    let p = reg.join(id, Some("Ann"), Some("#111"), |_, _| {}).await.unwrap();
    assert_eq!(p.id, id);
    assert_eq!(p.display_name, "Ann");
    assert_eq!(p.color, "#111");
}

#[tokio::test]
async fn join_blank_fields_use_defaults() {
    let reg = registry();
    let missing = reg.join(Uuid::new_v4(), None, None, |_, _| {}).await.unwrap();
    let blank = reg.join(Uuid::new_v4(), Some("   "), Some(""), |_, _| {}).await.unwrap();

    for p in [missing, blank] {
        assert!(p.display_name.starts_with("Guest-"), "unexpected name: {}", p.display_name);
        assert_eq!(p.display_name.len(), "Guest-0000".len());
        assert_eq!(p.color, DEFAULT_COLOR);
    }
}

#[tokio::test]
async fn join_trims_display_fields() {
    let reg = registry();
    let p = reg.join(Uuid::new_v4(), Some("  Bo "), Some(" red "), |_, _| {}).await.unwrap();
    assert_eq!(p.display_name, "Bo");
    assert_eq!(p.color, "red");
}

#[tokio::test]
async fn duplicate_join_is_rejected_and_keeps_original() {
    let reg = registry();
    let id = Uuid::new_v4();
    let original = reg.join(id, Some("Ann"), None, |_, _| {}).await.unwrap();

    let err = reg.join(id, Some("Impostor"), None, |_, _| {}).await.unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateId(dup) if dup == id));
    assert_eq!(err.error_code(), "E_DUPLICATE_PARTICIPANT");

    let snapshot = reg.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[&id].display_name, "Ann");
    assert!(approx_eq(snapshot[&id].x, original.x));
}

#[tokio::test]
async fn zero_half_extent_spawns_at_origin() {
    let reg = SessionRegistry::new(0.0, SCALE);
    let p = reg.join(Uuid::new_v4(), None, None, |_, _| {}).await.unwrap();
    assert!(approx_eq(p.x, 0.0));
    assert!(approx_eq(p.z, 0.0));
}

// =============================================================================
// move
// =============================================================================

#[tokio::test]
async fn move_accumulates_scaled_deltas() {
    let reg = registry();
    let id = Uuid::new_v4();
    let spawn = reg.join(id, None, None, |_, _| {}).await.unwrap();

    let deltas = [(1.0, 0.0), (0.0, -1.0), (2.5, 3.0), (-0.25, 0.0)];
    for (dx, dz) in deltas {
        reg.move_by(id, dx, dz, |_| {}).await.unwrap();
    }

    let sum_dx: f64 = deltas.iter().map(|(dx, _)| dx).sum();
    let sum_dz: f64 = deltas.iter().map(|(_, dz)| dz).sum();
    let p = &reg.snapshot().await[&id];
    assert!(approx_eq(p.x, spawn.x + sum_dx * SCALE));
    assert!(approx_eq(p.z, spawn.z + sum_dz * SCALE));
}

#[tokio::test]
async fn move_returns_post_move_state() {
    let reg = registry();
    let id = Uuid::new_v4();
    let spawn = reg.join(id, Some("Ann"), None, |_, _| {}).await.unwrap();

    let moved = reg.move_by(id, 1.0, 0.0, |_| {}).await.unwrap();
    assert_eq!(moved.id, id);
    assert_eq!(moved.display_name, "Ann");
    assert!(approx_eq(moved.x, spawn.x + SCALE));
    assert!(approx_eq(moved.z, spawn.z));
}

#[tokio::test]
async fn move_is_not_clamped() {
    let reg = SessionRegistry::new(0.0, 1.0);
    let id = Uuid::new_v4();
    reg.join(id, None, None, |_, _| {}).await.unwrap();

    let moved = reg.move_by(id, 1_000.0, -1_000.0, |_| {}).await.unwrap();
    assert!(approx_eq(moved.x, 1_000.0));
    assert!(approx_eq(moved.z, -1_000.0));
}

#[tokio::test]
async fn move_refreshes_last_activity() {
    let reg = registry();
    let id = Uuid::new_v4();
    let spawn = reg.join(id, None, None, |_, _| {}).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(spawn.idle_for() >= Duration::from_millis(5));

    let moved = reg.move_by(id, 0.0, 0.0, |_| {}).await.unwrap();
    assert!(moved.last_activity > spawn.last_activity);
    assert!(moved.idle_for() < spawn.idle_for());
}

#[tokio::test]
async fn move_out_of_finite_range_keeps_position() {
    let reg = SessionRegistry::new(0.0, SCALE);
    let id = Uuid::new_v4();
    reg.join(id, None, None, |_, _| {}).await.unwrap();

    let first = reg.move_by(id, 1.7e308, 0.0, |_| {}).await.unwrap();
    assert!(first.x.is_finite());

    let second = reg.move_by(id, 1.7e308, 1.0, |_| {}).await.unwrap();
    assert!(approx_eq(second.x, first.x), "overflowing move must be refused");
    assert!(approx_eq(second.z, 0.0), "a refused move keeps both axes");

    let back = reg.move_by(id, -1.7e308, 0.0, |_| {}).await.unwrap();
    assert!(back.x.is_finite());
    assert!(back.x.abs() < first.x);

    let wire = crate::frame::ServerEvent::PlayerMoved(back).encode().unwrap();
    assert!(!wire.contains("null"), "position must stay defined on the wire: {wire}");
}

#[tokio::test]
async fn move_unknown_id_is_noop() {
    let reg = registry();
    let id = Uuid::new_v4();
    let before = reg.join(id, None, None, |_, _| {}).await.unwrap();

    assert!(reg.move_by(Uuid::new_v4(), 1.0, 1.0, |_| {}).await.is_none());

    let snapshot = reg.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert!(approx_eq(snapshot[&id].x, before.x));
    assert!(approx_eq(snapshot[&id].z, before.z));
}

// =============================================================================
// leave / snapshot
// =============================================================================

#[tokio::test]
async fn leave_is_idempotent() {
    let reg = registry();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    reg.join(a, None, None, |_, _| {}).await.unwrap();
    reg.join(b, None, None, |_, _| {}).await.unwrap();

    assert!(reg.leave(a, |_| {}).await);
    assert_eq!(reg.snapshot().await.len(), 1);
    assert!(!reg.leave(a, |_| {}).await);
    assert_eq!(reg.snapshot().await.len(), 1);
    assert!(reg.snapshot().await.contains_key(&b));
}

#[tokio::test]
async fn len_tracks_membership() {
    let reg = registry();
    assert!(reg.is_empty().await);

    let id = Uuid::new_v4();
    reg.join(id, None, None, |_, _| {}).await.unwrap();
    reg.join(Uuid::new_v4(), None, None, |_, _| {}).await.unwrap();
    assert_eq!(reg.len().await, 2);
    assert!(!reg.is_empty().await);

    reg.leave(id, |_| {}).await;
    assert_eq!(reg.len().await, 1);
}

#[tokio::test]
async fn move_after_leave_is_noop() {
    let reg = registry();
    let id = Uuid::new_v4();
    reg.join(id, None, None, |_, _| {}).await.unwrap();
    reg.leave(id, |_| {}).await;

    assert!(reg.move_by(id, 1.0, 0.0, |_| {}).await.is_none());
    assert!(reg.snapshot().await.is_empty());
}

#[tokio::test]
async fn snapshot_is_an_independent_copy() {
    let reg = registry();
    let id = Uuid::new_v4();
    let spawn = reg.join(id, Some("Ann"), None, |_, _| {}).await.unwrap();

    let mut copy = reg.snapshot().await;
    copy.get_mut(&id).unwrap().x += 100.0;
    copy.clear();

    let fresh = reg.snapshot().await;
    assert_eq!(fresh.len(), 1);
    assert!(approx_eq(fresh[&id].x, spawn.x));
}

#[tokio::test]
async fn snapshot_tracks_mixed_sequence() {
    let reg = registry();
    let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let mut spawns = HashMap::new();
    for id in &ids {
        spawns.insert(*id, reg.join(*id, None, None, |_, _| {}).await.unwrap());
    }

    reg.move_by(ids[0], 1.0, 1.0, |_| {}).await;
    reg.leave(ids[1], |_| {}).await;
    reg.move_by(ids[1], 5.0, 5.0, |_| {}).await;
    reg.move_by(ids[2], -2.0, 0.5, |_| {}).await;
    reg.leave(ids[3], |_| {}).await;
    reg.move_by(ids[0], 1.0, 0.0, |_| {}).await;

    let snapshot = reg.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert!(approx_eq(snapshot[&ids[0]].x, spawns[&ids[0]].x + 2.0 * SCALE));
    assert!(approx_eq(snapshot[&ids[0]].z, spawns[&ids[0]].z + SCALE));
    assert!(approx_eq(snapshot[&ids[2]].x, spawns[&ids[2]].x - 2.0 * SCALE));
    assert!(approx_eq(snapshot[&ids[2]].z, spawns[&ids[2]].z + 0.5 * SCALE));
}

// =============================================================================
// announce hooks
// =============================================================================

#[tokio::test]
async fn join_announces_record_and_full_map() {
    let reg = registry();
    let first = Uuid::new_v4();
    reg.join(first, None, None, |_, _| {}).await.unwrap();

    let second = Uuid::new_v4();
    let mut seen = None;
    reg.join(second, Some("Bo"), None, |p, all| seen = Some((p.id, all.len())))
        .await
        .unwrap();
    assert_eq!(seen, Some((second, 2)));

    let mut called = false;
    reg.join(second, None, None, |_, _| called = true).await.unwrap_err();
    assert!(!called, "rejected join must not announce");
}

#[tokio::test]
async fn move_and_leave_announce_only_known_ids() {
    let reg = registry();
    let id = Uuid::new_v4();
    reg.join(id, None, None, |_, _| {}).await.unwrap();

    let mut moved = None;
    reg.move_by(id, 1.0, 0.0, |p| moved = Some(p.x)).await;
    assert!(moved.is_some());

    let mut calls = 0;
    reg.move_by(Uuid::new_v4(), 1.0, 0.0, |_| calls += 1).await;
    assert!(reg.leave(id, |p| { assert_eq!(p.id, id); calls += 10; }).await);
    assert!(!reg.leave(id, |_| calls += 100).await);
    assert_eq!(calls, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn announcements_follow_mutation_order() {
    let reg = Arc::new(SessionRegistry::new(0.0, 1.0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let reg = Arc::clone(&reg);
        let log = Arc::clone(&log);
        tasks.push(tokio::spawn(async move {
            let id = Uuid::new_v4();
            reg.join(id, None, None, |p, _| log.lock().unwrap().push((id, p.x)))
                .await
                .unwrap();
            for _ in 0..10 {
                reg.move_by(id, 1.0, 0.0, |p| log.lock().unwrap().push((id, p.x))).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Per participant, announced positions are strictly increasing.
    let log = log.lock().unwrap();
    let mut last: HashMap<Uuid, f64> = HashMap::new();
    for (id, x) in log.iter() {
        if let Some(prev) = last.insert(*id, *x) {
            assert!(*x > prev, "announcement for {id} went backwards");
        }
    }
    assert_eq!(log.len(), 8 * 11);
}

// =============================================================================
// concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_do_not_lose_updates() {
    let reg = Arc::new(SessionRegistry::new(0.0, 0.5));
    let ids: Vec<Uuid> = (0..16).map(|_| Uuid::new_v4()).collect();
    for id in &ids {
        reg.join(*id, None, None, |_, _| {}).await.unwrap();
    }

    let mut tasks = Vec::new();
    for id in ids.clone() {
        let reg = Arc::clone(&reg);
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                reg.move_by(id, 1.0, -1.0, |_| {}).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = reg.snapshot().await;
    assert_eq!(snapshot.len(), ids.len());
    for id in &ids {
        assert!(approx_eq(snapshot[id].x, 50.0));
        assert!(approx_eq(snapshot[id].z, -50.0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_join_and_leave_settle() {
    let reg = Arc::new(registry());
    let mut tasks = Vec::new();
    for i in 0..32 {
        let reg = Arc::clone(&reg);
        tasks.push(tokio::spawn(async move {
            let id = Uuid::new_v4();
            reg.join(id, None, None, |_, _| {}).await.unwrap();
            if i % 2 == 0 {
                assert!(reg.leave(id, |_| {}).await);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(reg.snapshot().await.len(), 16);
}
