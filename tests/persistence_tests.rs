//! Save / unload / load cycles through the on-disk ticket file.

mod common;

use common::{Cart, OVERWORLD, PlayerWatcher, Recorder, TestHost, forced_of};
use regionforce::storage::{FORCED_REGIONS_FILE, codec, has_persisted_tickets};
use regionforce::{
    BroadcastEventSink, ForceManager, LoadingCallback, QuotaConfig, RegionCoord, SpaceId, TicketId, TicketKind,
    TrackedEntity,
};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

fn manager_with(config: QuotaConfig, callback: Arc<dyn LoadingCallback>) -> ForceManager {
    let mut manager = ForceManager::new(config);
    manager.set_loading_callback("alpha", callback).unwrap();
    manager
}

#[test]
fn test_forced_regions_survive_reload() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.force_region(ticket, RegionCoord::new(1, 2)).unwrap();
    m.force_region(ticket, RegionCoord::new(3, 4)).unwrap();
    m.ticket_payload_mut(ticket)
        .unwrap()
        .insert("label".into(), serde_json::json!("quarry"));
    m.save_space(OVERWORLD, &host).unwrap();
    assert!(temp_dir.path().join(FORCED_REGIONS_FILE).exists());
    assert!(has_persisted_tickets(temp_dir.path()));
    m.unload_space(OVERWORLD);

    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new(), recorder.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 1);

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(recorder.calls()[0].0, OVERWORLD);
    let restored = m.ticket(delivered[0]).unwrap();
    assert_eq!(restored.forced_regions(), vec![RegionCoord::new(1, 2), RegionCoord::new(3, 4)]);
    assert_eq!(restored.payload().unwrap()["label"], serde_json::json!("quarry"));
    assert_eq!(m.current_count("alpha", OVERWORLD), 1);

    let forced = m.persistent_regions_for(OVERWORLD).unwrap();
    assert_eq!(forced.region_count(), 2);
    assert!(forced.contains(&RegionCoord::new(3, 4)));
}

#[test]
fn test_snapshot_encodes_losslessly() {
    let mut host = TestHost::transient();
    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);

    let normal = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.force_region(normal, RegionCoord::new(-1, -1)).unwrap();
    let cart = m.request_ticket("alpha", OVERWORLD, TicketKind::Entity).unwrap();
    m.bind_entity(cart, Cart::new(Uuid::new_v4(), RegionCoord::new(8, 8))).unwrap();
    m.force_region(cart, RegionCoord::new(8, 8)).unwrap();
    let player = m
        .request_player_ticket("alpha", "Steve", OVERWORLD, TicketKind::Normal)
        .unwrap();
    m.force_region(player, RegionCoord::new(5, 5)).unwrap();

    let snapshot = m.snapshot_space(OVERWORLD).unwrap();
    assert_eq!(snapshot.ticket_count(), 3);
    assert_eq!(codec::decode(&codec::encode(&snapshot).unwrap()).unwrap(), snapshot);
}

#[test]
fn test_unbound_or_transient_entities_are_not_saved() {
    let mut host = TestHost::transient();
    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);

    m.request_ticket("alpha", OVERWORLD, TicketKind::Entity).unwrap();
    let ghost = m.request_ticket("alpha", OVERWORLD, TicketKind::Entity).unwrap();
    m.bind_entity(
        ghost,
        Arc::new(Cart {
            id: Uuid::new_v4(),
            region: RegionCoord::new(0, 0),
            persistable: false,
        }),
    )
    .unwrap();

    assert!(m.snapshot_space(OVERWORLD).unwrap().is_empty());
}

#[test]
fn test_steve_player_ticket_survives_reload() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m
        .request_player_ticket("alpha", "Steve", OVERWORLD, TicketKind::Normal)
        .unwrap();
    m.force_region(ticket, RegionCoord::new(5, 5)).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let watcher = PlayerWatcher::new();
    let mut m = manager_with(QuotaConfig::new(), watcher.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 1);

    let offered = watcher.offered.lock().unwrap().clone();
    assert_eq!(offered.len(), 1);
    assert_eq!(offered["Steve"], vec![vec![RegionCoord::new(5, 5)]]);

    let delivered = watcher.recorder.delivered();
    assert_eq!(delivered.len(), 1);
    let restored = m.ticket(delivered[0]).unwrap();
    assert_eq!(restored.player(), Some("Steve"));
    assert_eq!(restored.owner().as_str(), "alpha");
    assert_eq!(m.available_player_tickets("Steve"), 499);
    assert_eq!(m.current_count("alpha", OVERWORLD), 0);
    assert!(m.persistent_regions_for(OVERWORLD).unwrap().contains(&RegionCoord::new(5, 5)));
}

#[test]
fn test_entity_ticket_rebinds_on_reload() {
    let temp_dir = TempDir::new().unwrap();
    let cart_id = Uuid::new_v4();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Entity).unwrap();
    m.bind_entity(ticket, Cart::new(cart_id, RegionCoord::new(3, 4))).unwrap();
    m.force_region(ticket, RegionCoord::new(3, 4)).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let mut host = TestHost::persistent(temp_dir.path()).with_entity(Cart::new(cart_id, RegionCoord::new(3, 4)));
    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new(), recorder.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 1);
    assert_eq!(host.loaded_regions, vec![RegionCoord::new(3, 4)]);

    let restored = m.ticket(recorder.delivered()[0]).unwrap();
    assert_eq!(restored.entity().unwrap().persistent_id(), cart_id);
    assert!(restored.can_force());
    assert!(m.persistent_regions_for(OVERWORLD).unwrap().contains(&RegionCoord::new(3, 4)));
}

#[test]
fn test_missing_entity_drops_ticket() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Entity).unwrap();
    m.bind_entity(ticket, Cart::new(Uuid::new_v4(), RegionCoord::new(3, 4))).unwrap();
    m.force_region(ticket, RegionCoord::new(3, 4)).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    // A different cart sits in the region now.
    let mut host =
        TestHost::persistent(temp_dir.path()).with_entity(Cart::new(Uuid::new_v4(), RegionCoord::new(3, 4)));
    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new(), recorder.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 0);

    // The owner is still told, with nothing.
    assert_eq!(recorder.calls(), vec![(OVERWORLD, Vec::<TicketId>::new())]);
    assert!(m.persistent_regions_for(OVERWORLD).unwrap().is_empty());
}

#[test]
fn test_inactive_owner_and_missing_callback_lose_tickets() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.set_loading_callback("beta", Recorder::new()).unwrap();
    m.load_space(OVERWORLD, &mut host);
    let a = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.force_region(a, RegionCoord::new(0, 0)).unwrap();
    let b = m.request_ticket("beta", OVERWORLD, TicketKind::Normal).unwrap();
    m.force_region(b, RegionCoord::new(1, 1)).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    // alpha is gone from the host, beta never registers a callback.
    host.inactive.insert("alpha".to_string());
    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new(), recorder.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 0);
    assert!(recorder.calls().is_empty());
    assert!(m.persistent_regions_for(OVERWORLD).unwrap().is_empty());
}

#[test]
fn test_reload_clamps_depth_to_current_quota() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new().max_regions_per_ticket(4), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    for x in 0..4 {
        m.force_region(ticket, RegionCoord::new(x, 0)).unwrap();
    }
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new().max_regions_per_ticket(2), recorder.clone());
    m.load_space(OVERWORLD, &mut host);

    let delivered = recorder.delivered();
    assert_eq!(m.ticket(delivered[0]).unwrap().depth(), 2);
    assert_eq!(
        forced_of(&m, &delivered),
        vec![vec![RegionCoord::new(2, 0), RegionCoord::new(3, 0)]]
    );
    assert_eq!(m.persistent_regions_for(OVERWORLD).unwrap().region_count(), 2);
}

#[test]
fn test_depth_above_byte_range_survives_reload() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());
    let config = QuotaConfig::new().max_regions_per_ticket(300);

    let mut m = manager_with(config.clone(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    for x in 0..300 {
        m.force_region(ticket, RegionCoord::new(x, 0)).unwrap();
    }
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let recorder = Recorder::new();
    let mut m = manager_with(config, recorder.clone());
    m.load_space(OVERWORLD, &mut host);

    let restored = m.ticket(recorder.delivered()[0]).unwrap();
    assert_eq!((restored.depth(), restored.forced_count()), (300, 300));
    assert_eq!(restored.forced_regions()[0], RegionCoord::new(0, 0));
    assert_eq!(m.persistent_regions_for(OVERWORLD).unwrap().region_count(), 300);

    // A smaller quota still clamps a saturated depth.
    m.shutdown();
    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new().max_regions_per_ticket(10), recorder.clone());
    m.load_space(OVERWORLD, &mut host);
    let restored = m.ticket(recorder.delivered()[0]).unwrap();
    assert_eq!((restored.depth(), restored.forced_count()), (10, 10));
    assert_eq!(restored.forced_regions()[0], RegionCoord::new(290, 0));
}

#[test]
fn test_reload_emits_no_events() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.force_region(ticket, RegionCoord::new(0, 0)).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let sink = Arc::new(BroadcastEventSink::new(8));
    let mut events = sink.subscribe();
    let mut m = manager_with(QuotaConfig::new(), Recorder::new()).with_event_sink(sink.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 1);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_corrupt_file_loads_empty_and_is_kept_aside() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(FORCED_REGIONS_FILE), b"not a ticket file").unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let recorder = Recorder::new();
    let mut m = manager_with(QuotaConfig::new(), recorder.clone());
    assert_eq!(m.load_space(OVERWORLD, &mut host), 0);
    assert!(m.is_space_loaded(OVERWORLD));
    assert!(recorder.calls().is_empty());
    assert!(temp_dir.path().join(format!("{}.corrupt", FORCED_REGIONS_FILE)).exists());

    // The space is usable and the next save replaces the bad file.
    m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.save_space(OVERWORLD, &host).unwrap();
    assert!(has_persisted_tickets(temp_dir.path()));
}

#[test]
fn test_transient_space_is_never_written() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::transient();

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(SpaceId(3), &mut host);
    m.request_ticket("alpha", SpaceId(3), TicketKind::Normal).unwrap();
    m.save_space(SpaceId(3), &host).unwrap();
    assert!(!has_persisted_tickets(temp_dir.path()));
    assert!(m.save_space(SpaceId(4), &host).is_err());
}

struct HomeForcer;

impl LoadingCallback for HomeForcer {
    fn tickets_loaded(&self, tickets: &[TicketId], _space: SpaceId, manager: &mut ForceManager) {
        for id in tickets {
            let home = manager
                .ticket(*id)
                .and_then(|t| t.payload())
                .and_then(|p| p.get("home"))
                .and_then(|v| serde_json::from_value::<(i32, i32)>(v.clone()).ok());
            if let Some((x, z)) = home {
                manager.force_region(*id, RegionCoord::new(x, z)).unwrap();
            }
        }
    }
}

#[test]
fn test_callback_can_force_from_payload() {
    let temp_dir = TempDir::new().unwrap();
    let mut host = TestHost::persistent(temp_dir.path());

    let mut m = manager_with(QuotaConfig::new(), Recorder::new());
    m.load_space(OVERWORLD, &mut host);
    let ticket = m.request_ticket("alpha", OVERWORLD, TicketKind::Normal).unwrap();
    m.ticket_payload_mut(ticket)
        .unwrap()
        .insert("home".into(), serde_json::json!([10, -3]));
    m.save_space(OVERWORLD, &host).unwrap();
    m.shutdown();

    let sink = Arc::new(BroadcastEventSink::new(8));
    let mut events = sink.subscribe();
    let mut m = manager_with(QuotaConfig::new(), Arc::new(HomeForcer)).with_event_sink(sink.clone());
    m.load_space(OVERWORLD, &mut host);

    assert!(m.persistent_regions_for(OVERWORLD).unwrap().contains(&RegionCoord::new(10, -3)));
    assert_eq!(events.try_recv().unwrap().region, RegionCoord::new(10, -3));
}
