//! Integration tests for the synchronization coordinator.

use humidor_sync::{
    CollectionDescriptor, CollectionStatus, Document, DocumentId, Identity, MemoryTransport,
    Phase, SyncConfig, SyncCoordinator, SyncError, TransportOp,
};
use serde_json::json;
use std::thread;
use std::time::Duration;

const U1_HUMIDORS: &str = "users/u1/humidors";
const U1_CIGARS: &str = "users/u1/cigars";
const U1_JOURNAL: &str = "users/u1/journalEntries";
const U2_CIGARS: &str = "users/u2/cigars";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Transport that only delivers when told to.
fn quiet_transport() -> MemoryTransport {
    MemoryTransport::new().with_initial_delivery(false)
}

fn coordinator(transport: &MemoryTransport) -> SyncCoordinator<MemoryTransport> {
    init_tracing();
    SyncCoordinator::new(transport.clone(), SyncConfig::default()).unwrap()
}

fn ids(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.id.0.as_str()).collect()
}

// --- Scenarios ---

#[test]
fn test_primary_snapshot_ends_loading() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    transport.set_documents(
        U1_CIGARS,
        vec![Document::new("c1").with_field("name", "Test Cigar")],
    );
    assert_eq!(coord.process_pending(), 1);

    let view = coord.view();
    assert!(!view.loading);
    assert_eq!(ids(&view.cigars), vec!["c1"]);
    assert_eq!(view.cigars[0].field("name"), Some(&json!("Test Cigar")));
    assert!(view.humidors.is_empty());
    assert!(view.journal_entries.is_empty());
    assert!(view.error.is_none());
}

#[test]
fn test_secondary_error_keeps_loading() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    transport.fail(U1_HUMIDORS, "permission-denied");
    coord.process_pending();

    let view = coord.view();
    assert!(view.loading);
    assert_eq!(
        view.error,
        Some(SyncError::Stream {
            descriptor: CollectionDescriptor::Humidors,
            cause: "permission-denied".into(),
        })
    );
    assert_eq!(
        view.status(CollectionDescriptor::Humidors),
        CollectionStatus::Failed {
            cause: "permission-denied".into()
        }
    );
}

#[test]
fn test_switch_discards_previous_identity_delivery() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    // A delivery for u1 is already queued when the identity changes.
    let u1_sink = transport.sinks(U1_CIGARS).remove(0);
    assert!(u1_sink.snapshot(vec![Document::new("u1-cigar")]));

    coord.set_identity(Some(Identity::new("u2")));

    // And another one arrives after the switch.
    assert!(!u1_sink.snapshot(vec![Document::new("u1-late")]));

    assert_eq!(coord.process_pending(), 0);
    assert!(coord.store(CollectionDescriptor::Cigars).is_empty());
    assert!(coord.is_loading());

    transport.set_documents(U2_CIGARS, vec![Document::new("u2-cigar")]);
    coord.process_pending();

    assert_eq!(ids(&coord.view().cigars), vec!["u2-cigar"]);
    assert!(!coord.is_loading());
}

#[test]
fn test_logout_resets_everything() {
    let transport = MemoryTransport::new();
    transport.set_documents(U1_HUMIDORS, vec![Document::new("h1")]);
    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);
    transport.set_documents(U1_JOURNAL, vec![Document::new("j1")]);

    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));
    assert_eq!(coord.process_pending(), 3);
    assert!(!coord.is_loading());

    coord.set_identity(None);

    let view = coord.view();
    assert_eq!(coord.phase(), Phase::Idle);
    assert!(view.loading);
    assert!(view.error.is_none());
    for d in CollectionDescriptor::ALL {
        assert!(view.collection(d).is_empty());
    }
    assert_eq!(transport.active_listeners(), 0);
}

// --- Lifecycle ---

#[test]
fn test_cancel_before_open_on_switch() {
    let transport = MemoryTransport::new();
    let mut coord = coordinator(&transport);

    coord.set_identity(Some(Identity::new("u1")));
    coord.set_identity(Some(Identity::new("u2")));

    let log = transport.op_log();
    let first_u2 = log
        .iter()
        .position(|op| matches!(op, TransportOp::Subscribed { path } if path.starts_with("users/u2/")))
        .unwrap();
    let u1_cancels: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, TransportOp::Cancelled { path } if path.starts_with("users/u1/")))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(u1_cancels.len(), 3);
    assert!(u1_cancels.iter().all(|&i| i < first_u2));
    assert_eq!(transport.active_listeners(), 3);
}

#[test]
fn test_epoch_increments_per_transition() {
    let transport = MemoryTransport::new();
    let mut coord = coordinator(&transport);

    let e1 = coord.set_identity(Some(Identity::new("u1")));
    let e2 = coord.set_identity(None);
    let e3 = coord.set_identity(Some(Identity::new("u1")));

    assert!(e1 < e2 && e2 < e3);
}

#[test]
fn test_initial_delivery_with_existing_data() {
    let transport = MemoryTransport::new();
    transport.set_documents(
        U1_CIGARS,
        vec![Document::new("c2"), Document::new("c1"), Document::new("c3")],
    );

    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));
    coord.process_pending();

    // Snapshot order, not sorted.
    assert_eq!(ids(&coord.view().cigars), vec!["c2", "c1", "c3"]);
    assert!(!coord.is_loading());
    assert_eq!(
        coord.view().status(CollectionDescriptor::Humidors),
        CollectionStatus::Live { snapshots: 1 }
    );
}

#[test]
fn test_subsequent_snapshots_replace() {
    let transport = MemoryTransport::new();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));
    coord.process_pending();

    transport.put_document(U1_JOURNAL, Document::new("j1").with_field("rating", 90));
    transport.put_document(U1_JOURNAL, Document::new("j2").with_field("rating", 85));
    transport.remove_document(U1_JOURNAL, &DocumentId::from("j1"));
    // Three undrained writes coalesce into one applied snapshot.
    assert_eq!(coord.process_pending(), 1);

    let journal = coord.store(CollectionDescriptor::JournalEntries).read();
    assert_eq!(ids(&journal), vec!["j2"]);
    assert_eq!(
        coord.view().status(CollectionDescriptor::JournalEntries),
        CollectionStatus::Live { snapshots: 2 }
    );
}

#[test]
fn test_loading_never_reverts_within_epoch() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);
    coord.process_pending();
    assert!(!coord.is_loading());

    transport.set_documents(U1_CIGARS, Vec::new());
    transport.fail(U1_CIGARS, "unavailable");
    transport.set_documents(U1_HUMIDORS, vec![Document::new("h1")]);
    coord.process_pending();

    assert!(!coord.is_loading());
}

#[test]
fn test_primary_never_reporting_keeps_loading() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    transport.set_documents(U1_HUMIDORS, vec![Document::new("h1")]);
    transport.set_documents(U1_JOURNAL, vec![Document::new("j1")]);
    coord.process_pending();

    assert!(coord.is_loading());
    assert_eq!(coord.view().humidors.len(), 1);
}

#[test]
fn test_custom_primary() {
    let transport = quiet_transport();
    let config = SyncConfig {
        primary: CollectionDescriptor::Humidors,
        ..Default::default()
    };
    let mut coord = SyncCoordinator::new(transport.clone(), config).unwrap();
    coord.set_identity(Some(Identity::new("u1")));

    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);
    coord.process_pending();
    assert!(coord.is_loading());

    transport.set_documents(U1_HUMIDORS, Vec::new());
    coord.process_pending();
    assert!(!coord.is_loading());
}

// --- Consumers ---

#[test]
fn test_watcher_sees_each_transition() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    let watcher = coord.watch();

    let initial = watcher.try_recv().unwrap();
    assert!(initial.identity.is_none());

    coord.set_identity(Some(Identity::new("u1")));
    let opened = watcher.try_recv().unwrap();
    assert_eq!(opened.identity, Some(Identity::new("u1")));
    assert!(opened.loading);

    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);
    coord.process_pending();
    let loaded = watcher.try_recv().unwrap();
    assert!(!loaded.loading);
    assert_eq!(loaded.cigars.len(), 1);

    assert!(watcher.try_recv().is_err());
}

#[test]
fn test_view_outlives_later_snapshots() {
    let transport = MemoryTransport::new();
    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));
    coord.process_pending();

    let before = coord.view();
    transport.set_documents(U1_CIGARS, vec![Document::new("c1"), Document::new("c2")]);
    coord.process_pending();

    assert_eq!(before.cigars.len(), 1);
    assert_eq!(coord.view().cigars.len(), 2);
}

#[test]
fn test_delivery_from_another_thread() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    let remote = transport.clone();
    let writer = thread::spawn(move || {
        for i in 0..5 {
            remote.put_document(U1_CIGARS, Document::new(format!("c{}", i)));
        }
    });
    writer.join().unwrap();

    let mut applied = 0;
    while coord.process_next(Duration::from_millis(100)) {
        applied += 1;
    }

    assert!(applied >= 1);
    assert_eq!(coord.view().cigars.len(), 5);
    assert!(!coord.is_loading());
}

#[test]
fn test_process_next_times_out() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    assert!(!coord.process_next(Duration::from_millis(20)));
}

// --- Backlog ---

#[test]
fn test_store_converges_to_latest_remote_state() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    for n in 1..=3 {
        transport.set_documents(
            U1_CIGARS,
            (0..n).map(|i| Document::new(format!("c{}", i))).collect(),
        );
    }
    coord.process_pending();

    assert_eq!(coord.view().cigars.len(), 3);
    assert_eq!(&*coord.view().cigars, transport.documents(U1_CIGARS).as_slice());
}

#[test]
fn test_long_backlog_keeps_latest_snapshot() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    for i in 0..2000 {
        transport.put_document(U1_HUMIDORS, Document::new(format!("h{}", i)));
    }
    transport.set_documents(U1_CIGARS, vec![Document::new("c1")]);

    assert_eq!(coord.process_pending(), 2);
    assert_eq!(coord.view().humidors.len(), 2000);
    assert!(!coord.is_loading());
}

#[test]
fn test_switch_with_undrained_previous_epoch() {
    let transport = MemoryTransport::new();
    transport.set_documents(U1_CIGARS, vec![Document::new("u1-cigar")]);
    transport.set_documents(U2_CIGARS, vec![Document::new("u2-cigar")]);

    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));
    for i in 0..2000 {
        transport.put_document(U1_JOURNAL, Document::new(format!("j{}", i)));
    }

    // u1's deliveries are never drained before the switch.
    coord.set_identity(Some(Identity::new("u2")));
    coord.process_pending();
    coord.process_pending();

    let view = coord.view();
    assert!(!view.loading);
    assert_eq!(ids(&view.cigars), vec!["u2-cigar"]);
    assert!(view.journal_entries.is_empty());
}

#[test]
fn test_pending_error_survives_later_snapshots() {
    let transport = quiet_transport();
    let mut coord = coordinator(&transport);
    coord.set_identity(Some(Identity::new("u1")));

    transport.fail(U1_CIGARS, "unavailable");
    for i in 0..10 {
        transport.put_document(U1_CIGARS, Document::new(format!("c{}", i)));
    }
    coord.process_pending();

    let view = coord.view();
    assert!(!view.loading);
    assert_eq!(view.cigars.len(), 10);
    assert_eq!(
        view.error,
        Some(SyncError::Stream {
            descriptor: CollectionDescriptor::Cigars,
            cause: "unavailable".into(),
        })
    );
    // The snapshot arrived after the failure, so the stream reads as live.
    assert_eq!(
        view.status(CollectionDescriptor::Cigars),
        CollectionStatus::Live { snapshots: 1 }
    );
}
