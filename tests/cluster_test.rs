use peerfs::config::Config;
use peerfs::coordinator::registry::Registry;
use peerfs::coordinator::Coordinator;
use peerfs::networking::clients::{CoordinatorClient, PeerClient};
use peerfs::networking::message_dispatcher::MessageDispatcher;
use peerfs::networking::node_info::NodeInfo;
use peerfs::networking::tcp_listener::TcpListenerService;
use peerfs::peer::local_state::LocalEntry;
use peerfs::peer::node::PeerNode;
use peerfs::peer::PeerError;
use peerfs::utils::testing::{create_test_directory, remove_test_file, write_test_file};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const POLL_ATTEMPTS: usize = 200;

async fn start_coordinator() -> (Arc<Coordinator>, String, JoinHandle<()>) {
    let listener = TcpListenerService::bind("127.0.0.1:0", TIMEOUT).await.unwrap();
    let address = listener.local_addr().to_string();
    let coordinator = Arc::new(Coordinator::new(TIMEOUT));
    let handle = Arc::clone(&coordinator).start_listening(listener);
    (coordinator, address, handle)
}

async fn start_peer(
    name: &str,
    directory: &Path,
    coordinator_address: &str,
) -> (Arc<PeerNode>, JoinHandle<()>) {
    let config = Config {
        coordinator_address: coordinator_address.to_string(),
        request_timeout_ms: TIMEOUT.as_millis() as u64,
        fetch_attempts: 2,
        retry_backoff_ms: 20,
        ..Config::default()
    };
    let listener = TcpListenerService::bind("127.0.0.1:0", TIMEOUT).await.unwrap();
    let address = listener.local_addr().to_string();
    let node = Arc::new(PeerNode::new(NodeInfo::new(name, address), directory, &config));
    let handle = Arc::clone(&node).start_listening(listener);
    node.join().await.unwrap();
    (node, handle)
}

fn client(address: &str) -> CoordinatorClient {
    CoordinatorClient::new(Arc::new(MessageDispatcher::new("test", TIMEOUT)), address)
}

async fn holders(coordinator: &Coordinator, file: &str) -> Vec<String> {
    let registry = coordinator.registry();
    let registry = registry.read().await;
    registry
        .file_record(file)
        .map(|record| record.holders().to_vec())
        .unwrap_or_default()
}

fn names(files: &[&str]) -> Vec<String> {
    files.iter().map(|file| file.to_string()).collect()
}

/// Stale refreshes run in the background, so their effects are polled for.
async fn wait_for_holders(coordinator: &Coordinator, file: &str, expected: &[&str]) {
    for _ in 0..POLL_ATTEMPTS {
        if holders(coordinator, file).await == names(expected) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!(
        "holders of {} stayed {:?}, expected {:?}",
        file,
        holders(coordinator, file).await,
        expected
    );
}

async fn wait_for_content(path: &Path, expected: &str) {
    for _ in 0..POLL_ATTEMPTS {
        if fs::read_to_string(path).is_ok_and(|content| content == expected) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("{:?} never held {:?}", path, expected);
}

#[tokio::test]
async fn test_fetch_caches_file_and_registers_replica() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice"]));

    let data = bob.fetch("doc.txt").await.unwrap();

    assert_eq!(data, b"hello");
    assert_eq!(
        fs::read_to_string(bob_dir.path().join("dfs_doc.txt")).unwrap(),
        "hello"
    );
    assert_eq!(
        bob.local_entry("doc.txt").await,
        Some(LocalEntry::Cached {
            origin: alice.info().address.clone(),
            fresh: true
        })
    );
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice", "bob"]));
}

#[tokio::test]
async fn test_second_fetch_is_served_locally() {
    let (_coordinator, address, coordinator_handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (_alice, alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    // Nobody is left to answer an outbound call.
    coordinator_handle.abort();
    alice_server.abort();
    let _ = coordinator_handle.await;
    let _ = alice_server.await;

    assert_eq!(bob.fetch("doc.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_change_refreshes_other_holders_only() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let carol_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    let (carol, _carol_server) = start_peer("carol", carol_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    write_test_file(alice_dir.path(), "doc.txt", "hello, version two");
    let report = alice.sync_once().await.unwrap();

    assert_eq!(report.changed_files, names(&["doc.txt"]));
    wait_for_content(&bob_dir.path().join("dfs_doc.txt"), "hello, version two").await;
    assert_eq!(bob.fetch("doc.txt").await.unwrap(), b"hello, version two");
    assert!(carol.local_entry("doc.txt").await.is_none());
    assert!(!carol_dir.path().join("dfs_doc.txt").exists());
    assert!(matches!(
        alice.local_entry("doc.txt").await,
        Some(LocalEntry::Owned { .. })
    ));
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice", "bob"]));
}

#[tokio::test]
async fn test_failed_refresh_marks_copy_stale_and_deregisters() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (alice, alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    // The origin still reports the change but can no longer serve it.
    alice_server.abort();
    let _ = alice_server.await;
    write_test_file(alice_dir.path(), "doc.txt", "hello, version two");
    alice.sync_once().await.unwrap();

    // Deregistration is the last step of the failed refresh.
    wait_for_holders(&coordinator, "doc.txt", &["alice"]).await;
    assert_eq!(
        bob.local_entry("doc.txt").await,
        Some(LocalEntry::Cached {
            origin: alice.info().address.clone(),
            fresh: false
        })
    );
    assert!(!bob_dir.path().join("dfs_doc.txt").exists());
}

#[tokio::test]
async fn test_hung_holder_does_not_fail_origin_heartbeat() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let carol_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (carol, _carol_server) = start_peer("carol", carol_dir.path(), &address).await;

    // Connections complete in the backlog but are never read nor answered.
    let hung = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hung_address = hung.local_addr().unwrap().to_string();
    let coordinator_client = client(&address);
    coordinator_client
        .register(NodeInfo::new("bob", hung_address), vec![])
        .await
        .unwrap();
    assert!(coordinator_client
        .register_replica("bob", "doc.txt")
        .await
        .unwrap());

    write_test_file(alice_dir.path(), "doc.txt", "hello, version two");
    write_test_file(alice_dir.path(), "new.txt", "new");
    let report = alice.sync_once().await.unwrap();
    assert_eq!(report.changed_files, names(&["doc.txt"]));
    assert_eq!(report.new_files, names(&["new.txt"]));

    carol.fetch("new.txt").await.unwrap();
    assert_eq!(holders(&coordinator, "new.txt").await, names(&["alice", "carol"]));

    write_test_file(alice_dir.path(), "new.txt", "newer");
    let report = alice.sync_once().await.unwrap();
    assert_eq!(report.changed_files, names(&["new.txt"]));

    wait_for_content(&carol_dir.path().join("dfs_new.txt"), "newer").await;
    assert_eq!(holders(&coordinator, "new.txt").await, names(&["alice", "carol"]));
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice", "bob"]));
}

#[tokio::test]
async fn test_heartbeat_from_unregistered_peer_is_rejected() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let (_alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;

    let ok = client(&address)
        .heartbeat(
            "mallory",
            names(&["evil.txt"]),
            names(&["doc.txt"]),
            names(&["doc.txt"]),
        )
        .await
        .unwrap();

    assert!(!ok);
    let registry = coordinator.registry();
    let registry = registry.read().await;
    assert_eq!(registry.list_files(), names(&["doc.txt"]));
    assert!(registry.host("mallory").is_none());
}

#[tokio::test]
async fn test_unknown_file_is_not_found() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let bob_dir = create_test_directory(&[]);
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;

    assert_eq!(
        client(&address)
            .resolve_file_location("ghost.txt")
            .await
            .unwrap(),
        None
    );
    assert!(matches!(
        bob.fetch("ghost.txt").await,
        Err(PeerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_catalog_follows_new_and_deleted_files() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    assert_eq!(alice.catalog().await.unwrap(), names(&["doc.txt"]));

    let before = SystemTime::now();
    write_test_file(alice_dir.path(), "notes.txt", "notes");
    let report = alice.sync_once().await.unwrap();
    assert_eq!(report.new_files, names(&["notes.txt"]));
    assert_eq!(alice.catalog().await.unwrap(), names(&["doc.txt", "notes.txt"]));

    remove_test_file(alice_dir.path(), "doc.txt");
    let report = alice.sync_once().await.unwrap();
    assert_eq!(report.deleted_files, names(&["doc.txt"]));
    assert_eq!(alice.catalog().await.unwrap(), names(&["notes.txt"]));

    let registry = coordinator.registry();
    let registry = registry.read().await;
    assert!(registry.host("alice").unwrap().last_heartbeat >= before);
}

#[tokio::test]
async fn test_unchanged_files_are_never_reported() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello"), ("notes.txt", "notes")]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;

    assert!(alice.sync_once().await.unwrap().is_empty());
    // Rewriting identical bytes does not count as a change.
    write_test_file(alice_dir.path(), "doc.txt", "hello");
    assert!(alice.sync_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_join_discards_leftover_cached_files() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello"), ("dfs_old.txt", "old")]);

    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;

    assert!(!alice_dir.path().join("dfs_old.txt").exists());
    assert_eq!(alice.catalog().await.unwrap(), names(&["doc.txt"]));
    assert!(alice.local_entry("old.txt").await.is_none());
}

#[tokio::test]
async fn test_owned_file_takes_over_cached_copy() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (_alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    write_test_file(bob_dir.path(), "doc.txt", "bob's own");
    let report = bob.sync_once().await.unwrap();

    assert_eq!(report.new_files, names(&["doc.txt"]));
    assert!(!bob_dir.path().join("dfs_doc.txt").exists());
    assert!(matches!(
        bob.local_entry("doc.txt").await,
        Some(LocalEntry::Owned { .. })
    ));
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["bob"]));
    assert_eq!(bob.fetch("doc.txt").await.unwrap(), b"bob's own");
}

#[tokio::test]
async fn test_copy_from_cache_holder_keeps_real_origin() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let carol_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    let (carol, _carol_server) = start_peer("carol", carol_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    // Whichever holder serves carol, the origin stays alice.
    assert_eq!(carol.fetch("doc.txt").await.unwrap(), b"hello");
    assert_eq!(
        carol.local_entry("doc.txt").await,
        Some(LocalEntry::Cached {
            origin: alice.info().address.clone(),
            fresh: true
        })
    );
}

#[tokio::test]
async fn test_peers_register_again_after_coordinator_lost_state() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    *coordinator.registry().write().await = Registry::new();

    alice.sync_once().await.unwrap();
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice"]));
    bob.sync_once().await.unwrap();
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice", "bob"]));

    let hosts = coordinator.registry().read().await.hosts();
    let hosts: Vec<(String, String)> = hosts
        .into_iter()
        .map(|(name, record)| (name, record.address))
        .collect();
    assert_eq!(
        hosts,
        vec![
            ("alice".to_string(), alice.info().address.clone()),
            ("bob".to_string(), bob.info().address.clone()),
        ]
    );
}

#[tokio::test]
async fn test_copy_refused_after_coordinator_lost_state_is_fetched_again() {
    let (coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let bob_dir = create_test_directory(&[]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let (bob, _bob_server) = start_peer("bob", bob_dir.path(), &address).await;
    bob.fetch("doc.txt").await.unwrap();

    *coordinator.registry().write().await = Registry::new();

    // Bob is back before the origin, so doc.txt is still unknown.
    bob.sync_once().await.unwrap();
    assert_eq!(
        bob.local_entry("doc.txt").await,
        Some(LocalEntry::Cached {
            origin: alice.info().address.clone(),
            fresh: false
        })
    );
    assert!(!bob_dir.path().join("dfs_doc.txt").exists());

    write_test_file(alice_dir.path(), "doc.txt", "hello, version two");
    alice.sync_once().await.unwrap();
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice"]));

    assert_eq!(bob.fetch("doc.txt").await.unwrap(), b"hello, version two");
    assert_eq!(holders(&coordinator, "doc.txt").await, names(&["alice", "bob"]));
}

#[tokio::test]
async fn test_refresh_of_uncached_file_is_not_acknowledged() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let peers = PeerClient::new(Arc::new(MessageDispatcher::new("test", TIMEOUT)));

    assert!(!peers
        .stale_refresh(&alice.info().address, "doc.txt")
        .await
        .unwrap());
    assert!(!peers
        .stale_refresh(&alice.info().address, "ghost.txt")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_download_serves_owned_content_with_origin() {
    let (_coordinator, address, _handle) = start_coordinator().await;
    let alice_dir = create_test_directory(&[("doc.txt", "hello")]);
    let (alice, _alice_server) = start_peer("alice", alice_dir.path(), &address).await;
    let peers = PeerClient::new(Arc::new(MessageDispatcher::new("test", TIMEOUT)));

    let content = peers
        .download_file(&alice.info().address, "doc.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.data, b"hello");
    assert_eq!(content.origin, alice.info().address);

    assert!(peers
        .download_file(&alice.info().address, "ghost.txt")
        .await
        .unwrap()
        .is_none());
}
