mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ciaas_fleet::common::error::FleetError;
use ciaas_fleet::common::partner::{FleetNode, Node, Partner};
use ciaas_fleet::fleet::connection::{ConnectionState, NodeStatus};
use ciaas_fleet::fleet::credential::CredentialBroker;
use ciaas_fleet::fleet::connection::NodeConnection;
use ciaas_fleet::traits::agent::AgentSession;
use ciaas_fleet::traits::directory::Directory;

use common::{address, harness};

async fn wait_until_idle(connection: &NodeConnection, node: &FleetNode) {
    for _ in 0..100 {
        if connection.state(node.id()) == ConnectionState::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("node {} never went idle", node.id());
}


#[tokio::test]
async fn test_second_connect_fails_and_first_session_survives() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];
    let connection = &h.ctx.connection;

    let session = connection.connect(node).await.unwrap();
    assert_eq!(connection.state(node.id()), ConnectionState::Connected);

    let err = connection.connect(node).await.err().unwrap();
    assert!(matches!(err, FleetError::InvalidState(_)), "got {:?}", err);

    // The rejected attempt must not have rotated the live secret.
    assert_eq!(connection.state(node.id()), ConnectionState::Connected);
    assert_eq!(session.get_version().await.unwrap(), "2.60.3");

    connection.disconnect(node).await.unwrap();
    assert_eq!(connection.state(node.id()), ConnectionState::Idle);
}

#[tokio::test]
async fn test_concurrent_connects_admit_exactly_one() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];

    let (a, b) = tokio::join!(h.ctx.connection.connect(node), h.ctx.connection.connect(node));
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err, FleetError::InvalidState(_)), "got {:?}", err);

    h.ctx.connection.disconnect(node).await.unwrap();
}

#[tokio::test]
async fn test_disconnect_burns_the_issued_secret() {
    let h = harness();
    let (partner, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];

    let session = h.ctx.connection.connect(node).await.unwrap();
    assert!(session.get_version().await.is_ok());
    let hash_in_use = h
        .memory_directory()
        .current_hash(&partner.service_identity())
        .unwrap();

    h.ctx.connection.disconnect(node).await.unwrap();

    let err = session.get_version().await.unwrap_err();
    assert!(matches!(err, FleetError::Unreachable(_)));
    let rotated = h
        .memory_directory()
        .current_hash(&partner.service_identity())
        .unwrap();
    assert_ne!(rotated, hash_in_use);
}

#[tokio::test]
async fn test_disconnect_without_session_is_invalid_state() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 1).await;
    let err = h.ctx.connection.disconnect(&nodes[0]).await.unwrap_err();
    assert!(matches!(err, FleetError::InvalidState(_)));
}

#[tokio::test]
async fn test_status_reports_online_and_releases_node() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];

    assert_eq!(h.ctx.connection.status(node).await.unwrap(), NodeStatus::Online);
    assert_eq!(h.ctx.connection.state(node.id()), ConnectionState::Idle);
}

#[tokio::test]
async fn test_status_offline_when_agent_is_down() {
    let h = harness();
    let (partner, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];
    h.agents.update(&address(&node.node), |n| n.online = false);
    let before = h
        .memory_directory()
        .current_hash(&partner.service_identity())
        .unwrap();

    assert_eq!(h.ctx.connection.status(node).await.unwrap(), NodeStatus::Offline);
    assert_eq!(h.ctx.connection.state(node.id()), ConnectionState::Idle);

    // The secret minted for the failed attempt was burned as well.
    let after = h
        .memory_directory()
        .current_hash(&partner.service_identity())
        .unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn test_connect_without_identity_is_not_found() {
    let h = harness();
    let ghost = FleetNode {
        node: Node::new(99, 98),
        partner: Partner {
            id: 98,
            short_name: "ghost".to_string(),
            name: "Ghost".to_string(),
            active: true,
        },
    };
    let err = h.ctx.connection.connect(&ghost).await.err().unwrap();
    assert!(matches!(err, FleetError::NotFound(_)), "got {:?}", err);
    assert_eq!(h.ctx.connection.state(99), ConnectionState::Idle);
}

#[tokio::test]
async fn test_with_session_disconnects_when_work_fails() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];

    let err = h
        .ctx
        .connection
        .with_session(node, |_session| async {
            Err::<(), _>(FleetError::Unreachable("boom".to_string()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Unreachable(_)));
    assert_eq!(h.ctx.connection.state(node.id()), ConnectionState::Idle);

    // The node can be used again right away.
    let version = h
        .ctx
        .connection
        .with_session(node, |session| async move { session.get_version().await })
        .await
        .unwrap();
    assert_eq!(version, "2.60.3");
}

#[tokio::test]
async fn test_fetch_invalidates_previous_secret() {
    let h = harness();
    let (partner, _) = h.partner("acme", 0).await;
    let identity = partner.service_identity();

    let first = h.ctx.broker.fetch(&identity).await.unwrap();
    assert!(h.memory_directory().authenticate(&first.username, &first.secret));
    let second = h.ctx.broker.fetch(&identity).await.unwrap();
    assert!(!h.memory_directory().authenticate(&first.username, &first.secret));
    assert!(h.memory_directory().authenticate(&second.username, &second.secret));
    assert!(CredentialBroker::verify(&second.secret, &second.hash));

    let err = h.ctx.broker.invalidate(&identity, &first.hash).await.unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)), "got {:?}", err);
    let entry = h.directory.lookup(&identity).await.unwrap();
    assert_eq!(entry.secret_hash, second.hash);
}

#[tokio::test]
async fn test_dropped_session_frees_node_and_burns_secret() {
    let h = harness();
    let (partner, nodes) = h.partner("acme", 1).await;
    let node = &nodes[0];
    let leaked: Arc<Mutex<Option<Arc<dyn AgentSession>>>> = Arc::new(Mutex::new(None));

    let slot = leaked.clone();
    let cut_short = tokio::time::timeout(
        Duration::from_millis(20),
        h.ctx.connection.with_session(node, |session| {
            *slot.lock().unwrap() = Some(session);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }),
    )
    .await;
    assert!(cut_short.is_err());
    let hash_in_use = h
        .memory_directory()
        .current_hash(&partner.service_identity())
        .unwrap();

    wait_until_idle(&h.ctx.connection, node).await;

    let session = leaked.lock().unwrap().take().unwrap();
    assert!(session.get_version().await.is_err());
    assert_ne!(
        h.memory_directory().current_hash(&partner.service_identity()).unwrap(),
        hash_in_use
    );
    assert_eq!(h.ctx.connection.status(node).await.unwrap(), NodeStatus::Online);
    assert_eq!(h.ctx.fleet.get_online_nodes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_dropped_while_waiting_for_sibling_frees_node() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 2).await;
    let connection = &h.ctx.connection;
    connection.connect(&nodes[0]).await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(20), connection.status(&nodes[1])).await;
    assert!(waited.is_err());
    wait_until_idle(connection, &nodes[1]).await;

    connection.disconnect(&nodes[0]).await.unwrap();
    assert_eq!(connection.status(&nodes[1]).await.unwrap(), NodeStatus::Online);
}

#[tokio::test]
async fn test_sibling_sessions_do_not_rotate_each_other() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 2).await;
    let connection = &h.ctx.connection;

    let first = connection.connect(&nodes[0]).await.unwrap();
    let second = async { connection.connect(&nodes[1]).await };
    let finish_first = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The sibling waits its turn instead of rotating the live secret.
        assert_eq!(connection.state(nodes[1].id()), ConnectionState::Connecting);
        assert_eq!(first.get_version().await.unwrap(), "2.60.3");
        connection.disconnect(&nodes[0]).await
    };
    let (second, released) = tokio::join!(second, finish_first);

    released.unwrap();
    let second = second.unwrap();
    assert_eq!(second.get_version().await.unwrap(), "2.60.3");
    connection.disconnect(&nodes[1]).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_sibling_work_all_succeeds() {
    let h = harness();
    let (_, nodes) = h.partner("acme", 3).await;
    let connection = &h.ctx.connection;

    let work = |node: &'static str| {
        move |session: Arc<dyn AgentSession>| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let version = session.get_version().await?;
            Ok::<_, FleetError>(format!("{} {}", node, version))
        }
    };
    let (a, b, c) = tokio::join!(
        connection.with_session(&nodes[0], work("a")),
        connection.with_session(&nodes[1], work("b")),
        connection.with_session(&nodes[2], work("c")),
    );

    assert_eq!(a.unwrap(), "a 2.60.3");
    assert_eq!(b.unwrap(), "b 2.60.3");
    assert_eq!(c.unwrap(), "c 2.60.3");
    for node in &nodes {
        assert_eq!(connection.state(node.id()), ConnectionState::Idle);
    }
}
