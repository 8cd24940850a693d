//! Lobby lifecycle tests driven through the room API with plain
//! channel-backed members.

use nightfall_server::game::role::Role;
use nightfall_server::protocol::{
    RoomConfig, RoomConfigPatch, RoomStatus, ServerMessage,
};
use nightfall_server::reconnection::ReconnectionManager;
use nightfall_server::room::{Room, RoomError, RoomSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn three_player_config() -> RoomConfig {
    RoomConfig {
        min_players: 3,
        max_players: 3,
        roles: vec![
            Role::Werewolf,
            Role::Seer,
            Role::Villager,
            Role::Villager,
            Role::Robber,
            Role::Tanner,
        ],
        ..RoomConfig::default()
    }
}

fn test_room(config: RoomConfig) -> Arc<Room> {
    let reconnect = ReconnectionManager::new(Duration::from_secs(30), 3, true);
    Room::new("ROOM1".to_string(), config, None, RoomSettings::default(), reconnect)
}

fn channel() -> (
    mpsc::Sender<ServerMessage>,
    mpsc::Receiver<ServerMessage>,
) {
    mpsc::channel(64)
}

#[tokio::test]
async fn first_human_becomes_host() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();

    let snapshot = room
        .add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    assert_eq!(snapshot.host, Some("alice".to_string()));
    assert_eq!(snapshot.status, RoomStatus::Waiting);
    assert_eq!(snapshot.members.len(), 1);
    assert!(snapshot.members[0].is_host);
}

#[tokio::test]
async fn room_enforces_capacity() {
    let room = test_room(three_player_config());
    for name in ["alice", "bob", "carol"] {
        let (tx, _rx) = channel();
        room.add_player(name.to_string(), name.to_string(), tx)
            .await
            .unwrap();
    }
    let (tx, _rx) = channel();
    let err = room
        .add_player("dave".to_string(), "Dave".to_string(), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomFull));
}

#[tokio::test]
async fn duplicate_join_is_rejected() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    let (tx2, _rx2) = channel();
    let err = room
        .add_player("alice".to_string(), "Alice".to_string(), tx2)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom));
}

#[tokio::test]
async fn host_leaving_promotes_oldest_human() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    let (tx, _rx2) = channel();
    room.add_player("bob".to_string(), "Bob".to_string(), tx)
        .await
        .unwrap();
    let (tx, _rx3) = channel();
    room.add_player("carol".to_string(), "Carol".to_string(), tx)
        .await
        .unwrap();

    room.leave(&"alice".to_string()).await.unwrap();
    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.host, Some("bob".to_string()));
    assert_eq!(snapshot.members.len(), 2);
}

#[tokio::test]
async fn only_host_may_add_ai_update_config_or_start() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    let (tx, _rx2) = channel();
    room.add_player("bob".to_string(), "Bob".to_string(), tx)
        .await
        .unwrap();

    let bob = "bob".to_string();
    assert!(matches!(
        room.add_ai(&bob).await.unwrap_err(),
        RoomError::NotHost
    ));
    assert!(matches!(
        room.update_config(&bob, RoomConfigPatch::default())
            .await
            .unwrap_err(),
        RoomError::NotHost
    ));
    assert!(matches!(
        room.start(&bob).await.unwrap_err(),
        RoomError::NotHost
    ));
}

#[tokio::test]
async fn config_patch_revalidates_role_count() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();

    // Growing the table without adjusting the role list must fail.
    let patch = RoomConfigPatch {
        max_players: Some(4),
        ..RoomConfigPatch::default()
    };
    let err = room
        .update_config(&"alice".to_string(), patch)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidConfig(_)));

    // Growing both together is fine.
    let patch = RoomConfigPatch {
        max_players: Some(4),
        roles: Some(vec![
            Role::Werewolf,
            Role::Seer,
            Role::Villager,
            Role::Villager,
            Role::Villager,
            Role::Robber,
            Role::Tanner,
        ]),
        ..RoomConfigPatch::default()
    };
    room.update_config(&"alice".to_string(), patch)
        .await
        .unwrap();
    assert_eq!(room.snapshot().await.config.max_players, 4);
}

#[tokio::test]
async fn start_requires_ready_non_host_humans() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    let (tx, _rx2) = channel();
    room.add_player("bob".to_string(), "Bob".to_string(), tx)
        .await
        .unwrap();
    let (tx, _rx3) = channel();
    room.add_player("carol".to_string(), "Carol".to_string(), tx)
        .await
        .unwrap();

    let alice = "alice".to_string();
    assert!(matches!(
        room.start(&alice).await.unwrap_err(),
        RoomError::NotReady
    ));

    room.set_ready(&"bob".to_string(), true).await.unwrap();
    room.set_ready(&"carol".to_string(), true).await.unwrap();
    room.start(&alice).await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Playing);
}

#[tokio::test]
async fn start_pads_the_table_with_ai_seats() {
    let config = RoomConfig {
        min_players: 3,
        max_players: 5,
        roles: vec![
            Role::Werewolf,
            Role::Werewolf,
            Role::Seer,
            Role::Robber,
            Role::Troublemaker,
            Role::Villager,
            Role::Villager,
            Role::Drunk,
        ],
        ..RoomConfig::default()
    };
    let room = test_room(config);
    for name in ["alice", "bob", "carol"] {
        let (tx, _rx) = channel();
        room.add_player(name.to_string(), name.to_string(), tx)
            .await
            .unwrap();
    }
    room.set_ready(&"bob".to_string(), true).await.unwrap();
    room.set_ready(&"carol".to_string(), true).await.unwrap();
    room.start(&"alice".to_string()).await.unwrap();

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.members.len(), 5);
    assert_eq!(snapshot.members.iter().filter(|m| m.is_ai).count(), 2);
}

#[tokio::test]
async fn lobby_actions_fail_once_playing() {
    let room = test_room(three_player_config());
    for name in ["alice", "bob", "carol"] {
        let (tx, _rx) = channel();
        room.add_player(name.to_string(), name.to_string(), tx)
            .await
            .unwrap();
        // Leak the receiver; broadcasts just queue until dropped.
        std::mem::forget(_rx);
    }
    room.set_ready(&"bob".to_string(), true).await.unwrap();
    room.set_ready(&"carol".to_string(), true).await.unwrap();
    room.start(&"alice".to_string()).await.unwrap();

    assert!(matches!(
        room.set_ready(&"bob".to_string(), false).await.unwrap_err(),
        RoomError::WrongStatus(RoomStatus::Playing)
    ));
    let (tx, _rx) = channel();
    assert!(matches!(
        room.add_player("dave".to_string(), "Dave".to_string(), tx)
            .await
            .unwrap_err(),
        RoomError::WrongStatus(RoomStatus::Playing)
    ));
}

#[tokio::test]
async fn kick_notifies_and_removes_the_target() {
    let room = test_room(three_player_config());
    let (tx, _rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();
    let (tx, mut bob_rx) = channel();
    room.add_player("bob".to_string(), "Bob".to_string(), tx)
        .await
        .unwrap();

    room.kick(&"alice".to_string(), &"bob".to_string())
        .await
        .unwrap();
    assert_eq!(room.snapshot().await.members.len(), 1);

    // Bob's channel saw the roomJoined-era updates and then the close.
    let mut saw_close = false;
    while let Ok(message) = bob_rx.try_recv() {
        if matches!(message, ServerMessage::RoomClosed { .. }) {
            saw_close = true;
        }
    }
    assert!(saw_close);
}

#[tokio::test]
async fn close_resolves_everything_and_goes_terminal() {
    let room = test_room(three_player_config());
    let (tx, mut rx) = channel();
    room.add_player("alice".to_string(), "Alice".to_string(), tx)
        .await
        .unwrap();

    room.close("test teardown").await;
    assert_eq!(room.status().await, RoomStatus::Closed);

    let mut saw_close = false;
    while let Ok(message) = rx.try_recv() {
        if let ServerMessage::RoomClosed { reason, .. } = message {
            assert_eq!(reason, "test teardown");
            saw_close = true;
        }
    }
    assert!(saw_close);
}
