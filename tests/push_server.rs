//! Push server tests over real WebSocket connections

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use voxloop::config::PushConfig;
use voxloop::push::server;
use voxloop::push::{ObserverRegistry, PushNotifier, StateNotifier};
use voxloop::state::{ConversationState, StateEvent};

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn local_config() -> PushConfig {
    PushConfig {
        bind: "127.0.0.1:0".to_string(),
        ..PushConfig::default()
    }
}

async fn wait_for_observers(registry: &ObserverRegistry, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.len() != count {
        assert!(
            Instant::now() < deadline,
            "expected {} observers, have {}",
            count,
            registry.len()
        );
        sleep(Duration::from_millis(10)).await;
    }
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broadcast_reaches_every_observer() {
    let registry = ObserverRegistry::new(8);
    let handle = server::start(&local_config(), registry.clone())
        .await
        .unwrap();
    let url = format!("ws://{}", handle.addr());

    let mut clients = Vec::new();
    for _ in 0..3 {
        let (client, _) = connect_async(url.as_str()).await.unwrap();
        clients.push(client);
    }
    wait_for_observers(&registry, 3).await;

    assert_eq!(
        registry.broadcast(&StateEvent::new(ConversationState::Speaking)),
        3
    );

    for client in clients.iter_mut() {
        let text = next_text(client).await;
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({"estado": "hablar"}));
    }

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_states_arrive_in_order() {
    let registry = ObserverRegistry::new(8);
    let handle = server::start(&local_config(), registry.clone())
        .await
        .unwrap();

    let (mut client, _) = connect_async(format!("ws://{}/estado", handle.addr()))
        .await
        .unwrap();
    wait_for_observers(&registry, 1).await;

    let notifier = PushNotifier::new(registry.clone(), false);
    for state in [
        ConversationState::Listening,
        ConversationState::Idle,
        ConversationState::Processing,
        ConversationState::Speaking,
    ] {
        notifier.notify(state);
    }

    // Idle is filtered when include_idle is off
    assert!(next_text(&mut client).await.contains("escuchar"));
    assert!(next_text(&mut client).await.contains("procesar"));
    assert!(next_text(&mut client).await.contains("hablar"));

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnected_observer_is_removed() {
    let registry = ObserverRegistry::new(8);
    let handle = server::start(&local_config(), registry.clone())
        .await
        .unwrap();
    let url = format!("ws://{}", handle.addr());

    let (mut staying, _) = connect_async(url.as_str()).await.unwrap();
    let (mut leaving, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_observers(&registry, 2).await;

    leaving.close(None).await.unwrap();
    drop(leaving);
    wait_for_observers(&registry, 1).await;

    assert_eq!(
        registry.broadcast(&StateEvent::new(ConversationState::Listening)),
        1
    );
    assert!(next_text(&mut staying).await.contains("escuchar"));

    // Inbound chatter from an observer is ignored
    staying
        .send(Message::Text("hola".to_string()))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.len(), 1);

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_observers() {
    let registry = ObserverRegistry::new(8);
    let handle = server::start(&local_config(), registry.clone())
        .await
        .unwrap();

    let (mut client, _) = connect_async(format!("ws://{}", handle.addr()))
        .await
        .unwrap();
    wait_for_observers(&registry, 1).await;

    handle.shutdown().await;
    assert!(registry.is_empty());

    // The socket ends with a close frame or an end of stream
    let ended = timeout(Duration::from_secs(5), async {
        while let Some(msg) = client.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await
    .unwrap_or(false);
    assert!(ended);
}
