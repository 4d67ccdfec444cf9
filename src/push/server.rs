//! WebSocket push server
//!
//! Accepts observers on any path of the bind address. Each connection gets
//! a writer task that drains its registry queue into the socket, with a
//! per-message time budget, and a reader task that only watches for the
//! connection ending. Whichever finishes first tears the connection down.

use super::{ObserverId, ObserverRegistry};
use crate::config::PushConfig;
use crate::error::PushError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// How long shutdown waits for the server task
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct PushState {
    registry: ObserverRegistry,
    send_timeout: Duration,
}

/// Running push server handle
pub struct PushHandle {
    addr: SocketAddr,
    registry: ObserverRegistry,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl PushHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close every observer and stop accepting connections
    pub async fn shutdown(mut self) {
        self.registry.clear();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(Ok(())) => tracing::debug!("Push server stopped"),
            Ok(Err(e)) => tracing::warn!("Push server task join error: {}", e),
            Err(_) => {
                tracing::warn!("Push server did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}

/// Bind the configured address and start serving observers
pub async fn start(config: &PushConfig, registry: ObserverRegistry) -> Result<PushHandle, PushError> {
    let bind = config.bind.trim();
    if bind.is_empty() || !bind.contains(':') {
        return Err(PushError::InvalidAddress(config.bind.clone()));
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| PushError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    let addr = listener.local_addr().map_err(|source| PushError::Bind {
        addr: bind.to_string(),
        source,
    })?;

    let state = PushState {
        registry: registry.clone(),
        send_timeout: Duration::from_millis(config.send_timeout_ms.max(1)),
    };

    let app = Router::new().fallback(ws_upgrade).with_state(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        {
            tracing::error!("Push server failed: {}", e);
        }
    });

    tracing::info!("Push server listening on ws://{}", addr);

    Ok(PushHandle {
        addr,
        registry,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

async fn ws_upgrade(State(state): State<PushState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: PushState) {
    let (sender, receiver) = socket.split();
    run_observer(state, sender, receiver).await;
}

/// Serve one observer until either direction ends, then deregister it
async fn run_observer<S, R, E>(state: PushState, sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let (id, queue) = state.registry.register();
    tracing::info!(observer = id, "Observer connected");

    let mut send_task = tokio::spawn(write_queue(id, queue, sender, state.send_timeout));

    // Inbound frames carry no meaning; only the end of the stream matters
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.deregister(id);
    tracing::info!(observer = id, "Observer disconnected");
}

/// Forward queued events to the socket until the queue closes or a send
/// fails or exceeds `send_timeout`
async fn write_queue<S>(
    id: ObserverId,
    mut queue: mpsc::Receiver<Arc<str>>,
    mut sender: S,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(payload) = queue.recv().await {
        match timeout(send_timeout, sender.send(Message::Text(payload.to_string()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(observer = id, "Send failed: {}", e);
                return;
            }
            Err(_) => {
                tracing::warn!(
                    observer = id,
                    "Send exceeded {}ms, dropping observer",
                    send_timeout.as_millis()
                );
                return;
            }
        }
    }

    // Queue closed: evicted or shutting down
    let _ = timeout(send_timeout, sender.send(Message::Close(None))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConversationState, StateEvent};
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// Peer that never accepts another frame
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Peer that accepts everything and remembers it
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Message>>>,
    }

    impl Sink<Message> for RecordingSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Infallible> {
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    fn silent_peer() -> futures::stream::Pending<Result<Message, Infallible>> {
        futures::stream::pending()
    }

    async fn wait_for_len(registry: &ObserverRegistry, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.len() != count {
            assert!(tokio::time::Instant::now() < deadline, "registry never reached {}", count);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_stalled_observer_dropped_after_send_timeout() {
        let registry = ObserverRegistry::new(4);
        let state = PushState {
            registry: registry.clone(),
            send_timeout: Duration::from_millis(50),
        };
        let observer = tokio::spawn(run_observer(state, StalledSink, silent_peer()));
        wait_for_len(&registry, 1).await;

        let started = tokio::time::Instant::now();
        assert_eq!(
            registry.broadcast(&StateEvent::new(ConversationState::Speaking)),
            1
        );

        timeout(Duration::from_secs(2), observer)
            .await
            .expect("stalled observer was never dropped")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_writer_sends_in_order_then_closes() {
        let registry = ObserverRegistry::new(4);
        let state = PushState {
            registry: registry.clone(),
            send_timeout: Duration::from_millis(500),
        };
        let sink = RecordingSink::default();
        let observer = tokio::spawn(run_observer(state, sink.clone(), silent_peer()));
        wait_for_len(&registry, 1).await;

        registry.broadcast(&StateEvent::new(ConversationState::Listening));
        registry.broadcast(&StateEvent::new(ConversationState::Processing));
        registry.clear();

        timeout(Duration::from_secs(2), observer).await.unwrap().unwrap();

        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], Message::Text(t) if t.contains("escuchar")));
        assert!(matches!(&sent[1], Message::Text(t) if t.contains("procesar")));
        assert!(matches!(sent[2], Message::Close(None)));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let config = PushConfig {
            bind: "nonsense".to_string(),
            ..PushConfig::default()
        };
        assert!(matches!(
            start(&config, ObserverRegistry::new(4)).await,
            Err(PushError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = PushConfig {
            bind: taken.local_addr().unwrap().to_string(),
            ..PushConfig::default()
        };
        assert!(matches!(
            start(&config, ObserverRegistry::new(4)).await,
            Err(PushError::Bind { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_and_shutdown() {
        let config = PushConfig {
            bind: "127.0.0.1:0".to_string(),
            ..PushConfig::default()
        };
        let handle = start(&config, ObserverRegistry::new(4)).await.unwrap();
        assert_ne!(handle.addr().port(), 0);
        handle.shutdown().await;
    }
}
