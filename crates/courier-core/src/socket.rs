use log::warn;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

use crate::receiver::ReceiverInner;
use crate::server::{MessageSocket, SocketEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
pub(crate) struct CloseCommand {
    pub code: u16,
    pub reason: String,
    pub done: Option<tokio::sync::oneshot::Sender<()>>,
}

// Owns the socket for its lifetime: pumps framed requests into the
// receiver, keeps the connection alive, reports closure exactly once.
pub(crate) fn run_socket(
    inner: Arc<ReceiverInner>,
    socket: Box<dyn MessageSocket>,
    control: mpsc::UnboundedReceiver<CloseCommand>,
    generation: u64,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(run_socket_inner(inner, socket, control, generation))
}

async fn run_socket_inner(
    inner: Arc<ReceiverInner>,
    socket: Box<dyn MessageSocket>,
    mut control: mpsc::UnboundedReceiver<CloseCommand>,
    generation: u64,
) {
    let period = Duration::from_millis(inner.config.keepalive_interval_ms);
    let keepalive_timeout = Duration::from_millis(inner.config.keepalive_timeout_ms);
    let mut keepalive = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            command = control.recv() => {
                match command {
                    Some(command) => {
                        socket.close(command.code, &command.reason).await;
                        inner.on_close(generation, command.code, &command.reason).await;
                        if let Some(done) = command.done {
                            let _ = done.send(());
                        }
                    }
                    None => {
                        socket.close(1000, "receiver dropped").await;
                        inner.on_close(generation, 1000, "receiver dropped").await;
                    }
                }
                return;
            }
            event = socket.recv() => {
                match event {
                    Some(SocketEvent::Request(request)) => inner.handle_request(request),
                    Some(SocketEvent::Closed { code, reason }) => {
                        inner.on_close(generation, code, &reason).await;
                        return;
                    }
                    None => {
                        inner.on_close(generation, 1006, "socket ended").await;
                        return;
                    }
                }
            }
            _ = keepalive.tick() => {
                let sent = tokio::time::timeout(
                    keepalive_timeout,
                    socket.send_request("GET", &inner.config.keepalive_path, None),
                ).await;
                match sent {
                    Ok(Ok(_)) => {}
                    _ => {
                        warn!("no response to keepalive request, closing socket");
                        socket.close(1000, "No response to keepalive request").await;
                        inner.on_close(generation, 1006, "keepalive timeout").await;
                        return;
                    }
                }
            }
        }
    }
}
