//! WebSocket channel over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{Channel, Connector, Incoming};
use crate::core::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError> {
        debug!(endpoint = %endpoint, "Opening WebSocket");
        let (stream, response) =
            connect_async(endpoint)
                .await
                .map_err(|err| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    message: err.to_string(),
                })?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketChannel { stream }))
    }
}

struct WebSocketChannel {
    stream: WsStream,
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Incoming, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(TransportError::Io(err.to_string()))),
            };
            return match message {
                Message::Text(text) => Some(Ok(Incoming::Text(text.as_str().to_owned()))),
                Message::Binary(bytes) => Some(Ok(Incoming::Binary(bytes.to_vec()))),
                // tungstenite answers pings on its own; both directions prove liveness.
                Message::Ping(_) | Message::Pong(_) => Some(Ok(Incoming::Heartbeat)),
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Peer sent close frame");
                    Some(Err(TransportError::Closed))
                }
                Message::Frame(_) => continue,
            };
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "WebSocket close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn exchanges_text_frames_with_a_loopback_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.send(Message::text(r#"{"type":"reply","text":"welcome"}"#))
                .await
                .unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    ws.send(Message::text(format!("echo:{}", text.as_str())))
                        .await
                        .unwrap();
                    break;
                }
            }
            ws.close(None).await.ok();
        });

        let mut channel = WebSocketConnector
            .connect(&format!("ws://{addr}/ws"))
            .await
            .expect("connect");

        let first = channel.recv().await.unwrap().unwrap();
        assert_eq!(
            first,
            Incoming::Text(r#"{"type":"reply","text":"welcome"}"#.to_string())
        );

        channel.send_text("hello".to_string()).await.unwrap();
        let echoed = loop {
            match channel.recv().await {
                Some(Ok(Incoming::Text(text))) => break text,
                Some(Ok(_)) => continue,
                other => panic!("expected echo, got {other:?}"),
            }
        };
        assert_eq!(echoed, "echo:hello");

        server.await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn close_frame_from_peer_is_reported_as_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.close(None).await.ok();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut channel = WebSocketConnector
            .connect(&format!("ws://{addr}/ws"))
            .await
            .expect("connect");

        assert!(matches!(
            channel.recv().await,
            Some(Err(TransportError::Closed))
        ));
        drop(channel);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketConnector.connect(&format!("ws://{addr}/ws")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
