//! WebSocket [`Socket`] over `tokio-tungstenite`.
//!
//! The stream is split into a writer task fed by an unbounded channel and a
//! reader task that forwards frames as [`WireEvent`]s. Sends never block the
//! event loop; the ready state is shared with both tasks through an atomic so
//! the transport can check it synchronously.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::{BinaryType, ReadyState, Socket};
use crate::error::{FeedError, Result};

/// Inbound traffic handed to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed or the connection failed. Always the last event.
    Closed,
}

fn encode_state(state: ReadyState) -> u8 {
    match state {
        ReadyState::Connecting => 0,
        ReadyState::Open => 1,
        ReadyState::Closing => 2,
        ReadyState::Closed => 3,
    }
}

fn decode_state(raw: u8) -> ReadyState {
    match raw {
        0 => ReadyState::Connecting,
        1 => ReadyState::Open,
        2 => ReadyState::Closing,
        _ => ReadyState::Closed,
    }
}

pub struct WsSocket {
    outgoing: mpsc::UnboundedSender<Message>,
    state: Arc<AtomicU8>,
    binary_type: BinaryType,
    tasks: Vec<JoinHandle<()>>,
}

impl WsSocket {
    /// Connect and start the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<WireEvent>)> {
        let (stream, _response) = connect_async(url).await?;
        info!(url, "connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream.
    pub fn from_stream<T>(stream: WebSocketStream<T>) -> (Self, mpsc::UnboundedReceiver<WireEvent>)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut to_send) = mpsc::unbounded_channel::<Message>();
        let (events, received) = mpsc::unbounded_channel::<WireEvent>();
        let state = Arc::new(AtomicU8::new(encode_state(ReadyState::Open)));

        let writer_state = Arc::clone(&state);
        let writer = tokio::spawn(async move {
            while let Some(message) = to_send.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            writer_state.store(encode_state(ReadyState::Closed), Ordering::SeqCst);
        });

        let reader_state = Arc::clone(&state);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => WireEvent::Text(text),
                    Ok(Message::Binary(bytes)) => WireEvent::Binary(bytes),
                    Ok(Message::Close(reason)) => {
                        debug!(?reason, "peer closed");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            reader_state.store(encode_state(ReadyState::Closed), Ordering::SeqCst);
            let _ = events.send(WireEvent::Closed);
        });

        let socket = Self {
            outgoing,
            state,
            binary_type: BinaryType::default(),
            tasks: vec![writer, reader],
        };
        (socket, received)
    }

    /// Start a clean close; the reader reports [`WireEvent::Closed`] when done.
    pub fn close(&mut self) {
        if self.ready_state() == ReadyState::Open {
            self.state
                .store(encode_state(ReadyState::Closing), Ordering::SeqCst);
            let _ = self.outgoing.send(Message::Close(None));
        }
    }

    fn push(&mut self, message: Message) -> Result<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(FeedError::ConnectionLost);
        }
        self.outgoing
            .send(message)
            .map_err(|_| FeedError::ConnectionLost)
    }
}

impl Socket for WsSocket {
    fn ready_state(&self) -> ReadyState {
        decode_state(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&mut self, text: String) -> Result<()> {
        self.push(Message::Text(text))
    }

    fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.push(Message::Binary(bytes))
    }

    fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.binary_type = binary_type;
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
