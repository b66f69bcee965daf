// TCP listener for one mock broker
//
// Binds nothing itself: the caller hands over a bound TcpListener and a
// shutdown receiver. Every accepted connection gets its own task and its
// own ClientContext.
//
// Each connection is split into a reader loop and a writer task joined by
// an unbounded channel. Requests are served one at a time in arrival order,
// so responses leave in request order as Kafka requires.

use std::net::SocketAddr;
use std::time::Duration;

use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, error, info, warn};

use super::constants::{API_KEY_API_VERSIONS, ERROR_UNSUPPORTED_VERSION, MAX_REQUEST_SIZE};
use super::context::ClientContext;
use super::error::{KafkaError, Result};
use super::messages::{KafkaRequest, KafkaResponse, RequestHeader, ResponseMessage};
use super::protocol;
use super::response_builders::build_api_versions_error_response;
use super::store::Store;

/// How long a closing connection waits for queued responses to drain
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Run the accept loop until `shutdown_rx` flips to true
///
/// Connections still open at shutdown are told to stop through the same
/// watch channel.
pub async fn run(
    listener: TcpListener,
    store: Store,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    info!("Kafka listener started on {}", local_addr);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Listener on {} received shutdown signal", local_addr);
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    info!("Accepted connection from {}", addr);
                    let store = store.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, addr, store, shutdown_rx).await {
                            warn!("Error handling connection from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                }
            }
        }
    }

    Ok(())
}

/// Serve one client connection until it closes or shutdown is signalled
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    store: Store,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let server_port = i32::from(socket.local_addr()?.port());
    let mut client = ClientContext::new(addr.ip().to_string(), server_port);

    // Kafka uses a big-endian 4-byte size prefix
    let framed = Framed::new(
        socket,
        LengthDelimitedCodec::builder()
            .big_endian()
            .length_field_length(4)
            .max_frame_length(MAX_REQUEST_SIZE as usize)
            .new_codec(),
    );
    let (mut writer, mut reader) = framed.split();
    let (response_tx, mut response_rx) = mpsc::unbounded_channel::<KafkaResponse>();

    let writer_handle = tokio::spawn(async move {
        while let Some(response) = response_rx.recv().await {
            let bytes = match protocol::encode_response(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(
                        correlation_id = response.correlation_id,
                        "Failed to encode response: {}", e
                    );
                    return;
                }
            };
            if let Err(e) = writer.send(bytes.freeze()).await {
                let e = KafkaError::from(e);
                if e.is_disconnect() {
                    debug!("Client went away before response was written");
                } else {
                    error!("Failed to send response to client: {}", e);
                }
                return;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = reader.next() => frame,
        };
        let mut frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("Error reading frame from {}: {}", addr, e);
                break;
            }
            None => break,
        };
        debug!("Received frame of {} bytes", frame.len());

        let header = match protocol::decode_header(&mut frame) {
            Ok(header) => header,
            Err(e) => {
                error!("Closing connection from {}: {}", addr, e);
                break;
            }
        };

        let message = match protocol::decode_body(&header, &mut frame) {
            Ok(message) => message,
            Err(KafkaError::UnsupportedVersion { api_key, .. })
                if api_key == API_KEY_API_VERSIONS =>
            {
                // Answer at v0 so the client can pick a version it shares with us
                debug!(
                    "ApiVersions v{} is not supported, answering with v0",
                    header.api_version
                );
                let fallback = RequestHeader {
                    api_version: 0,
                    ..header
                };
                let body = build_api_versions_error_response(ERROR_UNSUPPORTED_VERSION);
                if response_tx
                    .send(KafkaResponse::new(&fallback, ResponseMessage::ApiVersions(body)))
                    .is_err()
                {
                    break;
                }
                continue;
            }
            Err(e) => {
                error!("Closing connection from {}: {}", addr, e);
                break;
            }
        };

        let request = KafkaRequest::new(header, message);
        if let Err(e) = store.serve(&response_tx, request, &mut client).await {
            error!("Closing connection from {}: {}", addr, e);
            break;
        }
    }

    // Dropping the sender lets the writer finish what is queued
    drop(response_tx);
    let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle).await;

    debug!("Connection from {} closed", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Buf, BufMut, BytesMut};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::kafka::cluster_config::ClusterConfig;

    async fn start() -> (SocketAddr, watch::Sender<bool>, Store) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config =
            ClusterConfig::new("test").with_server("broker", format!("127.0.0.1:{}", addr.port()));
        let store = Store::new(&config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run(listener, store.clone(), shutdown_rx));
        (addr, shutdown_tx, store)
    }

    fn api_versions_frame(version: i16, correlation_id: i32) -> BytesMut {
        let mut body = BytesMut::new();
        body.put_i16(API_KEY_API_VERSIONS);
        body.put_i16(version);
        body.put_i32(correlation_id);
        body.put_i16(-1); // null client id
        if version >= 3 {
            body.put_u8(0); // header tagged fields
        }
        let mut frame = BytesMut::new();
        frame.put_i32(body.len() as i32);
        frame.extend_from_slice(&body);
        frame
    }

    async fn read_frame(stream: &mut TcpStream) -> BytesMut {
        let len = stream.read_i32().await.unwrap();
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await.unwrap();
        BytesMut::from(&buf[..])
    }

    #[tokio::test]
    async fn test_api_versions_over_tcp() {
        let (addr, shutdown_tx, store) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&api_versions_frame(0, 42)).await.unwrap();
        let mut response = read_frame(&mut stream).await;

        assert_eq!(response.get_i32(), 42);
        assert_eq!(response.get_i16(), 0); // error code
        assert_eq!(response.get_i32(), 13); // api key count

        let _ = shutdown_tx.send(true);
        store.close();
    }

    #[tokio::test]
    async fn test_unsupported_api_versions_answered_at_v0() {
        let (addr, shutdown_tx, store) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&api_versions_frame(9, 7)).await.unwrap();
        let mut response = read_frame(&mut stream).await;

        assert_eq!(response.get_i32(), 7);
        assert_eq!(response.get_i16(), ERROR_UNSUPPORTED_VERSION);
        assert_eq!(response.get_i32(), 13);

        let _ = shutdown_tx.send(true);
        store.close();
    }

    #[tokio::test]
    async fn test_unknown_api_key_closes_connection() {
        let (addr, shutdown_tx, store) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut frame = BytesMut::new();
        frame.put_i32(10);
        frame.put_i16(999);
        frame.put_i16(0);
        frame.put_i32(1);
        frame.put_i16(-1);
        stream.write_all(&frame).await.unwrap();

        let mut buf = [0u8; 4];
        let read = stream.read(&mut buf).await.unwrap_or(0);
        assert_eq!(read, 0);

        let _ = shutdown_tx.send(true);
        store.close();
    }
}
