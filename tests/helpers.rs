// Test helpers for the integration tests
//
// Starts a mock cluster on an ephemeral port and talks to it over a real
// TCP connection using the kafka-protocol message types, the same way a
// Kafka client would.

#![allow(dead_code)]

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{RequestHeader, ResponseHeader};
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use mock_kafka::kafka::messages::Record;
use mock_kafka::kafka::protocol::{encode_records, parse_record_batch};
use mock_kafka::kafka::{listener, ClusterConfig, Store, StoreOptions};

/// A running single-broker cluster
pub struct TestCluster {
    pub store: Store,
    pub port: u16,
    shutdown_tx: watch::Sender<bool>,
}

impl TestCluster {
    /// Start a broker named "broker" serving the channels of `document`
    ///
    /// `document` is a YAML cluster document without a `servers` section;
    /// the server entry is added once the ephemeral port is known.
    pub async fn start(document: &str) -> Self {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        let config = ClusterConfig::from_yaml(document)
            .unwrap()
            .with_server("broker", format!("127.0.0.1:{}", port));
        let store = Store::with_options(
            &config,
            StoreOptions {
                join_window: Duration::from_millis(300),
                ..StoreOptions::default()
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(listener::run(socket, store.clone(), shutdown_rx));

        TestCluster {
            store,
            port,
            shutdown_tx,
        }
    }

    pub async fn connect(&self, client_id: &str) -> TestConnection {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).await.unwrap();
        TestConnection {
            stream,
            client_id: client_id.to_string(),
            next_correlation_id: 1,
        }
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.store.close();
    }
}

/// One client connection
pub struct TestConnection {
    stream: TcpStream,
    client_id: String,
    next_correlation_id: i32,
}

impl TestConnection {
    /// Send a request and wait for its response
    pub async fn send<R: Request>(&mut self, version: i16, request: &R) -> R::Response {
        let correlation_id = self.write_request(version, request).await;
        self.read_response::<R>(version, correlation_id).await
    }

    /// Write a request without waiting; returns its correlation id
    pub async fn write_request<R: Request>(&mut self, version: i16, request: &R) -> i32 {
        let correlation_id = self.next_correlation_id;
        self.next_correlation_id += 1;

        let mut header = RequestHeader::default();
        header.request_api_key = R::KEY;
        header.request_api_version = version;
        header.correlation_id = correlation_id;
        header.client_id = Some(StrBytes::from_string(self.client_id.clone()));

        let mut body = BytesMut::new();
        header
            .encode(&mut body, <R as HeaderVersion>::header_version(version))
            .unwrap();
        request.encode(&mut body, version).unwrap();

        let mut frame = BytesMut::with_capacity(body.len() + 4);
        frame.put_i32(body.len() as i32);
        frame.extend_from_slice(&body);
        self.stream.write_all(&frame).await.unwrap();
        correlation_id
    }

    /// Read the next response frame, asserting its correlation id
    pub async fn read_response<R: Request>(
        &mut self,
        version: i16,
        correlation_id: i32,
    ) -> R::Response {
        let mut frame = self.read_frame().await;
        let header_version = <R::Response as HeaderVersion>::header_version(version);
        let header = ResponseHeader::decode(&mut frame, header_version).unwrap();
        assert_eq!(header.correlation_id, correlation_id);
        R::Response::decode(&mut frame, version).unwrap()
    }

    /// Read one raw response frame (without the length prefix)
    pub async fn read_frame(&mut self) -> BytesMut {
        let len = self.stream.read_i32().await.unwrap();
        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).await.unwrap();
        BytesMut::from(&buf[..])
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// True once the broker has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}

/// Encode key/value pairs as a v2 record batch
pub fn record_batch(records: &[(&str, &str)]) -> Bytes {
    let records: Vec<Record> = records
        .iter()
        .enumerate()
        .map(|(i, (key, value))| Record {
            offset: i as i64,
            time: 1_700_000_000_000,
            ..Record::new(
                Some(Bytes::copy_from_slice(key.as_bytes())),
                Some(Bytes::copy_from_slice(value.as_bytes())),
            )
        })
        .collect();
    encode_records(&records, 11).unwrap()
}

/// Values of the records in a Fetch partition, as strings
pub fn record_values(records: &Option<Bytes>) -> Vec<String> {
    match records {
        Some(bytes) if bytes.has_remaining() => parse_record_batch(bytes)
            .unwrap()
            .into_iter()
            .map(|r| String::from_utf8_lossy(r.value.as_deref().unwrap_or_default()).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}
