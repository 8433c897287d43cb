use std::io::Write;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

use super::SinkError;
use super::chain::{BuiltSink, SearchSinkConfig};
use crate::config::parse_duration;

/// Builds the search-indexed sink.
///
/// Attachment requires a configured destination, a parseable
/// connection-timeout, and a successful negotiation GET against the
/// destination. Negotiation runs under its own bounded deadline, scoped to
/// exactly that step; the sink's later lifetime is independent of it.
/// Records then flow through a channel to a background task posting one
/// document per event, so emitters never wait on the network.
pub(crate) async fn build(config: &SearchSinkConfig) -> Result<BuiltSink, SinkError> {
    if config.address.is_empty() {
        return Err(SinkError::DestinationNotFound);
    }

    let connect_timeout = parse_duration(&config.connection_timeout)?;
    let client = reqwest::Client::builder().build()?;

    let response = timeout(connect_timeout, client.get(&config.address).send())
        .await
        .map_err(|_| SinkError::NegotiationTimeout(connect_timeout))??;
    if !response.status().is_success() {
        return Err(SinkError::NegotiationRejected(response.status().as_u16()));
    }

    let (sender, receiver) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(forward_documents(
        client,
        config.address.clone(),
        config.service.clone(),
        receiver,
    ));

    let layer = fmt::layer()
        .with_writer(DocumentSender { sender })
        .with_ansi(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .boxed();

    Ok(BuiltSink { layer, guard: None })
}

/// Posts each record as a document under the service's index. Exits when
/// the sink layer (and with it the channel sender) is dropped.
async fn forward_documents(
    client: reqwest::Client,
    address: String,
    service: String,
    mut receiver: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let endpoint = format!("{}/{}/_doc", address.trim_end_matches('/'), service);
    while let Some(document) = receiver.recv().await {
        let document = tag_with_service(document, &service);
        // Failures cannot be reported through the pipeline that feeds this
        // sink; the document is dropped.
        let _ = client
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(document)
            .send()
            .await;
    }
}

/// Injects the service identifier into the document, leaving any existing
/// field untouched.
fn tag_with_service(document: Vec<u8>, service: &str) -> Vec<u8> {
    let Ok(serde_json::Value::Object(mut fields)) = serde_json::from_slice(&document) else {
        return document;
    };
    if !fields.contains_key("service") {
        fields.insert(
            "service".to_string(),
            serde_json::Value::String(service.to_string()),
        );
    }
    serde_json::to_vec(&serde_json::Value::Object(fields)).unwrap_or(document)
}

/// Hands each formatted record to the forwarding task. One writer is made
/// per event; the buffered record is sent when the writer is dropped.
struct DocumentSender {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

struct DocumentBuffer {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    buffer: Vec<u8>,
}

impl Write for DocumentBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for DocumentBuffer {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            let _ = self.sender.send(std::mem::take(&mut self.buffer));
        }
    }
}

impl<'a> MakeWriter<'a> for DocumentSender {
    type Writer = DocumentBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        DocumentBuffer {
            sender: self.sender.clone(),
            buffer: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str, timeout: &str) -> SearchSinkConfig {
        SearchSinkConfig {
            address: address.to_string(),
            connection_timeout: timeout.to_string(),
            service: "potd".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_address_is_destination_not_found() {
        assert!(matches!(
            build(&config("", "30s")).await,
            Err(SinkError::DestinationNotFound)
        ));
    }

    #[tokio::test]
    async fn unparseable_timeout_wraps_the_parse_error() {
        assert!(matches!(
            build(&config("http://127.0.0.1:9200", "soon")).await,
            Err(SinkError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn tagging_preserves_an_existing_service_field() {
        let tagged = tag_with_service(br#"{"service":"other","message":"m"}"#.to_vec(), "potd");
        let value: serde_json::Value = serde_json::from_slice(&tagged).unwrap();
        assert_eq!(value["service"], "other");

        let tagged = tag_with_service(br#"{"message":"m"}"#.to_vec(), "potd");
        let value: serde_json::Value = serde_json::from_slice(&tagged).unwrap();
        assert_eq!(value["service"], "potd");
    }
}
