use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use super::SinkError;
use super::chain::{BuiltSink, ShipperSinkConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the line-shipping sink: one TCP connection carrying NDJSON, one
/// JSON record per line. Attachment is best-effort; the caller decides
/// what a failure here means.
///
/// Records reach the socket through the same non-blocking worker the file
/// sink uses, so a stalled peer never blocks an emitting thread.
pub(crate) async fn build(config: &ShipperSinkConfig) -> Result<BuiltSink, SinkError> {
    if config.address.is_empty() {
        return Err(SinkError::DestinationNotFound);
    }

    let stream = timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(&config.address))
        .await
        .map_err(|_| SinkError::ConnectTimeout(CONNECT_TIMEOUT))??;
    let stream = stream.into_std()?;
    // Only the worker thread writes, synchronously.
    stream.set_nonblocking(false)?;

    let (writer, guard) = tracing_appender::non_blocking(ShipperWriter { stream });

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .boxed();

    Ok(BuiltSink {
        layer,
        guard: Some(guard),
    })
}

/// Owned by the worker thread. Shipping is enrichment: a broken connection
/// drops the record instead of surfacing an error to the emitting caller.
struct ShipperWriter {
    stream: TcpStream,
}

impl Write for ShipperWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.stream.write(buf) {
            Ok(written) => Ok(written),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.stream.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Dispatch;

    #[tokio::test]
    async fn empty_address_is_destination_not_found() {
        let config = ShipperSinkConfig {
            address: String::new(),
        };
        assert!(matches!(
            build(&config).await,
            Err(SinkError::DestinationNotFound)
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = ShipperSinkConfig { address };
        assert!(matches!(build(&config).await, Err(SinkError::Connect(_))));
    }

    #[tokio::test]
    async fn emitters_do_not_wait_on_a_stalled_peer() {
        // The listener never accepts or reads; the connection sits in the
        // backlog with nothing draining it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let sink = build(&ShipperSinkConfig { address }).await.unwrap();
        assert!(sink.guard.is_some());

        let dispatch = Dispatch::new(tracing_subscriber::registry().with(sink.layer));
        tracing::dispatcher::with_default(&dispatch, || {
            for i in 0..512 {
                tracing::info!(i, "queued without a reader");
            }
        });
        // Reaching here means emission only enqueued records and never
        // touched more than the socket's send buffer.
        drop(listener);
    }
}
