//! Stream drain and reaper tasks for background processes.

use super::registry::{ProcessRecord, Stream};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Longest line kept as one entry; longer runs without a newline are split.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Read `reader` line by line into the record until end-of-stream. A read error is
/// appended as the final line.
pub(crate) fn spawn_drain<R>(record: Arc<ProcessRecord>, stream: Stream, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
            match limited.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => record.append(stream, decode_line(&buf)).await,
                Err(e) => {
                    record
                        .append(stream, format!("error reading {}: {}", stream, e))
                        .await;
                    break;
                }
            }
        }
        log::debug!("{} drain for pid {} finished", stream, record.pid);
    })
}

/// Wait for the child and record its exit on the record. Kill requests are served here,
/// while the child is still unreaped, so a recycled pid is never signalled.
pub(crate) fn spawn_reaper(mut child: Child, record: Arc<ProcessRecord>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = record.kill_requested() => {
                if let Err(e) = child.start_kill() {
                    log::warn!("killing pid {} failed: {}", record.pid, e);
                }
                child.wait().await
            }
        };
        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                log::warn!("waiting for pid {} failed: {}", record.pid, e);
                None
            }
        };
        record.mark_exited(code).await;
        log::info!("background pid {} exited with {:?}", record.pid, code);
    })
}

/// Strip the line terminator (`\n` or `\r\n`); invalid UTF-8 is replaced.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
