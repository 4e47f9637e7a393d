//! Request loop for one client stream

use super::Server;
use crate::CacheError;
use crate::protocol::{Command, ParsedLine, ResponseWriter, parse_line};
use crate::scheduler::{Job, Request};
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Result of reading one command line
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Complete,
    TooLong,
    Eof,
}

/// Serve requests from `reader` until end of stream or cancellation
pub async fn handle<R, W>(server: Arc<Server>, mut reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let max_line = server.config.max_line_length;
    let mut line = BytesMut::with_capacity(max_line + 2);
    let mut response = ResponseWriter::new(server.config.write_buffer_size);

    loop {
        let read = tokio::select! {
            _ = server.cancel_token.cancelled() => break,
            read = read_line(&mut reader, &mut line, max_line) => read,
        };

        match read {
            Ok(Line::Eof) => break,
            Ok(Line::TooLong) => {
                server.metrics().protocol_errors.inc();
                response.error(&CacheError::Malformed);
            }
            Ok(Line::Complete) => {
                server.metrics().bytes_read.inc_by(line.len() as u64);
                match parse_line(&line) {
                    Ok(parsed) => execute(&server, parsed, &mut reader, &mut response).await?,
                    Err(e) => {
                        server.metrics().protocol_errors.inc();
                        debug!(error = %e, "Malformed request");
                        response.error(&e.into());
                    }
                }
            }
            Err(e) => {
                debug!("Read error: {}", e);
                break;
            }
        }

        if !response.is_empty() {
            server.metrics().bytes_written.inc_by(response.buffer().len() as u64);
            writer.write_all(response.buffer()).await?;
            writer.flush().await?;
            response.clear();
        }
    }

    Ok(())
}

/// Read the body if any, run the job and write its response
async fn execute<R>(
    server: &Arc<Server>,
    parsed: ParsedLine,
    reader: &mut R,
    response: &mut ResponseWriter,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let ParsedLine { mut request, body } = parsed;
    let noreply = request.noreply;
    let command = request.command;
    let key = request.key.clone().unwrap_or_default();

    let submitted = match body {
        // refused before the body is read
        Some(len) if len > server.scheduler.max_value_length() => Err(CacheError::NotStored),
        Some(len) => {
            request.value = Some(read_body(reader, len).await?);
            server.metrics().bytes_read.inc_by(len as u64);
            submit(server, request).await?
        }
        None => submit(server, request).await?,
    };

    if noreply {
        return Ok(());
    }

    match submitted {
        Ok(Some(job)) => match job.outcome() {
            Some(Ok(reply)) => response.reply(&key, reply, command == Command::Gets),
            Some(Err(e)) => response.error(e),
            None => {}
        },
        Ok(None) => {}
        Err(e) => response.error(&e),
    }
    Ok(())
}

/// Submit on the blocking pool; the scheduler parks the caller until done
async fn submit(
    server: &Arc<Server>,
    request: Request,
) -> anyhow::Result<Result<Option<Job>, CacheError>> {
    let scheduler = Arc::clone(&server.scheduler);
    let result =
        tokio::task::spawn_blocking(move || scheduler.submit_and_await(Job::new(request))).await?;
    Ok(result)
}

/// Read one line into `line` without its terminator.
///
/// A line longer than `max` is discarded up to its end.
async fn read_line<R>(reader: &mut R, line: &mut BytesMut, max: usize) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut too_long = false;

    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (too_long, line.is_empty()) {
                    (true, _) => Line::TooLong,
                    (false, true) => Line::Eof,
                    (false, false) => Line::Complete,
                });
            }

            let (chunk, done) = match memchr::memchr(b'\n', available) {
                Some(pos) => (&available[..=pos], true),
                None => (available, false),
            };
            if !too_long {
                if line.len() + chunk.len() > max + 2 {
                    too_long = true;
                    line.clear();
                } else {
                    line.extend_from_slice(chunk);
                }
            }
            (chunk.len(), done)
        };
        reader.consume(consumed);
        if done {
            break;
        }
    }

    if too_long {
        return Ok(Line::TooLong);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.truncate(line.len() - 1);
    }
    Ok(Line::Complete)
}

/// Read exactly `len` body bytes, then the line terminator after them
async fn read_body<R>(reader: &mut R, len: usize) -> io::Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;

    for expected in [b'\r', b'\n'] {
        let available = reader.fill_buf().await?;
        match available.first() {
            Some(&b) if b == expected => reader.consume(1),
            _ if expected == b'\r' => continue,
            _ => break,
        }
    }

    Ok(Bytes::from(body))
}
