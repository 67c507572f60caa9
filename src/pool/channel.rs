//! Line reader with timeouts over a child process stream.
//!
//! A dedicated thread drains the stream and hands complete lines over a
//! rendezvous channel, so at most one line is produced but not yet consumed.
//! The reader thread blocks on the hand-off until the consumer takes the line
//! or asks it to stop.

use crate::error::ChannelError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};
use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest line accepted before the stream is treated as broken (256 KiB).
pub const MAX_LINE_LENGTH: usize = 256 * 1024;

/// Buffer size for the underlying reader.
const READ_BUFFER_SIZE: usize = 64 * 1024;

type LineResult = Result<String, ChannelError>;

/// One readable stream from a child process, split into lines.
pub struct LineChannel {
    lines: Receiver<LineResult>,
    /// Dropping the sender tells the reader thread to stop.
    close: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    label: String,
}

impl LineChannel {
    /// Start a reader thread over `stream`.
    pub fn spawn<R>(stream: R, label: &str) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (line_tx, line_rx) = bounded::<LineResult>(0);
        let (close_tx, close_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name(format!("{label} reader"))
            .spawn(move || reader_loop(stream, line_tx, close_rx))?;

        Ok(Self {
            lines: line_rx,
            close: Some(close_tx),
            thread: Some(thread),
            label: label.to_string(),
        })
    }

    /// Next complete line, without its terminator.
    ///
    /// Fails with [`ChannelError::Timeout`] if nothing arrives in time and
    /// [`ChannelError::Closed`] once the stream has ended.
    pub fn next_line(&self, timeout: Duration) -> Result<String, ChannelError> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => Err(ChannelError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    /// Ask the reader thread to stop waiting for its line to be consumed.
    ///
    /// A thread blocked reading the stream itself only stops once the stream
    /// ends, so terminate the process before [`await_closed`](Self::await_closed).
    pub fn request_close(&mut self) {
        self.close.take();
    }

    /// Wait for the reader thread to exit.
    pub fn await_closed(mut self) {
        if self.close.is_some() {
            tracing::warn!(channel = %self.label, "await_closed called before request_close");
            self.close.take();
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!(channel = %self.label, "Reader thread panicked");
        }
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        // Never join here: the stream may still be open.
        self.close.take();
    }
}

/// Reader thread body.
fn reader_loop<R: Read>(stream: R, lines: Sender<LineResult>, close: Receiver<()>) {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
    let mut line: Vec<u8> = Vec::with_capacity(4096);

    loop {
        let chunk = match reader.fill_buf() {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                deliver(&lines, &close, Err(ChannelError::Io(e)));
                return;
            }
        };

        if chunk.is_empty() {
            // EOF: whatever is left becomes the final line.
            if !line.is_empty() {
                deliver(&lines, &close, Ok(decode(&line)));
            }
            return;
        }

        let (used, complete) = match chunk.iter().position(|&b| b == b'\n') {
            Some(at) => (at + 1, true),
            None => (chunk.len(), false),
        };
        let body = if complete { &chunk[..used - 1] } else { chunk };
        line.extend(body.iter().copied().filter(|&b| b != b'\r'));
        reader.consume(used);

        if line.len() > MAX_LINE_LENGTH {
            deliver(&lines, &close, Err(ChannelError::LineTooLong(MAX_LINE_LENGTH)));
            return;
        }

        if complete {
            let text = decode(&line);
            line.clear();
            if !deliver(&lines, &close, Ok(text)) {
                return;
            }
        }
    }
}

/// Hand one item to the consumer. Returns false when the thread should stop.
fn deliver(lines: &Sender<LineResult>, close: &Receiver<()>, item: LineResult) -> bool {
    select! {
        send(lines, item) -> sent => sent.is_ok(),
        recv(close) -> _ => false,
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WAIT: Duration = Duration::from_secs(2);

    fn channel_over(bytes: &[u8]) -> LineChannel {
        LineChannel::spawn(Cursor::new(bytes.to_vec()), "test").unwrap()
    }

    fn close(mut channel: LineChannel) {
        channel.request_close();
        channel.await_closed();
    }

    #[test]
    fn test_lf_and_crlf_terminate_lines() {
        let channel = channel_over(b"line1\r\nline2\n\nlast");
        assert_eq!(channel.next_line(WAIT).unwrap(), "line1");
        assert_eq!(channel.next_line(WAIT).unwrap(), "line2");
        assert_eq!(channel.next_line(WAIT).unwrap(), "");
        assert_eq!(channel.next_line(WAIT).unwrap(), "last");
        assert!(matches!(channel.next_line(WAIT), Err(ChannelError::Closed)));
        close(channel);
    }

    #[test]
    fn test_stray_cr_is_dropped() {
        let channel = channel_over(b"a\rb\n");
        assert_eq!(channel.next_line(WAIT).unwrap(), "ab");
        close(channel);
    }

    #[test]
    fn test_timeout_when_no_line_arrives() {
        // A pipe whose write end stays open never reaches EOF.
        let (reader, writer) = std::io::pipe().unwrap();
        let mut channel = LineChannel::spawn(reader, "idle").unwrap();
        assert!(matches!(
            channel.next_line(Duration::from_millis(50)),
            Err(ChannelError::Timeout)
        ));
        channel.request_close();
        drop(writer);
        channel.await_closed();
    }

    #[test]
    fn test_overlong_line_is_fatal() {
        let mut data = vec![b'x'; MAX_LINE_LENGTH + 1];
        data.push(b'\n');
        let channel = channel_over(&data);
        assert!(matches!(
            channel.next_line(WAIT),
            Err(ChannelError::LineTooLong(_))
        ));
        assert!(matches!(channel.next_line(WAIT), Err(ChannelError::Closed)));
        close(channel);
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut data = vec![b'y'; MAX_LINE_LENGTH];
        data.push(b'\n');
        let channel = channel_over(&data);
        assert_eq!(channel.next_line(WAIT).unwrap().len(), MAX_LINE_LENGTH);
        close(channel);
    }

    #[test]
    fn test_close_while_line_pending() {
        // The reader is parked handing over "unread"; closing must release it.
        let mut channel = channel_over(b"unread\nnever\n");
        channel.request_close();
        channel.await_closed();
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let channel = channel_over(b"caf\xff\n");
        assert_eq!(channel.next_line(WAIT).unwrap(), "caf\u{fffd}");
        close(channel);
    }
}
