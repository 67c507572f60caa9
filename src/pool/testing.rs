//! Scripted renderer instances for pool tests.
//!
//! A [`MockInstance`] answers each request from its content:
//!
//! - `error...`: an `ERRORS` section repeating the content
//! - `crash...`: starts a result, then the stream closes (stderr is
//!   `This\nis\nstderr`)
//! - `truncated...`: a complete SVG section but no `<<END:RESULT`
//! - `hang...`: no output, so reads time out
//! - `slow:<ms>`: a normal answer after sleeping `<ms>`
//! - anything else: `<svg font="F">content</svg>` plus MathML

use super::process::Instance;
use super::spawn::Spawner;
use crate::error::{ChannelError, PoolError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Everything the mocks did, shared with the test.
#[derive(Debug, Default)]
pub struct MockLog {
    /// `(serial, font, when)` per spawn.
    pub spawned: Mutex<Vec<(usize, String, Instant)>>,
    /// `(serial, font)` per close.
    pub closed: Mutex<Vec<(usize, String)>>,
    /// Lines sent to any instance, in order.
    pub sent: Mutex<Vec<String>>,
    /// How long each `close` takes.
    pub close_delay: Mutex<Duration>,
}

impl MockLog {
    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn closed_fonts(&self) -> Vec<String> {
        self.closed.lock().iter().map(|(_, f)| f.clone()).collect()
    }
}

pub struct MockSpawner {
    log: Arc<MockLog>,
    fail: AtomicBool,
}

impl MockSpawner {
    pub fn new() -> (Self, Arc<MockLog>) {
        let log = Arc::new(MockLog::default());
        let spawner = Self {
            log: Arc::clone(&log),
            fail: AtomicBool::new(false),
        };
        (spawner, log)
    }

    /// Make every later spawn fail.
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }
}

impl Spawner for MockSpawner {
    type Instance = MockInstance;

    fn spawn(&self, font: &str) -> Result<MockInstance> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PoolError::transport("Failed to start renderer: mock"));
        }
        let mut spawned = self.log.spawned.lock();
        let serial = spawned.len();
        spawned.push((serial, font.to_string(), Instant::now()));
        Ok(MockInstance {
            serial,
            font: font.to_string(),
            request: Vec::new(),
            replies: VecDeque::new(),
            crashed: false,
            log: Arc::clone(&self.log),
        })
    }
}

#[derive(Debug)]
pub struct MockInstance {
    serial: usize,
    font: String,
    request: Vec<String>,
    replies: VecDeque<std::result::Result<String, ChannelError>>,
    crashed: bool,
    log: Arc<MockLog>,
}

impl MockInstance {
    fn answer(&mut self, content: &str) {
        let lines = |lines: &[&str]| -> Vec<std::result::Result<String, ChannelError>> {
            lines.iter().map(|l| Ok(l.to_string())).collect()
        };

        let replies = if content.starts_with("error") {
            lines(&[
                "<<BEGIN:RESULT",
                "<<BEGIN:ERRORS",
                &format!("Error: {content}"),
                "<<END:ERRORS",
                "<<END:RESULT",
            ])
        } else if content.starts_with("crash") {
            self.crashed = true;
            let mut replies = lines(&["<<BEGIN:RESULT"]);
            replies.push(Err(ChannelError::Closed));
            replies
        } else if content.starts_with("truncated") {
            self.crashed = true;
            let mut replies = lines(&["<<BEGIN:RESULT", "<<BEGIN:SVG", "<svg/>", "<<END:SVG"]);
            replies.push(Err(ChannelError::Closed));
            replies
        } else if content.starts_with("hang") {
            vec![Err(ChannelError::Timeout)]
        } else {
            if let Some(ms) = content.strip_prefix("slow:").and_then(|ms| ms.parse().ok()) {
                std::thread::sleep(Duration::from_millis(ms));
            }
            lines(&[
                "<<BEGIN:RESULT",
                "<<BEGIN:SVG",
                &format!("<svg font=\"{}\">{}</svg>", self.font, content),
                "<<END:SVG",
                "<<BEGIN:MATHML",
                &format!("<math>{content}</math>"),
                "<<END:MATHML",
                "<<END:RESULT",
            ])
        };
        self.replies.extend(replies);
    }

    fn record_close(&self) {
        self.log
            .closed
            .lock()
            .push((self.serial, self.font.clone()));
    }
}

impl Instance for MockInstance {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        if self.crashed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock crashed"));
        }
        self.log.sent.lock().push(line.to_string());
        self.request.push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.request.len() >= 3 && self.request.last().is_some_and(|l| l.is_empty()) {
            let content = self.request[1].clone();
            self.request.clear();
            self.answer(&content);
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> std::result::Result<String, ChannelError> {
        self.replies.pop_front().unwrap_or(Err(ChannelError::Timeout))
    }

    fn close(self) {
        let delay = *self.log.close_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.record_close();
    }

    fn close_with_stderr(self, _line_timeout: Duration, max_lines: usize) -> String {
        self.record_close();
        if self.crashed {
            ["This", "is", "stderr"]
                .iter()
                .take(max_lines)
                .copied()
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            String::new()
        }
    }
}
