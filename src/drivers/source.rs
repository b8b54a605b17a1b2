use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::drivers::EngineError;

/// Line-oriented byte stream to the potentiostat.
pub trait Transport: Send {
    /// Write one ASCII command. Commands carry their own `!` terminator.
    fn write_command(&mut self, command: &str) -> Result<(), EngineError>;
    /// Next line without its terminator; `None` when the read timed out.
    fn read_line(&mut self) -> Result<Option<String>, EngineError>;
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), EngineError>;
    /// Drop everything the device sent before now.
    fn clear_input(&mut self) -> Result<(), EngineError>;
    fn name(&self) -> &str;
}

/// Scripted reply for [`ManualTransport`].
#[derive(Clone, Debug, PartialEq)]
pub enum ManualReply {
    Line(String),
    /// Behaves like a read that hit its timeout.
    Silence,
    /// The read fails with an I/O error.
    Failure(String),
}

/// In-memory transport useful for tests and deterministic replays.
pub struct ManualTransport {
    replies: VecDeque<ManualReply>,
    written: Arc<Mutex<Vec<String>>>,
    read_timeout: Duration,
    reads: usize,
}

impl ManualTransport {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::with_replies(lines.into_iter().map(|l| ManualReply::Line(l.into())))
    }

    pub fn with_replies(replies: impl IntoIterator<Item = ManualReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            written: Arc::new(Mutex::new(Vec::new())),
            read_timeout: Duration::from_millis(100),
            reads: 0,
        }
    }

    /// Shared view of every command written so far.
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.written)
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl Transport for ManualTransport {
    fn write_command(&mut self, command: &str) -> Result<(), EngineError> {
        self.written.lock().push(command.to_owned());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, EngineError> {
        self.reads += 1;
        match self.replies.pop_front() {
            Some(ManualReply::Line(line)) => Ok(Some(line)),
            Some(ManualReply::Failure(msg)) => Err(EngineError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                msg,
            ))),
            Some(ManualReply::Silence) | None => {
                thread::sleep(self.read_timeout);
                Ok(None)
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), EngineError> {
        self.read_timeout = timeout;
        Ok(())
    }

    // Scripted replies stand for data that arrives after the command.
    fn clear_input(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_times_out() {
        let mut t = ManualTransport::with_replies([
            ManualReply::Line("0;1.0".into()),
            ManualReply::Silence,
            ManualReply::Failure("unplugged".into()),
        ]);
        t.set_read_timeout(Duration::from_millis(1)).unwrap();
        assert_eq!(t.read_line().unwrap().as_deref(), Some("0;1.0"));
        assert_eq!(t.read_line().unwrap(), None);
        assert!(matches!(t.read_line(), Err(EngineError::Transport(_))));
        assert_eq!(t.read_line().unwrap(), None);
        assert_eq!(t.reads(), 4);
    }

    #[test]
    fn records_written_commands() {
        let mut t = ManualTransport::new(Vec::<String>::new());
        let log = t.command_log();
        t.write_command("7#0?10/2|1$0!").unwrap();
        assert_eq!(log.lock().as_slice(), ["7#0?10/2|1$0!".to_string()]);
    }
}
