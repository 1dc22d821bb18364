use std::collections::VecDeque;
use std::io;
use std::io::Read;
use std::io::Write;
use std::thread;

use log::debug;
use log::warn;

use crate::config::MAX_PENDING_LINE_BYTES;
use crate::config::READ_BUFFER_SIZE;
use crate::config::READ_RETRY_DELAY;
use crate::shutdown::Shutdown;

/// Why the transcript stopped producing lines.
#[derive(Debug)]
pub enum ReaderEnd {
    /// The terminal was closed, which happens when the client exits.
    Closed,
    Cancelled,
    Failed(io::Error),
}

/// Reassembles terminal output that arrives in arbitrary pieces into lines
/// without control sequences. Carriage returns end a line as well, since the
/// client redraws its countdown in place.
#[derive(Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = vec![];
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                lines.extend(self.take_line());
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_PENDING_LINE_BYTES {
                    lines.extend(self.take_line());
                }
            }
        }
        lines
    }

    /// Returns whatever is left over once no more input will arrive.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        let stripped = strip_ansi_escapes::strip(&raw);
        let line = String::from_utf8_lossy(&stripped).trim_end().to_string();
        Some(line).filter(|line| !line.trim().is_empty())
    }
}

/// Iterator over the lines printed by the client. Raw output is echoed to
/// `echo` unchanged so the user still sees the client's interface.
/// Once the iterator is exhausted, [`TranscriptReader::into_end`] tells why.
pub struct TranscriptReader<R: Read> {
    source: R,
    echo: Option<Box<dyn Write + Send>>,
    shutdown: Shutdown,
    assembler: LineAssembler,
    ready: VecDeque<String>,
    end: Option<ReaderEnd>,
}

impl<R: Read> TranscriptReader<R> {
    pub fn new(source: R, echo: Option<Box<dyn Write + Send>>, shutdown: Shutdown) -> Self {
        Self {
            source,
            echo,
            shutdown,
            assembler: LineAssembler::default(),
            ready: VecDeque::new(),
            end: None,
        }
    }

    #[cfg(test)]
    pub fn end(&self) -> Option<&ReaderEnd> {
        self.end.as_ref()
    }

    pub fn into_end(self) -> Option<ReaderEnd> {
        self.end
    }

    fn read_chunk(&mut self) {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        match self.source.read(&mut buf) {
            Ok(0) => self.close(ReaderEnd::Closed),
            Ok(n) => {
                self.echo_bytes(&buf[..n]);
                let lines = self.assembler.push(&buf[..n]);
                self.ready.extend(lines);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(READ_RETRY_DELAY);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            // Reading the master side of a pty whose child exited fails with EIO.
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => {
                debug!("Terminal closed: {}", e);
                self.close(ReaderEnd::Closed);
            }
            Err(e) => self.close(ReaderEnd::Failed(e)),
        }
    }

    fn echo_bytes(&mut self, bytes: &[u8]) {
        if let Some(echo) = self.echo.as_mut() {
            let result = echo.write_all(bytes).and_then(|_| echo.flush());
            if let Err(e) = result {
                warn!("Failed to echo client output: {}", e);
                self.echo = None;
            }
        }
    }

    fn close(&mut self, end: ReaderEnd) {
        self.ready.extend(self.assembler.finish());
        self.end = Some(end);
    }
}

impl<R: Read> Iterator for TranscriptReader<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(line);
            }
            if self.end.is_some() {
                return None;
            }
            if self.shutdown.is_triggered() {
                self.close(ReaderEnd::Cancelled);
                continue;
            }
            self.read_chunk();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;
    use crate::shutdown::ShutdownReason;

    /// Hands out one scripted result per read call.
    struct ScriptedSource(VecDeque<io::Result<Vec<u8>>>);

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scripted(chunks: Vec<io::Result<&[u8]>>) -> ScriptedSource {
        ScriptedSource(chunks.into_iter().map(|c| c.map(|b| b.to_vec())).collect())
    }

    #[test]
    fn test_strips_color_codes_split_across_reads() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(b"\x1b[2K|>  Station \"Ja").is_empty());
        assert!(assembler.push(b"zz\" (12)\x1b[").is_empty());
        let lines = assembler.push(b"0m\r\n");
        assert_eq!(lines, vec!["|>  Station \"Jazz\" (12)".to_string()]);
    }

    #[test]
    fn test_carriage_return_ends_countdown_line() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"\x1b[2K#   -03:21/03:45\r\x1b[2K#   -03:20/03:45\r");
        assert_eq!(lines, vec!["#   -03:21/03:45", "#   -03:20/03:45"]);
    }

    #[test]
    fn test_overlong_line_is_flushed() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(&vec![b'x'; MAX_PENDING_LINE_BYTES + 10]);
        assert_eq!(lines.len(), 1);
        assert_eq!(assembler.finish(), Some("x".repeat(10)));
    }

    #[test]
    fn test_reader_yields_lines_and_flushes_on_eof() {
        let source = Cursor::new(b"first\nsecond\r\nthird".to_vec());
        let mut reader = TranscriptReader::new(source, None, Shutdown::new());
        let lines: Vec<_> = reader.by_ref().collect();
        assert_eq!(lines, vec!["first", "second", "third"]);
        assert!(matches!(reader.end(), Some(ReaderEnd::Closed)));
    }

    #[test]
    fn test_reader_retries_would_block() {
        let source = scripted(vec![
            Ok(b"one"),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(b" two\n"),
        ]);
        let mut reader = TranscriptReader::new(source, None, Shutdown::new());
        assert_eq!(reader.next(), Some("one two".to_string()));
        assert_eq!(reader.next(), None);
        assert!(matches!(reader.end(), Some(ReaderEnd::Closed)));
    }

    #[test]
    fn test_reader_treats_eio_as_closed_and_other_errors_as_failure() {
        let source = scripted(vec![Err(io::Error::from_raw_os_error(nix::libc::EIO))]);
        let mut reader = TranscriptReader::new(source, None, Shutdown::new());
        assert_eq!(reader.next(), None);
        assert!(matches!(reader.end(), Some(ReaderEnd::Closed)));

        let source = scripted(vec![
            Ok(b"partial"),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        ]);
        let mut reader = TranscriptReader::new(source, None, Shutdown::new());
        assert_eq!(reader.next(), Some("partial".to_string()));
        assert_eq!(reader.next(), None);
        assert!(matches!(reader.into_end(), Some(ReaderEnd::Failed(_))));
    }

    #[test]
    fn test_reader_echoes_raw_output() {
        let echo = SharedBuffer::default();
        let raw = b"\x1b[1mbold\x1b[0m\n".to_vec();
        let reader = TranscriptReader::new(
            Cursor::new(raw.clone()),
            Some(Box::new(echo.clone())),
            Shutdown::new(),
        );
        assert_eq!(reader.collect::<Vec<_>>(), vec!["bold"]);
        assert_eq!(*echo.0.lock().unwrap(), raw);
    }

    #[test]
    fn test_reader_stops_on_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::QuitKey);
        let mut reader = TranscriptReader::new(Cursor::new(b"never read\n".to_vec()), None, shutdown);
        assert_eq!(reader.next(), None);
        assert!(matches!(reader.end(), Some(ReaderEnd::Cancelled)));
    }
}
