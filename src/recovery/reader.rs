//! Non-blocking reader for one output stream of a child process.
//!
//! A background thread drains the stream in batches into an mpsc channel;
//! the controller polls with a bounded timeout and never stalls on the pipe.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::process::{ChildStderr, ChildStdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHUNK: usize = 4096;
/// Longest wait before the reader thread rechecks its stop flag.
const STOP_CHECK: Duration = Duration::from_millis(50);

/// A stream the reader can wait on. Descriptor-backed streams are polled,
/// so `stop` ends the thread while the writer is still alive; in-memory
/// streams are always ready.
pub trait Source: Read + Send {
    /// True once a read would not block, false if `timeout` passed first.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let _ = timeout;
        Ok(true)
    }
}

fn poll_readable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<bool> {
    let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(ms)) {
        Ok(n) => Ok(n > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

macro_rules! polled_source {
    ($($ty:ty),*) => {$(
        impl Source for $ty {
            fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
                poll_readable(self.as_fd(), timeout)
            }
        }
    )*};
}

polled_source!(ChildStdout, ChildStderr, UnixStream, File);

impl Source for Cursor<Vec<u8>> {}

impl<S: Source + ?Sized> Source for Box<S> {
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        (**self).wait_readable(timeout)
    }
}

#[derive(Debug)]
pub struct StreamReader {
    rx:        Option<Receiver<Vec<u8>>>,
    stop:      Arc<AtomicBool>,
    handle:    Option<JoinHandle<()>>,
    exhausted: bool,
}

impl StreamReader {
    /// Take ownership of `stream` and start draining it.
    pub fn start<R: Source + 'static>(mut stream: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stream-reader".into())
            .spawn(move || {
                let mut buf = [0u8; CHUNK];
                // The stream is dropped (and its fd closed) when this returns.
                while !flag.load(Ordering::Acquire) {
                    match stream.wait_readable(STOP_CHECK) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            tracing::debug!("stream reader stopping: {}", e);
                            break;
                        }
                    }
                    match stream.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!("stream reader stopping: {}", e);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { rx: Some(rx), stop, handle: Some(handle), exhausted: false })
    }

    /// Wait up to `timeout` for the next chunk. `None` on timeout, after
    /// EOF, or once stopped.
    pub fn read(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let rx = self.rx.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Non-blocking variant of [`read`](Self::read).
    pub fn try_read(&mut self) -> Option<Vec<u8>> {
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(chunk) => Some(chunk),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Collect everything still queued or in flight, waiting at most
    /// `timeout` in total.
    pub fn drain(&mut self, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while !self.is_exhausted() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.read(left) {
                Some(chunk) => out.extend_from_slice(&chunk),
                None => break,
            }
        }
        out
    }

    /// True once the stream hit EOF and every chunk was handed out, or
    /// after `stop`.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted || self.rx.is_none()
    }

    /// Stop reading. Idempotent.
    ///
    /// Drops the queue and flags the background thread, which notices
    /// within one poll interval, returns, and closes the stream.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.rx = None;
        if self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(h) = self.handle.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Hands out `data` in the given chunk sizes, cycling through them.
    struct Chunked {
        data:  Vec<u8>,
        pos:   usize,
        sizes: Vec<usize>,
        next:  usize,
    }

    impl Source for Chunked {}

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            let want = self.sizes[self.next % self.sizes.len()].max(1);
            self.next += 1;
            let n = want.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn collect_all(r: &mut StreamReader) -> Vec<u8> {
        let mut out = Vec::new();
        while !r.is_exhausted() {
            if let Some(c) = r.read(Duration::from_millis(200)) {
                out.extend(c);
            }
        }
        out
    }

    #[test]
    fn returns_none_on_timeout_instead_of_blocking() {
        // A pipe with a live writer and no data.
        let (rd, _wr) = UnixStream::pair().unwrap();
        let mut r = StreamReader::start(rd).unwrap();
        let t = Instant::now();
        assert_eq!(r.read(Duration::from_millis(50)), None);
        assert!(t.elapsed() < Duration::from_secs(2));
        assert!(!r.is_exhausted());
        r.stop();
        r.stop();
        assert_eq!(r.read(Duration::from_millis(10)), None);
        assert!(r.is_exhausted());
    }

    #[test]
    fn stop_ends_the_thread_while_the_writer_lives() {
        let (rd, _wr) = UnixStream::pair().unwrap();
        let mut r = StreamReader::start(rd).unwrap();
        let handle = r.handle.take().unwrap();
        r.stop();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        handle.join().unwrap();
    }

    #[test]
    fn reports_exhaustion_after_eof() {
        let mut r = StreamReader::start(io::Cursor::new(b"abc".to_vec())).unwrap();
        assert_eq!(r.drain(Duration::from_secs(5)), b"abc");
        assert!(r.is_exhausted());
    }

    #[test]
    fn closed_stream_ends_quietly() {
        let (rd, wr) = UnixStream::pair().unwrap();
        let mut r = StreamReader::start(rd).unwrap();
        drop(wr);
        assert_eq!(r.drain(Duration::from_secs(5)), Vec::<u8>::new());
        assert!(r.is_exhausted());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn preserves_order_without_loss(
            data  in proptest::collection::vec(any::<u8>(), 0..20_000),
            sizes in proptest::collection::vec(1usize..9000, 1..16),
        ) {
            let mut r = StreamReader::start(Chunked { data: data.clone(), pos: 0, sizes, next: 0 }).unwrap();
            prop_assert_eq!(collect_all(&mut r), data);
        }

        #[test]
        fn stop_mid_stream_yields_a_prefix(
            data  in proptest::collection::vec(any::<u8>(), 1..20_000),
            sizes in proptest::collection::vec(1usize..512, 1..16),
            reads_before_stop in 0usize..20,
        ) {
            let mut r = StreamReader::start(Chunked { data: data.clone(), pos: 0, sizes, next: 0 }).unwrap();
            let mut got = Vec::new();
            for _ in 0..reads_before_stop {
                if let Some(c) = r.read(Duration::from_millis(100)) {
                    got.extend(c);
                }
            }
            r.stop();
            prop_assert!(r.read(Duration::from_millis(1)).is_none());
            prop_assert!(got.len() <= data.len());
            prop_assert_eq!(&data[..got.len()], &got[..]);
        }
    }
}
