//! Timeout-bounded reads and writes.
//!
//! The transport lives on a dedicated worker thread. Each request is sent to
//! the worker over a channel and the caller waits for the reply with
//! `recv_timeout`, so a read or write of `len` bytes never blocks longer than
//! `byte_timeout * len`.
//!
//! Timeout policy: cancel, then fence. When a deadline passes, the request's
//! cancel flag is raised and the worker abandons the request the next time the
//! transport reports "nothing yet". The reply of the abandoned request is still
//! owed; the next request first drains it (waiting at most `fence_timeout`)
//! and fails with [`LinkError::Fenced`] if the worker is still busy. A late
//! worker therefore never touches the byte stream of a later request.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use super::error::LinkError;
use super::{LinkConfig, Transport};

enum Op {
    Write(Vec<u8>),
    Read(usize),
    Discard,
}

struct Request {
    op: Op,
    cancel: Arc<AtomicBool>,
}

type Reply = io::Result<Vec<u8>>;

/// Owner of a transport running on its own worker thread.
pub struct BoundedIo {
    requests: Option<Sender<Request>>,
    replies: Receiver<Reply>,
    worker: Option<JoinHandle<()>>,
    abandoned: Option<Arc<AtomicBool>>,
    config: LinkConfig,
}

impl BoundedIo {
    /// Move `transport` onto a new worker thread.
    pub fn spawn<T: Transport>(transport: T, config: &LinkConfig) -> Result<Self, LinkError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("cubesync-link".to_string())
            .spawn(move || run_worker(transport, request_rx, reply_tx))?;
        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            worker: Some(worker),
            abandoned: None,
            config: config.clone(),
        })
    }

    /// Write all of `bytes` within `byte_timeout * bytes.len()`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.submit(Op::Write(bytes.to_vec()), bytes.len()).map(|_| ())
    }

    /// Read up to `len` bytes within `byte_timeout * len`.
    ///
    /// Returns fewer than `len` bytes only when the transport reached end of
    /// stream; callers must check the length.
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>, LinkError> {
        self.submit(Op::Read(len), len)
    }

    /// Drop bytes the transport received but nobody read.
    pub fn discard_input(&mut self) -> Result<(), LinkError> {
        self.submit(Op::Discard, 1).map(|_| ())
    }

    /// True while a timed-out request has not been drained yet.
    pub fn is_fenced(&self) -> bool {
        self.abandoned.is_some()
    }

    fn submit(&mut self, op: Op, len: usize) -> Result<Vec<u8>, LinkError> {
        self.fence()?;

        let deadline = self.config.deadline_for(len);
        let cancel = Arc::new(AtomicBool::new(false));
        let requests = self.requests.as_ref().ok_or(LinkError::Disconnected)?;
        requests
            .send(Request {
                op,
                cancel: Arc::clone(&cancel),
            })
            .map_err(|_| LinkError::Disconnected)?;

        match self.replies.recv_timeout(deadline) {
            Ok(reply) => Ok(reply?),
            Err(RecvTimeoutError::Timeout) => {
                warn!("link request of {len} byte(s) timed out after {deadline:?}");
                cancel.store(true, Ordering::Release);
                self.abandoned = Some(cancel);
                Err(LinkError::Timeout {
                    len,
                    after: deadline,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Disconnected),
        }
    }

    fn fence(&mut self) -> Result<(), LinkError> {
        if self.abandoned.is_none() {
            return Ok(());
        }
        let waited = self.config.fence_timeout();
        match self.replies.recv_timeout(waited) {
            Ok(stale) => {
                debug!("discarded reply of abandoned request: {stale:?}");
                self.abandoned = None;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("abandoned request still running after {waited:?}");
                Err(LinkError::Fenced { waited })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.abandoned = None;
                Err(LinkError::Disconnected)
            }
        }
    }
}

impl Drop for BoundedIo {
    fn drop(&mut self) {
        if let Some(cancel) = self.abandoned.take() {
            cancel.store(true, Ordering::Release);
        }
        // closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("link worker panicked");
            }
        }
    }
}

fn run_worker<T: Transport>(mut transport: T, requests: Receiver<Request>, replies: Sender<Reply>) {
    while let Ok(Request { op, cancel }) = requests.recv() {
        let reply = match op {
            Op::Write(bytes) => write_all(&mut transport, &bytes, &cancel),
            Op::Read(len) => read_exact(&mut transport, len, &cancel),
            Op::Discard => transport.discard_input().map(|()| Vec::new()),
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("link worker stopped");
}

fn write_all<T: Transport>(transport: &mut T, bytes: &[u8], cancel: &AtomicBool) -> Reply {
    trace!("tx {bytes:02x?}");
    let mut written = 0;
    while written < bytes.len() {
        check_cancel(cancel, "write")?;
        match transport.send(&bytes[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(err) if is_idle(&err) => {}
            Err(err) => return Err(err),
        }
    }
    loop {
        check_cancel(cancel, "write")?;
        match transport.flush() {
            Ok(()) => return Ok(Vec::new()),
            Err(err) if is_idle(&err) => {}
            Err(err) => return Err(err),
        }
    }
}

fn read_exact<T: Transport>(transport: &mut T, len: usize, cancel: &AtomicBool) -> Reply {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        check_cancel(cancel, "read")?;
        match transport.receive(&mut buf[filled..]) {
            Ok(0) => {
                buf.truncate(filled);
                break;
            }
            Ok(n) => filled += n,
            Err(err) if is_idle(&err) => {}
            Err(err) => return Err(err),
        }
    }
    trace!("rx {buf:02x?}");
    Ok(buf)
}

fn check_cancel(cancel: &AtomicBool, what: &str) -> io::Result<()> {
    if cancel.load(Ordering::Acquire) {
        return Err(io::Error::new(
            io::ErrorKind::Interrupted,
            format!("{what} abandoned after timeout"),
        ));
    }
    Ok(())
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// Transport that replays scripted input, one chunk per receive call.
    struct Scripted {
        input: Arc<Mutex<VecDeque<Vec<u8>>>>,
        sent: Arc<Mutex<Vec<u8>>>,
        idle: Duration,
        hang_up: bool,
    }

    impl Transport for Scripted {
        fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
            // accept at most two bytes per call
            let n = bytes.len().min(2);
            self.sent.lock().unwrap().extend_from_slice(&bytes[..n]);
            Ok(n)
        }

        fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let next = self.input.lock().unwrap().pop_front();
            match next {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None if self.hang_up => Ok(0),
                None => {
                    thread::sleep(self.idle);
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    fn config(byte_timeout_ms: u64) -> LinkConfig {
        LinkConfig {
            byte_timeout_ms,
            fence_timeout_ms: 500,
            ..LinkConfig::default()
        }
    }

    fn scripted(chunks: &[&[u8]], hang_up: bool) -> (Scripted, Arc<Mutex<VecDeque<Vec<u8>>>>) {
        let input = Arc::new(Mutex::new(
            chunks.iter().map(|chunk| chunk.to_vec()).collect::<VecDeque<_>>(),
        ));
        let transport = Scripted {
            input: Arc::clone(&input),
            sent: Arc::new(Mutex::new(Vec::new())),
            idle: Duration::from_millis(2),
            hang_up,
        };
        (transport, input)
    }

    #[test]
    fn read_assembles_chunks() {
        let (transport, _) = scripted(&[&[1, 2], &[3], &[4, 5]], false);
        let mut link = BoundedIo::spawn(transport, &config(100)).unwrap();
        assert_eq!(link.read(5).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn write_reaches_transport() {
        let (transport, _) = scripted(&[], false);
        let sent = Arc::clone(&transport.sent);
        let mut link = BoundedIo::spawn(transport, &config(100)).unwrap();
        link.write(&[0x73, 0x02, 0x01, 0x05, 0x42]).unwrap();
        assert_eq!(*sent.lock().unwrap(), vec![0x73, 0x02, 0x01, 0x05, 0x42]);
    }

    #[test]
    fn silent_read_times_out_within_deadline() {
        let (transport, _) = scripted(&[], false);
        let mut link = BoundedIo::spawn(transport, &config(20)).unwrap();

        let started = Instant::now();
        let err = link.read(2).unwrap_err();
        assert!(matches!(err, LinkError::Timeout { len: 2, .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(link.is_fenced());
    }

    #[test]
    fn fence_discards_late_data_of_abandoned_read() {
        let (transport, input) = scripted(&[], false);
        let mut link = BoundedIo::spawn(transport, &config(20)).unwrap();
        assert!(link.read(1).is_err());
        // give the worker time to notice the cancel flag
        thread::sleep(Duration::from_millis(50));

        input.lock().unwrap().push_back(vec![0x42]);
        assert_eq!(link.read(1).unwrap(), vec![0x42]);
        assert!(!link.is_fenced());
    }

    #[test]
    fn hang_up_returns_short_read() {
        let (transport, _) = scripted(&[&[9, 9, 9]], true);
        let mut link = BoundedIo::spawn(transport, &config(100)).unwrap();
        assert_eq!(link.read(64).unwrap(), vec![9, 9, 9]);
    }

    struct Stuck;

    impl Transport for Stuck {
        fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(300));
            Ok(bytes.len())
        }

        fn receive(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn stuck_worker_fences_next_request() {
        let mut link = BoundedIo::spawn(
            Stuck,
            &LinkConfig {
                byte_timeout_ms: 10,
                fence_timeout_ms: 20,
                ..LinkConfig::default()
            },
        )
        .unwrap();

        assert!(matches!(link.write(&[1]), Err(LinkError::Timeout { .. })));
        assert!(matches!(link.write(&[2]), Err(LinkError::Fenced { .. })));
        assert!(link.is_fenced());
    }

    /// Port whose writes never complete, reporting its own short timeout.
    struct Stalled;

    impl Transport for Stalled {
        fn send(&mut self, _bytes: &[u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(2));
            Err(io::ErrorKind::TimedOut.into())
        }

        fn receive(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn stalled_write_times_out_on_link_deadline() {
        let mut link = BoundedIo::spawn(Stalled, &config(20)).unwrap();

        let started = Instant::now();
        let err = link.write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, LinkError::Timeout { len: 3, .. }));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(link.is_fenced());

        // the worker gives up on the cancelled write and the fence clears
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(link.write(&[4]), Err(LinkError::Timeout { .. })));
    }
}
