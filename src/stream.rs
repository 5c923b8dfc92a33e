//! Native streams backed by host file-like objects.

use std::cell::RefCell;
use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use crate::error::{HostFailure, set_pending};
use crate::pool::Pool;
use crate::value::HostError;

/// A file-like object living in the host.
pub trait HostStream {
    /// Reads up to `len` bytes; an empty result means end of stream.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, HostError>;
    fn write(&mut self, data: &[u8]) -> Result<(), HostError>;
    fn close(&mut self) -> Result<(), HostError>;
}

type Shared = Rc<RefCell<Option<Box<dyn HostStream>>>>;

/// A native stream over a host object (`svn_stream_t` from `new_py_stream`).
///
/// The stream holds a reference to the host object until its pool is cleared
/// or destroyed; afterwards every operation fails.
pub struct Stream<'pool> {
    host: Shared,
    closed: bool,
    _pool: PhantomData<&'pool ()>,
}

/// Wraps `host` in a native stream whose lifetime is bounded by `pool`
/// (`new_py_stream`).
pub fn new_stream<'pool>(pool: &'pool Pool<'_>, host: Box<dyn HostStream>) -> Stream<'pool> {
    let shared: Shared = Rc::new(RefCell::new(Some(host)));
    let released = Rc::clone(&shared);
    pool.register_cleanup(move || {
        released.borrow_mut().take();
    });
    Stream {
        host: shared,
        closed: false,
        _pool: PhantomData,
    }
}

fn host_failure(err: HostError) -> io::Error {
    set_pending(err.into());
    io::Error::other(HostFailure)
}

impl Stream<'_> {
    fn with_host<T>(
        &mut self,
        f: impl FnOnce(&mut dyn HostStream) -> Result<T, HostError>,
    ) -> io::Result<T> {
        if self.closed {
            return Err(io::Error::other("stream is closed"));
        }
        let mut slot = self.host.borrow_mut();
        let host = slot
            .as_mut()
            .ok_or_else(|| io::Error::other("stream pool destroyed"))?;
        f(host.as_mut()).map_err(host_failure)
    }

    /// Closes the host object. Closing twice is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.with_host(|host| host.close());
        self.closed = true;
        result
    }
}

impl io::Read for Stream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.with_host(|host| host.read(buf.len()))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl io::Write for Stream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_host(|host| host.write(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl tokio::io::AsyncWrite for Stream<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(io::Write::write(self.get_mut(), buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
}

/// An in-memory host stream, the equivalent of a `BytesIO`.
///
/// Clones share the same buffer, so the caller can keep one handle and pass
/// another to an operation.
#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream positioned at the start of `data`.
    pub fn with_contents(data: impl Into<Vec<u8>>) -> Self {
        let stream = Self::default();
        stream.lock().data = data.into();
        stream
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn closed_file() -> HostError {
    HostError::new("ValueError", "I/O operation on closed file.")
}

impl HostStream for MemoryStream {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, HostError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed_file());
        }
        let start = inner.pos.min(inner.data.len());
        let end = start.saturating_add(len).min(inner.data.len());
        inner.pos = end;
        Ok(inner.data[start..end].to_vec())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HostError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed_file());
        }
        inner.data.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<(), HostError> {
        self.lock().closed = true;
        Ok(())
    }
}
