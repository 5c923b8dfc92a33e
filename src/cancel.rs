//! Cancellation callbacks polled by long-running operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{has_pending, host_error, set_pending};
use crate::value::HostCallable;
use crate::{SvnError, codes};

/// Polled between received items; an `Err` aborts the operation.
pub type CancelFunc = Box<dyn FnMut() -> Result<(), SvnError> + Send>;

/// A flag the host raises to interrupt a running operation (its signal
/// handler, a UI button, ...).
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lowers the flag so the token can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn cancelled() -> SvnError {
    SvnError::new(codes::CANCELLED, "Operation cancelled")
}

/// The host's cancellation check (`py_cancel_func`).
///
/// Fails with `SVN_ERR_CANCELLED` when `token` has fired. When a host
/// exception is already pending the cancellation wraps the host marker, so
/// the pending exception is what the caller finally sees.
pub fn host_cancel_func(token: CancelToken) -> CancelFunc {
    Box::new(move || {
        if has_pending() {
            debug!("host exception pending; cancelling");
            return Err(host_error().wrap(codes::CANCELLED, "Operation cancelled"));
        }
        if token.is_cancelled() {
            debug!("cancellation requested by host");
            return Err(cancelled());
        }
        Ok(())
    })
}

/// Adapts a host callable: a truthy return cancels, a raised exception is
/// left pending and cancels as well.
pub fn callable_cancel_func(mut callable: Box<dyn HostCallable + Send>) -> CancelFunc {
    Box::new(move || match callable.call(Vec::new()) {
        Ok(value) if value.is_truthy() => Err(cancelled()),
        Ok(_) => Ok(()),
        Err(err) => {
            set_pending(err.into());
            Err(host_error().wrap(codes::CANCELLED, "Operation cancelled"))
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::take_pending;
    use crate::value::{HostError, Value};
    use crate::{Error, check_error};

    #[test]
    fn token_cancels_with_plain_cancelled_error() {
        let token = CancelToken::new();
        let mut cancel = host_cancel_func(token.clone());
        assert!(cancel().is_ok());
        token.cancel();
        let err = cancel().unwrap_err();
        assert_eq!(err.apr_err(), codes::CANCELLED);
        assert!(!err.is_host_marker());
        token.reset();
        assert!(cancel().is_ok());
    }

    #[test]
    fn pending_host_exception_surfaces_through_check_error() {
        let mut cancel = host_cancel_func(CancelToken::new());
        set_pending(Error::Host(HostError::new("KeyboardInterrupt", "")));
        let err = cancel().unwrap_err();
        assert_eq!(err.apr_err(), codes::CANCELLED);
        match check_error::<()>(Err(err)).unwrap_err() {
            Error::Host(h) => assert_eq!(h.kind, "KeyboardInterrupt"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn callable_cancel_func_follows_truthiness_and_exceptions() {
        let mut calls = 0;
        let mut cancel = callable_cancel_func(Box::new(move |_args: Vec<Value>| {
            calls += 1;
            match calls {
                1 => Ok(Value::Bool(false)),
                2 => Ok(Value::Int(1)),
                _ => Err(HostError::new("ValueError", "bad")),
            }
        }));
        assert!(cancel().is_ok());
        assert_eq!(cancel().unwrap_err().apr_err(), codes::CANCELLED);
        let err = cancel().unwrap_err();
        assert!(err.is_host_marker());
        assert!(matches!(take_pending(), Some(Error::Host(h)) if h.kind == "ValueError"));
    }
}
