//! Scoped allocation with the lifetime rules of an APR pool.
//!
//! Everything allocated from a [`Pool`] borrows it, so nothing can outlive the
//! pool it came from. Cleanups registered on a pool run exactly once, children
//! first and in reverse registration order, when the pool is cleared or
//! destroyed.
#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::debug;

use crate::{Error, SvnError, check_error};

type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
struct PoolState {
    blocks: RefCell<Vec<NonNull<[u8]>>>,
    cleanups: RefCell<Vec<Cleanup>>,
    children: RefCell<Vec<Rc<PoolState>>>,
    allocated: Cell<usize>,
    destroyed: Cell<bool>,
}

impl PoolState {
    fn run_cleanups(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.iter().rev() {
            child.destroy();
        }
        loop {
            // A cleanup may register further cleanups; drain until empty.
            let Some(cleanup) = self.cleanups.borrow_mut().pop() else {
                break;
            };
            cleanup();
        }
    }

    fn free_blocks(&self) {
        for block in self.blocks.borrow_mut().drain(..) {
            // SAFETY: every block was produced by `Box::leak` in
            // `alloc_bytes` and is freed exactly once here. Outstanding
            // borrows are impossible: they are tied to `&Pool`, and freeing
            // requires `&mut Pool` or ownership.
            drop(unsafe { Box::from_raw(block.as_ptr()) });
        }
        self.allocated.set(0);
    }

    fn clear(&self) {
        self.run_cleanups();
        self.free_blocks();
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.clear();
    }
}

/// A pool-allocated, length-counted byte string (`svn_string_t`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SvnString<'pool> {
    data: &'pool [u8],
}

impl<'pool> SvnString<'pool> {
    pub fn as_bytes(&self) -> &'pool [u8] {
        self.data
    }

    /// Returns the contents as UTF-8, if valid.
    pub fn as_str(&self) -> Option<&'pool str> {
        std::str::from_utf8(self.data).ok()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Debug for SvnString<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SvnString({:?})", String::from_utf8_lossy(self.data))
    }
}

/// An allocation scope (`apr_pool_t`).
///
/// `'parent` ties a subpool to the pool it was created from. Dropping a pool
/// destroys it; [`Pool::destroy`] does the same explicitly.
pub struct Pool<'parent> {
    state: Rc<PoolState>,
    _parent: PhantomData<&'parent ()>,
}

impl Pool<'static> {
    /// Creates a root pool.
    pub fn new() -> Self {
        Self {
            state: Rc::new(PoolState::default()),
            _parent: PhantomData,
        }
    }
}

impl Default for Pool<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'parent> Pool<'parent> {
    /// Creates a child pool that is destroyed no later than `self`.
    pub fn subpool(&self) -> Pool<'_> {
        let state = Rc::new(PoolState::default());
        let mut children = self.state.children.borrow_mut();
        children.retain(|child| !child.destroyed.get());
        children.push(Rc::clone(&state));
        Pool {
            state,
            _parent: PhantomData,
        }
    }

    /// Copies `bytes` into the pool.
    pub fn alloc_bytes(&self, bytes: &[u8]) -> SvnString<'_> {
        let block: Box<[u8]> = bytes.into();
        let len = block.len();
        let ptr = NonNull::from(Box::leak(block));
        self.state.blocks.borrow_mut().push(ptr);
        self.state
            .allocated
            .set(self.state.allocated.get().saturating_add(len));
        // SAFETY: the block stays alive until the pool is cleared or
        // destroyed, both of which need `&mut self` or `self`, so no
        // borrow tied to `&self` can observe the free.
        SvnString {
            data: unsafe { ptr.as_ref() },
        }
    }

    pub fn alloc_str(&self, s: &str) -> SvnString<'_> {
        self.alloc_bytes(s.as_bytes())
    }

    /// Bytes currently allocated from this pool (not counting subpools).
    pub fn allocated(&self) -> usize {
        self.state.allocated.get()
    }

    /// Registers `cleanup` to run when the pool is cleared or destroyed.
    pub fn register_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.state.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Runs cleanups, destroys subpools and frees every allocation, keeping
    /// the pool usable.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Destroys the pool now.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Pool<'_> {
    fn drop(&mut self) {
        self.state.destroy();
    }
}

impl Debug for Pool<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("allocated", &self.state.allocated.get())
            .field("cleanups", &self.state.cleanups.borrow().len())
            .field("children", &self.state.children.borrow().len())
            .finish()
    }
}

/// Runs `f` in a scratch pool and translates its native result.
///
/// The scratch pool is a subpool of `parent` when one is given, otherwise a
/// fresh root pool. It is destroyed exactly once on every exit path before
/// the error, if any, is translated with [`check_error`].
pub fn run_with_pool<T>(
    parent: Option<&Pool<'_>>,
    f: impl FnOnce(&Pool<'_>) -> Result<T, SvnError>,
) -> Result<T, Error> {
    let result = match parent {
        Some(parent) => {
            let pool = parent.subpool();
            let result = f(&pool);
            pool.destroy();
            result
        }
        None => {
            let pool = Pool::new();
            let result = f(&pool);
            pool.destroy();
            result
        }
    };
    if let Err(err) = &result {
        debug!(code = err.apr_err(), error = %err, "native call failed");
    }
    check_error(result)
}

/// Evaluates a native call in a scratch pool and returns early with the
/// translated error on failure.
///
/// ```ignore
/// let rev = run_svn_with_pool!(|pool| session_call(pool));
/// ```
#[macro_export]
macro_rules! run_svn_with_pool {
    ($f:expr) => {
        $crate::run_with_pool(None, $f)?
    };
    ($parent:expr, $f:expr) => {
        $crate::run_with_pool(Some($parent), $f)?
    };
}
