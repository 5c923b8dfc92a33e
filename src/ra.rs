//! Host-facing remote access (`RemoteAccess`).
//!
//! Every operation runs the async [`Session`] to completion on a private
//! current-thread runtime, inside a scratch pool, and reports failures through
//! [`check_error`](crate::check_error).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Runtime;
use tracing::debug;

use crate::auth::Auth;
use crate::cancel::CancelFunc;
use crate::config::{Config, config_hash_from_object};
use crate::convert::{
    dict_to_prop_hash, dirent_to_dict, prop_hash_to_dict, revnum_list_to_array,
    string_list_to_array, wrap_lock,
};
use crate::editor::{CommitCallback, CommitEditor};
use crate::error::{host_error, set_pending};
use crate::log::{LogIterator, log_receiver};
use crate::options::{ClientOptions, CommitLockToken, CommitOptions, LogOptions, LogRevProps};
use crate::path::{require_relative, validate_rel_dir_path};
use crate::pool::{Pool, run_with_pool};
use crate::session::Session;
use crate::stream::{HostStream, new_stream};
use crate::types::{Depth, DirentField, LogEntry, NodeKind, Revnum, INVALID_REVNUM};
use crate::value::{HostCallable, Key, Value};
use crate::{Error, SvnError};

pub(crate) struct RaInner {
    pub(crate) runtime: Runtime,
    pub(crate) session: Session,
    pub(crate) cancel: Option<CancelFunc>,
}

pub(crate) fn lock_inner(inner: &Mutex<RaInner>) -> MutexGuard<'_, RaInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn opt_rev(rev: Revnum) -> Option<Revnum> {
    (rev >= 0).then_some(rev)
}

/// Arguments of `get_log` / `iter_log`, with the host's defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct LogParams {
    /// List of paths, or `None` for the session URL.
    pub paths: Value,
    pub start: Revnum,
    pub end: Revnum,
    /// `0` for no limit.
    pub limit: u64,
    pub discover_changed_paths: bool,
    pub strict_node_history: bool,
    pub include_merged_revisions: bool,
    /// List of revision property names, or `None` for all of them.
    pub revprops: Value,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            paths: Value::None,
            start: 0,
            end: INVALID_REVNUM,
            limit: 0,
            discover_changed_paths: false,
            strict_node_history: true,
            include_merged_revisions: false,
            revprops: Value::None,
        }
    }
}

impl LogParams {
    pub fn new(paths: Value, start: Revnum, end: Revnum) -> Self {
        Self {
            paths,
            start,
            end,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_changed_paths(mut self, discover_changed_paths: bool) -> Self {
        self.discover_changed_paths = discover_changed_paths;
        self
    }

    #[must_use]
    pub fn with_merged_revisions(mut self, include_merged_revisions: bool) -> Self {
        self.include_merged_revisions = include_merged_revisions;
        self
    }

    #[must_use]
    pub fn with_revprops(mut self, revprops: Value) -> Self {
        self.revprops = revprops;
        self
    }

    fn to_options(&self, pool: &Pool<'_>) -> Result<LogOptions, Error> {
        let paths = match string_list_to_array(pool, &self.paths)? {
            Some(paths) => paths
                .iter()
                .map(|p| validate_rel_dir_path(&String::from_utf8_lossy(p.as_bytes())))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![String::new()],
        };
        let revprops = match string_list_to_array(pool, &self.revprops)? {
            Some(names) => LogRevProps::Custom(
                names
                    .iter()
                    .map(|n| String::from_utf8_lossy(n.as_bytes()).into_owned())
                    .collect(),
            ),
            None => LogRevProps::All,
        };
        Ok(LogOptions {
            target_paths: paths,
            start_rev: self.start,
            end_rev: self.end,
            changed_paths: self.discover_changed_paths,
            strict_node: self.strict_node_history,
            limit: self.limit,
            include_merged_revisions: self.include_merged_revisions,
            revprops,
        })
    }
}

/// A remote-access session, as handed to host code.
///
/// Only one operation runs at a time. A call made while another is in
/// progress (from inside a callback, say) or while a commit editor is open
/// fails with [`Error::Busy`].
pub struct RemoteAccess {
    inner: Arc<Mutex<RaInner>>,
    busy: Arc<AtomicBool>,
    url: Mutex<String>,
}

/// Holds the busy flag for the duration of one operation.
struct Operation<'a> {
    busy: &'a AtomicBool,
    inner: MutexGuard<'a, RaInner>,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

fn busy_error() -> Error {
    Error::Busy("Remote access object already in use".to_string())
}

fn call_host(callback: &mut dyn HostCallable, args: Vec<Value>) -> Result<(), SvnError> {
    match callback.call(args) {
        Ok(_) => Ok(()),
        Err(err) => {
            set_pending(err.into());
            Err(host_error())
        }
    }
}

impl RemoteAccess {
    /// Opens a session to `url`.
    ///
    /// Timeouts come from the `servers` configuration (`config`, or the
    /// default configuration when `None`).
    pub fn open(url: &str, auth: Option<Auth>, config: Option<&Config>) -> Result<Self, Error> {
        let options = ClientOptions::from_config(config_hash_from_object(config))?;
        Self::open_with_options(url, options, auth)
    }

    pub fn open_with_options(url: &str, options: ClientOptions, auth: Option<Auth>) -> Result<Self, Error> {
        let inner = run_with_pool(None, |_pool| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let session = runtime.block_on(Session::open(url, options, auth))?;
            Ok(RaInner {
                runtime,
                session,
                cancel: None,
            })
        })?;
        debug!(url, uuid = inner.session.uuid(), "remote access opened");
        Ok(Self {
            url: Mutex::new(inner.session.url().to_string()),
            inner: Arc::new(Mutex::new(inner)),
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    fn begin(&self) -> Result<Operation<'_>, Error> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(busy_error());
        }
        Ok(Operation {
            busy: &self.busy,
            inner: lock_inner(&self.inner),
        })
    }

    /// Installs the cancel func polled by long-running operations.
    pub fn set_cancel_func(&self, cancel: Option<CancelFunc>) -> Result<(), Error> {
        let mut op = self.begin()?;
        op.inner.cancel = cancel;
        Ok(())
    }

    pub fn get_latest_revnum(&self) -> Result<Revnum, Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        run_with_pool(None, |_pool| runtime.block_on(session.latest_revnum()))
    }

    pub fn get_uuid(&self) -> Result<String, Error> {
        Ok(self.begin()?.inner.session.uuid().to_string())
    }

    pub fn get_repos_root(&self) -> Result<String, Error> {
        Ok(self.begin()?.inner.session.repos_root().to_string())
    }

    /// The current session URL.
    pub fn get_url(&self) -> Result<String, Error> {
        Ok(self.begin()?.inner.session.url().to_string())
    }

    pub fn reparent(&self, url: &str) -> Result<(), Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        run_with_pool(None, |_pool| runtime.block_on(session.reparent(url)))?;
        *self.url.lock().unwrap_or_else(PoisonError::into_inner) = session.url().to_string();
        Ok(())
    }

    pub fn has_capability(&self, capability: &str) -> Result<bool, Error> {
        let op = self.begin()?;
        run_with_pool(None, |_pool| op.inner.session.has_capability(capability))
    }

    /// Lists `path@revision` (negative for HEAD).
    ///
    /// Returns `(dirents, fetched_rev, props)`; `fields` is a mask of
    /// `DIRENT_*` bits and the node kind is always reported.
    pub fn get_dir(&self, path: &str, revision: Revnum, fields: u32) -> Result<(Value, Revnum, Value), Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let fields = DirentField::from_mask(fields);
        let listing = run_with_pool(None, |_pool| {
            runtime.block_on(session.get_dir(path, opt_rev(revision), &fields, true))
        })?;
        let dirents = listing
            .entries
            .iter()
            .map(|entry| (Key::Str(entry.name.clone()), dirent_to_dict(entry)))
            .collect();
        Ok((
            Value::Dict(dirents),
            listing.revision,
            prop_hash_to_dict(Some(&listing.props)),
        ))
    }

    pub fn check_path(&self, path: &str, revision: Revnum) -> Result<NodeKind, Error> {
        require_relative(path)?;
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        run_with_pool(None, |_pool| runtime.block_on(session.check_path(path, opt_rev(revision))))
    }

    /// Dirent dict for `path@revision`, or `None` when nothing is there.
    pub fn stat(&self, path: &str, revision: Revnum) -> Result<Value, Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let entry = run_with_pool(None, |_pool| runtime.block_on(session.stat(path, opt_rev(revision))))?;
        Ok(entry.as_ref().map_or(Value::None, dirent_to_dict))
    }

    /// `{revnum: path}` for each of `revisions` in which `path@peg_revision`
    /// existed.
    pub fn get_locations(&self, path: &str, peg_revision: Revnum, revisions: &Value) -> Result<Value, Error> {
        require_relative(path)?;
        let revisions = revnum_list_to_array(revisions)?.unwrap_or_default();
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let locations = run_with_pool(None, |_pool| {
            runtime.block_on(session.get_locations(path, peg_revision, &revisions))
        })?;
        Ok(Value::Dict(
            locations
                .into_iter()
                .map(|loc| (Key::Int(loc.revision), Value::Str(loc.path)))
                .collect(),
        ))
    }

    /// Calls `callback(changed_paths, revnum, revprops[, has_children])` for
    /// each log entry. An exception raised by the callback stops the log and
    /// is returned unchanged.
    pub fn get_log(&self, callback: &mut dyn HostCallable, params: &LogParams) -> Result<(), Error> {
        let pool = Pool::new();
        let options = params.to_options(&pool)?;
        let mut op = self.begin()?;
        let RaInner {
            runtime,
            session,
            cancel,
        } = &mut *op.inner;
        let mut receiver = log_receiver(callback, params.include_merged_revisions);
        run_with_pool(Some(&pool), |_pool| {
            runtime.block_on(session.log(&options, &mut receiver, cancel.as_mut()))
        })
    }

    /// Collects the log up front and iterates over
    /// `(changed_paths, revnum, revprops[, has_children])` tuples whose
    /// changed paths carry the node kind.
    pub fn iter_log(&self, params: &LogParams) -> Result<LogIterator, Error> {
        let pool = Pool::new();
        let options = params.to_options(&pool)?;
        let mut op = self.begin()?;
        let RaInner {
            runtime,
            session,
            cancel,
        } = &mut *op.inner;
        let mut entries = Vec::new();
        let mut receiver = |entry: LogEntry| {
            entries.push(entry);
            Ok(())
        };
        run_with_pool(Some(&pool), |_pool| {
            runtime.block_on(session.log(&options, &mut receiver, cancel.as_mut()))
        })?;
        Ok(LogIterator::new(entries, params.include_merged_revisions))
    }

    /// Writes `path@revision` into `stream`; returns `(fetched_rev, props)`.
    pub fn get_file(
        &self,
        path: &str,
        stream: Box<dyn HostStream>,
        revision: Revnum,
    ) -> Result<(Revnum, Value), Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let (fetched, props) = run_with_pool(None, |pool| {
            let mut out = new_stream(pool, stream);
            runtime.block_on(session.get_file(path, opt_rev(revision), true, &mut out))
        })?;
        Ok((fetched, prop_hash_to_dict(Some(&props))))
    }

    /// Calls `handler(path, revnum, revprops[, result_of_merge])` for every
    /// revision in which `path` changed between `start` and `end`.
    pub fn get_file_revs(
        &self,
        path: &str,
        start: Revnum,
        end: Revnum,
        handler: &mut dyn HostCallable,
        include_merged_revisions: bool,
    ) -> Result<(), Error> {
        let mut op = self.begin()?;
        let RaInner {
            runtime,
            session,
            cancel,
        } = &mut *op.inner;
        run_with_pool(None, |_pool| {
            let revs = runtime.block_on(session.get_file_revs(
                path,
                opt_rev(start),
                opt_rev(end),
                include_merged_revisions,
            ))?;
            for rev in revs {
                if let Some(cancel) = cancel.as_mut() {
                    cancel()?;
                }
                let mut args = vec![
                    Value::Str(rev.path),
                    Value::Int(rev.revision),
                    prop_hash_to_dict(Some(&rev.rev_props)),
                ];
                if include_merged_revisions {
                    args.push(Value::Bool(rev.merged_revision));
                }
                call_host(handler, args)?;
            }
            Ok(())
        })
    }

    pub fn rev_proplist(&self, revision: Revnum) -> Result<Value, Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let props = run_with_pool(None, |_pool| runtime.block_on(session.rev_proplist(revision)))?;
        Ok(prop_hash_to_dict(Some(&props)))
    }

    /// Sets a revision property; `None` deletes it.
    pub fn change_rev_prop(&self, revision: Revnum, name: &str, value: Option<&[u8]>) -> Result<(), Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        run_with_pool(None, |_pool| {
            runtime.block_on(session.change_rev_prop(revision, name, value))
        })
    }

    /// The lock on `path` as a 7-tuple, or `None`.
    pub fn get_lock(&self, path: &str) -> Result<Value, Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let lock = run_with_pool(None, |_pool| runtime.block_on(session.get_lock(path)))?;
        Ok(lock.as_ref().map_or(Value::None, wrap_lock))
    }

    /// `{path: lock}` for locks on and below `path`.
    pub fn get_locks(&self, path: &str, depth: Depth) -> Result<Value, Error> {
        let mut op = self.begin()?;
        let RaInner { runtime, session, .. } = &mut *op.inner;
        let locks = run_with_pool(None, |_pool| runtime.block_on(session.get_locks(path, depth)))?;
        Ok(Value::Dict(
            locks
                .iter()
                .map(|lock| (Key::Str(lock.path.clone()), wrap_lock(lock)))
                .collect(),
        ))
    }

    /// Starts a commit.
    ///
    /// `revprops` is a dict of revision properties (`svn:log` among them),
    /// `lock_tokens` a dict `{path: token}` or `None`. `callback` receives
    /// `(revnum, date, author)` after a successful commit.
    pub fn get_commit_editor(
        &self,
        revprops: &Value,
        callback: Option<CommitCallback>,
        lock_tokens: &Value,
        keep_locks: bool,
    ) -> Result<CommitEditor, Error> {
        let rev_props = dict_to_prop_hash(revprops)?;
        let lock_tokens = lock_tokens_from_value(lock_tokens)?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(busy_error());
        }
        let options = CommitOptions {
            rev_props,
            lock_tokens,
            keep_locks,
        };
        Ok(CommitEditor::new(
            Arc::clone(&self.inner),
            Arc::clone(&self.busy),
            options,
            callback,
        ))
    }
}

fn lock_tokens_from_value(value: &Value) -> Result<Vec<CommitLockToken>, Error> {
    if value.is_none() {
        return Ok(Vec::new());
    }
    let map: &BTreeMap<Key, Value> = value
        .as_dict()
        .ok_or_else(|| Error::Type(format!("Expected dictionary, got {}", value.type_name())))?;
    map.iter()
        .map(|(key, token)| match (key, token.as_str()) {
            (Key::Str(path), Some(token)) => Ok(CommitLockToken::new(path.clone(), token)),
            _ => Err(Error::Type("lock tokens must map paths to token strings".to_string())),
        })
        .collect()
}

impl Display for RemoteAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let url = self.url.lock().unwrap_or_else(PoisonError::into_inner);
        write!(f, "RemoteAccess(\"{url}\")")
    }
}

impl std::fmt::Debug for RemoteAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAccess")
            .field("url", &*self.url.lock().unwrap_or_else(PoisonError::into_inner))
            .field("busy", &self.busy.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use std::future::Future;
    use std::thread::JoinHandle;

    use tokio::net::TcpStream;

    use super::*;
    use crate::codes;
    use crate::rasvn::SvnItem;
    use crate::rasvn::conn::tests::{read_until_newline, run_async, write_item_line};
    use crate::session::tests::{no_auth, serve_handshake, success, unconnected_session};
    use crate::stream::MemoryStream;
    use crate::value::HostError;

    pub(crate) fn unconnected_inner() -> Arc<Mutex<RaInner>> {
        Arc::new(Mutex::new(RaInner {
            runtime: tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap(),
            session: unconnected_session(),
            cancel: None,
        }))
    }

    /// Runs a fake server for one connection on its own thread.
    fn spawn_server<F, Fut>(caps: &'static [&'static str], script: F) -> (String, JoinHandle<()>)
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("svn://127.0.0.1:{}/repo", listener.local_addr().unwrap().port());
        let root = url.clone();
        let handle = std::thread::spawn(move || {
            run_async(async move {
                listener.set_nonblocking(true).unwrap();
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let (mut server, _) = listener.accept().await.unwrap();
                serve_handshake(&mut server, &root, caps).await;
                script(server).await;
            });
        });
        (url, handle)
    }

    fn open(url: &str) -> RemoteAccess {
        RemoteAccess::open_with_options(url, ClientOptions::default(), None).unwrap()
    }

    fn changed_log_entry(rev: u64) -> SvnItem {
        SvnItem::List(vec![
            SvnItem::List(vec![SvnItem::List(vec![
                SvnItem::string("/foo"),
                SvnItem::word("A"),
                SvnItem::List(Vec::new()),
                SvnItem::List(vec![SvnItem::word("dir"), SvnItem::Bool(false), SvnItem::Bool(false)]),
            ])]),
            SvnItem::Number(rev),
            SvnItem::List(vec![SvnItem::string("jelmer")]),
            SvnItem::List(vec![SvnItem::string("2024-01-02T03:04:05.000000Z")]),
            SvnItem::List(vec![SvnItem::string("msg")]),
            SvnItem::Bool(false),
            SvnItem::Bool(false),
            SvnItem::Number(0),
            SvnItem::List(Vec::new()),
        ])
    }

    #[test]
    fn unknown_scheme_is_a_subversion_exception() {
        let err = RemoteAccess::open_with_options("bla://", ClientOptions::default(), None).unwrap_err();
        assert_eq!(err.svn_code(), Some(codes::RA_ILLEGAL_URL));
    }

    #[test]
    fn basic_accessors_and_display() {
        let (url, server) = spawn_server(&[], |mut server| async move {
            read_until_newline(&mut server).await;
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(&mut server, &success(vec![SvnItem::Number(0)])).await;
        });
        let ra = open(&url);
        assert_eq!(ra.get_latest_revnum().unwrap(), 0);
        assert_eq!(ra.get_repos_root().unwrap(), url);
        assert_eq!(ra.get_url().unwrap(), url);
        assert_eq!(ra.get_uuid().unwrap(), "uuid-1");
        assert_eq!(ra.to_string(), format!("RemoteAccess(\"{url}\")"));
        let err = ra.has_capability("FOO").unwrap_err();
        assert_eq!(err.svn_code(), Some(codes::UNKNOWN_CAPABILITY));
        server.join().unwrap();
    }

    #[test]
    fn leading_slashes_are_value_errors() {
        let ra = RemoteAccess {
            inner: unconnected_inner(),
            busy: Arc::new(AtomicBool::new(false)),
            url: Mutex::new("svn://example.com/repo".to_string()),
        };
        assert!(matches!(ra.check_path("/bar", 0), Err(Error::Value(_))));
        assert!(matches!(
            ra.get_locations("//bla", 0, &Value::List(vec![Value::Int(0)])),
            Err(Error::Value(_))
        ));
    }

    #[test]
    fn log_callback_exception_propagates_unchanged() {
        let (url, server) = spawn_server(&[], |mut server| async move {
            read_until_newline(&mut server).await;
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(&mut server, &changed_log_entry(1)).await;
            // the client drops the connection after the callback fails
            read_until_newline(&mut server).await;
        });
        let ra = open(&url);
        let mut callback = |_args: Vec<Value>| Err::<Value, _>(HostError::new("KeyError", "boom"));
        let err = ra.get_log(&mut callback, &LogParams::new(Value::None, 0, 1)).unwrap_err();
        match err {
            Error::Host(host) => assert_eq!(host, HostError::new("KeyError", "boom")),
            other => panic!("unexpected error: {other:?}"),
        }
        drop(ra);
        server.join().unwrap();
    }

    #[test]
    fn iter_log_reports_node_kinds() {
        let (url, server) = spawn_server(&[], |mut server| async move {
            let request = read_until_newline(&mut server).await;
            assert!(request.starts_with(b"( log ( ( 0: ) ( 0 ) ( 1 ) true true 0 false all-revprops ) )"));
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(&mut server, &changed_log_entry(1)).await;
            write_item_line(&mut server, &SvnItem::word("done")).await;
            write_item_line(&mut server, &success(Vec::new())).await;
        });
        let ra = open(&url);
        let params = LogParams::new(Value::List(vec![Value::from("/")]), 0, 1).with_changed_paths(true);
        let entries: Vec<Value> = ra.iter_log(&params).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let Value::Tuple(items) = &entries[0] else {
            panic!("expected tuple");
        };
        assert_eq!(
            items[0].get("/foo"),
            Some(&Value::Tuple(vec![
                Value::from("A"),
                Value::None,
                Value::Int(-1),
                Value::Int(NodeKind::Dir.as_int()),
            ]))
        );
        assert_eq!(items[1], Value::Int(1));
        server.join().unwrap();
    }

    #[test]
    fn get_file_writes_into_host_stream() {
        let (url, server) = spawn_server(&[], |mut server| async move {
            read_until_newline(&mut server).await;
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(
                &mut server,
                &success(vec![
                    SvnItem::List(Vec::new()),
                    SvnItem::Number(2),
                    SvnItem::List(Vec::new()),
                ]),
            )
            .await;
            write_item_line(&mut server, &SvnItem::string("contents")).await;
            write_item_line(&mut server, &SvnItem::string("")).await;
            write_item_line(&mut server, &success(Vec::new())).await;
        });
        let ra = open(&url);
        let stream = MemoryStream::new();
        let (rev, props) = ra.get_file("/bar", Box::new(stream.clone()), -1).unwrap();
        assert_eq!(rev, 2);
        assert_eq!(props, Value::Dict(BTreeMap::new()));
        assert_eq!(stream.contents(), b"contents");
        server.join().unwrap();
    }

    #[test]
    fn commit_editor_holds_the_busy_flag_and_reports_commit_info() {
        let (url, server) = spawn_server(&["commit-revprops"], |mut server| async move {
            let request = String::from_utf8(read_until_newline(&mut server).await).unwrap();
            assert!(request.starts_with("( commit ( 3:msg ( ) false ( "));
            assert!(request.contains("7:bar:foo 3:bla"));
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(&mut server, &success(Vec::new())).await;
            assert_eq!(read_until_newline(&mut server).await, b"( open-root ( ( ) 2:d0 ) ) \n");
            assert_eq!(
                read_until_newline(&mut server).await,
                b"( add-dir ( 3:foo 2:d0 2:d1 ( ) ) ) \n"
            );
            assert_eq!(read_until_newline(&mut server).await, b"( close-dir ( 2:d1 ) ) \n");
            assert_eq!(read_until_newline(&mut server).await, b"( close-dir ( 2:d0 ) ) \n");
            assert_eq!(read_until_newline(&mut server).await, b"( close-edit ( ) ) \n");
            write_item_line(&mut server, &success(Vec::new())).await;
            write_item_line(&mut server, &no_auth()).await;
            write_item_line(
                &mut server,
                &SvnItem::List(vec![
                    SvnItem::Number(1),
                    SvnItem::List(vec![SvnItem::string("2024-01-02T03:04:05.000000Z")]),
                    SvnItem::List(vec![SvnItem::string("jelmer")]),
                    SvnItem::List(Vec::new()),
                ]),
            )
            .await;
        });
        let ra = open(&url);
        let mut revprops = BTreeMap::new();
        revprops.insert(Key::from("svn:log"), Value::from("msg"));
        revprops.insert(Key::from("bar:foo"), Value::from("bla"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: CommitCallback = Box::new(move |args: Vec<Value>| {
            sink.lock().unwrap().push(args);
            Ok(Value::None)
        });
        let mut editor = ra
            .get_commit_editor(&Value::Dict(revprops), Some(callback), &Value::None, false)
            .unwrap();
        assert!(matches!(ra.get_latest_revnum(), Err(Error::Busy(_))));
        assert!(matches!(
            ra.get_commit_editor(&Value::Dict(BTreeMap::new()), None, &Value::None, false),
            Err(Error::Busy(_))
        ));

        let mut root = editor.open_root(-1).unwrap();
        root.add_directory("foo", None).unwrap().close().unwrap();
        root.close().unwrap();
        let info = editor.close().unwrap();
        assert_eq!(info.revision, 1);
        assert!(matches!(editor.close(), Err(Error::Runtime(_))));
        assert_eq!(
            seen.lock().unwrap()[0],
            vec![
                Value::Int(1),
                Value::from("2024-01-02T03:04:05.000000Z"),
                Value::from("jelmer"),
            ]
        );
        assert_eq!(ra.get_url().unwrap(), url);
        server.join().unwrap();
    }
}
