//! A connected `svn://` session.
//!
//! [`Session`] is the native remote-access layer the glue drives: every
//! operation reports failures as an [`SvnError`], the same way libsvn hands
//! back `svn_error_t *`.

use std::fmt::Formatter;
use std::future::Future;
use std::pin::Pin;

use md5::{Digest, Md5};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::Auth;
use crate::cancel::CancelFunc;
use crate::options::{ClientOptions, CommitOptions, LogOptions, LogRevProps};
use crate::path::{validate_rel_dir_path, validate_rel_path};
use crate::rasvn::SvnItem;
use crate::rasvn::conn::{ConnectionConfig, RaSvnConnection};
use crate::rasvn::edit::{EditCommand, send_edit};
use crate::rasvn::parse::{
    LogRevPropWants, opt_tuple_wordish, parse_commit_info, parse_file_rev_entry,
    parse_get_dir_listing, parse_get_file_response, parse_get_lock_response,
    parse_get_locks_response, parse_location_entry, parse_log_entry, parse_proplist,
    parse_server_error, parse_stat_response,
};
use crate::svndiff::SvndiffVersion;
use crate::types::{
    Capability, CommitInfo, Depth, DirEntry, DirListing, DirentField, FileRev, INVALID_REVNUM,
    LocationEntry, Lock, LogEntry, NodeKind, PropHash, Revnum, ServerInfo,
};
use crate::{SvnError, SvnUrl, codes};

type ConnFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SvnError>> + Send + 'a>>;

/// A stateful connection to one repository URL.
///
/// Operations take `&mut self` and run serially on the session's single
/// connection. A connection that drops before any data was consumed is
/// re-established once, transparently.
pub struct Session {
    url: SvnUrl,
    options: ClientOptions,
    auth: Option<Auth>,
    conn: Option<RaSvnConnection>,
    info: ServerInfo,
    allow_reconnect: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url.url)
            .field("connected", &self.conn.is_some())
            .field("info", &self.info)
            .finish()
    }
}

fn no_such_revision(rev: Revnum) -> SvnError {
    SvnError::new(codes::FS_NO_SUCH_REVISION, format!("No such revision {rev}"))
}

fn revnum_item(rev: Revnum) -> Result<SvnItem, SvnError> {
    u64::try_from(rev)
        .map(SvnItem::Number)
        .map_err(|_| no_such_revision(rev))
}

/// A `( failure ( err... ) )` item read where a stream entry was expected.
fn stream_failure(item: &SvnItem, ctx: &str) -> Option<SvnError> {
    let [status, errors, ..] = item.as_list()? else {
        return None;
    };
    if status.as_word() != Some("failure") {
        return None;
    }
    let err = parse_server_error(errors.as_list().unwrap_or_default());
    debug!(command = ctx, code = err.apr_err(), error = %err, "server failed the command");
    Some(err)
}

fn encode_proplist(props: &PropHash) -> SvnItem {
    SvnItem::List(
        props
            .iter()
            .map(|(name, value)| SvnItem::List(vec![SvnItem::string(name), SvnItem::string(value)]))
            .collect(),
    )
}

fn txn_client_compat_version(ra_client: &str) -> String {
    match ra_client.strip_prefix("SVN/") {
        Some(rest) => rest.split_whitespace().next().unwrap_or(rest).to_string(),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn log_params(options: &LogOptions) -> SvnItem {
    let mut params = vec![
        SvnItem::List(options.target_paths.iter().map(SvnItem::string).collect()),
        SvnItem::opt_revision(Some(options.start_rev)),
        SvnItem::opt_revision(Some(options.end_rev)),
        SvnItem::Bool(options.changed_paths),
        SvnItem::Bool(options.strict_node),
        SvnItem::Number(options.limit),
        SvnItem::Bool(options.include_merged_revisions),
    ];
    match &options.revprops {
        LogRevProps::All => params.push(SvnItem::word("all-revprops")),
        LogRevProps::Custom(names) => {
            params.push(SvnItem::word("revprops"));
            params.push(SvnItem::List(names.iter().map(SvnItem::string).collect()));
        }
    }
    SvnItem::List(params)
}

/// Client-side enforcement of the `log` limit.
///
/// Merged-revision children (entries nested below one with `has_children`)
/// do not count towards the limit; an entry with an invalid revision closes
/// one nesting level.
#[derive(Debug, Default)]
struct LogLimiter {
    limit: u64,
    received: u64,
    nest_level: u32,
}

impl LogLimiter {
    fn new(limit: u64) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Whether `entry` should reach the receiver.
    fn admit(&mut self, entry: &LogEntry) -> bool {
        let admitted = if self.limit > 0 && self.nest_level == 0 {
            self.received += 1;
            self.received <= self.limit
        } else {
            true
        };
        if entry.has_children {
            self.nest_level += 1;
        }
        if entry.revision == INVALID_REVNUM {
            self.nest_level = self.nest_level.saturating_sub(1);
        }
        admitted
    }
}

/// Progress of a streamed command, used to decide whether the connection is
/// still in step with the server after a failure.
#[derive(Debug, Default)]
struct StreamState {
    /// Something was handed to the caller (receiver called, bytes written).
    delivered: bool,
    /// The final command response was consumed.
    synced: bool,
}

impl Session {
    /// Connects to `url`, performs the handshake and authenticates.
    ///
    /// `auth` supplies credentials when the fixed ones in `options` are
    /// absent or rejected.
    pub async fn open(url: &str, options: ClientOptions, auth: Option<Auth>) -> Result<Self, SvnError> {
        let url = SvnUrl::parse(url)?;
        let (conn, info) = connect(&url, &options, auth.as_ref()).await?;
        Ok(Self {
            url,
            options,
            auth,
            conn: Some(conn),
            info,
            allow_reconnect: true,
        })
    }

    /// Opens a session over an already connected stream.
    ///
    /// Such sessions never reconnect: the transport cannot be recreated.
    pub async fn open_with_stream<S>(
        url: &str,
        options: ClientOptions,
        auth: Option<Auth>,
        stream: S,
    ) -> Result<Self, SvnError>
    where
        S: tokio::io::AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let url = SvnUrl::parse(url)?;
        let (read, write) = tokio::io::split(stream);
        let mut conn = RaSvnConnection::new(
            Box::new(read),
            Box::new(write),
            connection_config(&url, &options, auth.as_ref()),
        );
        let info = conn.handshake().await?;
        Ok(Self {
            url,
            options,
            auth,
            conn: Some(conn),
            info,
            allow_reconnect: false,
        })
    }

    /// The session URL.
    pub fn url(&self) -> &str {
        &self.url.url
    }

    pub fn uuid(&self) -> &str {
        &self.info.repository.uuid
    }

    /// The repository root URL reported during handshake.
    pub fn repos_root(&self) -> &str {
        &self.info.repository.root_url
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    /// Whether the server has `capability` (an `SVN_RA_CAPABILITY_*` name).
    ///
    /// Names this layer does not know fail with `SVN_ERR_UNKNOWN_CAPABILITY`.
    pub fn has_capability(&self, capability: &str) -> Result<bool, SvnError> {
        let cap = Capability::from_name(capability).ok_or_else(|| {
            SvnError::new(
                codes::UNKNOWN_CAPABILITY,
                format!("Don't know anything about capability '{capability}'"),
            )
        })?;
        Ok(self.server_has(cap))
    }

    fn server_has(&self, cap: Capability) -> bool {
        let word = cap.as_wire_word();
        self.info.server_caps.iter().any(|c| c == word)
            || self.info.repository.capabilities.iter().any(|c| c == word)
    }

    /// Reconnects and performs a new handshake.
    pub async fn reconnect(&mut self) -> Result<(), SvnError> {
        if !self.allow_reconnect {
            return Err(SvnError::new(
                codes::RA_SVN_CONNECTION_CLOSED,
                "Connection lost and this session cannot reconnect",
            ));
        }
        let (conn, info) = connect(&self.url, &self.options, self.auth.as_ref()).await?;
        self.conn = Some(conn);
        self.info = info;
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<(), SvnError> {
        if self.conn.is_none() {
            debug!(url = %self.url.url, "no live connection; reconnecting");
            self.reconnect().await?;
        }
        Ok(())
    }

    fn conn_mut(&mut self) -> Result<&mut RaSvnConnection, SvnError> {
        self.conn.as_mut().ok_or_else(|| {
            SvnError::new(codes::RA_SVN_CONNECTION_CLOSED, "Session is not connected")
        })
    }

    async fn with_retry<T, F>(&mut self, op: &'static str, mut f: F) -> Result<T, SvnError>
    where
        F: for<'a> FnMut(&'a mut RaSvnConnection) -> ConnFuture<'a, T>,
    {
        let mut attempt = 0usize;
        loop {
            self.ensure_connected().await?;
            let result = {
                let conn = self.conn_mut()?;
                f(conn).await
            };
            match result {
                Ok(v) => return Ok(v),
                Err(err) if attempt == 0 && self.allow_reconnect && err.is_connection_closed() => {
                    debug!(op, error = %err, "connection lost; reconnecting and retrying");
                    self.reconnect().await?;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_local_transport_failure() {
                        self.conn = None;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Points the session at another URL in the same repository.
    pub async fn reparent(&mut self, url: &str) -> Result<(), SvnError> {
        let new_url = SvnUrl::parse(url)?;
        if !new_url.same_server(&self.url) || new_url.path_below(self.repos_root()).is_none() {
            return Err(SvnError::new(
                codes::RA_ILLEGAL_URL,
                format!(
                    "'{}' isn't in the same repository as '{}'",
                    new_url.url,
                    self.repos_root()
                ),
            ));
        }
        let target = new_url.url.clone();
        self.with_retry("reparent", move |conn| {
            let target = target.clone();
            Box::pin(async move {
                let response = conn
                    .call("reparent", SvnItem::List(vec![SvnItem::string(&target)]))
                    .await?;
                response.ensure_success("reparent")?;
                conn.set_session_url(target);
                Ok(())
            })
        })
        .await?;
        debug!(url = %new_url.url, "session reparented");
        self.url = new_url;
        Ok(())
    }

    /// HEAD revision of the repository.
    pub async fn latest_revnum(&mut self) -> Result<Revnum, SvnError> {
        self.with_retry("get-latest-rev", |conn| {
            Box::pin(async move {
                let response = conn.call("get-latest-rev", SvnItem::List(Vec::new())).await?;
                let params = response.success_params("get-latest-rev")?;
                params
                    .first()
                    .and_then(SvnItem::as_revnum)
                    .ok_or_else(|| SvnError::protocol("Malformed get-latest-rev response"))
            })
        })
        .await
    }

    /// Lists a directory. `fields` selects which dirent fields are filled in;
    /// an empty selection still asks for the node kind.
    pub async fn get_dir(
        &mut self,
        path: &str,
        rev: Option<Revnum>,
        fields: &[DirentField],
        want_props: bool,
    ) -> Result<DirListing, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let fields = if fields.is_empty() {
            vec![DirentField::Kind]
        } else {
            fields.to_vec()
        };
        self.with_retry("get-dir", move |conn| {
            let path = path.clone();
            let fields = fields.clone();
            Box::pin(async move {
                let params = SvnItem::List(vec![
                    SvnItem::string(&path),
                    SvnItem::opt_revision(rev),
                    SvnItem::Bool(want_props),
                    SvnItem::Bool(true), // want-contents
                    SvnItem::List(fields.iter().map(|f| SvnItem::word(f.as_word())).collect()),
                    SvnItem::Bool(false), // want-iprops
                ]);
                let response = conn.call("get-dir", params).await?;
                parse_get_dir_listing(response.success_params("get-dir")?, &fields)
            })
        })
        .await
    }

    pub async fn check_path(&mut self, path: &str, rev: Option<Revnum>) -> Result<NodeKind, SvnError> {
        let path = validate_rel_dir_path(path)?;
        self.with_retry("check-path", move |conn| {
            let path = path.clone();
            Box::pin(async move {
                let params = SvnItem::List(vec![SvnItem::string(&path), SvnItem::opt_revision(rev)]);
                let response = conn.call("check-path", params).await?;
                let params = response.success_params("check-path")?;
                let kind = params
                    .first()
                    .and_then(opt_tuple_wordish)
                    .ok_or_else(|| SvnError::protocol("Malformed check-path response"))?;
                Ok(NodeKind::from_word(&kind))
            })
        })
        .await
    }

    /// Dirent for `path`, or `None` when nothing exists there.
    pub async fn stat(&mut self, path: &str, rev: Option<Revnum>) -> Result<Option<DirEntry>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        self.with_retry("stat", move |conn| {
            let path = path.clone();
            Box::pin(async move {
                let params = SvnItem::List(vec![SvnItem::string(&path), SvnItem::opt_revision(rev)]);
                let response = conn.call("stat", params).await?;
                parse_stat_response(response.success_params("stat")?)
            })
        })
        .await
    }

    /// Where `path@peg_rev` lived in each of `revs`. Revisions in which the
    /// node did not exist are left out.
    pub async fn get_locations(
        &mut self,
        path: &str,
        peg_rev: Revnum,
        revs: &[Revnum],
    ) -> Result<Vec<LocationEntry>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let peg = revnum_item(peg_rev)?;
        let revs = revs.iter().map(|rev| revnum_item(*rev)).collect::<Result<Vec<_>, _>>()?;
        self.with_retry("get-locations", move |conn| {
            let params = SvnItem::List(vec![
                SvnItem::string(&path),
                peg.clone(),
                SvnItem::List(revs.clone()),
            ]);
            Box::pin(async move {
                conn.send_command("get-locations", params).await?;
                conn.handle_auth_request().await?;

                let mut out = Vec::new();
                loop {
                    let item = conn.read_item().await?;
                    if let Some(err) = stream_failure(&item, "get-locations") {
                        return Err(err);
                    }
                    match &item {
                        SvnItem::Word(word) if word == "done" => break,
                        SvnItem::List(_) => out.push(parse_location_entry(&item)?),
                        other => {
                            return Err(SvnError::protocol(format!(
                                "Unexpected location entry item: {}",
                                other.kind()
                            )));
                        }
                    }
                }
                conn.read_command_response()
                    .await?
                    .ensure_success("get-locations")?;
                Ok(out)
            })
        })
        .await
    }

    /// Streams log entries to `receiver`.
    ///
    /// `cancel` is polled before every entry. An error from the receiver or
    /// the cancel func aborts the operation; the connection is then dropped
    /// because the rest of the stream is never read.
    pub async fn log(
        &mut self,
        options: &LogOptions,
        receiver: &mut dyn FnMut(LogEntry) -> Result<(), SvnError>,
        mut cancel: Option<&mut CancelFunc>,
    ) -> Result<(), SvnError> {
        let params = log_params(options);
        let wants = LogRevPropWants::new(&options.revprops);
        let mut attempt = 0usize;
        loop {
            self.ensure_connected().await?;
            let mut state = StreamState::default();
            let result = {
                let conn = self.conn_mut()?;
                drive_log(
                    conn,
                    params.clone(),
                    wants,
                    options.limit,
                    receiver,
                    cancel.as_deref_mut(),
                    &mut state,
                )
                .await
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err)
                    if attempt == 0
                        && !state.delivered
                        && self.allow_reconnect
                        && err.is_connection_closed() =>
                {
                    debug!(error = %err, "log connection lost before any entry; retrying");
                    self.reconnect().await?;
                    attempt += 1;
                }
                Err(err) => {
                    if !state.synced {
                        self.conn = None;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Writes the contents of `path@rev` to `out` and returns the fetched
    /// revision and the file's properties (empty unless `want_props`).
    ///
    /// The received text is checked against the MD5 the server announced.
    pub async fn get_file<W: AsyncWrite + Unpin>(
        &mut self,
        path: &str,
        rev: Option<Revnum>,
        want_props: bool,
        out: &mut W,
    ) -> Result<(Revnum, PropHash), SvnError> {
        let path = validate_rel_path(path)?;
        let mut attempt = 0usize;
        loop {
            self.ensure_connected().await?;
            let mut state = StreamState::default();
            let result = {
                let conn = self.conn_mut()?;
                fetch_file(conn, &path, rev, want_props, out, &mut state).await
            };
            match result {
                Ok(result) => return Ok(result),
                Err(err)
                    if attempt == 0
                        && !state.delivered
                        && self.allow_reconnect
                        && err.is_connection_closed() =>
                {
                    debug!(error = %err, "get-file connection lost before data; retrying");
                    self.reconnect().await?;
                    attempt += 1;
                }
                Err(err) => {
                    if !state.synced {
                        self.conn = None;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Every revision in which `path` changed between `start` and `end`,
    /// oldest first, with property changes and raw svndiff chunks.
    pub async fn get_file_revs(
        &mut self,
        path: &str,
        start: Option<Revnum>,
        end: Option<Revnum>,
        include_merged_revisions: bool,
    ) -> Result<Vec<FileRev>, SvnError> {
        let path = validate_rel_path(path)?;
        self.with_retry("get-file-revs", move |conn| {
            let params = SvnItem::List(vec![
                SvnItem::string(&path),
                SvnItem::opt_revision(start),
                SvnItem::opt_revision(end),
                SvnItem::Bool(include_merged_revisions),
            ]);
            Box::pin(async move {
                conn.send_command("get-file-revs", params).await?;
                conn.handle_auth_request().await?;

                let mut out = Vec::new();
                loop {
                    let item = conn.read_item().await?;
                    if let Some(err) = stream_failure(&item, "get-file-revs") {
                        return Err(err);
                    }
                    match &item {
                        SvnItem::Word(word) if word == "done" => break,
                        SvnItem::List(_) => {
                            let mut file_rev = parse_file_rev_entry(&item)?;
                            loop {
                                let chunk = conn.read_item().await?;
                                let bytes = chunk.as_bytes().ok_or_else(|| {
                                    SvnError::protocol("Text delta chunk not a string")
                                })?;
                                if bytes.is_empty() {
                                    break;
                                }
                                file_rev.delta_chunks.push(bytes.to_vec());
                            }
                            out.push(file_rev);
                        }
                        other => {
                            return Err(SvnError::protocol(format!(
                                "Unexpected file-rev entry item: {}",
                                other.kind()
                            )));
                        }
                    }
                }
                conn.read_command_response()
                    .await?
                    .ensure_success("get-file-revs")?;
                if out.is_empty() {
                    return Err(SvnError::protocol(
                        "The get-file-revs command didn't return any revisions",
                    ));
                }
                Ok(out)
            })
        })
        .await
    }

    pub async fn rev_proplist(&mut self, rev: Revnum) -> Result<PropHash, SvnError> {
        let rev = revnum_item(rev)?;
        self.with_retry("rev-proplist", move |conn| {
            let params = SvnItem::List(vec![rev.clone()]);
            Box::pin(async move {
                let response = conn.call("rev-proplist", params).await?;
                let params = response.success_params("rev-proplist")?;
                let props = params
                    .first()
                    .ok_or_else(|| SvnError::protocol("Malformed rev-proplist response"))?;
                parse_proplist(props)
            })
        })
        .await
    }

    /// Sets (or, with `None`, deletes) a revision property.
    pub async fn change_rev_prop(
        &mut self,
        rev: Revnum,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        let mut params = vec![revnum_item(rev)?, SvnItem::string(name)];
        if let Some(value) = value {
            params.push(SvnItem::string(value));
        }
        self.ensure_connected().await?;
        let result = async {
            let conn = self.conn_mut()?;
            conn.call("change-rev-prop", SvnItem::List(params))
                .await?
                .ensure_success("change-rev-prop")
        }
        .await;
        if let Err(err) = &result
            && err.is_local_transport_failure()
        {
            self.conn = None;
        }
        result
    }

    pub async fn get_lock(&mut self, path: &str) -> Result<Option<Lock>, SvnError> {
        let path = validate_rel_path(path)?;
        self.with_retry("get-lock", move |conn| {
            let params = SvnItem::List(vec![SvnItem::string(&path)]);
            Box::pin(async move {
                let response = conn.call("get-lock", params).await?;
                parse_get_lock_response(response.success_params("get-lock")?)
            })
        })
        .await
    }

    /// Locks on `path` and below, limited to `depth`.
    pub async fn get_locks(&mut self, path: &str, depth: Depth) -> Result<Vec<Lock>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        self.with_retry("get-locks", move |conn| {
            let params = SvnItem::List(vec![
                SvnItem::string(&path),
                SvnItem::List(vec![SvnItem::word(depth.as_word())]),
            ]);
            Box::pin(async move {
                let response = conn.call("get-locks", params).await?;
                parse_get_locks_response(response.success_params("get-locks")?)
            })
        })
        .await
    }

    /// Runs `commit` and sends `commands` as the editor drive.
    ///
    /// The drive must end with a single close-edit. File texts go out as
    /// svndiff1 when the server accepts it.
    pub(crate) async fn commit(
        &mut self,
        options: &CommitOptions,
        commands: &[EditCommand],
    ) -> Result<CommitInfo, SvnError> {
        let Some((EditCommand::CloseEdit, drive)) = commands.split_last() else {
            return Err(SvnError::new(
                codes::INCORRECT_PARAMS,
                "Commit editor drive must end with close-edit",
            ));
        };
        if drive
            .iter()
            .any(|c| matches!(c, EditCommand::CloseEdit | EditCommand::AbortEdit))
        {
            return Err(SvnError::new(
                codes::INCORRECT_PARAMS,
                "Commit editor drive may only close at the end",
            ));
        }
        if !options.rev_props.contains_key("svn:log") && !self.server_has(Capability::CommitRevProps) {
            return Err(SvnError::new(
                codes::BAD_PROPERTY_VALUE,
                "ra_svn does not support not specifying a log message with pre-1.5 servers",
            ));
        }
        let has_custom_revprops = options.rev_props.keys().any(|name| name != "svn:log");
        if has_custom_revprops && !self.server_has(Capability::CommitRevProps) {
            return Err(SvnError::new(
                codes::RA_NOT_IMPLEMENTED,
                "Server doesn't support setting arbitrary revision properties during commit",
            ));
        }

        let mut rev_props = options.rev_props.clone();
        if self.server_has(Capability::CommitRevProps)
            && self.server_has(Capability::EphemeralTxnProps)
        {
            let ra_client = &self.options.ra_client;
            rev_props.insert(
                "svn:txn-client-compat-version".to_string(),
                txn_client_compat_version(ra_client).into_bytes(),
            );
            rev_props.insert("svn:txn-user-agent".to_string(), ra_client.as_bytes().to_vec());
        }
        let lock_tokens = options
            .lock_tokens
            .iter()
            .map(|lock| -> Result<SvnItem, SvnError> {
                Ok(SvnItem::List(vec![
                    SvnItem::string(validate_rel_path(&lock.path)?),
                    SvnItem::string(&lock.token),
                ]))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let params = SvnItem::List(vec![
            SvnItem::string(options.log_message()),
            SvnItem::List(lock_tokens),
            SvnItem::Bool(options.keep_locks),
            encode_proplist(&rev_props),
        ]);
        let svndiff = if self.server_has(Capability::Svndiff1) {
            SvndiffVersion::V1
        } else {
            SvndiffVersion::V0
        };

        self.ensure_connected().await?;
        let result = async {
            let conn = self.conn_mut()?;
            conn.call("commit", params).await?.ensure_success("commit")?;
            send_edit(conn, commands, svndiff).await?;
            conn.read_command_response().await?.ensure_success("commit")?;
            conn.handle_auth_request().await?;
            let item = conn.read_item().await?;
            parse_commit_info(&item)
        }
        .await;
        match &result {
            Ok(info) => debug!(revision = info.revision, "commit finished"),
            Err(_) => self.conn = None,
        }
        result
    }
}

fn connection_config(url: &SvnUrl, options: &ClientOptions, auth: Option<&Auth>) -> ConnectionConfig {
    if !options.store_passwords
        && let Some(auth) = auth
    {
        auth.disable_caching();
    }
    ConnectionConfig {
        username: options.username.clone(),
        password: options.password.clone(),
        auth: auth.cloned(),
        url: url.url.clone(),
        ra_client: options.ra_client.clone(),
        read_timeout: options.read_timeout,
        write_timeout: options.write_timeout,
    }
}

async fn connect(
    url: &SvnUrl,
    options: &ClientOptions,
    auth: Option<&Auth>,
) -> Result<(RaSvnConnection, ServerInfo), SvnError> {
    let addr = url.socket_addr();
    debug!(addr = %addr, "connecting");
    let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            SvnError::from(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })?
        .map_err(|err| {
            SvnError::from(err).wrap(
                codes::RA_SVN_IO_ERROR,
                format!("Unable to connect to a repository at URL '{}'", url.url),
            )
        })?;
    stream.set_nodelay(true)?;

    let (read, write) = stream.into_split();
    let mut conn = RaSvnConnection::new(
        Box::new(read),
        Box::new(write),
        connection_config(url, options, auth),
    );
    let info = conn.handshake().await?;
    Ok((conn, info))
}

async fn drive_log(
    conn: &mut RaSvnConnection,
    params: SvnItem,
    wants: LogRevPropWants,
    limit: u64,
    receiver: &mut dyn FnMut(LogEntry) -> Result<(), SvnError>,
    mut cancel: Option<&mut CancelFunc>,
    state: &mut StreamState,
) -> Result<(), SvnError> {
    conn.send_command("log", params).await?;
    conn.handle_auth_request().await?;

    let mut limiter = LogLimiter::new(limit);
    loop {
        let item = conn.read_item().await?;
        if let Some(err) = stream_failure(&item, "log") {
            state.synced = true;
            return Err(err);
        }
        match &item {
            SvnItem::Word(word) if word == "done" => break,
            SvnItem::List(items) => {
                if let Some(cancel) = cancel.as_deref_mut() {
                    cancel()?;
                }
                let entry = parse_log_entry(items, wants)?;
                if limiter.admit(&entry) {
                    state.delivered = true;
                    receiver(entry)?;
                }
            }
            other => {
                return Err(SvnError::protocol(format!(
                    "Unexpected log entry item: {}",
                    other.kind()
                )));
            }
        }
    }
    let response = conn.read_command_response().await?;
    state.synced = true;
    response.ensure_success("log")
}

async fn fetch_file<W: AsyncWrite + Unpin>(
    conn: &mut RaSvnConnection,
    path: &str,
    rev: Option<Revnum>,
    want_props: bool,
    out: &mut W,
    state: &mut StreamState,
) -> Result<(Revnum, PropHash), SvnError> {
    let params = SvnItem::List(vec![
        SvnItem::string(path),
        SvnItem::opt_revision(rev),
        SvnItem::Bool(want_props),
        SvnItem::Bool(true), // want-contents
        SvnItem::Bool(false), // want-iprops
    ]);
    let response = conn.call("get-file", params).await?;
    let params = match response.success_params("get-file") {
        Ok(params) => params,
        Err(err) => {
            state.synced = true;
            return Err(err);
        }
    };
    let meta = parse_get_file_response(params)?;

    let mut hasher = Md5::new();
    loop {
        let item = conn.read_item().await?;
        let chunk = item
            .as_bytes()
            .ok_or_else(|| SvnError::protocol("Non-string as part of file contents"))?;
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
        state.delivered = true;
        out.write_all(chunk).await?;
    }
    out.flush().await?;
    let trailer = conn.read_command_response().await?;
    state.synced = true;
    trailer.ensure_success("get-file")?;

    if let Some(expected) = meta.checksum {
        let actual = hex::encode(hasher.finalize());
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(SvnError::new(
                codes::CHECKSUM_MISMATCH,
                format!("Checksum mismatch for '{path}': expected {expected}, actual {actual}"),
            ));
        }
    }
    debug!(path, revision = meta.revision, "fetched file");
    Ok((meta.revision, meta.props))
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::rasvn::conn::tests::{
        connected_conn, read_until_newline, run_async, write_item_line,
    };
    use crate::auth::{PARAM_DEFAULT_PASSWORD, PARAM_DEFAULT_USERNAME, simple_provider};
    use crate::config::{CATEGORY_SERVERS, Config};
    use crate::types::RepositoryInfo;
    use crate::value::Value;

    pub(crate) const ROOT: &str = "svn://example.com:3690/repo";

    pub(crate) fn success(params: Vec<SvnItem>) -> SvnItem {
        SvnItem::List(vec![SvnItem::word("success"), SvnItem::List(params)])
    }

    pub(crate) fn failure(code: i32, message: &str) -> SvnItem {
        SvnItem::List(vec![
            SvnItem::word("failure"),
            SvnItem::List(vec![SvnItem::List(vec![
                SvnItem::Number(code as u64),
                SvnItem::string(message),
                SvnItem::string("server.c"),
                SvnItem::Number(1),
            ])]),
        ])
    }

    pub(crate) fn no_auth() -> SvnItem {
        success(vec![SvnItem::List(Vec::new()), SvnItem::string("realm")])
    }

    /// Plays the server side of a handshake for a repository rooted at `root`.
    pub(crate) async fn serve_handshake(server: &mut TcpStream, root: &str, caps: &[&str]) {
        let mut all_caps = vec!["edit-pipeline"];
        all_caps.extend_from_slice(caps);
        write_item_line(
            server,
            &success(vec![
                SvnItem::Number(2),
                SvnItem::Number(2),
                SvnItem::List(Vec::new()),
                SvnItem::List(all_caps.iter().map(|c| SvnItem::word(c)).collect()),
            ]),
        )
        .await;
        let greeting = read_until_newline(server).await;
        assert!(greeting.starts_with(b"( 2 ( edit-pipeline"));
        write_item_line(server, &no_auth()).await;
        write_item_line(
            server,
            &success(vec![
                SvnItem::string("uuid-1"),
                SvnItem::string(root),
                SvnItem::List(Vec::new()),
            ]),
        )
        .await;
    }

    /// A session with no live connection that never reconnects.
    pub(crate) fn unconnected_session() -> Session {
        Session {
            url: SvnUrl::parse(ROOT).unwrap(),
            options: ClientOptions::default(),
            auth: None,
            conn: None,
            info: ServerInfo::default(),
            allow_reconnect: false,
        }
    }

    pub(crate) async fn connected_session(caps: &[&str]) -> (Session, TcpStream) {
        let (conn, server) = connected_conn().await;
        let mut server_caps = vec!["edit-pipeline".to_string()];
        server_caps.extend(caps.iter().map(|c| c.to_string()));
        let session = Session {
            url: SvnUrl::parse(ROOT).unwrap(),
            options: ClientOptions::default().with_ra_client("test-ra_svn"),
            auth: None,
            conn: Some(conn),
            info: ServerInfo {
                server_caps,
                repository: RepositoryInfo {
                    uuid: "uuid-1".to_string(),
                    root_url: ROOT.to_string(),
                    capabilities: Vec::new(),
                },
            },
            allow_reconnect: false,
        };
        (session, server)
    }

    fn log_entry(rev: u64, has_children: bool, invalid: bool) -> SvnItem {
        SvnItem::List(vec![
            SvnItem::List(Vec::new()),
            SvnItem::Number(rev),
            SvnItem::List(vec![SvnItem::string("jelmer")]),
            SvnItem::List(vec![SvnItem::string("2024-01-02T03:04:05.000000Z")]),
            SvnItem::List(vec![SvnItem::string("msg")]),
            SvnItem::Bool(has_children),
            SvnItem::Bool(invalid),
            SvnItem::Number(0),
            SvnItem::List(Vec::new()),
        ])
    }

    #[test]
    fn open_with_stream_runs_handshake() {
        run_async(async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server_task = tokio::spawn(async move {
                let (mut server, _) = listener.accept().await.unwrap();
                serve_handshake(&mut server, ROOT, &["svndiff1"]).await;
                server
            });
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut session = Session::open_with_stream(ROOT, ClientOptions::default(), None, stream)
                .await
                .unwrap();
            assert_eq!(session.uuid(), "uuid-1");
            assert_eq!(session.repos_root(), ROOT);
            assert_eq!(session.url(), ROOT);
            let _server = server_task.await.unwrap();

            let err = session.reconnect().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_CONNECTION_CLOSED);
        });
    }

    #[test]
    fn has_capability_rejects_unknown_names() {
        run_async(async {
            let (session, _server) = connected_session(&["mergeinfo"]).await;
            assert!(session.has_capability("mergeinfo").unwrap());
            assert!(!session.has_capability("depth").unwrap());
            let err = session.has_capability("FOO").unwrap_err();
            assert_eq!(err.apr_err(), codes::UNKNOWN_CAPABILITY);
            assert_eq!(err.message(), Some("Don't know anything about capability 'FOO'"));
        });
    }

    #[test]
    fn latest_revnum_sends_command() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( get-latest-rev ( ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &success(vec![SvnItem::Number(7)])).await;
                server
            });
            assert_eq!(session.latest_revnum().await.unwrap(), 7);
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn reparent_requires_same_repository() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let err = session.reparent("svn://example.com:3690/other").await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_ILLEGAL_URL);
            let err = session.reparent("svn://elsewhere/repo").await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_ILLEGAL_URL);

            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( reparent ( 33:svn://example.com:3690/repo/trunk ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            session.reparent(&format!("{ROOT}/trunk")).await.unwrap();
            assert_eq!(session.url(), "svn://example.com:3690/repo/trunk");
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn get_dir_always_requests_kind() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( get-dir ( 0: ( 1 ) false true ( kind ) false ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(
                    &mut server,
                    &success(vec![
                        SvnItem::Number(1),
                        SvnItem::List(Vec::new()),
                        SvnItem::List(vec![SvnItem::List(vec![
                            SvnItem::string("foo"),
                            SvnItem::word("dir"),
                            SvnItem::Number(0),
                            SvnItem::Bool(false),
                            SvnItem::Number(1),
                            SvnItem::List(Vec::new()),
                            SvnItem::List(Vec::new()),
                        ])]),
                    ]),
                )
                .await;
                server
            });
            let listing = session.get_dir("/", Some(1), &[], false).await.unwrap();
            assert_eq!(listing.revision, 1);
            assert_eq!(listing.entries[0].name, "foo");
            assert_eq!(listing.entries[0].kind, NodeKind::Dir);
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn server_failure_keeps_connection() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                read_until_newline(&mut server).await;
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &failure(codes::FS_NO_SUCH_REVISION, "No such revision 9"))
                    .await;
                server
            });
            let err = session.check_path("bar", Some(9)).await.unwrap_err();
            assert_eq!(err.apr_err(), codes::FS_NO_SUCH_REVISION);
            assert!(session.conn.is_some());
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn get_locations_reads_entries_until_done() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( get-locations ( 3:bla 2 ( 1 2 ) ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                for (rev, path) in [(1, "/bar"), (2, "/bla")] {
                    write_item_line(
                        &mut server,
                        &SvnItem::List(vec![SvnItem::Number(rev), SvnItem::string(path)]),
                    )
                    .await;
                }
                write_item_line(&mut server, &SvnItem::word("done")).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            let locations = session.get_locations("bla", 2, &[1, 2]).await.unwrap();
            assert_eq!(locations.len(), 2);
            assert_eq!(locations[0].path, "/bar");
            assert_eq!(locations[1].revision, 2);
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn log_limit_skips_excess_top_level_entries() {
        let mut limiter = LogLimiter::new(1);
        let entry = |revision, has_children| LogEntry {
            revision,
            changed_paths: None,
            rev_props: PropHash::new(),
            has_children,
            subtractive_merge: false,
        };
        assert!(limiter.admit(&entry(5, true)));
        assert!(limiter.admit(&entry(3, false)));
        assert!(limiter.admit(&entry(INVALID_REVNUM, false)));
        assert!(!limiter.admit(&entry(4, false)));
    }

    #[test]
    fn log_streams_entries_and_honours_cancel() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                let request = read_until_newline(&mut server).await;
                assert!(request.starts_with(b"( log ( ( 0: ) ( 0 ) ( 1 ) false false 0 false revprops ( 8:svn:date ) ) )"));
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &log_entry(0, false, false)).await;
                write_item_line(&mut server, &log_entry(1, false, false)).await;
                write_item_line(&mut server, &SvnItem::word("done")).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            let options = LogOptions::between(0, 1)
                .with_revprops(LogRevProps::Custom(vec!["svn:date".to_string()]));
            let mut seen = Vec::new();
            let mut receiver = |entry: LogEntry| {
                seen.push((entry.revision, entry.rev_props.keys().cloned().collect::<Vec<_>>()));
                Ok(())
            };
            session.log(&options, &mut receiver, None).await.unwrap();
            assert_eq!(
                seen,
                vec![(0, vec!["svn:date".to_string()]), (1, vec!["svn:date".to_string()])]
            );
            assert!(session.conn.is_some());
            let _server = server_task.await.unwrap();

            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                read_until_newline(&mut server).await;
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &log_entry(0, false, false)).await;
                server
            });
            let mut cancel: CancelFunc =
                Box::new(|| Err(SvnError::new(codes::CANCELLED, "Operation cancelled")));
            let mut receiver = |_entry: LogEntry| Ok(());
            let err = session
                .log(&options, &mut receiver, Some(&mut cancel))
                .await
                .unwrap_err();
            assert_eq!(err.apr_err(), codes::CANCELLED);
            assert!(session.conn.is_none());
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn get_file_streams_contents_and_verifies_checksum() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( get-file ( 3:bar ( 1 ) true true false ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(
                    &mut server,
                    &success(vec![
                        SvnItem::List(vec![SvnItem::string("0cc175b9c0f1b6a831c399e269772661")]),
                        SvnItem::Number(1),
                        SvnItem::List(vec![SvnItem::List(vec![
                            SvnItem::string("bla:bar"),
                            SvnItem::string("blie"),
                        ])]),
                    ]),
                )
                .await;
                write_item_line(&mut server, &SvnItem::string("a")).await;
                write_item_line(&mut server, &SvnItem::string("")).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            let mut out = Vec::new();
            let (rev, props) = session.get_file("/bar", Some(1), true, &mut out).await.unwrap();
            assert_eq!(out, b"a");
            assert_eq!(rev, 1);
            assert_eq!(props.get("bla:bar").map(Vec::as_slice), Some(&b"blie"[..]));
            let _server = server_task.await.unwrap();

            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                read_until_newline(&mut server).await;
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(
                    &mut server,
                    &success(vec![
                        SvnItem::List(vec![SvnItem::string("00000000000000000000000000000000")]),
                        SvnItem::Number(1),
                        SvnItem::List(Vec::new()),
                    ]),
                )
                .await;
                write_item_line(&mut server, &SvnItem::string("a")).await;
                write_item_line(&mut server, &SvnItem::string("")).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            let err = session.get_file("bar", None, false, &mut Vec::new()).await.unwrap_err();
            assert_eq!(err.apr_err(), codes::CHECKSUM_MISMATCH);
            assert!(session.conn.is_some());
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn get_file_revs_errors_on_empty_result() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                read_until_newline(&mut server).await;
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &SvnItem::word("done")).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            let err = session.get_file_revs("bar", Some(1), Some(2), false).await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_MALFORMED_DATA);
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn change_rev_prop_omits_deleted_value() {
        run_async(async {
            let (mut session, mut server) = connected_session(&[]).await;
            let server_task = tokio::spawn(async move {
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( change-rev-prop ( 1 3:foo 3:bar ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( change-rev-prop ( 1 3:foo ) ) \n"
                );
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                server
            });
            session.change_rev_prop(1, "foo", Some(b"bar")).await.unwrap();
            session.change_rev_prop(1, "foo", None).await.unwrap();
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn commit_rejects_custom_revprops_without_server_support() {
        run_async(async {
            let (mut session, _server) = connected_session(&[]).await;
            let mut extra = PropHash::new();
            extra.insert("bar:foo".to_string(), b"bla".to_vec());
            let options = CommitOptions::new("msg").with_rev_props(extra);
            let err = session
                .commit(&options, &[EditCommand::CloseEdit])
                .await
                .unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_NOT_IMPLEMENTED);

            let err = session
                .commit(&CommitOptions::new("msg"), &[])
                .await
                .unwrap_err();
            assert_eq!(err.apr_err(), codes::INCORRECT_PARAMS);
        });
    }

    #[test]
    fn commit_sends_drive_and_parses_commit_info() {
        run_async(async {
            let (mut session, mut server) =
                connected_session(&["commit-revprops", "ephemeral-txnprops"]).await;
            let server_task = tokio::spawn(async move {
                let request = read_until_newline(&mut server).await;
                let request = String::from_utf8(request).unwrap();
                assert!(request.starts_with("( commit ( 3:msg ( ) false ( "));
                assert!(request.contains("18:svn:txn-user-agent 11:test-ra_svn"));
                write_item_line(&mut server, &no_auth()).await;
                write_item_line(&mut server, &success(Vec::new())).await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( open-root ( ( ) 2:d0 ) ) \n"
                );
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
                server
            });
            let commands = vec![
                EditCommand::OpenRoot {
                    rev: None,
                    token: "d0".into(),
                },
                EditCommand::CloseDir {
                    dir_token: "d0".into(),
                },
                EditCommand::CloseEdit,
            ];
            let info = session
                .commit(&CommitOptions::new("msg"), &commands)
                .await
                .unwrap();
            assert_eq!(info.revision, 1);
            assert_eq!(info.author.as_deref(), Some("jelmer"));
            assert_eq!(info.post_commit_err, None);
            let _server = server_task.await.unwrap();
        });
    }

    #[test]
    fn store_passwords_off_marks_credentials_unsaveable() {
        let mut config = Config::new();
        config.set(CATEGORY_SERVERS, "global", "store-passwords", "no");
        let options = ClientOptions::from_config(&config).unwrap();
        let auth = Auth::new(vec![simple_provider()]);
        auth.set_parameter(PARAM_DEFAULT_USERNAME, Value::Str("jelmer".into()))
            .unwrap();
        auth.set_parameter(PARAM_DEFAULT_PASSWORD, Value::Str("secret".into()))
            .unwrap();
        assert!(auth.credentials("svn.simple", "realm").unwrap().may_save());

        let url = SvnUrl::parse(ROOT).unwrap();
        let conn_config = connection_config(&url, &options, Some(&auth));
        let creds = conn_config
            .auth
            .unwrap()
            .credentials("svn.simple", "realm")
            .unwrap();
        assert!(!creds.may_save());

        let kept = Auth::new(vec![simple_provider()]);
        connection_config(&url, &ClientOptions::default(), Some(&kept));
        assert!(kept.credentials("svn.simple", "realm").unwrap().may_save());
    }

    #[test]
    fn txn_compat_version_prefers_svn_user_agent() {
        assert_eq!(txn_client_compat_version("SVN/1.14.2 (x86_64)"), "1.14.2");
        assert_eq!(txn_client_compat_version("subvert"), env!("CARGO_PKG_VERSION"));
    }
}
