use hmac::{Hmac, Mac};
use md5::Md5;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::auth::{Auth, CredentialKind};
use crate::types::{Capability, RepositoryInfo, ServerInfo};
use crate::{SvnError, SvnUrl, codes};

use super::parse::{parse_repos_info, parse_server_error};
use super::{SvnItem, encode_command, encode_item};

const PROTOCOL_VERSION: u64 = 2;

const CLIENT_CAPS: [Capability; 6] = [
    Capability::EditPipeline,
    Capability::Svndiff1,
    Capability::AbsentEntries,
    Capability::Depth,
    Capability::MergeInfo,
    Capability::LogRevProps,
];

#[derive(Debug)]
pub(crate) struct CommandResponse {
    success: bool,
    params: Vec<SvnItem>,
    errors: Vec<SvnItem>,
}

impl CommandResponse {
    pub(crate) fn success_params(&self, ctx: &str) -> Result<&[SvnItem], SvnError> {
        if self.success {
            Ok(&self.params)
        } else {
            Err(self.failure(ctx))
        }
    }

    pub(crate) fn ensure_success(&self, ctx: &str) -> Result<(), SvnError> {
        self.success_params(ctx).map(|_| ())
    }

    pub(crate) fn failure(&self, ctx: &str) -> SvnError {
        let err = parse_server_error(&self.errors);
        debug!(command = ctx, code = err.apr_err(), error = %err, "server reported failure");
        err
    }
}

pub(crate) struct ConnectionConfig {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) auth: Option<Auth>,
    pub(crate) url: String,
    pub(crate) ra_client: String,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
}

type DynRead = Box<dyn AsyncRead + Unpin + Send>;
type DynWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// One `svn://` connection: item framing, handshake and authentication.
pub(crate) struct RaSvnConnection {
    read: DynRead,
    write: DynWrite,
    buf: Vec<u8>,
    pos: usize,
    write_buf: Vec<u8>,
    username: Option<String>,
    password: Option<String>,
    auth: Option<Auth>,
    url: String,
    ra_client: String,
    read_timeout: Duration,
    write_timeout: Duration,
    server_caps: Vec<String>,
}

enum MechOutcome {
    Success,
    Failure(String),
}

impl RaSvnConnection {
    pub(crate) fn new(read: DynRead, write: DynWrite, config: ConnectionConfig) -> Self {
        Self {
            read,
            write,
            buf: Vec::new(),
            pos: 0,
            write_buf: Vec::new(),
            username: config.username,
            password: config.password,
            auth: config.auth,
            url: config.url,
            ra_client: config.ra_client,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            server_caps: Vec::new(),
        }
    }

    pub(crate) fn server_has_cap(&self, cap: &str) -> bool {
        self.server_caps.iter().any(|c| c == cap)
    }

    pub(crate) fn set_session_url(&mut self, url: String) {
        self.url = url;
    }

    pub(crate) async fn handshake(&mut self) -> Result<ServerInfo, SvnError> {
        let greeting = self.read_command_response().await?;
        let params = greeting.success_params("greeting")?;
        let [minver, maxver, _, caps, ..] = params else {
            return Err(SvnError::protocol("Malformed server greeting"));
        };
        let (Some(minver), Some(maxver)) = (minver.as_u64(), maxver.as_u64()) else {
            return Err(SvnError::protocol("Malformed server greeting"));
        };
        self.server_caps = caps
            .as_list()
            .map(|caps| {
                caps.iter()
                    .filter_map(|c| c.as_word().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        debug!(minver, maxver, caps = ?self.server_caps, "received server greeting");
        if !(minver..=maxver).contains(&PROTOCOL_VERSION) {
            return Err(SvnError::new(
                codes::RA_SVN_BAD_VERSION,
                format!("Server only supports versions {minver} to {maxver}"),
            ));
        }
        if !self.server_has_cap(Capability::EditPipeline.as_wire_word()) {
            return Err(SvnError::new(
                codes::RA_SVN_BAD_VERSION,
                "Server does not support edit pipelining",
            ));
        }

        debug!(url = %self.url, ra_client = %self.ra_client, "sending client greeting");
        let response = SvnItem::List(vec![
            SvnItem::Number(PROTOCOL_VERSION),
            SvnItem::List(
                CLIENT_CAPS
                    .into_iter()
                    .map(|cap| SvnItem::word(cap.as_wire_word()))
                    .collect(),
            ),
            SvnItem::string(&self.url),
            SvnItem::string(&self.ra_client),
            SvnItem::List(Vec::new()),
        ]);
        self.write_item(&response).await?;

        self.handle_auth_request().await?;

        let repos_info = self.read_command_response().await?;
        let repository: RepositoryInfo = parse_repos_info(repos_info.success_params("repos-info")?)?;
        for cap in &repository.capabilities {
            if !self.server_has_cap(cap) {
                self.server_caps.push(cap.clone());
            }
        }
        debug!(uuid = %repository.uuid, root = %repository.root_url, "handshake complete");
        Ok(ServerInfo {
            server_caps: self.server_caps.clone(),
            repository,
        })
    }

    pub(crate) async fn call(
        &mut self,
        command: &str,
        params: SvnItem,
    ) -> Result<CommandResponse, SvnError> {
        self.send_command(command, params).await?;
        self.handle_auth_request().await?;
        self.read_command_response().await
    }

    pub(crate) async fn send_command(&mut self, command: &str, params: SvnItem) -> Result<(), SvnError> {
        debug!(command, "sending command");
        self.write_buf.clear();
        encode_command(command, &params, &mut self.write_buf);
        self.write_buf.push(b'\n');

        let buf = std::mem::take(&mut self.write_buf);
        let result = self.write_wire_bytes(&buf).await;
        self.write_buf = buf;
        result
    }

    /// Reads an auth request (`( ( mech... ) realm )`) and authenticates if
    /// the mechanism list is non-empty.
    pub(crate) async fn handle_auth_request(&mut self) -> Result<(), SvnError> {
        let auth_req = self.read_command_response().await?;
        let params = auth_req.success_params("auth-request")?;
        let [mechs, realm, ..] = params else {
            return Err(SvnError::protocol("Malformed auth request"));
        };
        let mechs = mechs
            .as_list()
            .ok_or_else(|| SvnError::protocol("Malformed auth request"))?;
        if mechs.is_empty() {
            return Ok(());
        }
        let mechs: Vec<String> = mechs
            .iter()
            .filter_map(|m| m.as_word().map(str::to_string))
            .collect();
        let realm = realm.as_string().unwrap_or_default();
        debug!(realm = %realm, mechs = ?mechs, "server requires authentication");
        self.authenticate(&mechs, &realm).await
    }

    async fn authenticate(&mut self, mechs: &[String], realm: &str) -> Result<(), SvnError> {
        let offers = |name: &str| mechs.iter().any(|m| m == name);
        let mut last_failure = None::<String>;

        if let (Some(user), Some(pass)) = (self.username.clone(), self.password.clone())
            && !user.trim().is_empty()
        {
            for (mech, token) in password_mechs(mechs, &user, &pass) {
                match self.try_mech(&mech, token, Some((&user, &pass))).await? {
                    MechOutcome::Success => return Ok(()),
                    MechOutcome::Failure(message) => last_failure = Some(message),
                }
            }
        }

        if offers("ANONYMOUS") {
            match self.try_mech("ANONYMOUS", Some(Vec::new()), None).await? {
                MechOutcome::Success => return Ok(()),
                MechOutcome::Failure(message) => last_failure = Some(message),
            }
        }

        let wants_password = offers("CRAM-MD5") || offers("PLAIN");
        if wants_password && let Some(auth) = self.auth.clone() {
            let realm_string = self.realm_string(realm);
            match auth.credentials(CredentialKind::Simple.as_str(), &realm_string) {
                Ok(mut creds) => {
                    while let Some((user, pass)) = creds.next_simple()? {
                        for (mech, token) in password_mechs(mechs, &user, &pass) {
                            match self.try_mech(&mech, token, Some((&user, &pass))).await? {
                                MechOutcome::Success => return Ok(()),
                                MechOutcome::Failure(message) => last_failure = Some(message),
                            }
                        }
                    }
                }
                Err(err) => debug!(error = %err, "no simple credential providers"),
            }
        }

        match last_failure {
            Some(message) => Err(SvnError::new(codes::RA_NOT_AUTHORIZED, message)),
            None if wants_password => Err(SvnError::new(
                codes::RA_NOT_AUTHORIZED,
                "Can't get username or password",
            )),
            None => Err(SvnError::new(
                codes::RA_SVN_NO_MECHANISMS,
                format!("Cannot negotiate authentication mechanism (offered: {})", mechs.join(" ")),
            )),
        }
    }

    /// `<svn://host:port> realm`, the realm string auth providers are keyed on.
    fn realm_string(&self, realm: &str) -> String {
        match SvnUrl::parse(&self.url) {
            Ok(url) => format!("<svn://{}> {realm}", url.socket_addr()),
            Err(_) => realm.to_string(),
        }
    }

    async fn try_mech(
        &mut self,
        mech: &str,
        initial: Option<Vec<u8>>,
        creds: Option<(&str, &str)>,
    ) -> Result<MechOutcome, SvnError> {
        debug!(mech, "trying auth mechanism");
        self.write_item(&SvnItem::List(vec![
            SvnItem::word(mech),
            match initial {
                Some(token) => SvnItem::List(vec![SvnItem::String(token)]),
                None => SvnItem::List(Vec::new()),
            },
        ]))
        .await?;

        loop {
            let challenge = self.read_item().await?;
            let Some([kind, rest @ ..]) = challenge.as_list() else {
                return Err(SvnError::protocol("Malformed auth challenge"));
            };
            let token = rest
                .first()
                .and_then(SvnItem::as_list)
                .and_then(|list| list.first());
            match kind.as_word() {
                Some("step") => {
                    let challenge = token
                        .and_then(SvnItem::as_bytes)
                        .ok_or_else(|| SvnError::protocol("Auth step is missing its token"))?;
                    let (Some((user, pass)), "CRAM-MD5") = (creds, mech) else {
                        return Err(SvnError::protocol(format!("Unexpected auth step for {mech}")));
                    };
                    let reply = cram_md5_reply(user, pass, challenge)?;
                    self.write_item(&SvnItem::String(reply)).await?;
                }
                Some("success") => return Ok(MechOutcome::Success),
                Some("failure") => {
                    let message = token
                        .and_then(SvnItem::as_string)
                        .unwrap_or_else(|| "Authentication error from server".to_string());
                    debug!(mech, message = %message, "auth mechanism failed");
                    return Ok(MechOutcome::Failure(message));
                }
                _ => return Err(SvnError::protocol("Unexpected server response to authentication")),
            }
        }
    }

    pub(crate) async fn write_wire_bytes(&mut self, bytes: &[u8]) -> Result<(), SvnError> {
        tokio::time::timeout(self.write_timeout, self.write.write_all(bytes))
            .await
            .map_err(|_| timed_out("write timed out"))??;
        self.write.flush().await?;
        Ok(())
    }

    pub(crate) async fn write_item(&mut self, item: &SvnItem) -> Result<(), SvnError> {
        self.write_buf.clear();
        encode_item(item, &mut self.write_buf);
        self.write_buf.push(b'\n');

        let buf = std::mem::take(&mut self.write_buf);
        let result = self.write_wire_bytes(&buf).await;
        self.write_buf = buf;
        result
    }

    pub(crate) async fn read_command_response(&mut self) -> Result<CommandResponse, SvnError> {
        let item = self.read_item().await?;
        let Some([kind, rest @ ..]) = item.as_list() else {
            return Err(SvnError::protocol("Malformed command response"));
        };
        let payload = rest
            .first()
            .and_then(SvnItem::as_list)
            .map(<[SvnItem]>::to_vec)
            .unwrap_or_default();
        match kind.as_word() {
            Some("success") => Ok(CommandResponse {
                success: true,
                params: payload,
                errors: Vec::new(),
            }),
            Some("failure") => Ok(CommandResponse {
                success: false,
                params: Vec::new(),
                errors: payload,
            }),
            other => Err(SvnError::protocol(format!(
                "Unknown status '{}' in command response",
                other.unwrap_or("")
            ))),
        }
    }

    pub(crate) async fn read_item(&mut self) -> Result<SvnItem, SvnError> {
        tokio::time::timeout(self.read_timeout, self.read_item_inner())
            .await
            .map_err(|_| timed_out("read timed out"))?
    }

    /// Returns `true` if the server has sent something not yet consumed,
    /// without waiting.
    pub(crate) async fn data_available(&mut self) -> Result<bool, SvnError> {
        self.skip_buffered_ws();
        if self.pos < self.buf.len() {
            return Ok(true);
        }
        self.compact();

        let mut temp = [0u8; 16384];
        match tokio::time::timeout(Duration::from_millis(0), self.read.read(&mut temp)).await {
            Ok(Ok(0)) => Err(connection_closed()),
            Ok(Ok(n)) => {
                self.buf.extend_from_slice(&temp[..n]);
                self.skip_buffered_ws();
                Ok(self.pos < self.buf.len())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Ok(false),
        }
    }

    fn skip_buffered_ws(&mut self) {
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    async fn read_item_inner(&mut self) -> Result<SvnItem, SvnError> {
        skip_ws(self).await?;
        if self.peek_byte().await? == b'(' {
            return self.read_list().await;
        }
        self.read_atom().await
    }

    async fn read_list(&mut self) -> Result<SvnItem, SvnError> {
        self.consume_byte().await?;
        require_ws(self).await?;

        let mut stack: Vec<Vec<SvnItem>> = vec![Vec::new()];
        loop {
            skip_ws(self).await?;
            match self.peek_byte().await? {
                b')' => {
                    self.consume_byte().await?;
                    require_ws(self).await?;
                    let completed = stack
                        .pop()
                        .ok_or_else(|| SvnError::protocol("list stack underflow"))?;
                    let item = SvnItem::List(completed);
                    match stack.last_mut() {
                        Some(parent) => parent.push(item),
                        None => return Ok(item),
                    }
                }
                b'(' => {
                    self.consume_byte().await?;
                    require_ws(self).await?;
                    stack.push(Vec::new());
                }
                _ => {
                    let atom = self.read_atom().await?;
                    stack
                        .last_mut()
                        .ok_or_else(|| SvnError::protocol("list stack underflow"))?
                        .push(atom);
                }
            }
        }
    }

    async fn read_atom(&mut self) -> Result<SvnItem, SvnError> {
        skip_ws(self).await?;
        if self.peek_byte().await?.is_ascii_digit() {
            let n = parse_digits(self).await?;
            if self.peek_byte().await? == b':' {
                self.consume_byte().await?;
                let len = usize::try_from(n).map_err(|_| SvnError::protocol("String length overflow"))?;
                let bytes = self.read_exact_vec(len).await?;
                require_ws(self).await?;
                return Ok(SvnItem::String(bytes));
            }
            require_ws(self).await?;
            return Ok(SvnItem::Number(n));
        }
        let word = parse_word(self).await?;
        require_ws(self).await?;
        Ok(match word.as_str() {
            "true" => SvnItem::Bool(true),
            "false" => SvnItem::Bool(false),
            _ => SvnItem::Word(word),
        })
    }

    async fn read_exact_vec(&mut self, n: usize) -> Result<Vec<u8>, SvnError> {
        let mut out = Vec::with_capacity(n.min(1 << 20));
        while out.len() < n {
            if self.pos < self.buf.len() {
                let take = (n - out.len()).min(self.buf.len() - self.pos);
                out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
                self.pos += take;
            } else {
                self.fill().await?;
            }
        }
        Ok(out)
    }

    async fn fill(&mut self) -> Result<(), SvnError> {
        self.compact();
        let mut temp = [0u8; 16384];
        let n = self.read.read(&mut temp).await?;
        if n == 0 {
            return Err(connection_closed());
        }
        self.buf.extend_from_slice(&temp[..n]);
        Ok(())
    }

    async fn peek_byte(&mut self) -> Result<u8, SvnError> {
        loop {
            if let Some(b) = self.buf.get(self.pos) {
                return Ok(*b);
            }
            self.fill().await?;
        }
    }

    async fn consume_byte(&mut self) -> Result<u8, SvnError> {
        let b = self.peek_byte().await?;
        self.pos += 1;
        Ok(b)
    }
}

fn timed_out(what: &str) -> SvnError {
    std::io::Error::new(std::io::ErrorKind::TimedOut, what.to_string()).into()
}

fn connection_closed() -> SvnError {
    SvnError::new(
        codes::RA_SVN_CONNECTION_CLOSED,
        codes::describe(codes::RA_SVN_CONNECTION_CLOSED),
    )
}

/// Password mechanisms the server offers, strongest first, with their
/// initial tokens.
fn password_mechs(mechs: &[String], user: &str, pass: &str) -> Vec<(String, Option<Vec<u8>>)> {
    let mut out = Vec::new();
    if mechs.iter().any(|m| m == "CRAM-MD5") {
        out.push(("CRAM-MD5".to_string(), None));
    }
    if mechs.iter().any(|m| m == "PLAIN") {
        let mut token = Vec::with_capacity(user.len() + pass.len() + 2);
        token.push(0);
        token.extend_from_slice(user.as_bytes());
        token.push(0);
        token.extend_from_slice(pass.as_bytes());
        out.push(("PLAIN".to_string(), Some(token)));
    }
    out
}

/// `"<user> <hex hmac-md5(password, challenge)>"`
fn cram_md5_reply(user: &str, pass: &str, challenge: &[u8]) -> Result<Vec<u8>, SvnError> {
    let mut mac = Hmac::<Md5>::new_from_slice(pass.as_bytes())
        .map_err(|_| SvnError::new(codes::AUTHN_FAILED, "Failed to create HMAC-MD5"))?;
    mac.update(challenge);
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{user} {digest}").into_bytes())
}

async fn skip_ws(conn: &mut RaSvnConnection) -> Result<(), SvnError> {
    while conn.peek_byte().await?.is_ascii_whitespace() {
        conn.consume_byte().await?;
    }
    Ok(())
}

async fn require_ws(conn: &mut RaSvnConnection) -> Result<(), SvnError> {
    if conn.consume_byte().await?.is_ascii_whitespace() {
        Ok(())
    } else {
        Err(SvnError::protocol("expected whitespace"))
    }
}

async fn parse_digits(conn: &mut RaSvnConnection) -> Result<u64, SvnError> {
    let mut n = 0u64;
    loop {
        let b = conn.peek_byte().await?;
        if !b.is_ascii_digit() {
            return Ok(n);
        }
        conn.consume_byte().await?;
        n = n
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| SvnError::protocol("Number is larger than maximum"))?;
    }
}

async fn parse_word(conn: &mut RaSvnConnection) -> Result<String, SvnError> {
    let mut bytes = Vec::new();
    loop {
        let b = conn.peek_byte().await?;
        if b.is_ascii_whitespace() {
            break;
        }
        if matches!(b, b'(' | b')' | b':') {
            return Err(SvnError::protocol("Malformed word token"));
        }
        bytes.push(conn.consume_byte().await?);
    }
    String::from_utf8(bytes).map_err(|_| SvnError::protocol("Word token is not UTF-8"))
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::auth::simple_prompt_provider;
    use crate::value::Value;
    use proptest::prelude::*;
    use std::future::Future;

    pub(crate) fn run_async<T>(f: impl Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    pub(crate) async fn connected_conn_with(
        username: Option<&str>,
        password: Option<&str>,
        auth: Option<Auth>,
    ) -> (RaSvnConnection, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_task = tokio::spawn(async move { listener.accept().await });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server, _) = accept_task.await.unwrap().unwrap();

        let (read, write) = client.into_split();
        let conn = RaSvnConnection::new(
            Box::new(read),
            Box::new(write),
            ConnectionConfig {
                username: username.map(str::to_string),
                password: password.map(str::to_string),
                auth,
                url: "svn://example.com:3690/repo".to_string(),
                ra_client: "test-ra_svn".to_string(),
                read_timeout: Duration::from_secs(1),
                write_timeout: Duration::from_secs(1),
            },
        );
        (conn, server)
    }

    pub(crate) async fn connected_conn() -> (RaSvnConnection, tokio::net::TcpStream) {
        connected_conn_with(None, None, None).await
    }

    pub(crate) fn line(item: &SvnItem) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_item(item, &mut buf);
        buf.push(b'\n');
        buf
    }

    pub(crate) async fn write_item_line(stream: &mut tokio::net::TcpStream, item: &SvnItem) {
        stream.write_all(&line(item)).await.unwrap();
        stream.flush().await.unwrap();
    }

    pub(crate) async fn read_until_newline(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = stream.read(&mut byte).await.unwrap();
            if n == 0 {
                break;
            }
            buf.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        buf
    }

    fn success(params: Vec<SvnItem>) -> SvnItem {
        SvnItem::List(vec![SvnItem::word("success"), SvnItem::List(params)])
    }

    fn auth_request(mechs: &[&str]) -> SvnItem {
        success(vec![
            SvnItem::List(mechs.iter().map(|m| SvnItem::word(m)).collect()),
            SvnItem::string("realm"),
        ])
    }

    fn plain_token(user: &str, pass: &str) -> Vec<u8> {
        let mut token = vec![0];
        token.extend_from_slice(user.as_bytes());
        token.push(0);
        token.extend_from_slice(pass.as_bytes());
        token
    }

    fn arb_word() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_\\-]{0,31}".prop_filter("avoid bool words", |w| w != "true" && w != "false")
    }

    fn arb_item() -> impl Strategy<Value = SvnItem> {
        let leaf = prop_oneof![
            arb_word().prop_map(SvnItem::Word),
            any::<u64>().prop_map(SvnItem::Number),
            any::<bool>().prop_map(SvnItem::Bool),
            prop::collection::vec(any::<u8>(), 0..64).prop_map(SvnItem::String),
        ];
        leaf.prop_recursive(6, 256, 12, |inner| {
            prop::collection::vec(inner, 0..16).prop_map(SvnItem::List)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn encode_then_read_roundtrips(item in arb_item()) {
            run_async(async {
                let (mut conn, mut server) = connected_conn().await;
                server.write_all(&line(&item)).await.unwrap();
                server.flush().await.unwrap();
                assert_eq!(conn.read_item().await.unwrap(), item);
            });
        }
    }

    #[test]
    fn cram_md5_matches_known_vector() {
        let reply = cram_md5_reply("alice", "key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            String::from_utf8(reply).unwrap(),
            "alice 80070713463e7749b90c2dc24911e275"
        );
    }

    #[test]
    fn password_mechs_prefer_cram_md5() {
        let mechs = vec!["PLAIN".to_string(), "CRAM-MD5".to_string()];
        let choices = password_mechs(&mechs, "alice", "secret");
        assert_eq!(choices[0], ("CRAM-MD5".to_string(), None));
        assert_eq!(choices[1], ("PLAIN".to_string(), Some(plain_token("alice", "secret"))));
        assert!(password_mechs(&["ANONYMOUS".to_string()], "a", "b").is_empty());
    }

    #[test]
    fn fixed_credentials_fall_back_to_next_mechanism() {
        run_async(async {
            let (mut conn, mut server) = connected_conn_with(Some("alice"), Some("secret"), None).await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &auth_request(&["CRAM-MD5", "PLAIN"])).await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    line(&SvnItem::List(vec![SvnItem::word("CRAM-MD5"), SvnItem::List(Vec::new())]))
                );
                write_item_line(
                    &mut server,
                    &SvnItem::List(vec![SvnItem::word("failure"), SvnItem::List(vec![SvnItem::string("bad")])]),
                )
                .await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    line(&SvnItem::List(vec![
                        SvnItem::word("PLAIN"),
                        SvnItem::List(vec![SvnItem::String(plain_token("alice", "secret"))]),
                    ]))
                );
                write_item_line(&mut server, &SvnItem::List(vec![SvnItem::word("success")])).await;
            });
            conn.handle_auth_request().await.unwrap();
            server_task.await.unwrap();
        });
    }

    #[test]
    fn cram_md5_step_answers_challenge() {
        run_async(async {
            let (mut conn, mut server) = connected_conn_with(Some("alice"), Some("key"), None).await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &auth_request(&["CRAM-MD5"])).await;
                read_until_newline(&mut server).await;
                write_item_line(
                    &mut server,
                    &SvnItem::List(vec![
                        SvnItem::word("step"),
                        SvnItem::List(vec![SvnItem::string("The quick brown fox jumps over the lazy dog")]),
                    ]),
                )
                .await;
                let reply = read_until_newline(&mut server).await;
                assert_eq!(reply, line(&SvnItem::string("alice 80070713463e7749b90c2dc24911e275")));
                write_item_line(&mut server, &SvnItem::List(vec![SvnItem::word("success"), SvnItem::List(Vec::new())])).await;
            });
            conn.handle_auth_request().await.unwrap();
            server_task.await.unwrap();
        });
    }

    #[test]
    fn prompt_providers_supply_credentials_with_realm_string() {
        run_async(async {
            let realms = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            let seen = std::sync::Arc::clone(&realms);
            let auth = Auth::new(vec![simple_prompt_provider(
                Box::new(move |args: Vec<Value>| {
                    seen.lock().unwrap().push(args[0].clone());
                    Ok(Value::Tuple(vec![Value::from("bob"), Value::from("pw"), Value::Bool(false)]))
                }),
                0,
            )]);
            let (mut conn, mut server) = connected_conn_with(None, None, Some(auth)).await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &auth_request(&["PLAIN"])).await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    line(&SvnItem::List(vec![
                        SvnItem::word("PLAIN"),
                        SvnItem::List(vec![SvnItem::String(plain_token("bob", "pw"))]),
                    ]))
                );
                write_item_line(&mut server, &SvnItem::List(vec![SvnItem::word("success")])).await;
            });
            conn.handle_auth_request().await.unwrap();
            server_task.await.unwrap();
            assert_eq!(
                realms.lock().unwrap()[0],
                Value::from("<svn://example.com:3690> realm")
            );
        });
    }

    #[test]
    fn exhausted_credentials_are_not_authorized() {
        run_async(async {
            let (mut conn, mut server) = connected_conn().await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &auth_request(&["CRAM-MD5"])).await;
            });
            let err = conn.handle_auth_request().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_NOT_AUTHORIZED);
            server_task.await.unwrap();

            let (mut conn, mut server) = connected_conn().await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &auth_request(&["GSSAPI"])).await;
            });
            let err = conn.handle_auth_request().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_NO_MECHANISMS);
            server_task.await.unwrap();
        });
    }

    #[test]
    fn read_item_rejects_malformed_tokens() {
        run_async(async {
            let (mut conn, mut server) = connected_conn().await;
            server.write_all(b"wo(rd ").await.unwrap();
            let err = conn.read_item().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_MALFORMED_DATA);

            let (mut conn, mut server) = connected_conn().await;
            server.write_all(b"18446744073709551616 \n").await.unwrap();
            assert_eq!(conn.read_item().await.unwrap_err().apr_err(), codes::RA_SVN_MALFORMED_DATA);

            let (mut conn, mut server) = connected_conn().await;
            server.write_all(b"4:testX \n").await.unwrap();
            let err = conn.read_item().await.unwrap_err();
            assert_eq!(err.message(), Some("expected whitespace"));
        });
    }

    #[test]
    fn eof_is_a_closed_connection() {
        run_async(async {
            let (mut conn, server) = connected_conn().await;
            drop(server);
            let err = conn.read_item().await.unwrap_err();
            assert!(err.is_connection_closed());
        });
    }

    #[test]
    fn failure_responses_become_error_chains() {
        run_async(async {
            let (mut conn, mut server) = connected_conn().await;
            write_item_line(
                &mut server,
                &SvnItem::List(vec![
                    SvnItem::word("failure"),
                    SvnItem::List(vec![SvnItem::List(vec![
                        SvnItem::Number(160_013),
                        SvnItem::string("Path not found"),
                        SvnItem::string("tree.c"),
                        SvnItem::Number(1),
                    ])]),
                ]),
            )
            .await;
            let response = conn.read_command_response().await.unwrap();
            let err = response.ensure_success("stat").unwrap_err();
            assert_eq!(err.apr_err(), codes::FS_NOT_FOUND);
            assert_eq!(err.message(), Some("Path not found"));
        });
    }

    fn greeting(minver: u64, maxver: u64, caps: &[&str]) -> SvnItem {
        success(vec![
            SvnItem::Number(minver),
            SvnItem::Number(maxver),
            SvnItem::List(Vec::new()),
            SvnItem::List(caps.iter().map(|c| SvnItem::word(c)).collect()),
        ])
    }

    #[test]
    fn handshake_writes_expected_client_greeting() {
        run_async(async {
            let (mut conn, mut server) = connected_conn().await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &greeting(2, 2, &["edit-pipeline", "svndiff1"])).await;
                assert_eq!(
                    read_until_newline(&mut server).await,
                    b"( 2 ( edit-pipeline svndiff1 absent-entries depth mergeinfo log-revprops ) 27:svn://example.com:3690/repo 11:test-ra_svn ( ) ) \n".to_vec()
                );
                write_item_line(&mut server, &auth_request(&[])).await;
                write_item_line(
                    &mut server,
                    &success(vec![
                        SvnItem::string("uuid"),
                        SvnItem::string("svn://example.com/repo"),
                        SvnItem::List(vec![SvnItem::word("mergeinfo")]),
                    ]),
                )
                .await;
            });

            let info = conn.handshake().await.unwrap();
            assert!(conn.server_has_cap("svndiff1"));
            assert!(conn.server_has_cap("mergeinfo"));
            assert_eq!(info.repository.uuid, "uuid");
            assert_eq!(info.repository.root_url, "svn://example.com/repo");
            server_task.await.unwrap();
        });
    }

    #[test]
    fn handshake_rejects_incompatible_servers() {
        run_async(async {
            let (mut conn, mut server) = connected_conn().await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &greeting(3, 4, &["edit-pipeline"])).await;
            });
            let err = conn.handshake().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_BAD_VERSION);
            server_task.await.unwrap();

            let (mut conn, mut server) = connected_conn().await;
            let server_task = tokio::spawn(async move {
                write_item_line(&mut server, &greeting(2, 2, &[])).await;
            });
            let err = conn.handshake().await.unwrap_err();
            assert_eq!(err.apr_err(), codes::RA_SVN_BAD_VERSION);
            server_task.await.unwrap();
        });
    }
}
