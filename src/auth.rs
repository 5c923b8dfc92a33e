//! Authentication baton: credential providers and run-time parameters.
//!
//! A provider supplies one kind of credential (`svn.simple`,
//! `svn.username`, ...). Asking an [`Auth`] for credentials walks the
//! providers registered for that kind in order. Prompt providers are asked
//! once plus up to `retry_limit` more times before the next provider takes
//! over.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{SubversionException, host_error, set_pending};
use crate::value::{HostCallable, Value};
use crate::{Error, SvnError, codes};

/// Default username for every provider.
pub const PARAM_DEFAULT_USERNAME: &str = "svn:auth:username";
/// Default password for the simple provider.
pub const PARAM_DEFAULT_PASSWORD: &str = "svn:auth:password";
/// Never prompt when set.
pub const PARAM_NON_INTERACTIVE: &str = "svn:auth:non-interactive";
/// Tells callbacks not to save credentials when set.
pub const PARAM_NO_AUTH_CACHE: &str = "svn:auth:no-auth-cache";
/// Bit mask of certificate failures handed to server-trust prompts.
pub const PARAM_SSL_SERVER_FAILURES: &str = "svn:auth:ssl:failures";
/// Certificate description handed to server-trust prompts.
pub const PARAM_SSL_SERVER_CERT_INFO: &str = "svn:auth:ssl:cert-info";

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Kinds of credentials a provider can supply.
pub enum CredentialKind {
    /// `svn.simple`: username and password.
    Simple,
    /// `svn.username`: a username only.
    Username,
    /// `svn.ssl.client-cert`: path to a client certificate.
    SslClientCert,
    /// `svn.ssl.client-passphrase`: passphrase for a client certificate.
    SslClientCertPw,
    /// `svn.ssl.server`: which server certificate failures to accept.
    SslServerTrust,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::Simple => "svn.simple",
            CredentialKind::Username => "svn.username",
            CredentialKind::SslClientCert => "svn.ssl.client-cert",
            CredentialKind::SslClientCertPw => "svn.ssl.client-passphrase",
            CredentialKind::SslServerTrust => "svn.ssl.server",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            CredentialKind::Simple,
            CredentialKind::Username,
            CredentialKind::SslClientCert,
            CredentialKind::SslClientCertPw,
            CredentialKind::SslServerTrust,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == name)
    }
}

impl Display for CredentialKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type SharedCallback = Arc<Mutex<Box<dyn HostCallable + Send>>>;

enum Source {
    /// Answers from `svn:auth:username`, else the login name.
    Username,
    /// Answers from `svn:auth:username` and `svn:auth:password`.
    Simple,
    Prompt {
        callback: SharedCallback,
        retry_limit: u32,
    },
}

/// A credential provider (`svn_auth_provider_object_t`).
pub struct AuthProvider {
    kind: CredentialKind,
    source: Source,
}

impl AuthProvider {
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    fn prompt(kind: CredentialKind, callback: Box<dyn HostCallable + Send>, retry_limit: u32) -> Self {
        Self {
            kind,
            source: Source::Prompt {
                callback: Arc::new(Mutex::new(callback)),
                retry_limit,
            },
        }
    }

    fn clone_source(&self) -> Source {
        match &self.source {
            Source::Username => Source::Username,
            Source::Simple => Source::Simple,
            Source::Prompt {
                callback,
                retry_limit,
            } => Source::Prompt {
                callback: Arc::clone(callback),
                retry_limit: *retry_limit,
            },
        }
    }
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            Source::Username => "username",
            Source::Simple => "simple",
            Source::Prompt { .. } => "prompt",
        };
        f.debug_struct("AuthProvider")
            .field("kind", &self.kind)
            .field("source", &source)
            .finish()
    }
}

/// Username provider answering from `svn:auth:username` or the login name.
pub fn username_provider() -> AuthProvider {
    AuthProvider {
        kind: CredentialKind::Username,
        source: Source::Username,
    }
}

/// Username/password provider answering from the default parameters.
pub fn simple_provider() -> AuthProvider {
    AuthProvider {
        kind: CredentialKind::Simple,
        source: Source::Simple,
    }
}

/// Prompts with `callback(realm, may_save)`, expecting `(username, may_save)`.
pub fn username_prompt_provider(callback: Box<dyn HostCallable + Send>, retry_limit: u32) -> AuthProvider {
    AuthProvider::prompt(CredentialKind::Username, callback, retry_limit)
}

/// Prompts with `callback(realm, username, may_save)`, expecting
/// `(username, password, may_save)`.
pub fn simple_prompt_provider(callback: Box<dyn HostCallable + Send>, retry_limit: u32) -> AuthProvider {
    AuthProvider::prompt(CredentialKind::Simple, callback, retry_limit)
}

/// Prompts with `callback(realm, may_save)`, expecting `(cert_file, may_save)`.
pub fn ssl_client_cert_prompt_provider(
    callback: Box<dyn HostCallable + Send>,
    retry_limit: u32,
) -> AuthProvider {
    AuthProvider::prompt(CredentialKind::SslClientCert, callback, retry_limit)
}

/// Prompts with `callback(realm, may_save)`, expecting `(passphrase, may_save)`.
pub fn ssl_client_cert_pw_prompt_provider(
    callback: Box<dyn HostCallable + Send>,
    retry_limit: u32,
) -> AuthProvider {
    AuthProvider::prompt(CredentialKind::SslClientCertPw, callback, retry_limit)
}

/// Prompts with `callback(realm, failures, cert_info, may_save)`, expecting
/// `(accepted_failures, may_save)`. Asked once.
pub fn ssl_server_trust_prompt_provider(callback: Box<dyn HostCallable + Send>) -> AuthProvider {
    AuthProvider::prompt(CredentialKind::SslServerTrust, callback, 0)
}

/// Providers backed by the platform's password store.
///
/// No store is reachable from an `svn://` client without a keyring
/// integration, so the list is empty; it is still a valid argument to
/// [`Auth::new`].
pub fn platform_specific_client_providers() -> Vec<AuthProvider> {
    Vec::new()
}

#[derive(Default)]
struct AuthInner {
    providers: Vec<AuthProvider>,
    parameters: BTreeMap<String, Value>,
}

/// Authentication baton (`svn_auth_baton_t`). Clones share state.
#[derive(Clone, Default)]
pub struct Auth {
    inner: Arc<Mutex<AuthInner>>,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Auth")
            .field("providers", &inner.providers)
            .field("parameters", &inner.parameters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Auth {
    pub fn new(providers: Vec<AuthProvider>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuthInner {
                providers,
                parameters: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a run-time parameter. `svn:auth:ssl:failures` must be an integer.
    pub fn set_parameter(&self, name: &str, value: Value) -> Result<(), Error> {
        if name == PARAM_SSL_SERVER_FAILURES && !matches!(value, Value::Int(_)) {
            return Err(Error::Type(format!(
                "{name} expects an int, got {}",
                value.type_name()
            )));
        }
        debug!(name, "setting auth parameter");
        self.lock().parameters.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get_parameter(&self, name: &str) -> Option<Value> {
        self.lock().parameters.get(name).cloned()
    }

    /// Marks credentials from this baton as not to be saved.
    pub(crate) fn disable_caching(&self) {
        self.lock()
            .parameters
            .insert(PARAM_NO_AUTH_CACHE.to_string(), Value::Bool(true));
    }

    fn parameter_str(&self, name: &str) -> Option<String> {
        self.get_parameter(name)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    fn parameter_set(&self, name: &str) -> bool {
        self.get_parameter(name).is_some_and(|value| value.is_truthy())
    }

    /// Starts iterating credentials of `kind` for `realm`
    /// (`svn_auth_first_credentials`).
    ///
    /// Fails with `AUTHN_NO_PROVIDER` when no provider handles `kind`.
    pub fn credentials(&self, kind: &str, realm: &str) -> Result<Credentials, Error> {
        let no_provider = || {
            Error::Subversion(SubversionException::new(&SvnError::new(
                codes::AUTHN_NO_PROVIDER,
                format!("No provider registered for '{kind}' credentials"),
            )))
        };
        let kind = CredentialKind::from_name(kind).ok_or_else(no_provider)?;
        let sources: Vec<Source> = self
            .lock()
            .providers
            .iter()
            .filter(|provider| provider.kind == kind)
            .map(AuthProvider::clone_source)
            .collect();
        if sources.is_empty() {
            return Err(no_provider());
        }
        Ok(Credentials {
            auth: self.clone(),
            kind,
            realm: realm.to_string(),
            sources,
            current: 0,
            attempts: 0,
        })
    }
}

/// Iterator over credentials (`svn_auth_iterstate_t`).
///
/// Yields host tuples:
/// - `svn.simple`: `(username, password, may_save)`
/// - `svn.username`: `(username, may_save)`
/// - `svn.ssl.client-cert`: `(cert_file, may_save)`
/// - `svn.ssl.client-passphrase`: `(passphrase, may_save)`
/// - `svn.ssl.server`: `(accepted_failures, may_save)`
pub struct Credentials {
    auth: Auth,
    kind: CredentialKind,
    realm: String,
    sources: Vec<Source>,
    current: usize,
    attempts: u32,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .field("realm", &self.realm)
            .field("current", &self.current)
            .field("attempts", &self.attempts)
            .finish()
    }
}

fn login_name() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
}

fn expect_tuple(kind: CredentialKind, value: &Value, arity: usize) -> Result<Vec<Value>, Error> {
    match value.as_seq() {
        Some(items) if items.len() == arity => Ok(items.to_vec()),
        _ => Err(Error::Type(format!(
            "{kind} prompt must return a {arity}-tuple, got {}",
            value.type_name()
        ))),
    }
}

fn expect_str(kind: CredentialKind, value: &Value) -> Result<String, Error> {
    value
        .as_bytes()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .ok_or_else(|| Error::Type(format!("{kind} credentials must be strings")))
}

impl Credentials {
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Produces the next set of credentials, or `None` when every provider
    /// is exhausted (`svn_auth_next_credentials`).
    pub fn next_credentials(&mut self) -> Result<Option<Value>, Error> {
        while let Some(source) = self.sources.get(self.current) {
            let answer = match source {
                Source::Username | Source::Simple if self.attempts > 0 => None,
                Source::Username => self.default_username(),
                Source::Simple => self.default_simple(),
                Source::Prompt {
                    callback,
                    retry_limit,
                } => {
                    if self.attempts > *retry_limit
                        || self.auth.parameter_set(PARAM_NON_INTERACTIVE)
                    {
                        None
                    } else {
                        let callback = Arc::clone(callback);
                        Some(self.prompt(&callback)?)
                    }
                }
            };
            match answer {
                Some(value) => {
                    self.attempts += 1;
                    return Ok(Some(value));
                }
                None => {
                    self.current += 1;
                    self.attempts = 0;
                }
            }
        }
        Ok(None)
    }

    /// Whether the answers may be stored (`svn:auth:no-auth-cache` unset).
    pub fn may_save(&self) -> bool {
        !self.auth.parameter_set(PARAM_NO_AUTH_CACHE)
    }

    fn default_username(&self) -> Option<Value> {
        let username = self
            .auth
            .parameter_str(PARAM_DEFAULT_USERNAME)
            .or_else(login_name)?;
        Some(Value::Tuple(vec![
            Value::Str(username),
            Value::Int(i64::from(self.may_save())),
        ]))
    }

    fn default_simple(&self) -> Option<Value> {
        let username = self.auth.parameter_str(PARAM_DEFAULT_USERNAME)?;
        let password = self.auth.parameter_str(PARAM_DEFAULT_PASSWORD)?;
        Some(Value::Tuple(vec![
            Value::Str(username),
            Value::Str(password),
            Value::Int(i64::from(self.may_save())),
        ]))
    }

    fn prompt(&self, callback: &SharedCallback) -> Result<Value, Error> {
        let realm = Value::Str(self.realm.clone());
        let may_save = Value::Bool(self.may_save());
        let args = match self.kind {
            CredentialKind::Simple => vec![
                realm,
                self.auth
                    .parameter_str(PARAM_DEFAULT_USERNAME)
                    .map_or(Value::None, Value::Str),
                may_save,
            ],
            CredentialKind::SslServerTrust => vec![
                realm,
                self.auth
                    .get_parameter(PARAM_SSL_SERVER_FAILURES)
                    .unwrap_or(Value::Int(0)),
                self.auth
                    .get_parameter(PARAM_SSL_SERVER_CERT_INFO)
                    .unwrap_or(Value::None),
                may_save,
            ],
            _ => vec![realm, may_save],
        };
        debug!(kind = %self.kind, realm = %self.realm, attempt = self.attempts, "prompting for credentials");
        let answer = callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call(args)?;
        let kind = self.kind;
        match kind {
            CredentialKind::Simple => {
                let items = expect_tuple(kind, &answer, 3)?;
                Ok(Value::Tuple(vec![
                    Value::Str(expect_str(kind, &items[0])?),
                    Value::Str(expect_str(kind, &items[1])?),
                    Value::Int(i64::from(items[2].is_truthy())),
                ]))
            }
            CredentialKind::Username => {
                let items = expect_tuple(kind, &answer, 2)?;
                Ok(Value::Tuple(vec![
                    Value::Str(expect_str(kind, &items[0])?),
                    Value::Int(i64::from(items[1].is_truthy())),
                ]))
            }
            CredentialKind::SslClientCert | CredentialKind::SslClientCertPw => {
                let items = expect_tuple(kind, &answer, 2)?;
                Ok(Value::Tuple(vec![
                    Value::Str(expect_str(kind, &items[0])?),
                    Value::Bool(items[1].is_truthy()),
                ]))
            }
            CredentialKind::SslServerTrust => {
                let items = expect_tuple(kind, &answer, 2)?;
                let accepted = items[0].as_int().ok_or_else(|| {
                    Error::Type("accepted failures must be an int".to_string())
                })?;
                Ok(Value::Tuple(vec![
                    Value::Int(accepted),
                    Value::Int(i64::from(items[1].is_truthy())),
                ]))
            }
        }
    }

    /// Next username/password pair for the connection's auth exchange.
    ///
    /// A host exception raised by a prompt is left pending and reported as
    /// the host marker.
    pub(crate) fn next_simple(&mut self) -> Result<Option<(String, String)>, SvnError> {
        let value = match self.next_credentials() {
            Ok(value) => value,
            Err(Error::Subversion(exc)) => {
                return Err(SvnError::from_chain(exc.chain)
                    .unwrap_or_else(|| SvnError::new(exc.code, exc.message)));
            }
            Err(err) => {
                set_pending(err);
                return Err(host_error());
            }
        };
        Ok(value.and_then(|value| match value.as_seq() {
            Some([Value::Str(user), Value::Str(pass), ..]) => Some((user.clone(), pass.clone())),
            _ => None,
        }))
    }
}

impl Iterator for Credentials {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_credentials().transpose()
    }
}
