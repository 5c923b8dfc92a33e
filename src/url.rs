use crate::{SvnError, codes};

const SCHEME: &str = "svn://";
const DEFAULT_PORT: u16 = 3690;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A repository URL understood by the `ra_svn` layer.
///
/// Only `svn://` is accepted (default port `3690`). The URL keeps the
/// authority exactly as written, so URLs the server echoes back (repository
/// root, locations) compare equal to the one the caller opened. A trailing
/// `/` is dropped unless the path is the root.
pub struct SvnUrl {
    /// Hostname (or IP) portion of the URL, without brackets.
    pub host: String,
    /// TCP port, explicit or default.
    pub port: u16,
    /// Canonical URL string.
    pub url: String,
}

fn illegal(input: &str, why: &str) -> SvnError {
    SvnError::new(
        codes::RA_ILLEGAL_URL,
        format!("Illegal svn repository URL '{input}': {why}"),
    )
}

impl SvnUrl {
    /// Parses an `svn://` URL.
    ///
    /// # Examples
    ///
    /// ```
    /// # use subvert::SvnUrl;
    /// let url = SvnUrl::parse("svn://example.com/repo/").unwrap();
    /// assert_eq!(url.url, "svn://example.com/repo");
    /// assert_eq!(url.port, 3690);
    /// ```
    pub fn parse(input: &str) -> Result<Self, SvnError> {
        let input = input.trim();
        if input.len() < SCHEME.len() || !input[..SCHEME.len()].eq_ignore_ascii_case(SCHEME) {
            return Err(SvnError::new(
                codes::RA_ILLEGAL_URL,
                format!("Unrecognized URL scheme for '{input}'"),
            ));
        }
        let rest = &input[SCHEME.len()..];
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let hostport = match authority.rsplit_once('@') {
            Some((user, _)) if user.contains(':') => {
                return Err(illegal(input, "passwords are not allowed in URLs"));
            }
            Some((user, _)) if user.trim().is_empty() => {
                return Err(illegal(input, "empty username"));
            }
            Some((_, hostport)) => hostport,
            None => authority,
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let end = bracketed
                .find(']')
                .ok_or_else(|| illegal(input, "unterminated IPv6 address"))?;
            let after = &bracketed[end + 1..];
            let port = match after.strip_prefix(':') {
                Some(port) => parse_port(input, port)?,
                None if after.is_empty() => DEFAULT_PORT,
                None => return Err(illegal(input, "junk after IPv6 address")),
            };
            (&bracketed[..end], port)
        } else {
            match hostport.split_once(':') {
                Some((_, port)) if port.contains(':') => {
                    return Err(illegal(input, "IPv6 addresses must be enclosed in brackets"));
                }
                Some((host, port)) => (host, parse_port(input, port)?),
                None => (hostport, DEFAULT_PORT),
            }
        };
        if host.trim().is_empty() {
            return Err(illegal(input, "missing host"));
        }

        let path = canonical_path(path);
        Ok(Self {
            host: host.to_string(),
            port,
            url: format!("{SCHEME}{authority}{path}"),
        })
    }

    /// Returns a `host:port` string suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns `true` if `other` is on the same server.
    pub fn same_server(&self, other: &SvnUrl) -> bool {
        self.host.eq_ignore_ascii_case(&other.host) && self.port == other.port
    }

    /// Appends a relative path.
    pub fn join(&self, relpath: &str) -> String {
        let relpath = relpath.trim_matches('/');
        if relpath.is_empty() {
            self.url.clone()
        } else if self.url.ends_with('/') {
            format!("{}{relpath}", self.url)
        } else {
            format!("{}/{relpath}", self.url)
        }
    }

    /// Path of this URL below `root`, with a leading `/`, if `root` is an
    /// ancestor (or the URL itself).
    pub fn path_below(&self, root: &str) -> Option<String> {
        let root = root.trim_end_matches('/');
        let rest = self.url.strip_prefix(root)?;
        if rest.is_empty() {
            Some("/".to_string())
        } else if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            None
        }
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16, SvnError> {
    port.parse::<u16>()
        .map_err(|_| illegal(input, "invalid port"))
}

fn canonical_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for SvnUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for SvnUrl {
    type Err = SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
