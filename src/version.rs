use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::value::Value;
use crate::{Error, SvnError, codes};

/// A Subversion library version (`svn_version_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Version tag, for example `-dev` or empty for releases.
    pub tag: String,
}

impl Version {
    pub const fn new_release(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            tag: String::new(),
        }
    }

    /// Parses `MAJOR.MINOR.PATCH[tag]`, for example `1.14.2` or `1.15.0-dev`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();
        let mut parts = input.splitn(3, '.');
        let major = parse_component(parts.next(), input)?;
        let minor = parse_component(parts.next(), input)?;
        let rest = parts
            .next()
            .ok_or_else(|| Error::Value(format!("invalid version: {input:?}")))?;
        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let patch = parse_component(Some(&rest[..split]), input)?;
        Ok(Self {
            major,
            minor,
            patch,
            tag: rest[split..].to_string(),
        })
    }

    /// `svn_ver_compatible`: can code built against `self` use library `lib`?
    ///
    /// A development library must match exactly. A development client needs
    /// the same major and minor and a newer patch. Otherwise majors must match
    /// and the library must not be older in the minor number.
    pub fn is_compatible_with(&self, lib: &Version) -> bool {
        if !lib.tag.is_empty() {
            return self == lib;
        }
        if !self.tag.is_empty() {
            return self.major == lib.major && self.minor == lib.minor && self.patch > lib.patch;
        }
        self.major == lib.major && self.minor <= lib.minor
    }

    /// Checks compatibility and reports a `VERSION_MISMATCH` native error otherwise.
    pub fn check_compatible(&self, lib: &Version, what: &str) -> Result<(), SvnError> {
        if self.is_compatible_with(lib) {
            Ok(())
        } else {
            Err(SvnError::new(
                codes::VERSION_MISMATCH,
                format!("Version mismatch in '{what}': found {lib}, expected {self}"),
            ))
        }
    }

    /// `(major, minor, patch, tag)` for the host.
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Int(i64::from(self.major)),
            Value::Int(i64::from(self.minor)),
            Value::Int(i64::from(self.patch)),
            Value::Str(self.tag.clone()),
        ])
    }
}

fn parse_component(part: Option<&str>, input: &str) -> Result<u32, Error> {
    part.and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(|| Error::Value(format!("invalid version: {input:?}")))
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}{}", self.major, self.minor, self.patch, self.tag)
    }
}

/// Version of the native layer: the bundled `ra_svn` client speaks the
/// Subversion 1.14 protocol.
pub fn version() -> Version {
    Version::new_release(1, 14, 0)
}

/// Version of the Subversion API these bindings were written against.
pub fn api_version() -> Version {
    Version::new_release(1, 10, 0)
}
