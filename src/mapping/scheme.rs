//! Branching schemes: which repository paths are branches.

use std::fmt;

use super::MappingError;

/// Splits repository paths into a branch path and a path inside the branch.
///
/// The `Display` form is the scheme name embedded in revision ids.
pub trait BranchingScheme: fmt::Display + fmt::Debug + Send + Sync {
    fn is_branch(&self, path: &str) -> bool;

    /// Returns `(branch_path, inner_path)`, both without surrounding slashes.
    fn unprefix(&self, path: &str) -> Result<(String, String), MappingError>;
}

/// The whole repository is a single branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoBranchingScheme;

impl BranchingScheme for NoBranchingScheme {
    fn is_branch(&self, path: &str) -> bool {
        path.trim_matches('/').is_empty()
    }

    fn unprefix(&self, path: &str) -> Result<(String, String), MappingError> {
        Ok((String::new(), path.trim_matches('/').to_string()))
    }
}

impl fmt::Display for NoBranchingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("none")
    }
}

/// `trunk`, `branches/*` and `tags/*` found `level` directories deep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrunkBranchingScheme {
    pub level: usize,
}

impl TrunkBranchingScheme {
    pub fn new(level: usize) -> Self {
        Self { level }
    }
}

fn split_parts(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

impl BranchingScheme for TrunkBranchingScheme {
    fn is_branch(&self, path: &str) -> bool {
        let parts = split_parts(path);
        let level = self.level;
        (parts.len() == level + 1 && parts[level] == "trunk")
            || (parts.len() == level + 2 && matches!(parts[level], "branches" | "tags"))
    }

    fn unprefix(&self, path: &str) -> Result<(String, String), MappingError> {
        let parts = split_parts(path);
        let level = self.level;
        let split = match parts.get(level) {
            Some(&"trunk" | &"hooks") => level + 1,
            Some(&"branches" | &"tags") if parts.len() >= level + 2 => level + 2,
            _ => return Err(MappingError::NotBranch(path.to_string())),
        };
        Ok((parts[..split].join("/"), parts[split..].join("/")))
    }
}

impl fmt::Display for TrunkBranchingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trunk{}", self.level)
    }
}

/// Parses a scheme name: `none`, `trunk` (level 0) or `trunkN`.
pub fn parse_scheme(name: &str) -> Result<Box<dyn BranchingScheme>, MappingError> {
    if name == "none" {
        return Ok(Box::new(NoBranchingScheme));
    }
    if let Some(level) = name.strip_prefix("trunk") {
        if level.is_empty() {
            return Ok(Box::new(TrunkBranchingScheme::new(0)));
        }
        if level.bytes().all(|b| b.is_ascii_digit())
            && let Ok(level) = level.parse()
        {
            return Ok(Box::new(TrunkBranchingScheme::new(level)));
        }
    }
    Err(MappingError::UnknownBranchingScheme(name.to_string()))
}

/// Picks the scheme under which `branch_path` is a branch, falling back to
/// [`NoBranchingScheme`].
pub fn guess_scheme_from_branch_path(branch_path: &str) -> Box<dyn BranchingScheme> {
    let parts = split_parts(branch_path);
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if (*part == "trunk" && i == last)
            || (matches!(*part, "branches" | "tags") && i + 1 == last)
        {
            return Box::new(TrunkBranchingScheme::new(i));
        }
    }
    Box::new(NoBranchingScheme)
}
