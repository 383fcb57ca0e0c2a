//! Semantic versions carried in block headers and record files.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// `major.minor.patch[-pre]` as declared by the producing software.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(default)]
    pub pre: String,
}

impl SemanticVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: String::new(),
        }
    }

    pub fn with_pre(mut self, pre: impl Into<String>) -> Self {
        self.pre = pre.into();
        self
    }

    /// Whether this version's pre-release tag starts with `tag` (e.g. `alpha`
    /// matches `alpha.3`).
    pub fn has_pre_release(&self, tag: &str) -> bool {
        !tag.is_empty() && self.pre.starts_with(tag)
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                // a release sorts after any of its pre-releases
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for SemanticVersion {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('v');
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, pre.to_string()),
            None => (s, String::new()),
        };

        let mut parts = core.split('.');
        let mut next = |name: &str| -> Result<u32, TypesError> {
            parts
                .next()
                .ok_or_else(|| TypesError::InvalidVersion(format!("{s}: missing {name}")))?
                .parse()
                .map_err(|_| TypesError::InvalidVersion(format!("{s}: bad {name}")))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}
