use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Storage backend family a [`Locator`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorScheme {
    /// Process-local in-memory store: `memory://{container}/{name}`.
    Memory,
    /// Filesystem store: `file:///{root}/{container}/{name}`.
    File,
}

impl LocatorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

impl fmt::Display for LocatorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-describing absolute address of a stored object.
///
/// A locator carries everything a backend needs to resolve the object: the
/// scheme, the backend root (filesystem only), the container and the object
/// name. Readers holding a locator never need container context.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    scheme: LocatorScheme,
    /// Absolute root directory for `file` locators; empty for `memory`.
    root: String,
    container: String,
    name: String,
}

impl Locator {
    /// Locator for an object held by an in-memory store.
    pub fn memory(container: &str, name: &str) -> Result<Self, TypeError> {
        validate_segment(container)?;
        validate_segment(name)?;
        Ok(Self {
            scheme: LocatorScheme::Memory,
            root: String::new(),
            container: container.to_string(),
            name: name.to_string(),
        })
    }

    /// Locator for an object stored under `root/container/name` on disk.
    ///
    /// `root` must be absolute.
    pub fn file(root: &Path, container: &str, name: &str) -> Result<Self, TypeError> {
        validate_segment(container)?;
        validate_segment(name)?;
        let root_str = root
            .to_str()
            .ok_or_else(|| TypeError::InvalidName(format!("non UTF-8 root: {}", root.display())))?;
        if !root_str.starts_with('/') {
            return Err(TypeError::InvalidName(format!(
                "storage root must be absolute: {root_str}"
            )));
        }
        Ok(Self {
            scheme: LocatorScheme::File,
            root: root_str.trim_end_matches('/').to_string(),
            container: container.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse a locator from its string form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| TypeError::locator(s, "missing scheme"))?;

        match scheme {
            "memory" => {
                let (container, name) = rest
                    .split_once('/')
                    .ok_or_else(|| TypeError::locator(s, "expected memory://{container}/{name}"))?;
                Self::memory(container, name).map_err(|e| TypeError::locator(s, e.to_string()))
            }
            "file" => {
                if !rest.starts_with('/') {
                    return Err(TypeError::locator(s, "file locator must carry an absolute path"));
                }
                let (parent, name) = rest
                    .rsplit_once('/')
                    .ok_or_else(|| TypeError::locator(s, "missing object name"))?;
                let (root, container) = parent
                    .rsplit_once('/')
                    .ok_or_else(|| TypeError::locator(s, "missing container"))?;
                let root = if root.is_empty() { "/" } else { root };
                Self::file(Path::new(root), container, name)
                    .map_err(|e| TypeError::locator(s, e.to_string()))
            }
            other => Err(TypeError::locator(s, format!("unsupported scheme '{other}'"))),
        }
    }

    pub fn scheme(&self) -> LocatorScheme {
        self.scheme
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory of a `file` locator.
    pub fn root(&self) -> Option<&Path> {
        match self.scheme {
            LocatorScheme::File => Some(Path::new(if self.root.is_empty() { "/" } else { &self.root })),
            LocatorScheme::Memory => None,
        }
    }

    /// Full filesystem path of a `file` locator.
    pub fn to_path(&self) -> Option<PathBuf> {
        self.root()
            .map(|root| root.join(&self.container).join(&self.name))
    }
}

/// Container and object names are single path segments.
fn validate_segment(segment: &str) -> Result<(), TypeError> {
    if segment.is_empty() {
        return Err(TypeError::InvalidName("empty path segment".into()));
    }
    if segment == "." || segment == ".." {
        return Err(TypeError::InvalidName(format!("reserved segment '{segment}'")));
    }
    if segment.contains(['/', '\\']) || segment.chars().any(char::is_control) {
        return Err(TypeError::InvalidName(format!(
            "segment '{}' contains a separator or control character",
            segment.escape_default()
        )));
    }
    Ok(())
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            LocatorScheme::Memory => write!(f, "memory://{}/{}", self.container, self.name),
            LocatorScheme::File => {
                write!(f, "file://{}/{}/{}", self.root, self.container, self.name)
            }
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({self})")
    }
}

impl FromStr for Locator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}
