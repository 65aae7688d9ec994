use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_newtype!(DocumentId, "doc");
id_newtype!(WindowId, "window");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerRole {
    Source,
    VisualDesign,
    Preview,
    Tool,
}

/// One way of displaying a descriptor, as offered by a controller factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerDescription {
    pub name: String,
    pub is_default: bool,
    pub role: ControllerRole,
}

impl ControllerDescription {
    pub fn new(name: impl Into<String>, is_default: bool, role: ControllerRole) -> Self {
        Self {
            name: name.into(),
            is_default,
            role,
        }
    }
}

/// Project or solution item that owns a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceOwner(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    File {
        path: PathBuf,
        owner: Option<WorkspaceOwner>,
        content: Option<Arc<[u8]>>,
    },
    Memory {
        key: String,
        content: Arc<[u8]>,
    },
}

/// Immutable description of content that can be opened as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDescriptor {
    source: DescriptorSource,
    mime_type: String,
}

impl DocumentDescriptor {
    pub fn file(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            source: DescriptorSource::File {
                path: path.into(),
                owner: None,
                content: None,
            },
            mime_type: mime_type.into(),
        }
    }

    /// A file descriptor whose content is supplied up front instead of read from disk.
    pub fn file_with_content(
        path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            source: DescriptorSource::File {
                path: path.into(),
                owner: None,
                content: Some(content.into()),
            },
            mime_type: mime_type.into(),
        }
    }

    pub fn in_memory(
        key: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            source: DescriptorSource::Memory {
                key: key.into(),
                content: content.into(),
            },
            mime_type: mime_type.into(),
        }
    }

    pub fn with_owner(mut self, new_owner: WorkspaceOwner) -> Self {
        if let DescriptorSource::File { owner, .. } = &mut self.source {
            *owner = Some(new_owner);
        }
        self
    }

    /// Same descriptor pointing at `new_path`. Memory descriptors are returned unchanged.
    pub fn renamed(&self, new_path: impl Into<PathBuf>) -> Self {
        let mut renamed = self.clone();
        if let DescriptorSource::File { path, .. } = &mut renamed.source {
            *path = new_path.into();
        }
        renamed
    }

    pub fn source(&self) -> &DescriptorSource {
        &self.source
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            DescriptorSource::File { path, .. } => Some(path),
            DescriptorSource::Memory { .. } => None,
        }
    }

    pub fn owner(&self) -> Option<&WorkspaceOwner> {
        match &self.source {
            DescriptorSource::File { owner, .. } => owner.as_ref(),
            DescriptorSource::Memory { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        match &self.source {
            DescriptorSource::File { content, .. } => content.as_deref(),
            DescriptorSource::Memory { content, .. } => Some(content),
        }
    }

    /// Lowercased extension including the leading dot, e.g. `.rs`.
    pub fn extension(&self) -> Option<String> {
        let name = match &self.source {
            DescriptorSource::File { path, .. } => path.file_name()?.to_str()?.to_string(),
            DescriptorSource::Memory { key, .. } => key.rsplit(['/', '\\']).next()?.to_string(),
        };
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(format!(".{}", ext.to_ascii_lowercase()))
    }

    pub fn display_name(&self) -> String {
        match &self.source {
            DescriptorSource::File { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            DescriptorSource::Memory { key, .. } => key.clone(),
        }
    }

    pub fn identity(&self, base_dir: &Path) -> DocumentIdentity {
        match &self.source {
            DescriptorSource::File { path, .. } => {
                DocumentIdentity::File(normalize_full_path(path, base_dir))
            }
            DescriptorSource::Memory { key, .. } => DocumentIdentity::Memory(key.clone()),
        }
    }
}

impl fmt::Display for DocumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            DescriptorSource::File { path, .. } => {
                write!(f, "{} ({})", path.display(), self.mime_type)
            }
            DescriptorSource::Memory { key, .. } => write!(f, "memory:{key} ({})", self.mime_type),
        }
    }
}

/// Key used to decide whether two opens refer to the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentIdentity {
    File(PathBuf),
    Memory(String),
    /// Controller opened without a descriptor; never shared.
    Anonymous(DocumentId),
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentIdentity::File(path) => write!(f, "{}", path.display()),
            DocumentIdentity::Memory(key) => write!(f, "memory:{key}"),
            DocumentIdentity::Anonymous(id) => write!(f, "anonymous:{id}"),
        }
    }
}

/// Resolves `path` against `base_dir` and folds `.` and `..` segments
/// without touching the file system.
pub fn normalize_full_path(path: &Path, base_dir: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` above the root stays at the root.
                if normalized.file_name().is_some() {
                    normalized.pop();
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
