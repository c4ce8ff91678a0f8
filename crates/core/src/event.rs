//! Storage gateway event payloads.
//!
//! The webhook translator sends `{provider, action, metadata}` for
//! create/update/delete and `{action, source, destination}` for
//! move/rename/copy. Metadata mirrors the gateway's own file schema.

use crate::provider::Provider;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// File or folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Folder,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            other => Err(crate::Error::InvalidPayload(format!("unknown kind: {other}"))),
        }
    }
}

/// Provider-specific extras.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileExtra {
    #[serde(default, deserialize_with = "loose_string")]
    pub version: Option<String>,
}

/// File metadata as reported by the storage gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Provider path (an opaque id on primary storage).
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    /// Human-facing path.
    #[serde(default)]
    pub materialized: String,
    #[serde(default)]
    pub kind: FileKind,
    /// Size in bytes as sent. Kept signed so malformed negative sizes can be
    /// detected and rejected.
    #[serde(default, deserialize_with = "loose_i64")]
    pub size: Option<i64>,
    #[serde(default)]
    pub created_utc: Option<String>,
    #[serde(default)]
    pub modified_utc: Option<String>,
    #[serde(default)]
    pub extra: FileExtra,
    /// Folder contents, when the sender expanded them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileMetadata>,
}

impl FileMetadata {
    /// Create metadata for a file at a materialized path.
    pub fn file(materialized: &str, size: u64) -> Self {
        let materialized = crate::path::normalize(materialized);
        Self {
            path: materialized.clone(),
            name: crate::path::file_name(&materialized).to_string(),
            materialized,
            kind: FileKind::File,
            size: i64::try_from(size).ok(),
            ..Self::default()
        }
    }

    /// Create metadata for a folder at a materialized path.
    pub fn folder(materialized: &str) -> Self {
        let mut materialized = crate::path::normalize(materialized);
        if !materialized.ends_with('/') {
            materialized.push('/');
        }
        Self {
            path: materialized.clone(),
            name: crate::path::file_name(&materialized).to_string(),
            materialized,
            kind: FileKind::Folder,
            ..Self::default()
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    /// Size if present and non-negative.
    pub fn parsed_size(&self) -> Option<u64> {
        self.size.and_then(|s| u64::try_from(s).ok())
    }

    /// Normalized materialized path; folders always end in `/`.
    pub fn materialized_path(&self) -> String {
        let source = if self.materialized.is_empty() {
            &self.path
        } else {
            &self.materialized
        };
        let mut path = crate::path::normalize(source);
        if self.is_folder() && !path.ends_with('/') {
            path.push('/');
        }
        path
    }

    /// Provider path, normalized.
    pub fn provider_path(&self) -> String {
        if self.path.is_empty() {
            self.materialized_path()
        } else {
            crate::path::normalize(&self.path)
        }
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        parse_timestamp(self.created_utc.as_deref())
    }

    pub fn modified_at(&self) -> Option<OffsetDateTime> {
        parse_timestamp(self.modified_utc.as_deref())
    }

    /// Every file in this tree (including `self` when it is a file),
    /// in depth-first order.
    pub fn files(&self) -> Vec<&FileMetadata> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_folder() {
                stack.extend(node.children.iter().rev());
            } else {
                out.push(node);
            }
        }
        out
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<OffsetDateTime> {
    value.and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

fn loose_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(v)) => Some(v),
        Some(Loose::Float(v)) if v.is_finite() => Some(v as i64),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(v)) => Some(v.to_string()),
        Some(Loose::Float(v)) => Some(v.to_string()),
        Some(Loose::Text(s)) => Some(s),
        None => None,
    })
}

/// Event action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
    Move,
    Copy,
    Rename,
}

/// Reference to the project a move endpoint belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "_id")]
    pub id: String,
}

/// One side of a move/rename/copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveEndpoint {
    pub provider: String,
    #[serde(default)]
    pub node: Option<NodeRef>,
    #[serde(flatten)]
    pub metadata: FileMetadata,
}

impl MoveEndpoint {
    pub fn provider(&self) -> crate::Result<Provider> {
        Provider::parse(&self.provider)
    }
}

/// Raw webhook payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub action: Option<EventAction>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
    #[serde(default)]
    pub source: Option<MoveEndpoint>,
    #[serde(default)]
    pub destination: Option<MoveEndpoint>,
}

/// A validated file event.
#[derive(Clone, Debug, PartialEq)]
pub enum FileEvent {
    Created {
        provider: Provider,
        metadata: FileMetadata,
    },
    Updated {
        provider: Provider,
        metadata: FileMetadata,
    },
    Deleted {
        provider: Provider,
        metadata: FileMetadata,
    },
    /// Move or rename.
    Moved {
        source: MoveEndpoint,
        destination: MoveEndpoint,
    },
    Copied {
        source: MoveEndpoint,
        destination: MoveEndpoint,
    },
}

impl EventPayload {
    /// Parse a JSON payload.
    pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Validate the payload shape for its action.
    ///
    /// A payload without an action is a move when it carries both endpoints
    /// and a create otherwise.
    pub fn into_event(self) -> crate::Result<FileEvent> {
        let action = match self.action {
            Some(action) => action,
            None if self.source.is_some() && self.destination.is_some() => EventAction::Move,
            None => EventAction::Create,
        };

        match action {
            EventAction::Create | EventAction::Update | EventAction::Delete => {
                let provider = self
                    .provider
                    .as_deref()
                    .ok_or_else(|| crate::Error::InvalidPayload("missing provider".to_string()))
                    .and_then(Provider::parse)?;
                let metadata = self
                    .metadata
                    .ok_or_else(|| crate::Error::InvalidPayload("missing metadata".to_string()))?;
                Ok(match action {
                    EventAction::Create => FileEvent::Created { provider, metadata },
                    EventAction::Update => FileEvent::Updated { provider, metadata },
                    _ => FileEvent::Deleted { provider, metadata },
                })
            }
            EventAction::Move | EventAction::Rename | EventAction::Copy => {
                let (Some(source), Some(destination)) = (self.source, self.destination) else {
                    return Err(crate::Error::InvalidPayload(
                        "move/copy requires source and destination".to_string(),
                    ));
                };
                source.provider()?;
                destination.provider()?;
                Ok(if action == EventAction::Copy {
                    FileEvent::Copied {
                        source,
                        destination,
                    }
                } else {
                    FileEvent::Moved {
                        source,
                        destination,
                    }
                })
            }
        }
    }
}
