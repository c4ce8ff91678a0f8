//! Storage providers and quota classes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A storage provider a file can live on.
///
/// Providers differ in how their paths are addressed and which quota
/// counter (if any) they charge. Anything not known by name is carried
/// through as [`Provider::Other`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    /// Primary storage. Paths are opaque ids, charged to the project's storage class.
    OsfStorage,
    /// Nextcloud addon on a user-owned server.
    Nextcloud,
    /// Institution-managed Nextcloud.
    NextcloudInstitutions,
    /// Institution-managed S3-compatible storage.
    S3CompatInstitutions,
    /// Institution-managed ownCloud.
    OwnCloudInstitutions,
    /// Amazon S3 addon.
    S3,
    /// Any other addon provider.
    Other(String),
}

impl Provider {
    /// Parse a provider name. Unknown names become [`Provider::Other`].
    pub fn parse(s: &str) -> crate::Result<Self> {
        let name = s.trim();
        if name.is_empty() {
            return Err(crate::Error::InvalidProvider("empty provider name".to_string()));
        }
        Ok(match name {
            crate::PRIMARY_PROVIDER => Self::OsfStorage,
            "nextcloud" => Self::Nextcloud,
            "nextcloudinstitutions" => Self::NextcloudInstitutions,
            "s3compatinstitutions" => Self::S3CompatInstitutions,
            "ocinstitutions" => Self::OwnCloudInstitutions,
            "s3" => Self::S3,
            other => Self::Other(other.to_string()),
        })
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::OsfStorage => crate::PRIMARY_PROVIDER,
            Self::Nextcloud => "nextcloud",
            Self::NextcloudInstitutions => "nextcloudinstitutions",
            Self::S3CompatInstitutions => "s3compatinstitutions",
            Self::OwnCloudInstitutions => "ocinstitutions",
            Self::S3 => "s3",
            Self::Other(name) => name,
        }
    }

    /// Whether this is the primary storage provider.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::OsfStorage)
    }

    /// Institution-managed providers charge the per-institution quota.
    pub fn is_institutional(&self) -> bool {
        match self {
            Self::NextcloudInstitutions
            | Self::S3CompatInstitutions
            | Self::OwnCloudInstitutions => true,
            Self::Other(name) => name.ends_with("institutions"),
            _ => false,
        }
    }

    /// Whether the provider's own path is an opaque id rather than the
    /// materialized path.
    pub fn has_opaque_paths(&self) -> bool {
        matches!(self, Self::OsfStorage)
    }

    /// Quota class charged for files on this provider, given the owning
    /// project's storage class. `None` means the provider is not charged.
    pub fn charged_storage_type(&self, project_storage: Option<StorageType>) -> Option<StorageType> {
        if self.is_primary() {
            Some(project_storage.unwrap_or_default())
        } else if self.is_institutional() {
            Some(StorageType::Custom)
        } else {
            None
        }
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or(Self::Other(s))
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider({})", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota class a project's primary storage charges against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Generic storage counter.
    #[default]
    Default,
    /// Per-institution custom storage counter.
    Custom,
}

impl StorageType {
    /// Every storage class, in code order.
    pub const ALL: [StorageType; 2] = [StorageType::Default, StorageType::Custom];

    /// Stored integer code.
    pub fn code(self) -> i64 {
        match self {
            Self::Default => 1,
            Self::Custom => 2,
        }
    }

    /// Parse a stored integer code.
    pub fn from_code(code: i64) -> crate::Result<Self> {
        match code {
            1 => Ok(Self::Default),
            2 => Ok(Self::Custom),
            other => Err(crate::Error::InvalidStorageType(other)),
        }
    }

    /// Get the string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_roundtrip() {
        for name in [
            "osfstorage",
            "nextcloud",
            "nextcloudinstitutions",
            "s3compatinstitutions",
            "ocinstitutions",
            "s3",
            "github",
        ] {
            assert_eq!(Provider::parse(name).unwrap().as_str(), name);
        }
        assert!(Provider::parse("  ").is_err());
    }

    #[test]
    fn test_institutional_detection() {
        assert!(Provider::NextcloudInstitutions.is_institutional());
        assert!(Provider::parse("dropboxbusinessinstitutions").unwrap().is_institutional());
        assert!(!Provider::OsfStorage.is_institutional());
        assert!(!Provider::Nextcloud.is_institutional());
    }

    #[test]
    fn test_charged_storage_type() {
        assert_eq!(
            Provider::OsfStorage.charged_storage_type(None),
            Some(StorageType::Default)
        );
        assert_eq!(
            Provider::OsfStorage.charged_storage_type(Some(StorageType::Custom)),
            Some(StorageType::Custom)
        );
        assert_eq!(
            Provider::S3CompatInstitutions.charged_storage_type(None),
            Some(StorageType::Custom)
        );
        assert_eq!(Provider::S3.charged_storage_type(Some(StorageType::Custom)), None);
    }

    #[test]
    fn test_provider_serde_as_string() {
        let json = serde_json::to_string(&Provider::OsfStorage).unwrap();
        assert_eq!(json, "\"osfstorage\"");
        let decoded: Provider = serde_json::from_str("\"box\"").unwrap();
        assert_eq!(decoded, Provider::Other("box".to_string()));
    }

    #[test]
    fn test_storage_type_codes() {
        for st in StorageType::ALL {
            assert_eq!(StorageType::from_code(st.code()).unwrap(), st);
        }
        assert!(StorageType::from_code(0).is_err());
    }
}
