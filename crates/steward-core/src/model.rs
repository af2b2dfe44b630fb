use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::release::{any_critical, any_manual_required};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionUpdateStatus {
    UpToDate,
    UpdateAvailable,
    #[default]
    Unknown,
}

impl VersionUpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "up-to-date",
            Self::UpdateAvailable => "update-available",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNote {
    pub version: String,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub manual_update_required: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreVersionInfo {
    pub local_version: String,
    pub local_build: String,
    pub latest_version: String,
    pub latest_build: String,
    #[serde(default)]
    pub status: VersionUpdateStatus,
    #[serde(default)]
    pub critical_update_available: bool,
    #[serde(default)]
    pub manual_update_required: bool,
    #[serde(default)]
    pub releases: Vec<ReleaseNote>,
}

impl CoreVersionInfo {
    pub fn update_available(&self) -> bool {
        self.status == VersionUpdateStatus::UpdateAvailable
    }

    pub fn with_derived_flags(mut self) -> Self {
        self.critical_update_available = any_critical(&self.releases);
        self.manual_update_required = any_manual_required(&self.releases);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionVersionInfo {
    pub id: String,
    pub display_name: String,
    pub local_version: String,
    pub latest_version: String,
    #[serde(default)]
    pub status: VersionUpdateStatus,
    #[serde(default)]
    pub releases: Vec<ReleaseNote>,
}

impl ExtensionVersionInfo {
    pub fn update_available(&self) -> bool {
        self.status == VersionUpdateStatus::UpdateAvailable
    }

    pub fn critical_update_available(&self) -> bool {
        self.update_available() && any_critical(&self.releases)
    }
}

/// The default value is the "no update data" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    #[serde(default)]
    pub core: CoreVersionInfo,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionVersionInfo>,
}

impl UpdateSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Core,
    Extension,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub kind: ComponentKind,
    pub name: String,
    pub handle: String,
    pub version: String,
    pub latest_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_build: Option<String>,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_update_required: Option<bool>,
    pub notes: String,
}
