// Permission tiers and the persisted permission store.

mod store;

pub use store::{GrantOutcome, PermissionStore};

use std::fmt;
use std::str::FromStr;

/// Totally ordered permission tier. `Owner` only ever comes from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionTier {
    None,
    Admin,
    SuperAdmin,
    Owner,
}

impl PermissionTier {
    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
            Self::Owner => "owner",
        }
    }

    /// Name shown in chat replies.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::None => "普通用户",
            Self::Admin => "普通管理员",
            Self::SuperAdmin => "超级管理员",
            Self::Owner => "主人",
        }
    }

    /// Tiers that can be granted or revoked at runtime.
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    /// The lowest tier that strictly exceeds `self`.
    pub fn next_above(self) -> PermissionTier {
        match self {
            Self::None => Self::Admin,
            Self::Admin => Self::SuperAdmin,
            Self::SuperAdmin | Self::Owner => Self::Owner,
        }
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PermissionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "user" => Ok(Self::None),
            "admin" => Ok(Self::Admin),
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            "owner" => Ok(Self::Owner),
            other => Err(format!("unknown permission tier: {other}")),
        }
    }
}
