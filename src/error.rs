// Error taxonomy shared by the dispatcher, permission store and CRCON client.

use thiserror::Error;

use crate::crcon::ServerTarget;
use crate::permissions::PermissionTier;

/// Everything that can go wrong while handling one chat command.
///
/// All variants are caught at the dispatcher boundary and rendered as a
/// single reply; only `Storage` and `Internal` are logged at error level.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid selector token: {token}")]
    InvalidSelector { token: String },

    #[error("player index {index} out of range (roster has {max})")]
    IndexOutOfRange { index: u32, max: usize },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("requires {required}, sender has {actual}")]
    InsufficientPrivilege {
        required: PermissionTier,
        actual: PermissionTier,
    },

    #[error("invalid arguments, usage: {usage}")]
    InvalidArguments {
        usage: String,
        reason: Option<String>,
    },

    #[error("identity {0} is protected")]
    ProtectedIdentity(String),

    #[error("{operation} failed on {server}: {message}")]
    ApiError {
        operation: &'static str,
        server: ServerTarget,
        status: Option<u16>,
        message: String,
    },

    #[error("{0} is unreachable")]
    ApiUnreachable(ServerTarget),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Static error code string for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSelector { .. } => "invalid_selector",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::UnknownCommand(_) => "unknown_command",
            Self::InsufficientPrivilege { .. } => "insufficient_privilege",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ProtectedIdentity(_) => "protected_identity",
            Self::ApiError { .. } => "api_error",
            Self::ApiUnreachable(_) => "api_unreachable",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Failures the operator has to look at, as opposed to user mistakes
    /// or remote API refusals.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }

    pub fn invalid_args(usage: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            usage: usage.to_string(),
            reason: Some(reason.into()),
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            BotError::InvalidSelector { token: "x".into() },
            BotError::IndexOutOfRange { index: 3, max: 2 },
            BotError::UnknownCommand("foo".into()),
            BotError::InsufficientPrivilege {
                required: PermissionTier::SuperAdmin,
                actual: PermissionTier::Admin,
            },
            BotError::invalid_args("/踢出 <序号>", "missing selector"),
            BotError::ProtectedIdentity("10001".into()),
            BotError::ApiUnreachable(ServerTarget::default()),
            BotError::Internal("boom".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.error_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_storage_and_internal_are_internal() {
        assert!(BotError::Internal("x".into()).is_internal());
        assert!(BotError::Storage(sqlx::Error::RowNotFound).is_internal());
        assert!(!BotError::UnknownCommand("x".into()).is_internal());
        assert!(!BotError::ApiUnreachable(ServerTarget::new(2)).is_internal());
    }
}
