use inference::AnalysisError;
use shared::{
    domain::{CategoryId, HistoryEntryId},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

use crate::{controller::PhaseName, ingest::ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("unknown scan category '{0}'")]
    UnknownCategory(CategoryId),
    #[error("unknown history entry {0}")]
    UnknownHistoryEntry(HistoryEntryId),
    #[error("history entry {0} has no result to reopen")]
    NotReopenable(HistoryEntryId),
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: PhaseName,
    },
}

impl ScanError {
    /// Analysis failures keep the uploaded file, so the user can retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Analysis(_))
    }

    pub fn to_api_error(&self) -> ApiError {
        let code = match self {
            Self::Validation(_) | Self::InvalidPhase { .. } | Self::NotReopenable(_) => {
                ErrorCode::Validation
            }
            Self::UnknownCategory(_) | Self::UnknownHistoryEntry(_) => ErrorCode::NotFound,
            Self::Analysis(AnalysisError::Timeout(_)) => ErrorCode::Timeout,
            Self::Analysis(AnalysisError::Unavailable(_)) => ErrorCode::Unavailable,
            Self::Analysis(_) => ErrorCode::Internal,
        };
        ApiError::new(code, self.to_string())
    }
}
