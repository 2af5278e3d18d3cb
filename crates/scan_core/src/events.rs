//! UI-facing commands and notifications for the scan controller.

use serde::Serialize;
use shared::{
    domain::{CategoryId, DetectionResult, HistoryEntryId, ScanHistoryEntry},
    error::ApiError,
};

use crate::{controller::PhaseName, ingest::CandidateFile};

pub enum ScanCommand {
    SelectCategory { category_id: CategoryId },
    SubmitFiles { files: Vec<CandidateFile> },
    StartAnalysis,
    Reset,
    Reopen { entry_id: HistoryEntryId },
    SetDragHover { hovering: bool },
}

impl ScanCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectCategory { .. } => "select_category",
            Self::SubmitFiles { .. } => "submit_files",
            Self::StartAnalysis => "start_analysis",
            Self::Reset => "reset",
            Self::Reopen { .. } => "reopen",
            Self::SetDragHover { .. } => "set_drag_hover",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        phase: PhaseName,
    },
    FileRejected {
        file_name: String,
        error: ApiError,
    },
    AnalysisStarted {
        generation: u64,
        category_id: CategoryId,
    },
    AnalysisCompleted {
        generation: u64,
        result: DetectionResult,
    },
    AnalysisFailed {
        generation: u64,
        error: ApiError,
    },
    HistoryAppended {
        entry: ScanHistoryEntry,
    },
    StaleCompletionDiscarded {
        generation: u64,
    },
}
