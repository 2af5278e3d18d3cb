//! Scan session state machine.
//!
//! One controller per signed-in session. It is the only writer of the scan
//! phase and is driven through `&mut self`; analysis runs on spawned tasks
//! and comes back through a channel, so completions are applied only when
//! the owner calls [`ScanSessionController::next_settlement`] or
//! [`ScanSessionController::try_settle`].

use std::{fmt, mem, sync::Arc};

use inference::{AnalysisError, AnalysisRequest, InferenceEngine};
use serde::Serialize;
use shared::{
    domain::{
        CategoryId, DetectionResult, HistoryEntryId, ScanCategory, ScanHistoryEntry,
        UploadedFile, UserId,
    },
    error::ApiError,
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    error::ScanError,
    events::{ScanCommand, SessionEvent},
    history::HistoryStore,
    ingest::{CandidateFile, FileIngestionValidator},
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Idle,
    CategorySelected,
    FileReady,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CategorySelected => "category selected",
            Self::FileReady => "file ready",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum ScanPhase {
    Idle,
    CategorySelected {
        category: ScanCategory,
    },
    FileReady {
        category: ScanCategory,
        file: UploadedFile,
    },
    Processing {
        category: ScanCategory,
        file: UploadedFile,
        generation: u64,
    },
    /// `file` is `None` when the result was reopened from history.
    Completed {
        category: ScanCategory,
        result: DetectionResult,
        file: Option<UploadedFile>,
    },
    Failed {
        category: ScanCategory,
        file: UploadedFile,
        error: AnalysisError,
    },
}

impl ScanPhase {
    pub fn name(&self) -> PhaseName {
        match self {
            Self::Idle => PhaseName::Idle,
            Self::CategorySelected { .. } => PhaseName::CategorySelected,
            Self::FileReady { .. } => PhaseName::FileReady,
            Self::Processing { .. } => PhaseName::Processing,
            Self::Completed { .. } => PhaseName::Completed,
            Self::Failed { .. } => PhaseName::Failed,
        }
    }

    pub fn category(&self) -> Option<&ScanCategory> {
        match self {
            Self::Idle => None,
            Self::CategorySelected { category }
            | Self::FileReady { category, .. }
            | Self::Processing { category, .. }
            | Self::Completed { category, .. }
            | Self::Failed { category, .. } => Some(category),
        }
    }

    pub fn file(&self) -> Option<&UploadedFile> {
        match self {
            Self::Idle | Self::CategorySelected { .. } => None,
            Self::FileReady { file, .. }
            | Self::Processing { file, .. }
            | Self::Failed { file, .. } => Some(file),
            Self::Completed { file, .. } => file.as_ref(),
        }
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }

    fn in_flight_generation(&self) -> Option<u64> {
        match self {
            Self::Processing { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

/// Render-ready view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: PhaseName,
    pub category_id: Option<CategoryId>,
    pub file_name: Option<String>,
    pub preview_data_uri: Option<String>,
    pub result: Option<DetectionResult>,
    pub processing: bool,
    pub drag_hover: bool,
    pub last_error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing was offered; no validation took place.
    Ignored,
    Accepted { file_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Completed {
        generation: u64,
        result: DetectionResult,
    },
    Failed {
        generation: u64,
        error: AnalysisError,
    },
    /// The session moved on before this analysis finished.
    Stale { generation: u64 },
}

struct AnalysisCompletion {
    generation: u64,
    outcome: Result<DetectionResult, AnalysisError>,
}

pub struct ScanSessionController {
    user_id: UserId,
    catalog: Arc<Catalog>,
    engine: Arc<dyn InferenceEngine>,
    validator: FileIngestionValidator,
    history: HistoryStore,
    phase: ScanPhase,
    drag_hover: bool,
    next_generation: u64,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<AnalysisCompletion>,
    completions_rx: mpsc::UnboundedReceiver<AnalysisCompletion>,
    events: broadcast::Sender<SessionEvent>,
    runtime: Option<Handle>,
}

impl ScanSessionController {
    /// Captures the ambient tokio runtime, if any. Analysis is spawned onto
    /// it, so `start_analysis` and `try_settle` also work from a UI thread
    /// that is not itself inside the runtime.
    pub fn new(
        user_id: UserId,
        catalog: Arc<Catalog>,
        engine: Arc<dyn InferenceEngine>,
        validator: FileIngestionValidator,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            user_id,
            catalog,
            engine,
            validator,
            history: HistoryStore::new(),
            phase: ScanPhase::Idle,
            drag_hover: false,
            next_generation: 1,
            in_flight: 0,
            completions_tx,
            completions_rx,
            events,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.phase
    }

    pub fn drag_hover(&self) -> bool {
        self.drag_hover
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_entries(&self) -> Vec<&ScanHistoryEntry> {
        self.history.list_for(self.user_id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let file = self.phase.file();
        SessionSnapshot {
            phase: self.phase.name(),
            category_id: self.phase.category().map(|c| c.id.clone()),
            file_name: file.map(|f| f.file_name.clone()),
            preview_data_uri: file.map(|f| f.preview_data_uri.clone()),
            result: self.phase.result().cloned(),
            processing: self.phase.is_processing(),
            drag_hover: self.drag_hover,
            last_error: match &self.phase {
                ScanPhase::Failed { error, .. } => {
                    Some(ScanError::Analysis(error.clone()).to_api_error())
                }
                _ => None,
            },
        }
    }

    /// Always discards the current file and result, even when re-selecting
    /// the same category.
    pub fn select_category(&mut self, category_id: &CategoryId) -> Result<(), ScanError> {
        let category = self
            .catalog
            .get(category_id)
            .cloned()
            .ok_or_else(|| ScanError::UnknownCategory(category_id.clone()))?;
        info!(user_id = self.user_id.0, category = %category.id, "scan category selected");
        self.transition(ScanPhase::CategorySelected { category });
        Ok(())
    }

    /// Validates the first offered file and, on success, replaces any
    /// previous file and result. A rejection leaves the phase untouched.
    pub async fn submit_files(
        &mut self,
        files: Vec<CandidateFile>,
    ) -> Result<SubmitOutcome, ScanError> {
        // Any drop ends the hover, even one that carries no files.
        self.drag_hover = false;
        let Some(candidate) = files.into_iter().next() else {
            debug!("empty file selection ignored");
            return Ok(SubmitOutcome::Ignored);
        };
        let Some(category) = self.phase.category().cloned() else {
            return Err(ScanError::InvalidPhase {
                operation: "submit a file",
                phase: self.phase.name(),
            });
        };

        let file_name = candidate.file_name.clone();
        let file = match self.validator.validate(candidate).await {
            Ok(file) => file,
            Err(error) => {
                let error = ScanError::from(error);
                self.emit(SessionEvent::FileRejected {
                    file_name,
                    error: error.to_api_error(),
                });
                return Err(error);
            }
        };

        info!(
            user_id = self.user_id.0,
            category = %category.id,
            file = %file.file_name,
            size_bytes = file.size_bytes(),
            "file ready for analysis"
        );
        let file_name = file.file_name.clone();
        self.transition(ScanPhase::FileReady { category, file });
        Ok(SubmitOutcome::Accepted { file_name })
    }

    /// Handle for starting analysis; only exists when a category and a
    /// validated file are both present (`FileReady`, or `Failed` for a retry).
    pub fn ready(&mut self) -> Option<ReadyScan<'_>> {
        let (category, file) = match &self.phase {
            ScanPhase::FileReady { category, file } | ScanPhase::Failed { category, file, .. } => {
                (category.clone(), file.clone())
            }
            _ => return None,
        };
        Some(ReadyScan {
            controller: self,
            category,
            file,
        })
    }

    /// Clears file, result and processing state. Repeating it changes nothing.
    pub fn reset(&mut self) {
        let next = match self.phase.category() {
            Some(category) => ScanPhase::CategorySelected {
                category: category.clone(),
            },
            None => ScanPhase::Idle,
        };
        let unchanged = matches!(
            (&self.phase, &next),
            (ScanPhase::Idle, ScanPhase::Idle)
                | (ScanPhase::CategorySelected { .. }, ScanPhase::CategorySelected { .. })
        );
        if unchanged {
            return;
        }
        if let Some(generation) = self.phase.in_flight_generation() {
            info!(generation, "reset while analysis in flight; its result will be discarded");
        }
        self.transition(next);
    }

    /// Shows a past result without re-running analysis or recording anything.
    pub fn reopen(&mut self, entry_id: HistoryEntryId) -> Result<DetectionResult, ScanError> {
        let entry = self
            .history
            .get(self.user_id, entry_id)
            .ok_or(ScanError::UnknownHistoryEntry(entry_id))?;
        let result = entry
            .result
            .clone()
            .ok_or(ScanError::NotReopenable(entry_id))?;
        let category = self
            .catalog
            .get(&entry.category_id)
            .cloned()
            .ok_or_else(|| ScanError::UnknownCategory(entry.category_id.clone()))?;

        info!(user_id = self.user_id.0, entry = %entry_id, category = %category.id, "history entry reopened");
        self.transition(ScanPhase::Completed {
            category,
            result: result.clone(),
            file: None,
        });
        Ok(result)
    }

    pub fn set_drag_hover(&mut self, hovering: bool) {
        self.drag_hover = hovering;
    }

    pub async fn dispatch(&mut self, command: ScanCommand) -> Result<(), ScanError> {
        debug!(command = command.name(), phase = %self.phase.name(), "dispatching scan command");
        match command {
            ScanCommand::SelectCategory { category_id } => {
                self.select_category(&category_id)?;
            }
            ScanCommand::SubmitFiles { files } => {
                self.submit_files(files).await?;
            }
            ScanCommand::StartAnalysis => {
                let phase = self.phase.name();
                self.ready()
                    .ok_or(ScanError::InvalidPhase {
                        operation: "start analysis",
                        phase,
                    })?
                    .start_analysis();
            }
            ScanCommand::Reset => self.reset(),
            ScanCommand::Reopen { entry_id } => {
                self.reopen(entry_id)?;
            }
            ScanCommand::SetDragHover { hovering } => self.set_drag_hover(hovering),
        }
        Ok(())
    }

    /// Waits for the next spawned analysis to finish and applies it.
    /// Returns `None` when nothing is in flight.
    pub async fn next_settlement(&mut self) -> Option<Settlement> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        self.in_flight -= 1;
        Some(self.apply_completion(completion))
    }

    /// Non-blocking variant for UI frame loops.
    pub fn try_settle(&mut self) -> Option<Settlement> {
        let completion = self.completions_rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(self.apply_completion(completion))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn begin_analysis(&mut self, category: ScanCategory, file: UploadedFile) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.in_flight += 1;

        let request = AnalysisRequest {
            file: file.clone(),
            category: category.clone(),
        };
        let tx = self.completions_tx.clone();
        match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => {
                let engine = Arc::clone(&self.engine);
                runtime.spawn(async move {
                    let outcome =
                        match tokio::spawn(async move { engine.analyze(&request).await }).await {
                            Ok(outcome) => outcome,
                            Err(join_error) => Err(AnalysisError::Engine(format!(
                                "analysis task aborted: {join_error}"
                            ))),
                        };
                    let _ = tx.send(AnalysisCompletion {
                        generation,
                        outcome,
                    });
                });
            }
            None => {
                warn!(generation, "no tokio runtime to run analysis on");
                let _ = tx.send(AnalysisCompletion {
                    generation,
                    outcome: Err(AnalysisError::Unavailable(
                        "no async runtime available to run analysis".to_string(),
                    )),
                });
            }
        }

        info!(
            user_id = self.user_id.0,
            category = %category.id,
            file = %file.file_name,
            generation,
            engine = self.engine.name(),
            "analysis started"
        );
        let category_id = category.id.clone();
        self.transition(ScanPhase::Processing {
            category,
            file,
            generation,
        });
        self.emit(SessionEvent::AnalysisStarted {
            generation,
            category_id,
        });
        generation
    }

    fn apply_completion(&mut self, completion: AnalysisCompletion) -> Settlement {
        let AnalysisCompletion {
            generation,
            outcome,
        } = completion;

        match mem::replace(&mut self.phase, ScanPhase::Idle) {
            ScanPhase::Processing {
                category,
                file,
                generation: current,
            } if current == generation => match outcome {
                Ok(result) => {
                    let entry = ScanHistoryEntry::completed(
                        self.user_id,
                        category.id.clone(),
                        file.file_name.clone(),
                        file.uploaded_at,
                        result.clone(),
                    );
                    info!(
                        user_id = self.user_id.0,
                        category = %category.id,
                        generation,
                        detected = result.detected(),
                        entry = %entry.entry_id,
                        "analysis completed"
                    );
                    self.history.append(entry.clone());
                    self.transition(ScanPhase::Completed {
                        category,
                        result: result.clone(),
                        file: Some(file),
                    });
                    self.emit(SessionEvent::AnalysisCompleted {
                        generation,
                        result: result.clone(),
                    });
                    self.emit(SessionEvent::HistoryAppended { entry });
                    Settlement::Completed { generation, result }
                }
                Err(error) => {
                    warn!(
                        user_id = self.user_id.0,
                        category = %category.id,
                        generation,
                        %error,
                        "analysis failed"
                    );
                    self.transition(ScanPhase::Failed {
                        category,
                        file,
                        error: error.clone(),
                    });
                    self.emit(SessionEvent::AnalysisFailed {
                        generation,
                        error: ScanError::Analysis(error.clone()).to_api_error(),
                    });
                    Settlement::Failed { generation, error }
                }
            },
            other => {
                self.phase = other;
                debug!(generation, phase = %self.phase.name(), "discarding stale analysis completion");
                self.emit(SessionEvent::StaleCompletionDiscarded { generation });
                Settlement::Stale { generation }
            }
        }
    }

    fn transition(&mut self, next: ScanPhase) {
        self.phase = next;
        self.emit(SessionEvent::PhaseChanged {
            phase: self.phase.name(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is normal for headless use.
        let _ = self.events.send(event);
    }
}

/// Proof that the controller holds a category and a validated file.
pub struct ReadyScan<'a> {
    controller: &'a mut ScanSessionController,
    category: ScanCategory,
    file: UploadedFile,
}

impl ReadyScan<'_> {
    pub fn category(&self) -> &ScanCategory {
        &self.category
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    /// Moves to `Processing` and returns the generation tagging this run.
    pub fn start_analysis(self) -> u64 {
        self.controller.begin_analysis(self.category, self.file)
    }

    /// Starts analysis and waits until this run settles.
    pub async fn run_analysis(self) -> Result<DetectionResult, ScanError> {
        let controller = self.controller;
        let generation = controller.begin_analysis(self.category, self.file);
        while let Some(settlement) = controller.next_settlement().await {
            match settlement {
                Settlement::Completed {
                    generation: settled,
                    result,
                } if settled == generation => return Ok(result),
                Settlement::Failed {
                    generation: settled,
                    error,
                } if settled == generation => return Err(ScanError::Analysis(error)),
                _ => continue,
            }
        }
        Err(ScanError::Analysis(AnalysisError::Engine(
            "analysis task ended without reporting".to_string(),
        )))
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
