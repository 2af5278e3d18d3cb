//! Scan session core: category catalog, upload validation, the scan state
//! machine and the per-session history it writes to.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod history;
pub mod ingest;
pub mod session;

pub use catalog::{Catalog, CatalogError};
pub use controller::{
    PhaseName, ReadyScan, ScanPhase, ScanSessionController, SessionSnapshot, Settlement,
    SubmitOutcome,
};
pub use error::ScanError;
pub use events::{ScanCommand, SessionEvent};
pub use history::HistoryStore;
pub use ingest::{CandidateFile, FileIngestionValidator, FileSource, ValidationError};
pub use session::{AuthError, Authenticator, Credentials, UserSession};
