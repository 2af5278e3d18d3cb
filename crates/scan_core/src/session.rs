//! Sign-in and sign-out around a scan controller.
//!
//! Credentials are accepted as given; signing in only allocates a user id and
//! a fresh controller with an empty history.

use std::{collections::HashMap, sync::Arc};

use inference::InferenceEngine;
use shared::domain::{UserId, UserProfile};
use thiserror::Error;
use tracing::info;

use crate::{catalog::Catalog, controller::ScanSessionController, ingest::FileIngestionValidator};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("username is required")]
    MissingUsername,
}

pub struct Authenticator {
    catalog: Arc<Catalog>,
    engine: Arc<dyn InferenceEngine>,
    validator: FileIngestionValidator,
    known_users: HashMap<String, UserId>,
    next_user_id: i64,
}

impl Authenticator {
    pub fn new(
        catalog: Arc<Catalog>,
        engine: Arc<dyn InferenceEngine>,
        validator: FileIngestionValidator,
    ) -> Self {
        Self {
            catalog,
            engine,
            validator,
            known_users: HashMap::new(),
            next_user_id: 1,
        }
    }

    pub fn login(&mut self, credentials: &Credentials) -> Result<UserSession, AuthError> {
        let username = credentials.username.trim().to_ascii_lowercase();
        if username.is_empty() {
            return Err(AuthError::MissingUsername);
        }
        let user_id = match self.known_users.get(&username) {
            Some(user_id) => *user_id,
            None => {
                let user_id = UserId(self.next_user_id);
                self.next_user_id += 1;
                self.known_users.insert(username.clone(), user_id);
                user_id
            }
        };

        info!(user_id = user_id.0, %username, "signed in");
        let controller = ScanSessionController::new(
            user_id,
            Arc::clone(&self.catalog),
            Arc::clone(&self.engine),
            self.validator.clone(),
        );
        Ok(UserSession {
            profile: UserProfile { user_id, username },
            controller,
        })
    }
}

/// Owns all per-user scan state; dropping it discards everything.
pub struct UserSession {
    profile: UserProfile,
    controller: ScanSessionController,
}

impl UserSession {
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn controller(&self) -> &ScanSessionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ScanSessionController {
        &mut self.controller
    }

    pub fn logout(self) -> UserProfile {
        info!(
            user_id = self.profile.user_id.0,
            discarded_entries = self.controller.history().len(),
            "signed out"
        );
        self.profile
    }
}
