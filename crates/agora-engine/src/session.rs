// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication state with durable persistence and change notification.

use std::sync::Arc;

use agora_core::{AgoraError, KeyValueStore, KvWrite, Session, User};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const TOKEN_KEY: &str = "session.token";
pub const USER_KEY: &str = "session.user";

/// Holds the current [`Session`].
///
/// Remote-call wrappers read the token through [`SessionStore::token`]
/// immediately before each dispatch and never keep a copy.
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    current: watch::Sender<Session>,
}

impl SessionStore {
    /// Restores the persisted session. A corrupt persisted user yields an
    /// anonymous session.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, AgoraError> {
        let token = store.get(TOKEN_KEY).await?.unwrap_or_default();
        let user = match store.get(USER_KEY).await? {
            Some(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "persisted user is corrupt, starting anonymous");
                    return Ok(Self::with_session(store, Session::anonymous()));
                }
            },
            None => None,
        };
        let session = Session { token, user };
        debug!(signed_in = !session.is_anonymous(), "session restored");
        Ok(Self::with_session(store, session))
    }

    fn with_session(store: Arc<dyn KeyValueStore>, session: Session) -> Self {
        Self {
            store,
            current: watch::channel(session).0,
        }
    }

    pub fn get(&self) -> Session {
        self.current.borrow().clone()
    }

    /// The bearer token, or `None` when anonymous.
    pub fn token(&self) -> Option<String> {
        self.current.borrow().bearer().map(str::to_string)
    }

    pub fn is_signed_in(&self) -> bool {
        !self.current.borrow().is_anonymous()
    }

    pub fn on_change(&self) -> watch::Receiver<Session> {
        self.current.subscribe()
    }

    /// Replaces the session and persists token and user in one batch.
    pub async fn set_session(&self, token: String, user: Option<User>) -> Result<(), AgoraError> {
        let user_json = user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AgoraError::Internal(format!("cannot encode user: {e}")))?;
        let batch = vec![
            KvWrite::put(TOKEN_KEY, token.clone()),
            match user_json {
                Some(json) => KvWrite::put(USER_KEY, json),
                None => KvWrite::remove(USER_KEY),
            },
        ];

        let session = Session { token, user };
        info!(
            user = session.user.as_ref().map(|u| u.display_name.as_str()).unwrap_or(""),
            "session set"
        );
        self.current.send_replace(session);
        self.store.apply(batch).await
    }

    /// Signs out locally. The in-memory session is cleared even when
    /// persisting the removal fails.
    pub async fn clear(&self) -> Result<(), AgoraError> {
        let was_signed_in = self.current.send_if_modified(|session| {
            if *session == Session::anonymous() {
                false
            } else {
                *session = Session::anonymous();
                true
            }
        });
        if was_signed_in {
            info!("session cleared");
        }
        self.store
            .apply(vec![KvWrite::remove(TOKEN_KEY), KvWrite::remove(USER_KEY)])
            .await
    }

    /// Clears the session only if `token` is still the current one, so a
    /// late rejection of an old token cannot sign out a newer login.
    pub async fn clear_if_current(&self, token: &str) -> Result<bool, AgoraError> {
        if self.current.borrow().token != token {
            return Ok(false);
        }
        self.clear().await?;
        Ok(true)
    }
}
