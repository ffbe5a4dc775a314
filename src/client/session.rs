//! Client session
//!
//! The session token lives in a `SessionStore`. `SessionClient` tracks
//! whether that token is usable and decides which screens may be shown.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::RwLock;

use super::{ApiClient, ClientError, ExpenseBoard};

/// Where the session token is kept between runs
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn read(&self) -> Result<Option<String>, ClientError>;

    async fn write(&self, token: &str) -> Result<(), ClientError>;

    async fn clear(&self) -> Result<(), ClientError>;
}

/// Token held in memory only; lost when the process exits
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a token, as if left over from a previous run
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn read(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token.read().await.clone())
    }

    async fn write(&self, token: &str) -> Result<(), ClientError> {
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.token.write().await = None;
        Ok(())
    }
}

/// Token persisted to a file, surviving restarts
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn read(&self) -> Result<Option<String>, ClientError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Store(
                anyhow::Error::new(e)
                    .context(format!("Failed to read session file {}", self.path.display())),
            )),
        }
    }

    async fn write(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))
                .map_err(ClientError::Store)?;
        }
        tokio::fs::write(&self.path, token)
            .await
            .with_context(|| format!("Failed to write session file {}", self.path.display()))
            .map_err(ClientError::Store)
    }

    async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Store(
                anyhow::Error::new(e)
                    .context(format!("Failed to remove session file {}", self.path.display())),
            )),
        }
    }
}

/// Sign-in state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable token
    Unauthenticated,
    /// A stored token is being checked with the server
    Validating,
    /// The token was accepted
    Authenticated,
}

/// Screens of the client application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Dashboard,
}

impl Route {
    /// Whether the screen needs a signed-in session
    pub fn is_protected(self) -> bool {
        matches!(self, Route::Dashboard)
    }
}

/// Session state machine over an `ApiClient` and a token store
pub struct SessionClient<S: SessionStore> {
    api: ApiClient,
    store: S,
    state: SessionState,
    user_id: Option<i64>,
}

impl<S: SessionStore> SessionClient<S> {
    pub fn new(api: ApiClient, store: S) -> Self {
        Self {
            api,
            store,
            state: SessionState::Unauthenticated,
            user_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the signed-in user, set by `restore()` and after a successful login
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Revalidate a token left by a previous run.
    ///
    /// A token the server rejects, for any reason, is discarded.
    pub async fn restore(&mut self) -> Result<SessionState, ClientError> {
        let Some(token) = self.store.read().await? else {
            self.reset();
            return Ok(self.state);
        };

        self.state = SessionState::Validating;
        self.api.set_token(Some(token));

        match self.api.validate().await {
            Ok(validation) if validation.valid => {
                tracing::debug!("Restored session for user {}", validation.user_id);
                self.state = SessionState::Authenticated;
                self.user_id = Some(validation.user_id);
            }
            Ok(_) => {
                self.discard().await?;
            }
            Err(e) => {
                tracing::debug!("Stored session rejected: {}", e);
                self.discard().await?;
            }
        }
        Ok(self.state)
    }

    /// Password sign-in
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ClientError> {
        let token = self.api.login(email, password).await?;
        self.establish(token).await
    }

    /// Sign in with an identity provider token
    pub async fn login_with_provider(&mut self, id_token: &str) -> Result<(), ClientError> {
        let token = self.api.google_login(id_token).await?;
        self.establish(token).await
    }

    /// Create an account. Registration issues no token, so the state is
    /// left as it was.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: Option<&str>,
    ) -> Result<String, ClientError> {
        self.api.register(name, email, password).await
    }

    /// Forget the session, whatever state it is in
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.reset();
        self.store.clear().await
    }

    pub fn can_view_dashboard(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Screen actually shown when `requested` is asked for
    pub fn route(&self, requested: Route) -> Route {
        if requested.is_protected() && !self.can_view_dashboard() {
            Route::Login
        } else {
            requested
        }
    }

    /// Expense list for the signed-in user
    pub fn expenses(&self) -> Result<ExpenseBoard, ClientError> {
        if !self.can_view_dashboard() {
            return Err(ClientError::NotAuthenticated);
        }
        Ok(ExpenseBoard::new(self.api.clone()))
    }

    async fn establish(&mut self, token: String) -> Result<(), ClientError> {
        self.store.write(&token).await?;
        self.api.set_token(Some(token));
        self.state = SessionState::Authenticated;

        // The login reply carries only the token; ask the server whose it is
        self.user_id = match self.api.validate().await {
            Ok(validation) if validation.valid => Some(validation.user_id),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Could not resolve user for new session: {}", e);
                None
            }
        };
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), ClientError> {
        self.reset();
        self.store.clear().await
    }

    fn reset(&mut self) {
        self.api.set_token(None);
        self.state = SessionState::Unauthenticated;
        self.user_id = None;
    }
}
