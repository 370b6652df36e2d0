//! Runtime abstraction for host-environment operations.
//!
//! The client layer never talks to the environment directly: credential
//! persistence, execution-context detection, navigation and notifications
//! all go through the [`Runtime`] trait, enabling dependency injection and
//! testability.
//!
//! # Structure
//!
//! - `store` - file-backed credential persistence
//! - `ui` - notification deduplication and navigation requests

mod store;
mod ui;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::env as std_env;
use std::path::PathBuf;
use std::sync::Mutex;

/// Destinations the client layer can redirect the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Shown when the backend rejects the caller's permissions.
    Profile,
    /// Shown when the session cannot be recovered and the user must
    /// authenticate again.
    SignIn,
}

impl Page {
    /// The well-known path of the destination.
    pub fn path(&self) -> &'static str {
        match self {
            Page::Profile => "/profile",
            Page::SignIn => "/sign-in",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // Credential store
    fn credential(&self, key: &str) -> Option<String>;
    fn set_credential(&self, key: &str, value: &str) -> Result<()>;
    fn remove_credential(&self, key: &str) -> Result<()>;

    /// Whether this is a server-rendering context. A server context has no
    /// durable place to persist a rotated token, so token refresh must not
    /// run there.
    fn is_server(&self) -> bool;

    // Navigation boundary
    /// Request a full-page navigation to the given destination.
    fn navigate(&self, page: Page);

    // Notification boundary
    /// Show a user-visible error. Repeated calls with the same key must not
    /// stack duplicate notifications.
    fn notify_error(&self, key: &str, message: &str);
}

/// Runtime for a headless or native host: credentials persist to a JSON
/// file under the user config directory, notifications surface through the
/// log with per-key deduplication, and navigation requests are logged for
/// the embedding application to act on.
pub struct RealRuntime {
    store_path: PathBuf,
    shown_notifications: Mutex<HashSet<String>>,
}

impl RealRuntime {
    /// Create a runtime storing credentials under the user config directory.
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(Self::with_store_path(
            dir.join("authbridge").join("credentials.json"),
        ))
    }

    /// Create a runtime with an explicit credential store location.
    pub fn with_store_path(store_path: PathBuf) -> Self {
        Self {
            store_path,
            shown_notifications: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, std_env::VarError> {
        std_env::var(key)
    }
}

#[async_trait]
impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn credential(&self, key: &str) -> Option<String> {
        self.credential_impl(key)
    }

    fn set_credential(&self, key: &str, value: &str) -> Result<()> {
        self.set_credential_impl(key, value)
    }

    fn remove_credential(&self, key: &str) -> Result<()> {
        self.remove_credential_impl(key)
    }

    fn is_server(&self) -> bool {
        // A native or embedded host is always a client context.
        false
    }

    fn navigate(&self, page: Page) {
        self.navigate_impl(page)
    }

    fn notify_error(&self, key: &str, message: &str) {
        self.notify_error_impl(key, message)
    }
}
