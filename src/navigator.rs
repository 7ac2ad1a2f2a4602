//! Redirect side channel for session death.
//!
//! When a refresh exchange fails, the session client sends the application
//! to its login entry point through a [`Navigator`]. A browser build would
//! set `window.location`; a terminal front-end tells the user to log in again.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Redirects kept by [`LocationNavigator::history`].
pub const HISTORY_LIMIT: usize = 16;

pub trait Navigator: Send + Sync {
    /// Move the application to `path`.
    fn redirect(&self, path: &str);
}

/// Tracks the current location in memory and logs every redirect.
#[derive(Debug, Default)]
pub struct LocationNavigator {
    location: Mutex<Option<String>>,
    redirects: Mutex<VecDeque<String>>,
}

impl LocationNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last location redirected to, if any.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        self.location.lock().ok().and_then(|l| l.clone())
    }

    /// The most recent redirects, oldest first, at most [`HISTORY_LIMIT`].
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.redirects
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Navigator for LocationNavigator {
    fn redirect(&self, path: &str) {
        tracing::warn!(%path, "session ended, redirecting");
        if let Ok(mut location) = self.location.lock() {
            *location = Some(path.to_string());
        }
        if let Ok(mut redirects) = self.redirects.lock() {
            if redirects.len() == HISTORY_LIMIT {
                redirects.pop_front();
            }
            redirects.push_back(path.to_string());
        }
    }
}

#[cfg(test)]
#[path = "navigator_test.rs"]
mod tests;
