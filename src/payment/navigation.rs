//! Payment Redirects

use std::sync::{Arc, Mutex};

use mockall::automock;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Navigation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// The embedding frame belongs to another origin and refuses to be navigated.
    #[error("cross-origin frame refused navigation")]
    CrossOrigin,

    /// The window could not be navigated at all (popup blocked, closed window).
    #[error("navigation failed: {0}")]
    Failed(String),
}

/// Where the shopper was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTarget {
    /// Top-level frame above an embedding iframe.
    TopFrame,

    /// The window the checkout runs in.
    CurrentWindow,

    /// A new tab, opened when framing prevented the others.
    NewTab,
}

/// The browsing context the checkout runs in.
#[automock]
pub trait Navigator: Send + Sync {
    /// Whether the checkout is embedded in another page's frame.
    fn is_embedded(&self) -> bool;

    /// Navigate the top-level frame.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::CrossOrigin`] when the embedder forbids it.
    fn navigate_top(&self, url: &Url) -> Result<(), NavigationError>;

    /// Navigate the current window.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::CrossOrigin`] when framing forbids it.
    fn navigate_current(&self, url: &Url) -> Result<(), NavigationError>;

    /// Open `url` in a new tab.
    ///
    /// # Errors
    ///
    /// Returns an error when no tab could be opened.
    fn open_new_tab(&self, url: &Url) -> Result<(), NavigationError>;
}

/// Send the shopper to `url`: top frame when embedded, current window otherwise, and a new tab
/// when cross-origin framing blocks either.
///
/// # Errors
///
/// Returns an error when every option failed.
pub fn redirect(navigator: &dyn Navigator, url: &Url) -> Result<NavigationTarget, NavigationError> {
    let attempt = if navigator.is_embedded() {
        navigator
            .navigate_top(url)
            .map(|()| NavigationTarget::TopFrame)
    } else {
        navigator
            .navigate_current(url)
            .map(|()| NavigationTarget::CurrentWindow)
    };

    match attempt {
        Err(NavigationError::CrossOrigin) => navigator
            .open_new_tab(url)
            .map(|()| NavigationTarget::NewTab),
        other => other,
    }
}

/// Navigator that remembers every visit instead of leaving the page.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    embedded: bool,
    cross_origin: bool,
    visits: Arc<Mutex<Vec<(NavigationTarget, Url)>>>,
}

impl RecordingNavigator {
    /// A top-level, unframed window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A window framed by a page of another origin.
    #[must_use]
    pub fn cross_origin_frame() -> Self {
        Self {
            embedded: true,
            cross_origin: true,
            ..Self::default()
        }
    }

    /// Visits so far, oldest first.
    #[must_use]
    pub fn visits(&self) -> Vec<(NavigationTarget, Url)> {
        self.visits
            .lock()
            .map(|visits| visits.clone())
            .unwrap_or_default()
    }

    fn visit(&self, target: NavigationTarget, url: &Url) -> Result<(), NavigationError> {
        if self.cross_origin && target != NavigationTarget::NewTab {
            return Err(NavigationError::CrossOrigin);
        }

        self.visits
            .lock()
            .map_err(|_poison| NavigationError::Failed("navigator state poisoned".to_string()))?
            .push((target, url.clone()));

        Ok(())
    }
}

impl Navigator for RecordingNavigator {
    fn is_embedded(&self) -> bool {
        self.embedded
    }

    fn navigate_top(&self, url: &Url) -> Result<(), NavigationError> {
        self.visit(NavigationTarget::TopFrame, url)
    }

    fn navigate_current(&self, url: &Url) -> Result<(), NavigationError> {
        self.visit(NavigationTarget::CurrentWindow, url)
    }

    fn open_new_tab(&self, url: &Url) -> Result<(), NavigationError> {
        self.visit(NavigationTarget::NewTab, url)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn unframed_checkout_uses_current_window() -> TestResult {
        let navigator = RecordingNavigator::new();
        let url = Url::parse("https://pay.example/session/1")?;

        assert_eq!(redirect(&navigator, &url)?, NavigationTarget::CurrentWindow);
        assert_eq!(
            navigator.visits(),
            vec![(NavigationTarget::CurrentWindow, url)]
        );

        Ok(())
    }

    #[test]
    fn embedded_checkout_navigates_top_frame() -> TestResult {
        let mut navigator = MockNavigator::new();
        navigator.expect_is_embedded().return_const(true);
        navigator.expect_navigate_top().times(1).returning(|_| Ok(()));
        navigator.expect_navigate_current().never();
        navigator.expect_open_new_tab().never();

        let url = Url::parse("https://pay.example/session/1")?;

        assert_eq!(redirect(&navigator, &url)?, NavigationTarget::TopFrame);

        Ok(())
    }

    #[test]
    fn cross_origin_frame_falls_back_to_new_tab() -> TestResult {
        let navigator = RecordingNavigator::cross_origin_frame();
        let url = Url::parse("https://pay.example/session/1")?;

        assert_eq!(redirect(&navigator, &url)?, NavigationTarget::NewTab);
        assert_eq!(navigator.visits(), vec![(NavigationTarget::NewTab, url)]);

        Ok(())
    }

    #[test]
    fn other_failures_are_not_retried_in_a_tab() -> TestResult {
        let mut navigator = MockNavigator::new();
        navigator.expect_is_embedded().return_const(false);
        navigator
            .expect_navigate_current()
            .returning(|_| Err(NavigationError::Failed("window closed".to_string())));
        navigator.expect_open_new_tab().never();

        let url = Url::parse("https://pay.example/session/1")?;

        assert!(matches!(
            redirect(&navigator, &url),
            Err(NavigationError::Failed(_))
        ));

        Ok(())
    }
}
