//! Session-driver abstraction over the browser engine.
//!
//! Defines the capability traits the fetch pipeline depends on: open a page,
//! navigate it, locate elements on it (or inside any of its sub-frames) and
//! interact with them. The production implementation drives headless
//! Chromium via chromiumoxide; `fake` ships an in-memory scripted portal for
//! the test-suite.

pub mod chromium;
pub mod fake;

use async_trait::async_trait;

use crate::error::Result;

/// Page readiness states a driver can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Document load event fired.
    Load,
    /// No network activity for a short quiet window.
    NetworkIdle,
}

/// How to pick an option inside a `<select>` control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTarget<'a> {
    Value(&'a str),
    Label(&'a str),
}

/// A browser engine that can open authenticated page sessions.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Launch the engine and open a fresh page. The returned session owns
    /// every underlying resource and releases all of them on `close`.
    async fn open_session(&self) -> Result<Box<dyn PageSession>>;
}

/// Anything elements can be located on: the main document or a sub-frame.
#[async_trait]
pub trait Surface: Send + Sync {
    /// All elements matching a CSS selector, in document order.
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>>;
}

/// A single open page and its sub-frames.
#[async_trait]
pub trait PageSession: Surface {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn wait_for_state(&self, state: LoadState) -> Result<()>;

    /// Sub-frames of the current document, excluding the main frame.
    async fn frames(&self) -> Result<Vec<Box<dyn Surface>>>;

    /// The main document as a locate surface.
    fn as_surface(&self) -> &dyn Surface;

    /// Release the page and every resource behind it, in reverse
    /// acquisition order.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A located element.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn is_visible(&self) -> Result<bool>;

    async fn fill(&self, text: &str) -> Result<()>;

    async fn click(&self) -> Result<()>;

    async fn select_option(&self, target: OptionTarget<'_>) -> Result<()>;

    /// Text content, or `None` when the element carries none.
    async fn text_content(&self) -> Result<Option<String>>;
}
