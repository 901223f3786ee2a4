//! Scripted in-memory session driver.
//!
//! Stands in for the browser in the test-suite: a `FakePortal` is built
//! from a description of the login form, the post-login page and the
//! reporting widget, and then behaves like the real portal through the
//! same driver traits. Navigation failures can be scripted to exercise
//! the retry loops, and every interaction is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ElementHandle, LoadState, OptionTarget, PageSession, SessionDriver, Surface};
use crate::error::{code, Error, Result};
use crate::retry::Sleeper;

/// Sleeper that records requested waits instead of sleeping.
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self {
            waits: Mutex::new(Vec::new()),
        }
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Default for RecordingSleeper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// What an element does when interacted with.
#[derive(Clone)]
enum Role {
    /// Inert content element.
    Static,
    /// Text input; fills are recorded under the given key.
    Input(&'static str),
    /// Login submit control.
    Submit,
    /// Dropdown with the given option labels.
    Select { labels: Vec<String> },
}

#[derive(Clone)]
struct FakeElementSpec {
    visible: bool,
    text: Option<String>,
    role: Role,
}

/// A locate surface: exact selector string to element list.
#[derive(Clone, Default)]
struct SurfaceSpec {
    elements: HashMap<String, Vec<FakeElementSpec>>,
}

impl SurfaceSpec {
    fn insert(&mut self, selector: &str, spec: FakeElementSpec) {
        self.elements.entry(selector.to_string()).or_default().push(spec);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SurfaceId {
    Main,
    Frame(usize),
}

/// Description of the reporting widget, usable as a frame or merged into
/// the main page.
#[derive(Clone, Default)]
pub struct FakeWidget {
    spec: SurfaceSpec,
}

impl FakeWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the marker image the frame probe looks for.
    pub fn with_marker(mut self) -> Self {
        self.spec.insert(
            "img[alt='使用量']",
            FakeElementSpec {
                visible: true,
                text: None,
                role: Role::Static,
            },
        );
        self
    }

    /// Add the period dropdown with the portal's option labels.
    pub fn with_period_select(mut self) -> Self {
        self.spec.insert(
            "select",
            FakeElementSpec {
                visible: true,
                text: None,
                role: Role::Select {
                    labels: vec!["今日".to_string(), "今月".to_string()],
                },
            },
        );
        self
    }

    /// Add one labelled value cell, e.g. `("使用量", "12.5kWh")`.
    pub fn with_field(mut self, marker: &str, text: &str) -> Self {
        let dt = format!("dt:has(img[alt='{marker}'])");
        self.spec.insert(
            &dt,
            FakeElementSpec {
                visible: true,
                text: None,
                role: Role::Static,
            },
        );
        self.spec.insert(
            &format!("{dt} + dd"),
            FakeElementSpec {
                visible: true,
                text: Some(text.to_string()),
                role: Role::Static,
            },
        );
        self
    }

    /// Add a labelled field whose value cell is missing.
    pub fn with_field_without_value(mut self, marker: &str) -> Self {
        self.spec.insert(
            &format!("dt:has(img[alt='{marker}'])"),
            FakeElementSpec {
                visible: true,
                text: None,
                role: Role::Static,
            },
        );
        self
    }
}

struct PortalState {
    login_form: bool,
    /// Credentials the portal accepts; `None` rejects every login.
    accept: Option<(String, String)>,
    error_banner: Option<String>,
    logged_in: bool,
    frames: Vec<SurfaceSpec>,
    main_widget: Option<SurfaceSpec>,
    fail_navigations: VecDeque<Error>,
    fail_frames: VecDeque<Error>,
    fail_locates: bool,

    // Recordings.
    open_sessions: usize,
    navigations: Vec<String>,
    filled: HashMap<&'static str, String>,
    login_attempts: usize,
    selected_labels: Vec<String>,
}

/// Builder for a scripted portal.
pub struct FakePortalBuilder {
    state: PortalState,
}

impl FakePortalBuilder {
    /// Accept exactly these credentials at the login form.
    pub fn accept_credentials(mut self, email: &str, password: &str) -> Self {
        self.state.accept = Some((email.to_string(), password.to_string()));
        self
    }

    /// Show an error banner after a rejected login.
    pub fn with_error_banner(mut self, text: &str) -> Self {
        self.state.error_banner = Some(text.to_string());
        self
    }

    /// Serve a page without any login form.
    pub fn without_login_form(mut self) -> Self {
        self.state.login_form = false;
        self
    }

    /// Embed the reporting widget as a sub-frame.
    pub fn with_frame(mut self, widget: FakeWidget) -> Self {
        self.state.frames.push(widget.spec);
        self
    }

    /// Put the reporting widget directly on the post-login page.
    pub fn with_main_widget(mut self, widget: FakeWidget) -> Self {
        self.state.main_widget = Some(widget.spec);
        self
    }

    /// Fail the next `count` navigations with transient errors.
    pub fn fail_navigations(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.state
                .fail_navigations
                .push_back(Error::transient("connection reset", code::DRIVER_ERROR));
        }
        self
    }

    /// Fail the next `count` frame enumerations with transient errors.
    pub fn fail_frames(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.state
                .fail_frames
                .push_back(Error::transient("frame tree unavailable", code::DRIVER_ERROR));
        }
        self
    }

    /// Make every locate call fail with a driver error.
    pub fn fail_all_locates(mut self) -> Self {
        self.state.fail_locates = true;
        self
    }

    pub fn build(self) -> FakePortal {
        FakePortal {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

/// Scripted portal implementing the session-driver traits.
#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn builder() -> FakePortalBuilder {
        FakePortalBuilder {
            state: PortalState {
                login_form: true,
                accept: None,
                error_banner: None,
                logged_in: false,
                frames: Vec::new(),
                main_widget: None,
                fail_navigations: VecDeque::new(),
                fail_frames: VecDeque::new(),
                fail_locates: false,
                open_sessions: 0,
                navigations: Vec::new(),
                filled: HashMap::new(),
                login_attempts: 0,
                selected_labels: Vec::new(),
            },
        }
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn login_attempts(&self) -> usize {
        self.state.lock().unwrap().login_attempts
    }

    pub fn selected_labels(&self) -> Vec<String> {
        self.state.lock().unwrap().selected_labels.clone()
    }

    /// Resolve the element specs a selector matches on a surface, given
    /// the portal's current login state.
    fn resolve(&self, surface: SurfaceId, selector: &str) -> Result<Vec<FakeElementSpec>> {
        let state = self.state.lock().unwrap();
        if state.fail_locates {
            return Err(Error::transient("locate failed", code::DRIVER_ERROR));
        }

        match surface {
            SurfaceId::Main => {
                if state.logged_in {
                    if selector == "a" {
                        return Ok(vec![FakeElementSpec {
                            visible: true,
                            text: Some(crate::auth::LOGOUT_TEXT.to_string()),
                            role: Role::Static,
                        }]);
                    }
                    if let Some(widget) = &state.main_widget {
                        if let Some(found) = widget.elements.get(selector) {
                            return Ok(found.clone());
                        }
                    }
                    Ok(Vec::new())
                } else {
                    if state.login_form {
                        let spec = |role| FakeElementSpec {
                            visible: true,
                            text: None,
                            role,
                        };
                        if selector == crate::auth::EMAIL_SELECTOR {
                            return Ok(vec![spec(Role::Input("email"))]);
                        }
                        if selector == crate::auth::PASSWORD_SELECTOR {
                            return Ok(vec![spec(Role::Input("password"))]);
                        }
                        if selector == crate::auth::SUBMIT_SELECTOR {
                            return Ok(vec![spec(Role::Submit)]);
                        }
                    }
                    if selector == crate::auth::ERROR_MESSAGE_SELECTOR {
                        if let Some(banner) = &state.error_banner {
                            return Ok(vec![FakeElementSpec {
                                visible: true,
                                text: Some(banner.clone()),
                                role: Role::Static,
                            }]);
                        }
                    }
                    Ok(Vec::new())
                }
            }
            SurfaceId::Frame(index) => Ok(state
                .frames
                .get(index)
                .and_then(|frame| frame.elements.get(selector))
                .cloned()
                .unwrap_or_default()),
        }
    }

    fn handles(&self, surface: SurfaceId, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let specs = self.resolve(surface, selector)?;
        Ok((0..specs.len())
            .map(|index| {
                Box::new(FakeElement {
                    portal: self.clone(),
                    surface,
                    selector: selector.to_string(),
                    index,
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }
}

#[async_trait]
impl SessionDriver for FakePortal {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        let mut state = self.state.lock().unwrap();
        state.open_sessions += 1;
        // Each session starts unauthenticated, like a fresh browser.
        state.logged_in = false;
        drop(state);
        Ok(Box::new(FakeSession {
            portal: self.clone(),
        }))
    }
}

struct FakeSession {
    portal: FakePortal,
}

#[async_trait]
impl Surface for FakeSession {
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        self.portal.handles(SurfaceId::Main, selector)
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.portal.state.lock().unwrap();
        if let Some(err) = state.fail_navigations.pop_front() {
            return Err(err);
        }
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn wait_for_state(&self, _state: LoadState) -> Result<()> {
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<Box<dyn Surface>>> {
        let mut state = self.portal.state.lock().unwrap();
        if let Some(err) = state.fail_frames.pop_front() {
            return Err(err);
        }
        let count = state.frames.len();
        drop(state);
        Ok((0..count)
            .map(|index| {
                Box::new(FakeFrame {
                    portal: self.portal.clone(),
                    index,
                }) as Box<dyn Surface>
            })
            .collect())
    }

    fn as_surface(&self) -> &dyn Surface {
        self
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct FakeFrame {
    portal: FakePortal,
    index: usize,
}

#[async_trait]
impl Surface for FakeFrame {
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        self.portal.handles(SurfaceId::Frame(self.index), selector)
    }
}

struct FakeElement {
    portal: FakePortal,
    surface: SurfaceId,
    selector: String,
    index: usize,
}

impl FakeElement {
    fn spec(&self) -> Result<FakeElementSpec> {
        self.portal
            .resolve(self.surface, &self.selector)?
            .into_iter()
            .nth(self.index)
            .ok_or_else(|| Error::transient("element no longer present", code::DRIVER_ERROR))
    }
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn is_visible(&self) -> Result<bool> {
        Ok(self.spec()?.visible)
    }

    async fn fill(&self, text: &str) -> Result<()> {
        match self.spec()?.role {
            Role::Input(key) => {
                self.portal
                    .state
                    .lock()
                    .unwrap()
                    .filled
                    .insert(key, text.to_string());
                Ok(())
            }
            _ => Err(Error::transient("element is not fillable", code::DRIVER_ERROR)),
        }
    }

    async fn click(&self) -> Result<()> {
        match self.spec()?.role {
            Role::Submit => {
                let mut state = self.portal.state.lock().unwrap();
                state.login_attempts += 1;
                let accepted = match &state.accept {
                    Some((email, password)) => {
                        state.filled.get("email").map(String::as_str) == Some(email.as_str())
                            && state.filled.get("password").map(String::as_str)
                                == Some(password.as_str())
                    }
                    None => false,
                };
                state.logged_in = accepted;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn select_option(&self, target: OptionTarget<'_>) -> Result<()> {
        match self.spec()?.role {
            Role::Select { labels } => {
                let wanted = match target {
                    OptionTarget::Label(label) | OptionTarget::Value(label) => label,
                };
                if labels.iter().any(|label| label == wanted) {
                    self.portal
                        .state
                        .lock()
                        .unwrap()
                        .selected_labels
                        .push(wanted.to_string());
                    Ok(())
                } else {
                    Err(Error::transient(
                        format!("no matching option: {wanted}"),
                        code::DRIVER_ERROR,
                    ))
                }
            }
            _ => Err(Error::transient(
                "element is not a select",
                code::DRIVER_ERROR,
            )),
        }
    }

    async fn text_content(&self) -> Result<Option<String>> {
        Ok(self.spec()?.text)
    }
}
