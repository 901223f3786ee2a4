//! Chromium-based session driver using chromiumoxide.
//!
//! Element access goes through JavaScript evaluation on the page rather
//! than CDP node handles: the portal's reporting widget lives inside an
//! iframe, and `window.frames[i].document` reaches it with the same code
//! path as the main document. Every caller-supplied string is sanitized
//! before injection into a script literal.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ElementHandle, LoadState, OptionTarget, PageSession, SessionDriver, Surface};
use crate::config::Config;
use crate::error::{code, Error, Result};

/// Quiet window appended to network-idle waits; CDP exposes no direct
/// network-idle signal.
const NETWORK_QUIET_DELAY: Duration = Duration::from_millis(500);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. ENECOQ_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("ENECOQ_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.enecoq/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".enecoq/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".enecoq/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".enecoq/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".enecoq/chromium/chrome-linux64/chrome"),
                home.join(".enecoq/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium per session.
pub struct ChromiumDriver {
    timeout: Duration,
    user_agent: String,
}

impl ChromiumDriver {
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait]
impl SessionDriver for ChromiumDriver {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        let chrome_path = find_chromium().ok_or_else(|| {
            Error::transient(
                "Chromium not found. Install Google Chrome or set ENECOQ_CHROMIUM_PATH.",
                code::BROWSER_ERROR,
            )
        })?;

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--user-agent={}", self.user_agent))
            .build()
            .map_err(|e| {
                Error::transient(
                    format!("failed to build browser config: {e}"),
                    code::BROWSER_ERROR,
                )
            })?;

        let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            Error::transient(format!("failed to launch Chromium: {e}"), code::BROWSER_ERROR)
        })?;

        // Drain CDP events for the lifetime of the session.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(Error::transient(
                    format!("failed to open page: {e}"),
                    code::BROWSER_ERROR,
                ));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            timeout: self.timeout,
        }))
    }
}

/// One page in one exclusively-owned browser process.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    timeout: Duration,
}

#[async_trait]
impl Surface for ChromiumSession {
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        locate_in(&self.page, "document", selector).await
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigating to {url}");
        let result = tokio::time::timeout(self.timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::transient(
                format!("navigation failed: {e}"),
                code::DRIVER_ERROR,
            )),
            Err(_) => Err(Error::transient(
                format!("navigation timed out after {}s", self.timeout.as_secs()),
                code::NAV_TIMEOUT,
            )),
        }
    }

    async fn wait_for_state(&self, state: LoadState) -> Result<()> {
        // Outcome is advisory; the subsequent locate calls decide whether
        // the page is actually usable.
        if let Ok(Err(e)) =
            tokio::time::timeout(self.timeout, self.page.wait_for_navigation()).await
        {
            debug!("wait_for_navigation: {e}");
        }
        if state == LoadState::NetworkIdle {
            tokio::time::sleep(NETWORK_QUIET_DELAY).await;
        }
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<Box<dyn Surface>>> {
        let count: usize = eval(
            &self.page,
            "(() => { try { return window.frames.length; } catch (e) { return 0; } })()"
                .to_string(),
        )
        .await?;

        Ok((0..count)
            .map(|index| {
                Box::new(ChromiumFrame {
                    page: self.page.clone(),
                    index,
                }) as Box<dyn Surface>
            })
            .collect())
    }

    fn as_surface(&self) -> &dyn Surface {
        self
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
            ..
        } = *self;

        // Reverse acquisition order: page, then browser, then the event
        // drain task.
        if let Err(e) = page.close().await {
            warn!("failed to close page: {e}");
        }
        if let Err(e) = browser.close().await {
            warn!("failed to close browser: {e}");
        }
        let _ = browser.wait().await;
        handler_task.abort();
        Ok(())
    }
}

/// A sub-frame of the session's page, addressed by frame index.
struct ChromiumFrame {
    page: Page,
    index: usize,
}

#[async_trait]
impl Surface for ChromiumFrame {
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let doc_expr = format!("window.frames[{}].document", self.index);
        locate_in(&self.page, &doc_expr, selector).await
    }
}

/// An element addressed by (document, selector, index).
struct ChromiumElement {
    page: Page,
    doc_expr: String,
    selector: String,
    index: usize,
}

impl ChromiumElement {
    /// Script prelude resolving this element into `el` (or returning the
    /// given fallback when the document or element is gone).
    fn prelude(&self, fallback: &str) -> String {
        format!(
            r#"let doc;
               try {{ doc = {doc}; }} catch (e) {{ return {fallback}; }}
               if (!doc) return {fallback};
               const el = doc.querySelectorAll('{sel}')[{idx}];
               if (!el) return {fallback};"#,
            doc = self.doc_expr,
            sel = sanitize_js_string(&self.selector),
            idx = self.index,
        )
    }

    fn gone(&self) -> Error {
        Error::transient(
            format!("element no longer present: {}", self.selector),
            code::DRIVER_ERROR,
        )
    }
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn is_visible(&self) -> Result<bool> {
        let js = format!(
            r#"(() => {{
                {prelude}
                return !!(el.offsetParent !== null || el.getClientRects().length);
            }})()"#,
            prelude = self.prelude("false"),
        );
        eval(&self.page, js).await
    }

    async fn fill(&self, text: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
                {prelude}
                el.value = '{value}';
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            prelude = self.prelude("false"),
            value = sanitize_js_string(text),
        );
        let filled: bool = eval(&self.page, js).await?;
        if filled {
            Ok(())
        } else {
            Err(self.gone())
        }
    }

    async fn click(&self) -> Result<()> {
        let js = format!(
            r#"(() => {{
                {prelude}
                el.click();
                return true;
            }})()"#,
            prelude = self.prelude("false"),
        );
        let clicked: bool = eval(&self.page, js).await?;
        if clicked {
            Ok(())
        } else {
            Err(self.gone())
        }
    }

    async fn select_option(&self, target: OptionTarget<'_>) -> Result<()> {
        let matcher = match target {
            OptionTarget::Value(value) => format!(
                "opt.value === '{}'",
                sanitize_js_string(value)
            ),
            OptionTarget::Label(label) => format!(
                "opt.textContent.trim() === '{}'",
                sanitize_js_string(label)
            ),
        };
        let js = format!(
            r#"(() => {{
                {prelude}
                for (const opt of el.options) {{
                    if ({matcher}) {{
                        el.value = opt.value;
                        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            prelude = self.prelude("false"),
        );
        let selected: bool = eval(&self.page, js).await?;
        if selected {
            Ok(())
        } else {
            Err(Error::transient(
                format!("no matching option in {}", self.selector),
                code::DRIVER_ERROR,
            ))
        }
    }

    async fn text_content(&self) -> Result<Option<String>> {
        let js = format!(
            r#"(() => {{
                {prelude}
                return el.textContent;
            }})()"#,
            prelude = self.prelude("null"),
        );
        eval(&self.page, js).await
    }
}

/// Count matches, then hand out handles addressing them by index.
async fn locate_in(
    page: &Page,
    doc_expr: &str,
    selector: &str,
) -> Result<Vec<Box<dyn ElementHandle>>> {
    let js = format!(
        r#"(() => {{
            try {{
                const doc = {doc_expr};
                return doc ? doc.querySelectorAll('{sel}').length : 0;
            }} catch (e) {{
                return 0;
            }}
        }})()"#,
        sel = sanitize_js_string(selector),
    );
    let count: usize = eval(page, js).await?;

    Ok((0..count)
        .map(|index| {
            Box::new(ChromiumElement {
                page: page.clone(),
                doc_expr: doc_expr.to_string(),
                selector: selector.to_string(),
                index,
            }) as Box<dyn ElementHandle>
        })
        .collect())
}

/// Evaluate a script and deserialize its result.
async fn eval<T: DeserializeOwned>(page: &Page, js: String) -> Result<T> {
    let result = page.evaluate(js).await.map_err(|e| {
        Error::transient(
            format!("script evaluation failed: {e}"),
            code::DRIVER_ERROR,
        )
    })?;
    result.into_value().map_err(|e| {
        Error::transient(
            format!("failed to convert script result: {e:?}"),
            code::DRIVER_ERROR,
        )
    })
}

/// Sanitize a string for safe injection into a JavaScript string literal.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("hello"), "hello");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_sanitize_keeps_attribute_selectors_usable() {
        let sel = "input[name=\"user_id\"]";
        assert_eq!(sanitize_js_string(sel), "input[name=\\\"user_id\\\"]");
    }

    #[test]
    fn test_sanitize_script_injection() {
        let malicious = r#"</script><script>alert(1)</script>"#;
        let sanitized = sanitize_js_string(malicious);
        assert!(!sanitized.contains("</script>"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_locate_and_read() {
        let driver = ChromiumDriver::new(&Config::default());
        let session = driver.open_session().await.expect("failed to open session");

        session
            .navigate("data:text/html,<dl><dt>a</dt><dd>14.5kWh</dd></dl>")
            .await
            .expect("navigation failed");

        let cells = session.locate("dd").await.expect("locate failed");
        assert_eq!(cells.len(), 1);
        let text = cells[0].text_content().await.expect("text failed");
        assert_eq!(text.as_deref(), Some("14.5kWh"));

        session.close().await.expect("close failed");
    }
}
