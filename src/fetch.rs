//! End-to-end fetch orchestration.
//!
//! One `fetch` call walks the whole pipeline: open a browser session, log
//! in, select the reporting period, extract the three quantities, export.
//! Authentication and the fetch-and-extract sequence each run under their
//! own retry loop; authentication failures are never retried anywhere.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::driver::{PageSession, SessionDriver};
use crate::error::{code, Error, Result};
use crate::export::{self, OutputFormat};
use crate::extract::Extractor;
use crate::model::{PowerReading, ReportingPeriod};
use crate::retry::{self, Disposition, RetryPolicy, Sleeper, TokioSleeper};

/// Orchestrates authentication, extraction and export for one account.
pub struct PowerFetcher {
    driver: Arc<dyn SessionDriver>,
    authenticator: Authenticator,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl PowerFetcher {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        authenticator: Authenticator,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            driver,
            authenticator,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the backoff sleeper. Tests use this to observe waits
    /// without real delays.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fetch figures for `period` and hand them to the exporter.
    ///
    /// Transient and structural extraction failures are retried per
    /// policy; authentication failures propagate on the first occurrence;
    /// export failures are always fatal.
    pub async fn fetch(
        &self,
        period: ReportingPeriod,
        format: OutputFormat,
        output: Option<&Path>,
    ) -> Result<PowerReading> {
        info!("starting data fetch for period: {period}");

        let reading = retry::run(
            &self.policy,
            self.sleeper.as_ref(),
            fetch_disposition,
            |attempts, last| {
                Error::transient(
                    format!("operation failed after {attempts} attempts: {last}"),
                    code::RETRY_EXHAUSTED,
                )
            },
            || self.fetch_once(period),
        )
        .await?;

        info!("data fetch completed successfully");
        export::export(&reading, format, output)?;

        Ok(reading)
    }

    /// One full attempt: session open, login, extract, session close.
    async fn fetch_once(&self, period: ReportingPeriod) -> Result<PowerReading> {
        debug!("opening browser session");
        let session = self.driver.open_session().await?;

        let outcome = self.fetch_in_session(session.as_ref(), period).await;

        // Release the session on every path; an extraction error wins over
        // a close error.
        if let Err(err) = session.close().await {
            warn!("failed to close browser session: {err}");
        }

        outcome
    }

    async fn fetch_in_session(
        &self,
        session: &dyn PageSession,
        period: ReportingPeriod,
    ) -> Result<PowerReading> {
        info!("starting authentication");
        retry::run(
            &self.policy,
            self.sleeper.as_ref(),
            login_disposition,
            |attempts, last| {
                Error::authentication_coded(
                    format!("authentication failed after {attempts} attempts: {last}"),
                    code::AUTH_RETRY_EXHAUSTED,
                )
            },
            || self.authenticator.login(session),
        )
        .await?;
        info!("authentication successful");

        let extractor = Extractor::new(session, self.sleeper.as_ref());
        let reading = match period {
            ReportingPeriod::Today => extractor.fetch_today().await?,
            ReportingPeriod::Month => extractor.fetch_month().await?,
        };

        debug!(
            "data fetched: usage={}, cost={}, co2={}",
            reading.usage.value, reading.cost.value, reading.co2.value
        );
        Ok(reading)
    }
}

/// Outer loop: retry the network/timeout class and structural extraction
/// problems; authentication and export failures surface immediately.
fn fetch_disposition(err: &Error) -> Disposition {
    match err {
        Error::Transient { .. } | Error::Extraction { .. } => Disposition::Retry,
        Error::Authentication { .. } | Error::Export { .. } => Disposition::Fatal,
    }
}

/// Login loop: only driver-level transient failures are worth another
/// attempt. Repeating a rejected login would trip the portal's rate
/// limiting, so authentication failures are fatal here too.
fn login_disposition(err: &Error) -> Disposition {
    match err {
        Error::Transient { .. } => Disposition::Retry,
        _ => Disposition::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outer_disposition() {
        assert_eq!(
            fetch_disposition(&Error::transient("x", code::DRIVER_ERROR)),
            Disposition::Retry
        );
        assert_eq!(
            fetch_disposition(&Error::extraction("x", code::IFRAME_ERROR)),
            Disposition::Retry
        );
        assert_eq!(
            fetch_disposition(&Error::authentication("x")),
            Disposition::Fatal
        );
        assert_eq!(fetch_disposition(&Error::export("x")), Disposition::Fatal);
    }

    #[test]
    fn test_login_disposition() {
        assert_eq!(
            login_disposition(&Error::transient("x", code::NAV_TIMEOUT)),
            Disposition::Retry
        );
        assert_eq!(
            login_disposition(&Error::authentication("x")),
            Disposition::Fatal
        );
        assert_eq!(
            login_disposition(&Error::extraction("x", code::FETCH_ERROR)),
            Disposition::Fatal
        );
    }
}
