//! Field extraction from the authenticated portal page.
//!
//! The reporting widget lives either directly on the signed-in page or
//! inside an embedded iframe, depending on which portal layout is served.
//! Field positions are unstable and the labels are images, so every value
//! is reached through its marker image and read as localized text.
//!
//! A missing field is degraded to 0.0 with a warning rather than failing
//! the whole fetch.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::driver::{LoadState, OptionTarget, PageSession, Surface};
use crate::error::{code, Error, Result};
use crate::model::{PowerReading, ReportingPeriod};
use crate::retry::Sleeper;

/// Marker image that identifies the reporting widget. Site contract.
pub const FRAME_MARKER_SELECTOR: &str = "img[alt='使用量']";

/// The period dropdown is the widget's first `<select>`. Site contract.
pub const PERIOD_SELECT_SELECTOR: &str = "select";

/// Settle time after switching periods in the iframe layout, where the
/// widget update is not observable through a separate readiness signal.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// First integer-or-decimal token in a value cell, e.g. "14.50kWh" → 14.50.
static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("numeric token pattern"));

/// One extractable quantity: a marker image and the name used in logs.
struct QuantitySpec {
    name: &'static str,
    marker: &'static str,
    unit: &'static str,
}

const USAGE: QuantitySpec = QuantitySpec {
    name: "power usage",
    marker: "使用量",
    unit: crate::model::USAGE_UNIT,
};
const COST: QuantitySpec = QuantitySpec {
    name: "power cost",
    marker: "使用料金",
    unit: crate::model::COST_UNIT,
};
const CO2: QuantitySpec = QuantitySpec {
    name: "CO2 emission",
    marker: "CO2",
    unit: crate::model::CO2_UNIT,
};

/// Where the reporting widget was found.
enum DataSurface<'a> {
    /// Directly on the main document (layout with observable load state).
    Page(&'a dyn PageSession),
    /// Inside an embedded sub-frame (legacy layout, fixed settle delay).
    Frame(Box<dyn Surface>),
}

impl DataSurface<'_> {
    fn surface(&self) -> &dyn Surface {
        match self {
            Self::Page(page) => page.as_surface(),
            Self::Frame(frame) => frame.as_ref(),
        }
    }
}

/// Reads usage, cost and CO2 figures off an authenticated page.
pub struct Extractor<'a> {
    page: &'a dyn PageSession,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Extractor<'a> {
    pub fn new(page: &'a dyn PageSession, sleeper: &'a dyn Sleeper) -> Self {
        Self { page, sleeper }
    }

    /// Fetch today's figures.
    pub async fn fetch_today(&self) -> Result<PowerReading> {
        debug!("fetching today's data");
        self.fetch_period(ReportingPeriod::Today)
            .await
            .map_err(|err| {
                Error::extraction(
                    format!("failed to fetch today's data: {err}"),
                    code::FETCH_TODAY_ERROR,
                )
            })
    }

    /// Fetch this month's figures.
    pub async fn fetch_month(&self) -> Result<PowerReading> {
        debug!("fetching month's data");
        self.fetch_period(ReportingPeriod::Month)
            .await
            .map_err(|err| {
                Error::extraction(
                    format!("failed to fetch month's data: {err}"),
                    code::FETCH_MONTH_ERROR,
                )
            })
    }

    /// Fetch figures for the given period.
    pub async fn fetch_period(&self, period: ReportingPeriod) -> Result<PowerReading> {
        let data = self.data_surface().await?;
        self.select_period(&data, period).await?;

        debug!("waiting for data to load");
        match &data {
            DataSurface::Page(page) => page.wait_for_state(LoadState::NetworkIdle).await?,
            DataSurface::Frame(_) => self.sleeper.sleep(SETTLE_DELAY).await,
        }

        let surface = data.surface();
        let usage = self.quantity(surface, &USAGE).await;
        let cost = self.quantity(surface, &COST).await;
        let co2 = self.quantity(surface, &CO2).await;

        Ok(PowerReading::new(period, usage, cost, co2))
    }

    /// Locate the surface holding the reporting widget.
    ///
    /// Probes the main document first, then every sub-frame for the marker
    /// image; falls back to the first sub-frame when no marker matches.
    async fn data_surface(&self) -> Result<DataSurface<'a>> {
        let on_page = self
            .page
            .as_surface()
            .locate(FRAME_MARKER_SELECTOR)
            .await
            .map_err(frame_error)?;
        if !on_page.is_empty() {
            debug!("reporting widget found on main document");
            return Ok(DataSurface::Page(self.page));
        }

        let mut frames = self.page.frames().await.map_err(frame_error)?;
        for index in 0..frames.len() {
            let marked = frames[index]
                .locate(FRAME_MARKER_SELECTOR)
                .await
                .map_err(frame_error)?;
            if !marked.is_empty() {
                debug!("reporting widget found in frame {index}");
                return Ok(DataSurface::Frame(frames.swap_remove(index)));
            }
        }

        if !frames.is_empty() {
            debug!("no marker matched, using first available frame");
            return Ok(DataSurface::Frame(frames.remove(0)));
        }

        Err(Error::extraction(
            "reporting data frame not found",
            code::IFRAME_NOT_FOUND,
        ))
    }

    /// Select the reporting period in the widget's dropdown.
    async fn select_period(&self, data: &DataSurface<'_>, period: ReportingPeriod) -> Result<()> {
        debug!("selecting period: {period}");
        let selects = data
            .surface()
            .locate(PERIOD_SELECT_SELECTOR)
            .await
            .map_err(|err| period_select_error(&err))?;
        let dropdown = selects.first().ok_or_else(|| {
            Error::extraction(
                "period dropdown not found",
                code::PERIOD_SELECT_ERROR,
            )
        })?;
        dropdown
            .select_option(OptionTarget::Label(period.option_label()))
            .await
            .map_err(|err| period_select_error(&err))
    }

    /// Read one quantity, degrading to 0.0 when anything is missing.
    async fn quantity(&self, surface: &dyn Surface, spec: &QuantitySpec) -> f64 {
        match self.read_quantity(surface, spec).await {
            Ok(Some(value)) => {
                debug!("{}: {value} {}", spec.name, spec.unit);
                value
            }
            Ok(None) => {
                warn!("{} not found on page, recording 0.0", spec.name);
                0.0
            }
            Err(err) => {
                warn!("{} extraction failed: {err}", spec.name);
                0.0
            }
        }
    }

    async fn read_quantity(
        &self,
        surface: &dyn Surface,
        spec: &QuantitySpec,
    ) -> Result<Option<f64>> {
        let label_selector = format!("dt:has(img[alt='{}'])", spec.marker);
        if surface.locate(&label_selector).await?.is_empty() {
            return Ok(None);
        }

        // The value cell is the dt's adjacent dd.
        let value_selector = format!("{label_selector} + dd");
        let values = surface.locate(&value_selector).await?;
        let Some(cell) = values.first() else {
            return Ok(None);
        };
        let Some(text) = cell.text_content().await? else {
            return Ok(None);
        };

        Ok(parse_numeric_token(&text))
    }
}

/// Extract the first decimal-or-integer token from localized value text.
pub fn parse_numeric_token(text: &str) -> Option<f64> {
    NUMERIC_TOKEN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|token| token.as_str().parse().ok())
}

fn frame_error(err: Error) -> Error {
    Error::extraction(
        format!("failed to locate data frame: {err}"),
        code::IFRAME_ERROR,
    )
}

fn period_select_error(err: &Error) -> Error {
    Error::extraction(
        format!("failed to select period: {err}"),
        code::PERIOD_SELECT_ERROR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_token_with_unit_suffix() {
        assert_eq!(parse_numeric_token("14.50kWh"), Some(14.5));
        assert_eq!(parse_numeric_token("100kWh"), Some(100.0));
        assert_eq!(parse_numeric_token("0.5kWh"), Some(0.5));
        assert_eq!(parse_numeric_token("1234.56 kWh"), Some(1234.56));
    }

    #[test]
    fn test_numeric_token_localized_units() {
        assert_eq!(parse_numeric_token("542.02円"), Some(542.02));
        assert_eq!(parse_numeric_token("6.53kg"), Some(6.53));
    }

    #[test]
    fn test_numeric_token_takes_first_match() {
        assert_eq!(parse_numeric_token("12.5kWh (前日 10.0kWh)"), Some(12.5));
    }

    #[test]
    fn test_numeric_token_absent() {
        assert_eq!(parse_numeric_token(""), None);
        assert_eq!(parse_numeric_token("---"), None);
        assert_eq!(parse_numeric_token("kWh"), None);
    }
}
