//! Logging setup.
//!
//! Console output goes to stderr at the configured level so stdout stays
//! clean for JSON results; the optional log file captures everything at
//! debug level. Secret redaction is applied in the sink's writer, so a
//! credential value that slips into a log line is masked no matter which
//! component emitted it.

use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result};
use regex::Regex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::prelude::*;

/// `password: hunter2`, `token=abc` and friends, in any casing.
static SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|pwd|secret|token)\b(["']?\s*[:=]\s*)(\S+)"#)
        .expect("secret mask pattern")
});

/// Mask secret values in a rendered log line.
pub fn mask_secrets(text: &str) -> Cow<'_, str> {
    SECRET_PATTERN.replace_all(text, "${1}${2}****")
}

/// `MakeWriter` wrapper that masks secrets on every write.
pub struct Redact<M> {
    inner: M,
}

impl<M> Redact<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for Redact<M> {
    type Writer = RedactWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactWriter {
            inner: self.inner.make_writer(),
        }
    }
}

pub struct RedactWriter<W> {
    inner: W,
}

impl<W: io::Write> io::Write for RedactWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(mask_secrets(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Install the global subscriber: stderr console layer at `log_level`,
/// plus a debug-level file layer when `log_file` is given.
pub fn setup(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    let console_level: LevelFilter = log_level.parse().unwrap_or(LevelFilter::INFO);
    let console = fmt::layer()
        .with_target(false)
        .with_writer(Redact::new(io::stderr))
        .with_filter(console_level);

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create log directory {}", parent.display())
                    })?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Redact::new(Mutex::new(file)))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mask_colon_and_equals_forms() {
        assert_eq!(mask_secrets("password: hunter2"), "password: ****");
        assert_eq!(mask_secrets("token=abc123"), "token=****");
        assert_eq!(mask_secrets("Secret : s3cr3t"), "Secret : ****");
    }

    #[test]
    fn test_mask_leaves_ordinary_text() {
        let line = "fetching month's data for user@example.com";
        assert_eq!(mask_secrets(line), line);
    }

    #[test]
    fn test_redact_writer_masks_output() {
        let mut sink = Vec::new();
        {
            let mut writer = RedactWriter { inner: &mut sink };
            writer.write_all(b"login with password: hunter2 failed").unwrap();
        }
        let written = String::from_utf8(sink).unwrap();
        assert!(written.contains("password: ****"));
        assert!(!written.contains("hunter2"));
    }
}
