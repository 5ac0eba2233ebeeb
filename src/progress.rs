use crate::timecode::parse_duration;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::sync::mpsc::Sender;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Receives fractional progress in `[0, 1]`. Values may overshoot 1 a little
/// because the elapsed time is scraped from text.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

impl ProgressSink for Sender<f64> {
    fn report(&self, fraction: f64) {
        let _ = self.send(fraction);
    }
}

/// Discards everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// Maps a child operation's `[0, 1]` into a sub-range of a parent sink.
pub struct ScaledSink<'a> {
    inner: &'a dyn ProgressSink,
    offset: f64,
    span: f64,
}

impl<'a> ScaledSink<'a> {
    pub fn new(inner: &'a dyn ProgressSink, offset: f64, span: f64) -> Self {
        Self {
            inner,
            offset,
            span,
        }
    }
}

impl ProgressSink for ScaledSink<'_> {
    fn report(&self, fraction: f64) {
        self.inner.report(self.offset + fraction * self.span);
    }
}

static FRAMES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"frame=\s*[^\s]+\s+fps=\s*[^\s]+\s+q=\s*[^\s]+\s+(?:size|Lsize)=\s*[^\s]+\s+time=\s*([^\s]+)\s+",
    )
    .expect("valid frames regex")
});

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:size|Lsize)=\s*[^\s]+\s+time=\s*([^\s]+)\s+").expect("valid size regex")
});

/// Which status line shape to expect on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPattern {
    /// `frame=… fps=… q=… size=… time=…`, printed while cutting.
    Frames,
    /// `size=… time=…`, printed by remux/concat/audio jobs.
    Size,
}

impl ProgressPattern {
    fn regex(self) -> &'static Regex {
        match self {
            ProgressPattern::Frames => &FRAMES_RE,
            ProgressPattern::Size => &SIZE_RE,
        }
    }
}

pub struct ProgressParser<'a> {
    pattern: ProgressPattern,
    total_seconds: f64,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressParser<'a> {
    pub fn new(pattern: ProgressPattern, total_seconds: f64, sink: &'a dyn ProgressSink) -> Self {
        Self {
            pattern,
            total_seconds,
            sink,
        }
    }

    /// Extracts the elapsed time from a status line, if it is one.
    pub fn elapsed(&self, line: &str) -> Option<Result<f64, String>> {
        let caps = self.pattern.regex().captures(line)?;
        Some(parse_duration(&caps[1]))
    }

    /// Reports a fraction for matching lines; anything else is ignored.
    pub fn feed(&self, line: &str) {
        match self.elapsed(line) {
            None => {}
            Some(Err(err)) => warn!(%err, "skipping unparsable progress line"),
            Some(Ok(seconds)) if seconds < 0.0 => {
                debug!(seconds, "skipping negative progress time");
            }
            Some(Ok(seconds)) => {
                if self.total_seconds > 0.0 {
                    let fraction = seconds / self.total_seconds;
                    debug!(seconds, fraction, "progress");
                    self.sink.report(fraction);
                }
            }
        }
    }
}

/// Terminal progress bar for the command-line front end.
pub struct ProgressUi {
    bar: ProgressBar,
}

const BAR_LEN: u64 = 1000;

impl ProgressUi {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(BAR_LEN);
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}]  [{bar:60.cyan/bright-black}] {percent:>3}%  ETA:{eta_precise}\n{wide_msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(label.to_string());
        Self { bar }
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.bar.set_position(BAR_LEN);
        self.bar.finish_with_message(message.into());
    }

    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}

impl ProgressSink for ProgressUi {
    fn report(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.bar.set_position((clamped * BAR_LEN as f64) as u64);
    }
}
