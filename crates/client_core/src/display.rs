use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::watch;

const SUCCESS_COLOUR: &str = "#21730d";
const FAILURE_COLOUR: &str = "#b31e0b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Success,
    Failure,
}

/// One line for the operator console. Toned lines carry a client-side timestamp,
/// which is cosmetic and not the server's time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub text: String,
    pub tone: Tone,
    pub timestamp: Option<DateTime<Utc>>,
}

impl DisplayLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Plain,
            timestamp: None,
        }
    }

    pub fn toned(is_success: bool, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: if is_success { Tone::Success } else { Tone::Failure },
            timestamp: Some(Utc::now()),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::toned(true, text)
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self::toned(false, text)
    }

    pub fn render_text(&self) -> String {
        match self.tag() {
            Some(tag) => format!("{}{tag}{}", self.stamp(), self.text),
            None => self.text.clone(),
        }
    }

    pub fn render_html(&self) -> String {
        let text = escape_html(&self.text);
        match (self.tag(), self.tone) {
            (Some(tag), Tone::Success) => {
                format!(r#"{}<span style="color: {SUCCESS_COLOUR}">{tag}</span>{text}"#, self.stamp())
            }
            (Some(tag), _) => {
                format!(r#"{}<span style="color: {FAILURE_COLOUR}">{tag}</span>{text}"#, self.stamp())
            }
            (None, _) => text,
        }
    }

    fn tag(&self) -> Option<&'static str> {
        match self.tone {
            Tone::Plain => None,
            Tone::Success => Some("  INFO: "),
            Tone::Failure => Some(" ERROR: "),
        }
    }

    fn stamp(&self) -> String {
        self.timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Append-only consumer of console lines. Lines arrive in protocol order.
pub trait DisplaySink: Send + Sync {
    fn append(&self, line: DisplayLine);

    /// Called when a new session takes over the console.
    fn clear(&self) {}
}

/// Keeps every line in memory, newest last.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<DisplayLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<DisplayLine> {
        self.guard().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.guard().iter().map(|line| line.text.clone()).collect()
    }

    pub fn latest(&self) -> Option<DisplayLine> {
        self.guard().last().cloned()
    }

    pub fn to_html(&self) -> String {
        self.guard()
            .iter()
            .map(|line| format!("{}<br>", line.render_html()))
            .collect()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<DisplayLine>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DisplaySink for MemorySink {
    fn append(&self, line: DisplayLine) {
        self.guard().push(line);
    }

    fn clear(&self) {
        self.guard().clear();
    }
}

/// Active while a command session holds a channel open.
#[derive(Clone)]
pub struct ConnectionIndicator {
    tx: watch::Sender<bool>,
}

impl Default for ConnectionIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionIndicator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn set_active(&self) {
        self.tx.send_replace(true);
    }

    pub fn set_inactive(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toned_lines_carry_level_tag() {
        let ok = DisplayLine::success("Testbeds are up");
        assert!(ok.render_text().ends_with("  INFO: Testbeds are up"));
        let failed = DisplayLine::failure("Testbeds are not up");
        assert!(failed.render_text().ends_with(" ERROR: Testbeds are not up"));
        assert_eq!(DisplayLine::plain("raw").render_text(), "raw");
    }

    #[test]
    fn html_rendering_escapes_server_text() {
        let line = DisplayLine::failure("<script>alert('x')</script>");
        let html = line.render_html();
        assert!(html.contains(FAILURE_COLOUR));
        assert!(html.ends_with("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
    }

    #[test]
    fn memory_sink_keeps_order_and_clears() {
        let sink = MemorySink::new();
        sink.append(DisplayLine::plain("one"));
        sink.append(DisplayLine::plain("a & b"));
        assert_eq!(sink.texts(), vec!["one", "a & b"]);
        assert_eq!(sink.to_html(), "one<br>a &amp; b<br>");
        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn indicator_toggles() {
        let indicator = ConnectionIndicator::new();
        let rx = indicator.subscribe();
        indicator.set_active();
        assert!(indicator.is_active());
        assert!(*rx.borrow());
        indicator.set_inactive();
        assert!(!indicator.is_active());
    }
}
