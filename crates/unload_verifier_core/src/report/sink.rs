//! Report sinks.

use crate::report::escape::escape_service_value;
use log::error;
use serde::Serialize;
use std::io::Write;

/// Kind of one reported test event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Finish,
    Failure,
}

/// One event as delivered to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEvent {
    pub kind: EventKind,
    pub name: String,
    pub message: Option<String>,
}

/// Downstream consumer of harness events.
///
/// `name` and `message` arrive already passed through `escape`.
pub trait ReportSink {
    /// Encodes a raw value for this sink's protocol.
    fn escape(&self, raw: &str) -> String {
        escape_service_value(raw)
    }

    fn emit_event(&mut self, kind: EventKind, name: &str, message: Option<&str>);

    /// Publishes one numeric build statistic. Ignored by default.
    fn emit_statistic(&mut self, _key: &str, _value: u64) {}
}

/// Writes service messages, one per line, flushing after each.
pub struct ServiceMessageSink<W: Write> {
    out: W,
}

impl<W: Write> ServiceMessageSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        let written = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
        if let Err(err) = written {
            error!(
                "event=report_write module=report status=error error_code=sink_write_failed error={}",
                err
            );
        }
    }
}

impl ServiceMessageSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ReportSink for ServiceMessageSink<W> {
    fn emit_event(&mut self, kind: EventKind, name: &str, message: Option<&str>) {
        let line = match kind {
            EventKind::Start => format!("##teamcity[testStarted name='{name}']"),
            EventKind::Finish => format!("##teamcity[testFinished name='{name}']"),
            EventKind::Failure => format!(
                "##teamcity[testFailed name='{name}' message='{}']",
                message.unwrap_or_default()
            ),
        };
        self.write_line(&line);
    }

    fn emit_statistic(&mut self, key: &str, value: u64) {
        let line = format!(
            "##teamcity[buildStatisticValue key='{}' value='{value}']",
            self.escape(key)
        );
        self.write_line(&line);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<ReportEvent>,
    statistics: Vec<(String, u64)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.events
    }

    pub fn statistics(&self) -> &[(String, u64)] {
        &self.statistics
    }

    /// Events for one escaped test name.
    pub fn events_named(&self, name: &str) -> Vec<&ReportEvent> {
        self.events.iter().filter(|event| event.name == name).collect()
    }
}

impl ReportSink for RecordingSink {
    fn emit_event(&mut self, kind: EventKind, name: &str, message: Option<&str>) {
        self.events.push(ReportEvent {
            kind,
            name: name.to_string(),
            message: message.map(str::to_string),
        });
    }

    fn emit_statistic(&mut self, key: &str, value: u64) {
        self.statistics.push((key.to_string(), value));
    }
}
