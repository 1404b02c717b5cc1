//! Message rendering
//!
//! Wording and language are supplied by a [`MessageFormatter`]; the monitor
//! ships an English markdown formatter for IM robots.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AlertEvent, AlertSource, CheckStatus, StaleReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub msg_type: MessageType,
    pub content: String,
}

impl RenderedMessage {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Markdown,
            content: content.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Text,
            content: content.into(),
        }
    }
}

pub trait MessageFormatter: Send + Sync {
    fn render(&self, event: &AlertEvent) -> RenderedMessage;
}

#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    title: String,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new("instance-monitor")
    }
}

impl MarkdownFormatter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    fn headline(event: &AlertEvent) -> String {
        match (event.result.status, event.source) {
            (CheckStatus::SustainedIncrease, AlertSource::Metric(kind)) => {
                format!("{} keeps increasing", kind.label())
            }
            (CheckStatus::Threshold, AlertSource::Metric(kind)) => {
                format!("{} above limit", kind.label())
            }
            (CheckStatus::StaleRelease, _) => "Release tag is stale".to_string(),
            (status, source) => format!("{source}: {status}"),
        }
    }
}

fn format_value(source: AlertSource, value: f64) -> String {
    match source {
        AlertSource::Metric(kind) if kind.unit().is_empty() => format!("{value:.2}"),
        AlertSource::Metric(kind) => format!("{value:.2} {}", kind.unit()),
        AlertSource::Release => format_age(value as i64),
    }
}

fn format_age(ms: i64) -> String {
    let hours = ms / 3_600_000;
    let (days, hours) = (hours / 24, hours % 24);
    format!("{days}d {hours}h")
}

fn format_time(at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| at_ms.to_string())
}

impl MessageFormatter for MarkdownFormatter {
    fn render(&self, event: &AlertEvent) -> RenderedMessage {
        let result = &event.result;
        let mut lines = vec![
            format!(
                "### [{}] {} - {}",
                self.title,
                Self::headline(event),
                event.service_name
            ),
            format!("> **Service**: {}", event.service_name),
        ];

        if let Some(instance_id) = &event.instance_id {
            lines.push(format!("> **Instance**: {instance_id}"));
        }
        lines.push(format!("> **Metric**: {}", event.source));
        lines.push(format!(
            "> **Observed**: {}",
            format_value(event.source, result.observed)
        ));
        if let Some(rate) = result.rate {
            lines.push(format!(
                "> **Rate**: {}/min",
                format_value(event.source, rate)
            ));
        }
        if let Some(threshold) = result.threshold {
            lines.push(format!(
                "> **Threshold**: {}",
                format_value(event.source, threshold)
            ));
        }
        if result.stale_reason == Some(StaleReason::NoTagFound) {
            lines.push("> **Note**: no tag build found".to_string());
        }
        lines.push(format!("> **Time**: {}", format_time(event.at_ms)));

        RenderedMessage::markdown(lines.join("\n"))
    }
}
