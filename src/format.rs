use crate::dispatch::channel::NotificationPayload;
use crate::rules::TriggeredAlert;

/// The contract the dispatcher invokes to turn a [`TriggeredAlert`] into
/// a [`NotificationPayload`]. Human-readable message templating is out
/// of scope (spec.md §1); this trait restores only the call boundary
/// `formatter.py` exposed, so a real templating engine can be plugged
/// in without the dispatcher changing.
pub trait AlertFormatter: Send + Sync {
    fn format(&self, alert: &TriggeredAlert) -> NotificationPayload;
}

/// Minimal default: enough structure for the dispatcher to have a
/// payload to send, no human-facing copywriting.
#[derive(Clone, Copy, Default)]
pub struct PlainAlertFormatter;

impl AlertFormatter for PlainAlertFormatter {
    fn format(&self, alert: &TriggeredAlert) -> NotificationPayload {
        let subject = format!("[{}] {}", alert.severity_label(), alert.rule_name);
        let coin = alert.event.coin.clone().unwrap_or_else(|| "?".to_string());
        let usd_value = alert
            .event
            .usd_value
            .map(|value| format!("${value:.2}"))
            .unwrap_or_else(|| "unknown value".to_string());

        let text = format!(
            "{subject}: account {} {coin} ({usd_value})",
            alert.account
        );

        NotificationPayload {
            subject,
            text,
            html: None,
        }
    }
}

impl TriggeredAlert {
    fn severity_label(&self) -> &'static str {
        match self.severity {
            crate::dispatch::task::Severity::Critical => "CRITICAL",
            crate::dispatch::task::Severity::High => "HIGH",
            crate::dispatch::task::Severity::Medium => "MEDIUM",
            crate::dispatch::task::Severity::Low => "LOW",
            crate::dispatch::task::Severity::Info => "INFO",
        }
    }
}
