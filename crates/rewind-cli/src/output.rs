use clap::ValueEnum;
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

#[derive(Clone, Copy)]
enum MessageKind {
    Success,
    Error,
    Info,
    Warning,
}

impl MessageKind {
    fn label(self) -> &'static str {
        match self {
            MessageKind::Success => "success",
            MessageKind::Error => "error",
            MessageKind::Info => "info",
            MessageKind::Warning => "warning",
        }
    }
}

/// User-facing messages on stdout; diagnostics go through tracing on stderr.
pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.message(MessageKind::Success, msg.as_ref());
    }

    /// Shown even in quiet mode.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.message(MessageKind::Error, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.message(MessageKind::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.message(MessageKind::Warning, msg.as_ref());
    }

    /// Plain line in human mode; dropped in JSON modes, where `json` carries the data.
    pub fn println(&self, msg: impl AsRef<str>) {
        if !self.quiet && self.is_human() {
            println!("{}", msg.as_ref());
        }
    }

    pub fn json(&self, data: &serde_json::Value) {
        if self.quiet && !self.is_human() {
            return;
        }
        self.print_json(data);
    }

    fn message(&self, kind: MessageKind, msg: &str) {
        if self.quiet && !matches!(kind, MessageKind::Error) {
            return;
        }
        if !self.is_human() {
            self.print_json(&json!({ "type": kind.label(), "message": msg }));
            return;
        }
        match kind {
            MessageKind::Success => println!("{} {}", "✓".green(), msg),
            MessageKind::Error => eprintln!("{} {}", "✗".red(), msg),
            MessageKind::Info => println!("{}", msg),
            MessageKind::Warning => println!("{} {}", "⚠".yellow(), msg),
        }
    }

    fn print_json(&self, data: &serde_json::Value) {
        let rendered = match self.format {
            OutputFormat::JsonPretty => serde_json::to_string_pretty(data),
            OutputFormat::Json | OutputFormat::Human => serde_json::to_string(data),
        };
        println!("{}", rendered.unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_message_labels() {
        assert_eq!(MessageKind::Success.label(), "success");
        assert_eq!(MessageKind::Error.label(), "error");
        assert_eq!(MessageKind::Warning.label(), "warning");
    }

    #[test]
    fn test_only_human_format_is_human() {
        assert!(Output::new(OutputFormat::Human, false).is_human());
        assert!(!Output::new(OutputFormat::Json, false).is_human());
        assert!(!Output::new(OutputFormat::JsonPretty, true).is_human());
        assert!(Output::new(OutputFormat::JsonPretty, true).is_quiet());
    }
}
