/// Classification of debug-output lines captured from the target process.
///
/// The engine prefixes its log lines with `[INFO]`, `[WARN]` or `[ERRO]`
/// (exactly these three, case-sensitive). Untagged lines — including output
/// from third-party code inside the target — default to Info.
use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERRO",
        }
    }
}

/// One captured trace line. Ownership transfers to the consumer on emission;
/// the monitor keeps no history.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: DateTime<Local>,
    pub severity: LogSeverity,
    pub text: String,
}

impl LogRecord {
    /// Classifies `line` and stamps it with the current local time.
    pub fn classify(line: &str) -> Self {
        let (severity, text) = classify(line);
        Self { time: Local::now(), severity, text }
    }
}

/// Splits an optional leading severity tag off `line` and trims the rest.
/// The tag must sit at the very start of the line, untrimmed, which is how
/// the engine always emits it.
pub fn classify(line: &str) -> (LogSeverity, String) {
    let tagged = [
        ("[INFO]", LogSeverity::Info),
        ("[WARN]", LogSeverity::Warning),
        ("[ERRO]", LogSeverity::Error),
    ];
    for (tag, severity) in tagged {
        if let Some(rest) = line.strip_prefix(tag) {
            return (severity, rest.trim().to_string());
        }
    }
    (LogSeverity::Info, line.trim().to_string())
}
