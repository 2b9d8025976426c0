use std::io::{self, Write};

use serde::Serialize;

use crate::cli::OutputFormat;

/// Routes command results either to a text renderer or to stdout as JSON.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Emits `value` as one JSON line, or hands it to `render` in text mode.
    pub fn emit<T: Serialize>(&self, value: &T, render: impl FnOnce(&T)) {
        match self.format {
            OutputFormat::Text => render(value),
            OutputFormat::Json => self.write_json(value),
        }
    }

    /// Emit a simple message.
    pub fn emit_message(&self, message: &str) {
        match self.format {
            OutputFormat::Text => {
                println!("{}", message);
            }
            OutputFormat::Json => {
                let msg = MessageOutput {
                    message: message.to_string(),
                };
                self.write_json(&msg);
            }
        }
    }

    fn write_json<T: Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageOutput {
    pub message: String,
}
