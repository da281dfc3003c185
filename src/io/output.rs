//! Output management for CLI commands.
//!
//! Every command result goes through [`OutputManager`], which prints either
//! a text rendering or the JSON envelope.

use std::io::{self, Write};

use serde::Serialize;

use crate::error::RagError;
use crate::io::exit_code::ExitCode;
use crate::io::format::{JsonResponse, OutputFormat, ResponseMeta};

pub struct OutputManager {
    format: OutputFormat,
    session: String,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl OutputManager {
    pub fn new(format: OutputFormat, session: &str) -> Self {
        Self {
            format,
            session: session.to_string(),
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// Create an output manager for testing with custom writers.
    #[cfg(test)]
    pub fn new_with_writers(
        format: OutputFormat,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            session: "test".to_string(),
            stdout,
            stderr,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn write_json<T: Serialize>(&mut self, response: &JsonResponse<T>) -> io::Result<()> {
        writeln!(self.stdout, "{}", serde_json::to_string_pretty(response)?)
    }

    /// Outputs a result; `render` produces the text form.
    pub fn success<T, F>(&mut self, data: &T, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let response =
                    JsonResponse::success(data).with_meta(ResponseMeta::for_session(&self.session));
                self.write_json(&response)?;
            }
            OutputFormat::Text => {
                writeln!(self.stdout, "{}", render(data))?;
            }
        }
        Ok(ExitCode::Success)
    }

    /// Outputs a list. An empty list exits with [`ExitCode::NotFound`].
    pub fn collection<T, F>(&mut self, items: &[T], entity_name: &str, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: Fn(usize, &T) -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::success(items)
                    .with_message(format!("Found {} {entity_name}", items.len()))
                    .with_meta(ResponseMeta::for_session(&self.session));
                self.write_json(&response)?;
            }
            OutputFormat::Text if items.is_empty() => {
                writeln!(self.stderr, "No {entity_name} found")?;
            }
            OutputFormat::Text => {
                writeln!(self.stdout, "Found {} {entity_name}:", items.len())?;
                writeln!(self.stdout, "{}", "=".repeat(40))?;
                for (position, item) in items.iter().enumerate() {
                    writeln!(self.stdout, "{}", render(position, item))?;
                }
            }
        }
        Ok(ExitCode::from_results(items))
    }

    /// Output an error with suggestions.
    pub fn error(&mut self, error: &RagError) -> io::Result<ExitCode> {
        let code = ExitCode::from_error(error);
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::from_error(error)
                    .with_meta(ResponseMeta::for_session(&self.session));
                writeln!(self.stderr, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stderr, "{}: {error}", code.description())?;
                for suggestion in error.recovery_suggestions() {
                    writeln!(self.stderr, "  Suggestion: {suggestion}")?;
                }
            }
        }
        Ok(code)
    }

    /// Output progress information (text mode only).
    pub fn progress(&mut self, message: &str) -> io::Result<()> {
        if matches!(self.format, OutputFormat::Text) {
            writeln!(self.stderr, "{message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer whose contents stay readable after being boxed.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_text_collection() {
        let stdout = Shared::default();
        let mut manager = OutputManager::new_with_writers(
            OutputFormat::Text,
            Box::new(stdout.clone()),
            Box::new(Shared::default()),
        );

        let code = manager
            .collection(&["alpha", "beta"], "results", |i, item| format!("{}. {item}", i + 1))
            .unwrap();
        assert_eq!(code, ExitCode::Success);
        let text = stdout.text();
        assert!(text.starts_with("Found 2 results:"));
        assert!(text.contains("2. beta"));
    }

    #[test]
    fn test_json_empty_collection_is_not_found() {
        let stdout = Shared::default();
        let mut manager = OutputManager::new_with_writers(
            OutputFormat::Json,
            Box::new(stdout.clone()),
            Box::new(Shared::default()),
        );

        let code = manager
            .collection::<String, _>(&[], "results", |_, item| item.clone())
            .unwrap();
        assert_eq!(code, ExitCode::NotFound);
        let json: serde_json::Value = serde_json::from_str(&stdout.text()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["meta"]["session"], "test");
    }

    #[test]
    fn test_error_goes_to_stderr() {
        let stderr = Shared::default();
        let mut manager = OutputManager::new_with_writers(
            OutputFormat::Text,
            Box::new(Shared::default()),
            Box::new(stderr.clone()),
        );

        let error = RagError::Config {
            reason: "bad".into(),
        };
        assert_eq!(manager.error(&error).unwrap(), ExitCode::ConfigError);
        assert!(stderr.text().starts_with("Configuration error: "));
        assert!(stderr.text().contains("Suggestion:"));
    }
}
