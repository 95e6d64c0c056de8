use engine::config::LoggingConfig;
use regex::Regex;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Applies the configured redaction patterns to every log line.
struct RedactingWriter<W> {
    inner: W,
    patterns: Vec<(Regex, String)>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let mut redacted = s.to_string();
        for (re, replacement) in &self.patterns {
            redacted = re.replace_all(&redacted, replacement.as_str()).to_string();
        }
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter {
    patterns: Vec<(Regex, String)>,
}

impl<'a> fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    // Stdout carries command results, so logs always go to stderr.
    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: io::stderr(),
            patterns: self.patterns.clone(),
        }
    }
}

fn compile_patterns(config: &LoggingConfig) -> Vec<(Regex, String)> {
    if !config.redaction.enabled {
        return Vec::new();
    }
    config
        .redaction
        .patterns
        .iter()
        .filter_map(|p| match Regex::new(&p.regex) {
            Ok(re) => Some((re, p.placeholder.clone())),
            Err(e) => {
                eprintln!("warning: ignoring redaction pattern '{}': {}", p.name, e);
                None
            }
        })
        .collect()
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level()));

    let make_writer = RedactingMakeWriter {
        patterns: compile_patterns(config),
    };
    let format = &config.format;

    // Use Layer::boxed() to unify the types of the branches
    let fmt_layer = match (format.json, format.show_time) {
        (true, _) => fmt::layer()
            .json()
            .with_writer(make_writer)
            .with_target(format.show_target)
            .with_file(format.show_file)
            .with_line_number(format.show_line)
            .boxed(),
        (false, false) => fmt::layer()
            .with_writer(make_writer)
            .with_target(format.show_target)
            .with_file(format.show_file)
            .with_line_number(format.show_line)
            .with_thread_ids(false)
            .without_time()
            .boxed(),
        (false, true) => fmt::layer()
            .with_writer(make_writer)
            .with_target(format.show_target)
            .with_file(format.show_file)
            .with_line_number(format.show_line)
            .with_thread_ids(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_pattern_masks_passwords() {
        let patterns = compile_patterns(&LoggingConfig::default());
        let mut w = RedactingWriter {
            inner: Vec::new(),
            patterns,
        };
        w.write_all(br#"creating user alice password="Pwd!2345" ok"#).unwrap();
        let out = String::from_utf8(w.inner).unwrap();
        assert!(!out.contains("Pwd!2345"), "{}", out);
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("alice"));
    }

    #[test]
    fn test_redaction_can_be_disabled() {
        let mut config = LoggingConfig::default();
        config.redaction.enabled = false;
        assert!(compile_patterns(&config).is_empty());
    }
}
