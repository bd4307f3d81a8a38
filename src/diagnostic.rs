//! Diagnostics for malformed disassembly, rendered with ariadne against
//! the offending dump text. The parser is line-oriented, so spans are
//! whole lines.

use crate::error::Error;

/// A pipeline diagnostic (error or warning) anchored to a dump line.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based line in the disassembly text.
    pub line: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, line: usize) -> Self {
        Self {
            severity: Severity::Error,
            message,
            line,
        }
    }

    pub fn warning(message: String, line: usize) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            line,
        }
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let (start, end) = line_span(source, self.line);
        Report::build(kind, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            )
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

/// Render a `ParseError` against the dump it came from; other error kinds
/// have no span and are left to the caller's logging.
pub fn render_parse_error(err: &Error, filename: &str, source: &str) {
    if let Error::Parse { line, reason } = err {
        Diagnostic::error(reason.clone(), *line).render(filename, source);
    }
}

/// Byte span of a 1-based line, excluding its newline.
fn line_span(source: &str, line: usize) -> (usize, usize) {
    let mut start = 0;
    for (i, l) in source.lines().enumerate() {
        if i + 1 == line {
            return (start, start + l.len());
        }
        start += l.len() + 1;
    }
    (source.len(), source.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("File header without descriptor".to_string(), 3);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.line, 3);
    }

    #[test]
    fn test_line_span() {
        let src = "one\ntwo\nthree\n";
        assert_eq!(line_span(src, 1), (0, 3));
        assert_eq!(line_span(src, 2), (4, 7));
        assert_eq!(line_span(src, 3), (8, 13));
        assert_eq!(line_span(src, 9), (14, 14));
    }

    #[test]
    fn test_render_does_not_panic() {
        let src = "File test.py\nbogus row\n";
        let d = Diagnostic::error("malformed header".to_string(), 2);
        // Render to stderr — just verify it doesn't panic.
        d.render("test.s", src);
    }

    #[test]
    fn test_render_parse_error() {
        let err = Error::Parse {
            line: 1,
            reason: "File header without source name".to_string(),
        };
        render_parse_error(&err, "test.s", "File \n");
    }
}
