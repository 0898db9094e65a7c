use crate::span::Span;
use crate::style::Style;
use serde::Serialize;

/// Which pipeline stage rejected the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    Lex,
    Parse,
    Resolve,
    Lower,
    Type,
    Effect,
    Internal,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Lex => "LexError",
            DiagnosticKind::Parse => "ParseError",
            DiagnosticKind::Resolve => "ResolveError",
            DiagnosticKind::Lower => "LowerError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Effect => "EffectError",
            DiagnosticKind::Internal => "InternalError",
        }
    }
}

/// Single-span, single-message failure. The pipeline fails fast: each stage
/// produces at most one of these and no stage attempts recovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Lex, message, span)
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Parse, message, span)
    }

    pub fn resolve(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Resolve, message, span)
    }

    pub fn lower(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Lower, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Type, message, span)
    }

    pub fn effect(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Effect, message, span)
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Internal, message, span)
    }

    /// Render with the source line and a caret underline:
    ///
    /// ```text
    /// main.flv:3:5: ParseError: Expected expression
    ///   let = 1
    ///       ^
    /// ```
    pub fn render(&self, source: &str) -> String {
        self.render_styled(source, false)
    }

    pub fn render_styled(&self, source: &str, color: bool) -> String {
        let span = &self.span;
        let lines: Vec<&str> = source.lines().collect();
        let line_idx = span.line.saturating_sub(1).min(lines.len().saturating_sub(1));
        let line_text = lines.get(line_idx).copied().unwrap_or("");

        let caret_col = span.col.max(1);
        // Width comes from the byte range, clamped to the visible line.
        let mut width = (span.end.saturating_sub(span.start)).max(1);
        let max_width = line_text.chars().count().saturating_sub(caret_col - 1).max(1);
        width = width.min(max_width);

        let underline: String = " ".repeat(caret_col - 1) + &"^".repeat(width);
        let header = format!(
            "{}:{}:{}: {}: {}",
            span.file,
            span.line,
            span.col,
            self.kind.label(),
            self.message
        );
        if color {
            format!(
                "{}\n{}\n{}\n",
                Style::bold_red(&header),
                line_text,
                Style::red(&underline)
            )
        } else {
            format!("{}\n{}\n{}\n", header, line_text, underline)
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.span.file,
            self.span.line,
            self.span.col,
            self.kind.label(),
            self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn render_points_caret_under_span() {
        let src = "let x = 1\nlet = 2\n";
        let d = Diagnostic::parse(
            "Expected expression",
            Span::new(Arc::from("t.flv"), 14, 15, 2, 5),
        );
        let out = d.render(src);
        assert!(out.starts_with("t.flv:2:5: ParseError: Expected expression\n"));
        assert!(out.contains("let = 2\n    ^"));
    }
}
