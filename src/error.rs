use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

/// Location of a construct in the source.
///
/// `start`/`end` are character offsets (what ariadne expects), `line` and
/// `column` are 1-based and refer to the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn single(pos: usize, line: usize, column: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
            line,
            column,
        }
    }

    /// Covers everything from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.start),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Binding,
    Type,
    Arity,
    Runtime,
    Resource,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Lex => "Lexical Error",
            ErrorKind::Parse => "Syntax Error",
            ErrorKind::Binding => "Binding Error",
            ErrorKind::Type => "Type Error",
            ErrorKind::Arity => "Arity Error",
            ErrorKind::Runtime => "Runtime Error",
            ErrorKind::Resource => "Resource Error",
        }
    }

    fn color(&self) -> Color {
        match self {
            ErrorKind::Lex => Color::Red,
            ErrorKind::Parse => Color::Yellow,
            ErrorKind::Binding => Color::Blue,
            ErrorKind::Type | ErrorKind::Arity => Color::Magenta,
            ErrorKind::Runtime | ErrorKind::Resource => Color::Magenta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SableError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl SableError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Lex, span, message)
    }

    pub fn parse_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Parse, span, message)
    }

    pub fn parse_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::Parse, span, message, help)
    }

    pub fn binding_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Binding, span, message)
    }

    pub fn type_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Type, span, message)
    }

    pub fn arity_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Arity, span, message)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Runtime, span, message)
    }

    pub fn runtime_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::Runtime, span, message, help)
    }

    pub fn resource_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Resource, span, message)
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        let color = self.kind.color();

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!(
                "{} at {}:{}: {}",
                self.kind.label().fg(color),
                self.span.line,
                self.span.column,
                self.message
            ))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        // Rendering to stderr only fails if stderr is gone; fall back to plain text.
        if report_builder
            .finish()
            .eprint((filename, Source::from(source)))
            .is_err()
        {
            eprintln!("{}", self);
        }
    }
}

impl fmt::Display for SableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}: {}",
            self.kind.label(),
            self.span.line,
            self.span.column,
            self.message
        )
    }
}

impl std::error::Error for SableError {}
