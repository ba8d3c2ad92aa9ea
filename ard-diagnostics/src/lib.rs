// Diagnostic engine for the Ard toolchain.
// Collects parse and check diagnostics with source locations and renders
// them with snippets, notes, and suggestions.

use colored::Colorize;
use std::fmt;

/// Source location of a token or node. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize, column: usize, length: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", "error".red().bold()),
            Severity::Warning => write!(f, "{}", "warning".yellow().bold()),
            Severity::Note => write!(f, "{}", "note".cyan().bold()),
            Severity::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// A single diagnostic message with optional notes, help, and a
/// replacement suggestion.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: &'static str, message: String, span: Span) -> Self {
        Self {
            severity,
            code,
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(code: &'static str, message: String, span: Span) -> Self {
        Self::new(Severity::Error, code, message, span)
    }

    pub fn warning(code: &'static str, message: String, span: Span) -> Self {
        Self::new(Severity::Warning, code, message, span)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render with a source snippet and caret underline.
    pub fn render(&self, source: &str) -> String {
        let mut out = self.render_header();
        if let Some(snippet) = self.snippet(source) {
            out.push_str(&snippet);
        }
        for note in &self.notes {
            out.push_str(&format!(" {} {}\n", "=".cyan().bold(), note));
        }
        if let Some(help) = &self.help {
            out.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }
        out
    }

    fn render_header(&self) -> String {
        format!(
            "{}[{}]: {}\n {} {}\n",
            self.severity,
            self.code,
            self.message.bold(),
            "-->".cyan().bold(),
            self.span,
        )
    }

    fn snippet(&self, source: &str) -> Option<String> {
        if self.span.line == 0 {
            return None;
        }
        let line = source.lines().nth(self.span.line - 1)?;
        let gutter = self.span.line.to_string().len().max(2);
        let mut out = String::new();
        out.push_str(&format!(
            " {} {} {}\n",
            format!("{:>gutter$}", self.span.line).cyan().bold(),
            "|".cyan().bold(),
            line
        ));
        let pad = " ".repeat(gutter + 2 + self.span.column.saturating_sub(1));
        let carets = "^".repeat(self.span.length.max(1));
        out.push_str(&format!(" {}{}\n", pad, carets.red().bold()));
        Some(out)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render_header())?;
        for note in &self.notes {
            writeln!(f, " = {}", note)?;
        }
        if let Some(help) = &self.help {
            writeln!(f, " help: {}", help)?;
        }
        Ok(())
    }
}

/// Accumulator for diagnostics across a compilation.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_error(&mut self, code: &'static str, message: String, span: Span) {
        self.emit(Diagnostic::error(code, message, span));
    }

    pub fn emit_warning(&mut self, code: &'static str, message: String, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.emit(d);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Render every diagnostic to stderr against the given source.
    pub fn print_all(&self, source: &str) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.render(source));
        }
    }

    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }
        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }

    /// Machine-readable export for editors and conformance tooling.
    pub fn to_json(&self) -> String {
        let mut json = String::from("{\"diagnostics\":[");
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                json.push(',');
            }
            let severity = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            };
            json.push_str(&format!(
                "{{\"severity\":\"{}\",\"code\":\"{}\",\"message\":\"{}\",\"file\":\"{}\",\"line\":{},\"column\":{}}}",
                severity,
                diag.code,
                escape_json(&diag.message),
                escape_json(&diag.span.file),
                diag.span.line,
                diag.span.column,
            ));
        }
        json.push_str("]}");
        json
    }
}

fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Diagnostic codes shared across the pipeline.
pub mod codes {
    // Lexing and parsing
    pub const SYNTAX: &str = "A0001";
    pub const UNEXPECTED_TOKEN: &str = "A0002";
    pub const UNEXPECTED_EOF: &str = "A0003";
    pub const BAD_LITERAL: &str = "A0004";
    pub const EXPECTED_MODULE_PATH: &str = "A0005";

    // Name resolution
    pub const UNDEFINED: &str = "A0100";
    pub const DUPLICATE_DEFINITION: &str = "A0101";
    pub const PRIVATE_ACCESS: &str = "A0102";
    pub const DUPLICATE_IMPORT: &str = "A0103";
    pub const MODULE_NOT_FOUND: &str = "A0104";
    pub const CYCLIC_IMPORT: &str = "A0105";

    // Types
    pub const TYPE_MISMATCH: &str = "A0200";
    pub const OPERATOR_TYPES: &str = "A0201";
    pub const CANNOT_INFER: &str = "A0202";
    pub const ARGUMENT_COUNT: &str = "A0203";
    pub const NO_SUCH_FIELD: &str = "A0204";
    pub const NO_SUCH_METHOD: &str = "A0205";
    pub const GENERIC_MISMATCH: &str = "A0206";
    pub const TRAIT_CONFORMANCE: &str = "A0207";

    // Mutability
    pub const IMMUTABLE_ASSIGN: &str = "A0300";
    pub const MUT_METHOD_ON_LET: &str = "A0301";

    // Pattern matching
    pub const NON_EXHAUSTIVE: &str = "A0400";
    pub const UNREACHABLE_PATTERN: &str = "A0401";
    pub const OVERLAPPING_RANGE: &str = "A0402";

    // Control flow
    pub const BREAK_OUTSIDE_LOOP: &str = "A0500";
    pub const BRANCH_TYPES_DIFFER: &str = "A0501";

    // Warnings
    pub const UNUSED_RESULT: &str = "W0001";
    pub const UNUSED_FUNCTION: &str = "W0002";
}

/// "Did you mean" support for undefined-name diagnostics.
pub mod fuzzy {
    use strsim::jaro_winkler;

    /// Candidates scoring above `threshold`, best first, at most
    /// `max_suggestions`.
    pub fn similar_names(
        target: &str,
        candidates: &[String],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|c| (c.clone(), jaro_winkler(target, c)))
            .filter(|(_, score)| *score > threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }

    /// Default tuning used by the checker for undefined names.
    pub fn did_you_mean(target: &str, candidates: &[String]) -> Option<String> {
        similar_names(target, candidates, 0.8, 1).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_code_location_and_carets() {
        let source = "let x = 5\nlet y = z + 2\ny";
        let diag = Diagnostic::error(
            codes::UNDEFINED,
            "Undefined: z".to_string(),
            Span::new("main.ard", 2, 9, 1),
        )
        .with_help("did you mean `x`?".to_string());

        let rendered = diag.render(source);
        assert!(rendered.contains("A0100"));
        assert!(rendered.contains("main.ard:2:9"));
        assert!(rendered.contains("^"));
        assert!(rendered.contains("did you mean"));
    }

    #[test]
    fn engine_counts_by_severity() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error(codes::SYNTAX, "bad".into(), Span::unknown());
        engine.emit_warning(codes::UNUSED_RESULT, "unused".into(), Span::unknown());
        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);
    }

    #[test]
    fn json_export_is_parseable() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error(
            codes::TYPE_MISMATCH,
            "expected `Int`, got \"Str\"".into(),
            Span::new("m.ard", 3, 1, 2),
        );
        let json = engine.to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed["diagnostics"][0]["line"], 3);
    }

    #[test]
    fn fuzzy_suggests_close_names() {
        let candidates = vec!["count".to_string(), "total".to_string()];
        assert_eq!(
            fuzzy::did_you_mean("cuont", &candidates),
            Some("count".to_string())
        );
        assert_eq!(fuzzy::did_you_mean("xyz", &candidates), None);
    }
}
