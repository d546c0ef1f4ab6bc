//! Ariadne-based rendering of type errors and warnings.
//!
//! Each diagnostic carries a stable code, the error message, a label at the
//! primary span, a secondary label at the origin of a mismatch when there
//! is one, and a help line when a plausible fix exists.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use tolk_ast::Ty;
use tolk_common::Span;

use crate::error::{ConstraintOrigin, TypeError, TypeWarning};

/// Rendering knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticOptions {
    pub color: bool,
}

impl DiagnosticOptions {
    /// Plain text output, stable enough for snapshots.
    pub fn colorless() -> Self {
        DiagnosticOptions { color: false }
    }
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        DiagnosticOptions { color: true }
    }
}

// ── Error Codes ────────────────────────────────────────────────────────

/// A unique code per error kind. Codes are never reused.
pub fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::Mismatch { .. } => "E0001",
        TypeError::ArityMismatch { .. } => "E0002",
        TypeError::GenericArgsCount { .. } => "E0003",
        TypeError::PatternArity { .. } => "E0004",
        TypeError::UnknownType { .. } => "E0005",
        TypeError::InvalidTypeWidth { .. } => "E0006",
        TypeError::NotACondition { .. } => "E0007",
        TypeError::IncompatibleBranches { .. } => "E0008",
        TypeError::UntypedTupleIndex { .. } => "E0009",
        TypeError::IndexOutOfBounds { .. } => "E0010",
        TypeError::NoSuchField { .. } => "E0011",
        TypeError::NoSuchMethod { .. } => "E0012",
        TypeError::NotAFunction { .. } => "E0013",
        TypeError::CannotDeduce { .. } => "E0014",
        TypeError::GenericFunctionAsValue { .. } => "E0015",
        TypeError::CircularInference { .. } => "E0016",
        TypeError::CircularConstant { .. } => "E0017",
        TypeError::GenericWidth { .. } => "E0018",
        TypeError::UsedBeforeAssignment { .. } => "E0019",
        TypeError::AlwaysNull { .. } => "E0020",
        TypeError::MissingTypeAnnotation { .. } => "E0021",
        TypeError::OperatorMismatch { .. } | TypeError::UnaryOperator { .. } => "E0022",
        TypeError::InvalidCast { .. } => "E0023",
        TypeError::MissingMutate { .. } | TypeError::UnexpectedMutate { .. } => "E0024",
        TypeError::MissingReturn { .. } => "E0025",
        TypeError::MatchArmNotVariant { .. } => "E0026",
        TypeError::NonExhaustiveMatch { .. } | TypeError::MatchWithoutElse { .. } => "E0027",
        TypeError::MissingField { .. } | TypeError::UnknownField { .. } => "E0028",
        TypeError::UntypedStructLiteral { .. } => "E0029",
        TypeError::ExpectTypeFailed { .. } => "E0030",
        TypeError::InstantiationTooDeep { .. } => "E0031",
    }
}

pub fn warning_code(warning: &TypeWarning) -> &'static str {
    match warning {
        TypeWarning::UnreachableCode { .. } => "W0001",
        TypeWarning::InferredUnion { .. } => "W0002",
    }
}

// ── Help Text ──────────────────────────────────────────────────────────

fn mismatch_help(expected: &Ty, found: &Ty) -> Option<String> {
    if found.can_hold_null() && expected.can_rhs_be_assigned(&found.without_null()) {
        return Some("the value may be null; check it with `!= null` or assert it with `!`".to_string());
    }
    if expected.is_integer() && found.is_bool() {
        return Some("convert with `as int`".to_string());
    }
    None
}

fn help(err: &TypeError) -> Option<String> {
    match err {
        TypeError::Mismatch { expected, found, .. } => mismatch_help(expected, found),
        TypeError::NoSuchMethod { suggestion, .. } => suggestion.clone(),
        TypeError::UntypedTupleIndex { .. } => {
            Some("add a type annotation or an `as` cast to the element".to_string())
        }
        TypeError::IncompatibleBranches { first, second, .. } => {
            Some(format!("annotate the expected type, for example `{} | {}`", first, second))
        }
        TypeError::CannotDeduce { param, .. } => {
            Some(format!("pass `{}` explicitly in angle brackets", param))
        }
        TypeError::GenericFunctionAsValue { name, .. } => {
            Some(format!("instantiate it explicitly, like `{}<int>`", name))
        }
        TypeError::AlwaysNull { .. } => Some("declare the variable with a nullable type".to_string()),
        TypeError::MissingTypeAnnotation { .. } => Some("write `var x: <type>`".to_string()),
        TypeError::MissingMutate { .. } => Some("write `mutate` before the argument".to_string()),
        TypeError::NonExhaustiveMatch { missing, .. } => {
            Some(format!("add an arm for `{}` or an `else` arm", missing))
        }
        _ => None,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

fn clamp(span: Span, source_len: usize) -> Range<usize> {
    span.to_range(source_len)
}

fn origin_label(origin: &ConstraintOrigin, expected: &Ty) -> String {
    match origin {
        ConstraintOrigin::Assignment { .. } => format!("declared as `{}`", expected),
        ConstraintOrigin::VarDecl { .. } => format!("declared as `{}`", expected),
        other => format!("`{}` required by the {}", expected, other),
    }
}

fn write_report(report: Report<'_, Range<usize>>, source: &str) -> String {
    let mut buf = Vec::new();
    report.write(Source::from(source), &mut buf).expect("failed to write diagnostic");
    String::from_utf8(buf).expect("diagnostic output should be valid UTF-8")
}

/// Render a type error into a formatted diagnostic string.
pub fn render_diagnostic(error: &TypeError, source: &str, options: &DiagnosticOptions) -> String {
    let config = Config::default().with_color(options.color);
    let source_len = source.len();
    let span = clamp(error.span(), source_len);
    let msg = error.to_string();

    let mut builder = Report::build(ReportKind::Error, span.clone())
        .with_code(error_code(error))
        .with_message(&msg)
        .with_config(config);

    match error {
        TypeError::Mismatch { expected, found, origin, .. } => {
            builder.add_label(
                Label::new(span.clone())
                    .with_message(format!("this is `{}`", found))
                    .with_color(Color::Red),
            );
            if let Some(origin_span) = origin.span().filter(|s| *s != error.span()) {
                builder.add_label(
                    Label::new(clamp(origin_span, source_len))
                        .with_message(origin_label(origin, expected))
                        .with_color(Color::Blue),
                );
            }
        }
        _ => {
            builder.add_label(Label::new(span.clone()).with_message(&msg).with_color(Color::Red));
        }
    }

    if let Some(text) = help(error) {
        builder.set_help(text);
    }

    write_report(builder.finish(), source)
}

/// Render a warning into a formatted diagnostic string.
pub fn render_warning(warning: &TypeWarning, source: &str, options: &DiagnosticOptions) -> String {
    let config = Config::default().with_color(options.color);
    let span = clamp(warning.span(), source.len());
    let msg = warning.to_string();

    let label = match warning {
        TypeWarning::UnreachableCode { .. } => "this statement never executes".to_string(),
        TypeWarning::InferredUnion { ty, .. } => format!("returns `{}`", ty),
    };

    let mut builder = Report::build(ReportKind::Warning, span.clone())
        .with_code(warning_code(warning))
        .with_message(&msg)
        .with_config(config)
        .with_label(Label::new(span).with_message(label).with_color(Color::Yellow));

    if let TypeWarning::InferredUnion { .. } = warning {
        builder.set_help("declare the return type if the union is intended");
    }

    write_report(builder.finish(), source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_kind() {
        let a = TypeError::UsedBeforeAssignment { name: "x".into(), span: Span::new(0, 1) };
        let b = TypeError::AlwaysNull { name: "x".into(), span: Span::new(0, 1) };
        assert_ne!(error_code(&a), error_code(&b));
    }

    #[test]
    fn empty_span_is_widened() {
        assert_eq!(clamp(Span::new(3, 3), 10), 3..4);
        assert_eq!(clamp(Span::new(20, 25), 10), 10..10);
    }
}
