//! The per-compile diagnostic log.
//!
//! Diagnostics are data, not control flow: every stage appends to the same
//! `Diagnostics` sink and keeps going where it can, so one compile surfaces
//! as many problems as possible. Whether the compile failed is decided at
//! the end from `has_errors()`.

use crate::SourceLocation;
use std::fmt;

/// Identifies one reportable problem. The numeric range selects the
/// severity: ids below `WARNING_BASE` are errors, the rest are warnings.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
#[repr(u16)]
pub enum DiagnosticId {
    // Preprocessor
    InvalidDirective = 100,
    UnknownDirective = 101,
    MacroRedefined = 102,
    MacroNameReserved = 103,
    MacroArgumentMismatch = 104,
    ConditionalUnterminated = 105,
    ConditionalElseWithoutIf = 106,
    ConditionalEndWithoutIf = 107,
    InvalidConditionExpression = 108,
    DivisionByZeroInCondition = 109,
    InvalidVersionDirective = 110,
    VersionNotFirstStatement = 111,
    InvalidExtensionDirective = 112,
    InvalidPragmaDirective = 113,
    InvalidLineDirective = 114,
    ErrorDirective = 115,
    UnterminatedComment = 116,

    // Lexer / parser
    InvalidCharacter = 200,
    ReservedKeyword = 201,
    LiteralOutOfRange = 202,
    SyntaxError = 203,
    UnexpectedEndOfFile = 204,

    // Typer
    UndeclaredIdentifier = 300,
    Redefinition = 301,
    RedeclaringBuiltIn = 302,
    ReservedIdentifier = 303,
    UnknownType = 304,
    NoMatchingOverload = 305,
    InvalidSwizzle = 306,
    TypeMismatch = 307,
    ArraySizeMustBeConstant = 308,
    ArraySizeMustBePositive = 309,
    ArraysOfArraysNotSupported = 310,
    UnsizedArrayNotAllowed = 311,
    MixedArrayDeclarators = 312,
    IndexingNonArray = 313,
    ConstructorWrongArguments = 314,
    LValueRequired = 315,
    ReturnTypeMismatch = 316,
    ConditionNotBoolean = 317,
    MainWrongSignature = 318,
    DivisionByZero = 319,
    PrecisionNotSpecified = 320,

    // Validator
    InvalidQualifierCombination = 400,
    QualifierNotAllowed = 401,
    OpaqueTypeAssignment = 402,
    OpaqueTypeInStruct = 403,
    LayoutQualifierNotAllowed = 404,
    WriteToReadOnlyBuiltin = 405,
    ConstRequiresInitializer = 406,
    GlobalInitializerNotConst = 407,
    InvalidCaseLabel = 408,
    InvalidStructField = 409,
    MainMissing = 410,

    // Warnings
    UndefinedShift = 500,
    UnknownExtension = 501,
    UnknownPragma = 502,
}

const WARNING_BASE: u16 = 500;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Severity {
    Error,
    Warning,
}

impl DiagnosticId {
    pub fn severity(self) -> Severity {
        if (self as u16) >= WARNING_BASE {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

/// One reported problem, kept in memory until the info log is rendered.
#[derive(PartialEq, Debug, Clone)]
pub struct Diagnostic {
    pub id: DiagnosticId,
    pub location: SourceLocation,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self.id.severity() {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        write!(f, "{}: {}: {}", tag, self.location, self.text)
    }
}

/// The accumulating log for one compile.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn report(&mut self, id: DiagnosticId, location: SourceLocation, text: impl Into<String>) {
        match id.severity() {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
        }
        self.entries.push(Diagnostic {
            id,
            location,
            text: text.into(),
        });
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

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn contains(&self, id: DiagnosticId) -> bool {
        self.entries.iter().any(|d| d.id == id)
    }

    /// Renders the free-text info log returned from `compile()`.
    pub fn info_log(&self) -> String {
        let mut log = String::new();
        for entry in &self.entries {
            log.push_str(&entry.to_string());
            log.push('\n');
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ranges() {
        assert_eq!(DiagnosticId::MacroRedefined.severity(), Severity::Error);
        assert_eq!(DiagnosticId::SyntaxError.severity(), Severity::Error);
        assert_eq!(DiagnosticId::UndefinedShift.severity(), Severity::Warning);
        assert_eq!(DiagnosticId::UnknownPragma.severity(), Severity::Warning);
    }

    #[test]
    fn log_accumulates() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.report(
            DiagnosticId::UndefinedShift,
            SourceLocation::new(0, 4),
            "'<<' : shift amount is undefined",
        );
        assert!(!diags.has_errors());
        assert_eq!(diags.warning_count(), 1);
        diags.report(
            DiagnosticId::SyntaxError,
            SourceLocation::new(0, 5),
            "'}' : unexpected token",
        );
        assert!(diags.has_errors());
        let log = diags.info_log();
        assert!(log.contains("WARNING: 0:4: '<<' : shift amount is undefined"));
        assert!(log.contains("ERROR: 0:5: '}' : unexpected token"));
    }
}
