//! Checker errors and failure derivations.
//!
//! Subtraction failures carry a [`Derivation`]: a tree recording, for each
//! rule the subtraction algorithm committed to, the sub-derivations of its
//! premises, down to the leaf mismatch that made the whole attempt fail.
//! The driver renders derivations only under `--explain`; the default
//! diagnostic is the one-line summary from [`TypeError`]'s `Display`.
//!
//! Types inside errors are stored pre-rendered: rendering needs the
//! environment and interner, which are not available at `Display` time.

use mezzo_base::Span;
use std::fmt;

/// Why a subtraction attempt failed, as a tree of attempted rules.
#[derive(Debug, Clone)]
pub struct Derivation {
    /// Name of the rule that was attempted.
    pub rule: &'static str,
    /// Rendered description of the goal or mismatch.
    pub detail: String,
    /// Failed premises, in attempt order.
    pub premises: Vec<Derivation>,
}

impl Derivation {
    pub fn leaf(rule: &'static str, detail: impl Into<String>) -> Self {
        Derivation {
            rule,
            detail: detail.into(),
            premises: Vec::new(),
        }
    }

    pub fn node(
        rule: &'static str,
        detail: impl Into<String>,
        premises: Vec<Derivation>,
    ) -> Self {
        Derivation {
            rule,
            detail: detail.into(),
            premises,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}: {}", "", self.rule, self.detail, indent = depth * 2)?;
        for premise in &self.premises {
            premise.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// Errors raised by the expression checker.
///
/// Every variant knows its source span and the rule name used in the
/// driver's one-line diagnostic.
#[derive(Debug, Clone)]
pub enum TypeError {
    /// Subtraction could not extract the wanted permission.
    ExpectedPermission {
        var: String,
        expected: String,
        span: Span,
        derivation: Derivation,
    },
    /// Application of a variable with no arrow permission.
    NotAFunction { var: String, span: Span },
    /// Type application would instantiate a binder marked non-instantiable.
    CannotInstantiate { var: String, span: Span },
    /// Field access or assignment on a variable with no matching block.
    NoSuchField { var: String, field: String, span: Span },
    /// Assignment through a type that is not mutable.
    AssignToImmutable { ty: String, span: Span },
    /// Tag update between branches of different field counts.
    TagChangeArity {
        from: String,
        to: String,
        span: Span,
    },
    /// `give`/`take` on an adopter with no adopts clause.
    NoAdoptsClause { ty: String, span: Span },
    /// The adopts clause names a type that is not exclusive.
    NonExclusiveAdoptee { ty: String, span: Span },
    /// A constructor pattern omits a declared field.
    MissingFieldInPattern {
        datacon: String,
        field: String,
        span: Span,
    },
    /// An annotation contradicts an inherited one.
    ConflictingAnnotations {
        first: String,
        second: String,
        span: Span,
    },
    /// `if` scrutinee is not a two-constructor data type.
    NotTwoBranches { ty: String, span: Span },
    /// `match`/`if` ran out of live branches without any typing.
    NoLiveBranch { span: Span },
}

impl TypeError {
    /// The rule name printed in the one-line diagnostic.
    pub fn rule(&self) -> &'static str {
        match self {
            TypeError::ExpectedPermission { .. } => "expected-permission",
            TypeError::NotAFunction { .. } => "not-a-function",
            TypeError::CannotInstantiate { .. } => "cannot-instantiate",
            TypeError::NoSuchField { .. } => "no-such-field",
            TypeError::AssignToImmutable { .. } => "assign-to-immutable",
            TypeError::TagChangeArity { .. } => "tag-change-arity",
            TypeError::NoAdoptsClause { .. } => "no-adopts-clause",
            TypeError::NonExclusiveAdoptee { .. } => "non-exclusive-adoptee",
            TypeError::MissingFieldInPattern { .. } => "missing-field-in-pattern",
            TypeError::ConflictingAnnotations { .. } => "conflicting-annotations",
            TypeError::NotTwoBranches { .. } => "not-two-branches",
            TypeError::NoLiveBranch { .. } => "no-live-branch",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypeError::ExpectedPermission { span, .. }
            | TypeError::NotAFunction { span, .. }
            | TypeError::CannotInstantiate { span, .. }
            | TypeError::NoSuchField { span, .. }
            | TypeError::AssignToImmutable { span, .. }
            | TypeError::TagChangeArity { span, .. }
            | TypeError::NoAdoptsClause { span, .. }
            | TypeError::NonExclusiveAdoptee { span, .. }
            | TypeError::MissingFieldInPattern { span, .. }
            | TypeError::ConflictingAnnotations { span, .. }
            | TypeError::NotTwoBranches { span, .. }
            | TypeError::NoLiveBranch { span, .. } => *span,
        }
    }

    /// The failure derivation, when the error came out of subtraction.
    pub fn derivation(&self) -> Option<&Derivation> {
        match self {
            TypeError::ExpectedPermission { derivation, .. } => Some(derivation),
            _ => None,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::ExpectedPermission { var, expected, .. } => {
                write!(f, "{} does not have permission {}", var, expected)
            }
            TypeError::NotAFunction { var, .. } => {
                write!(f, "{} has no arrow permission", var)
            }
            TypeError::CannotInstantiate { var, .. } => {
                write!(f, "the type variable {} may not be instantiated here", var)
            }
            TypeError::NoSuchField { var, field, .. } => {
                write!(f, "{} has no block with a field {}", var, field)
            }
            TypeError::AssignToImmutable { ty, .. } => {
                write!(f, "cannot assign through {}, which is not mutable", ty)
            }
            TypeError::TagChangeArity { from, to, .. } => {
                write!(
                    f,
                    "cannot change tag from {} to {}: field counts differ",
                    from, to
                )
            }
            TypeError::NoAdoptsClause { ty, .. } => {
                write!(f, "{} has no adopts clause", ty)
            }
            TypeError::NonExclusiveAdoptee { ty, .. } => {
                write!(f, "adopts clause {} is not exclusive", ty)
            }
            TypeError::MissingFieldInPattern { datacon, field, .. } => {
                write!(f, "pattern for {} is missing field {}", datacon, field)
            }
            TypeError::ConflictingAnnotations { first, second, .. } => {
                write!(f, "conflicting type annotations: {} vs {}", first, second)
            }
            TypeError::NotTwoBranches { ty, .. } => {
                write!(f, "if requires a two-constructor data type, got {}", ty)
            }
            TypeError::NoLiveBranch { .. } => {
                write!(f, "no branch of this match can be taken")
            }
        }
    }
}

impl std::error::Error for TypeError {}

/// Result type for checker operations.
pub type TypeResult<T> = Result<T, TypeError>;
