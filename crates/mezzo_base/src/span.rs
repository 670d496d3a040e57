//! Source locations.
//!
//! A [`Span`] is a half-open byte range into the source text. Checking
//! introduces many nodes with no source position at all — desugared
//! sequences, auto-bound function arguments, variables invented by
//! unfolding — and those carry the dummy span. The dummy is an identity
//! for [`Span::merge`]: a compound node built from one real child and
//! one synthesized child reports the real location, never a range
//! stretched back to offset zero.

/// A byte range in a source file, or the dummy location of a
/// synthesized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First byte (inclusive).
    pub start: usize,
    /// Past the last byte (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The location of a node that was synthesized rather than parsed.
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// `true` for synthesized nodes; diagnostics fall back to an
    /// enclosing span instead of printing this one.
    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// Smallest span covering both, with the dummy span as identity.
    pub fn merge(self, other: Span) -> Span {
        if self.is_dummy() {
            other
        } else if other.is_dummy() {
            self
        } else {
            Span {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            }
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dummy() {
            write!(f, "?")
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both_ranges() {
        let a = Span::new(3, 8);
        let b = Span::new(6, 14);
        assert_eq!(a.merge(b), Span::new(3, 14));
        assert_eq!(b.merge(a), Span::new(3, 14));
    }

    #[test]
    fn dummy_is_a_merge_identity() {
        let real = Span::new(7, 12);
        assert_eq!(Span::dummy().merge(real), real);
        assert_eq!(real.merge(Span::dummy()), real);
        assert!(Span::dummy().merge(Span::dummy()).is_dummy());
    }

    #[test]
    fn display_marks_synthesized_locations() {
        assert_eq!(Span::new(5, 9).to_string(), "5..9");
        assert_eq!(Span::dummy().to_string(), "?");
    }
}
