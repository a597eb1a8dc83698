//! Name predicates for region selection.

use regex::{Regex, RegexBuilder};

/// Selects regions by name: exact equality or a single-line-mode regex, with
/// optional inversion of the result.
#[derive(Debug, Clone)]
pub struct NamePredicate {
    matcher: Matcher,
    invert: bool,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl NamePredicate {
    /// Build a predicate from a literal or a pattern.
    ///
    /// With `use_regex`, the pattern is compiled in single-line mode (`.`
    /// matches any character including newline — sheet names can contain
    /// them) and tested against the full name. Otherwise the predicate is
    /// exact-name equality. `invert` negates the outcome either way.
    pub fn new(pattern_or_literal: &str, use_regex: bool, invert: bool) -> Result<Self, regex::Error> {
        let matcher = if use_regex {
            Matcher::Pattern(
                RegexBuilder::new(pattern_or_literal)
                    .dot_matches_new_line(true)
                    .build()?,
            )
        } else {
            Matcher::Exact(pattern_or_literal.to_string())
        };
        Ok(Self { matcher, invert })
    }

    /// Exact-name equality, no inversion.
    pub fn exact(name: &str) -> Self {
        Self {
            matcher: Matcher::Exact(name.to_string()),
            invert: false,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let hit = match &self.matcher {
            Matcher::Exact(literal) => name == literal,
            Matcher::Pattern(re) => re.is_match(name),
        };
        hit != self.invert
    }
}
