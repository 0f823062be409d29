use glob::{MatchOptions, Pattern};

use crate::error::ExecutorError;

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Include/exclude decision on package names.
#[derive(Debug, Clone, Default)]
pub enum PackageFilter {
    #[default]
    All,
    Include(Vec<Pattern>),
    Exclude(Vec<Pattern>),
}

impl PackageFilter {
    /// A non-empty `include` list wins over `exclude`.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ExecutorError> {
        if !include.is_empty() {
            Ok(Self::Include(compile(include)?))
        } else if !exclude.is_empty() {
            Ok(Self::Exclude(compile(exclude)?))
        } else {
            Ok(Self::All)
        }
    }

    pub fn admits(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Include(p) => p.iter().any(|p| p.matches_with(name, MATCH)),
            Self::Exclude(p) => !p.iter().any(|p| p.matches_with(name, MATCH)),
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ExecutorError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ExecutorError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn include_keeps_only_matches() {
        let f = PackageFilter::new(&strings(&["web-app-*"]), &[]).unwrap();
        assert!(f.admits("web-app-x"));
        assert!(!f.admits("web-lib-y"));
        assert!(!f.admits("Web-App-x"));
    }

    #[test]
    fn exclude_drops_matches_and_star_crosses_scopes() {
        let f = PackageFilter::new(&[], &strings(&["@internal/*", "legacy"])).unwrap();
        assert!(!f.admits("@internal/tools"));
        assert!(!f.admits("legacy"));
        assert!(f.admits("legacy-ui"));
    }

    #[test]
    fn include_takes_precedence() {
        let f = PackageFilter::new(&strings(&["a*"]), &strings(&["a1"])).unwrap();
        assert!(f.admits("a1"));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = PackageFilter::new(&strings(&["[oops"]), &[]).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPattern { .. }));
    }
}
