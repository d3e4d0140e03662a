//! Exclusion patterns
//!
//! Glob syntax over internal names: `*` matches within one path segment,
//! `**` matches across segments, and `.` is accepted as a package separator
//! (it stands for `/`). Everything else matches literally.

use regex::Regex;

use crate::config::{ConfigError, MethodPattern};

/// Compile one glob into an anchored regular expression
pub fn compile_glob(glob: &str) -> Result<Regex, ConfigError> {
    let mut source = String::with_capacity(glob.len() * 2 + 2);
    source.push('^');

    let mut chars = glob.chars().peekable();
    let mut literal = String::new();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    source.push_str(".*");
                } else {
                    source.push_str("[^/]*");
                }
            }
            '.' => literal.push('/'),
            _ => literal.push(c),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');

    Regex::new(&source).map_err(|source| ConfigError::InvalidPattern {
        pattern: glob.to_string(),
        source,
    })
}

/// A compiled owner/name/descriptor pattern triple
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    owner: Regex,
    name: Regex,
    desc: Regex,
}

impl ExclusionPattern {
    pub fn compile(pattern: &MethodPattern) -> Result<Self, ConfigError> {
        Ok(ExclusionPattern {
            owner: compile_glob(&pattern.owner)?,
            name: compile_glob(&pattern.name)?,
            desc: compile_glob(&pattern.desc)?,
        })
    }

    /// All three parts must match
    pub fn matches(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.owner.is_match(owner) && self.name.is_match(name) && self.desc.is_match(descriptor)
    }
}

/// A method is excluded when any pattern matches it
pub fn is_excluded(patterns: &[ExclusionPattern], owner: &str, name: &str, descriptor: &str) -> bool {
    patterns.iter().any(|p| p.matches(owner, name, descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_star_stays_in_segment() {
        let re = compile_glob("a.b.*").unwrap();
        assert!(re.is_match("a/b/C"));
        assert!(!re.is_match("a/b/c/D"));
        assert!(!re.is_match("xa/b/C"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let re = compile_glob("a.**").unwrap();
        assert!(re.is_match("a/b/C"));
        assert!(re.is_match("a/b/c/D"));
        assert!(!re.is_match("b/a/C"));
    }

    #[test]
    fn test_suffix_pattern_is_anchored() {
        let re = compile_glob("*Impl").unwrap();
        assert!(re.is_match("doImpl"));
        assert!(!re.is_match("doImplX"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let re = compile_glob("(I)V").unwrap();
        assert!(re.is_match("(I)V"));
        assert!(!re.is_match("I"));

        let re = compile_glob("$Lambda+").unwrap();
        assert!(re.is_match("$Lambda+"));
        assert!(!re.is_match("$Lambdaaa"));
    }

    #[test]
    fn test_every_pattern_is_consulted() {
        let patterns = vec![
            ExclusionPattern::compile(&MethodPattern::new("x.Y", "**", "**")).unwrap(),
            ExclusionPattern::compile(&MethodPattern::new("a.**", "secret*", "()V")).unwrap(),
        ];
        assert!(is_excluded(&patterns, "x/Y", "anything", "(J)J"));
        assert!(is_excluded(&patterns, "a/b/C", "secretKey", "()V"));
        assert!(!is_excluded(&patterns, "a/b/C", "secretKey", "()I"));
        assert!(!is_excluded(&patterns, "q/R", "run", "()V"));
    }
}
