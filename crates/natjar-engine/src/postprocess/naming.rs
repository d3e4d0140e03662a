//! Synthetic member names
//!
//! Stub names are drawn from a small alphabet of look-alike characters that
//! are legal in JVM member names but hard to tell apart when reading a
//! decompiled class. The sequence for a method is seeded from its identity,
//! so the same input always yields the same names.

use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Glyphs used for generated names
const ALPHABET: [char; 8] = ['I', 'l', '\u{0131}', '\u{01C0}', '\u{0399}', '\u{04C0}', '\u{2113}', '\u{217C}'];

/// Characters per generated name, before any disambiguating suffix
const NAME_LENGTH: usize = 12;

/// Deterministic name source for synthesized members
#[derive(Debug, Default)]
pub struct NameGenerator {
    issued: usize,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A name for a stub of `owner.name descriptor` for which `taken`
    /// reports no collision. Candidates gain a numeric suffix until one is
    /// free.
    pub fn fresh(&mut self, owner: &str, name: &str, descriptor: &str, taken: impl Fn(&str) -> bool) -> String {
        let base = base_name(owner, name, descriptor);
        let mut candidate = base.clone();
        let mut counter = 0u32;
        while taken(&candidate) {
            counter += 1;
            candidate = format!("{}{}", base, counter);
        }
        self.issued += 1;
        candidate
    }

    /// Names handed out so far
    pub fn issued(&self) -> usize {
        self.issued
    }
}

fn base_name(owner: &str, name: &str, descriptor: &str) -> String {
    let mut hasher = FxHasher::default();
    hasher.write(owner.as_bytes());
    hasher.write_u8(0);
    hasher.write(name.as_bytes());
    hasher.write_u8(0);
    hasher.write(descriptor.as_bytes());
    let mut state = hasher.finish() | 1;

    (0..NAME_LENGTH)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ALPHABET[(state % ALPHABET.len() as u64) as usize]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let mut a = NameGenerator::new();
        let mut b = NameGenerator::new();
        let x = a.fresh("a/B", "run", "()V", |_| false);
        let y = b.fresh("a/B", "run", "()V", |_| false);
        assert_eq!(x, y);
        assert_eq!(x.chars().count(), NAME_LENGTH);
        assert!(x.chars().all(|c| ALPHABET.contains(&c)));
    }

    #[test]
    fn test_distinct_methods_differ() {
        let mut names = NameGenerator::new();
        let x = names.fresh("a/B", "run", "()V", |_| false);
        let y = names.fresh("a/B", "run", "(I)V", |_| false);
        assert_ne!(x, y);
        assert_eq!(names.issued(), 2);
    }

    #[test]
    fn test_collision_adds_suffix() {
        let mut names = NameGenerator::new();
        let base = names.fresh("a/B", "run", "()V", |_| false);
        let first = base.clone();
        let again = names.fresh("a/B", "run", "()V", |n| n == first);
        assert_eq!(again, format!("{}1", base));

        let second = again.clone();
        let third = names.fresh("a/B", "run", "()V", |n| n == first || n == second);
        assert_eq!(third, format!("{}2", base));
    }
}
