//! Emoji assignment: sampling without replacement from a refilling pool.

use rand::Rng;

use crate::error::OverlayError;

/// Hands out palette symbols so none repeats until the whole palette has been used.
///
/// When the pool runs dry it is refilled with the full palette. The symbol drawn last
/// is never drawn again immediately, including across a refill, unless the palette
/// only holds one symbol.
#[derive(Debug, Clone)]
pub struct EmojiAssigner {
    palette: Vec<String>,
    pool: Vec<String>,
    last: Option<String>,
}

impl EmojiAssigner {
    /// Create an assigner. Blank and duplicate entries are dropped.
    pub fn new<I, S>(palette: I) -> Result<Self, OverlayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut symbols: Vec<String> = Vec::new();
        for symbol in palette {
            let symbol = symbol.into();
            if !symbol.trim().is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if symbols.is_empty() {
            return Err(OverlayError::EmptyPalette);
        }
        Ok(Self {
            pool: symbols.clone(),
            palette: symbols,
            last: None,
        })
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// Symbols still available before the next refill.
    pub fn remaining(&self) -> &[String] {
        &self.pool
    }

    /// Draw the next symbol.
    pub fn next_symbol<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        if self.pool.is_empty() {
            self.pool.extend(self.palette.iter().cloned());
        }

        let candidates: Vec<usize> = (0..self.pool.len())
            .filter(|&i| self.last.as_ref() != Some(&self.pool[i]))
            .collect();
        let index = if candidates.is_empty() {
            rng.gen_range(0..self.pool.len())
        } else {
            candidates[rng.gen_range(0..candidates.len())]
        };

        let symbol = self.pool.remove(index);
        self.last = Some(symbol.clone());
        symbol
    }

    /// Start over with a full pool.
    pub fn reset(&mut self) {
        self.pool.clone_from(&self.palette);
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use std::collections::HashSet;

    fn palette(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(matches!(
            EmojiAssigner::new(Vec::<String>::new()),
            Err(OverlayError::EmptyPalette)
        ));
        assert!(EmojiAssigner::new(["", "  "]).is_err());
    }

    #[test]
    fn uses_every_symbol_before_repeating() {
        let symbols = palette(&["a", "b", "c", "d"]);
        let mut assigner = EmojiAssigner::new(symbols.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..5 {
            let round: HashSet<String> = (0..4).map(|_| assigner.next_symbol(&mut rng)).collect();
            assert_eq!(round.len(), 4);
            assert!(assigner.remaining().is_empty());
        }
    }

    #[test]
    fn adjacent_draws_differ_across_refills() {
        let mut assigner = EmojiAssigner::new(["x", "y"]).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let draws: Vec<String> = (0..50).map(|_| assigner.next_symbol(&mut rng)).collect();
        assert!(draws.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn single_symbol_palette_repeats() {
        let mut assigner = EmojiAssigner::new(["🙂"]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(assigner.next_symbol(&mut rng), "🙂");
        assert_eq!(assigner.next_symbol(&mut rng), "🙂");
    }

    #[test]
    fn duplicates_are_collapsed() {
        let assigner = EmojiAssigner::new(["a", "b", "a"]).unwrap();
        assert_eq!(assigner.palette(), &palette(&["a", "b"])[..]);
    }

    #[test]
    fn same_seed_same_sequence() {
        let symbols = palette(&["1", "2", "3", "4", "5"]);
        let run = |seed| {
            let mut assigner = EmojiAssigner::new(symbols.clone()).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            (0..12)
                .map(|_| assigner.next_symbol(&mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn reset_refills_pool() {
        let mut assigner = EmojiAssigner::new(["a", "b", "c"]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assigner.next_symbol(&mut rng);
        assert_eq!(assigner.remaining().len(), 2);
        assigner.reset();
        assert_eq!(assigner.remaining().len(), 3);
    }
}
