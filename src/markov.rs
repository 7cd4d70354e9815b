//! Finite Markov chain over a fixed set of integer lengths, used to drive variable
//! datagram/burst sizes instead of a constant `bufLen`.
//!
//! Wire description format: `<len1|p11,p12,...,p1n<len2|p21,...<lenN|pN1,...,pNn>`.
//! Each of the `N` rows gives the transition probabilities from `lenI` to every
//! `lenJ` (including itself); rows must each sum to `1.0` within `1e-5`.

use crate::error::CoreError;
use rand::Rng;

const PROB_TOLERANCE: f64 = 1e-5;

/// A row-stochastic Markov chain over a small set of lengths.
#[derive(Debug, Clone)]
pub struct MarkovLengthGenerator {
    lengths: Vec<u32>,
    /// `cumulative[row][col]` is the running sum of `row`'s probabilities up to and
    /// including `col`; the last entry of every row is `1.0` (within tolerance).
    cumulative: Vec<Vec<f64>>,
    current_row: usize,
    unknown_observed: u64,
}

impl MarkovLengthGenerator {
    /// Parses a `<len|p,p,...` description. Rejects malformed input: unequal row
    /// widths, unparseable numbers, or any row whose probabilities don't sum to `1.0`
    /// within [`PROB_TOLERANCE`].
    pub fn parse(desc: &str) -> Result<Self, CoreError> {
        let rows: Vec<&str> = desc
            .split('<')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if rows.is_empty() {
            return Err(CoreError::MalformedMarkov("no rows found".into()));
        }

        let mut lengths = Vec::with_capacity(rows.len());
        let mut raw_probs: Vec<Vec<f64>> = Vec::with_capacity(rows.len());

        for row in &rows {
            let (len_str, probs_str) = row
                .split_once('|')
                .ok_or_else(|| CoreError::MalformedMarkov(format!("row missing '|': {row}")))?;
            let len: u32 = len_str
                .trim()
                .parse()
                .map_err(|_| CoreError::MalformedMarkov(format!("bad length: {len_str}")))?;
            let probs: Vec<f64> = probs_str
                .split(',')
                .map(|p| {
                    p.trim()
                        .parse::<f64>()
                        .map_err(|_| CoreError::MalformedMarkov(format!("bad probability: {p}")))
                })
                .collect::<Result<_, _>>()?;
            lengths.push(len);
            raw_probs.push(probs);
        }

        let n = lengths.len();
        let mut cumulative = Vec::with_capacity(n);
        for (i, probs) in raw_probs.iter().enumerate() {
            if probs.len() != n {
                return Err(CoreError::MalformedMarkov(format!(
                    "row {i} has {} columns, expected {n}",
                    probs.len()
                )));
            }
            let mut running = 0.0;
            let mut cum_row = Vec::with_capacity(n);
            for &p in probs {
                running += p;
                cum_row.push(running);
            }
            if (running - 1.0).abs() > PROB_TOLERANCE {
                return Err(CoreError::MalformedMarkov(format!(
                    "row {i} sums to {running}, expected 1.0 (+/- {PROB_TOLERANCE})"
                )));
            }
            // Clamp the final entry exactly to 1.0 so a draw of u -> 1.0-eps always
            // resolves to a column even after floating-point summation drift.
            *cum_row.last_mut().unwrap() = 1.0;
            cumulative.push(cum_row);
        }

        Ok(Self {
            lengths,
            cumulative,
            current_row: 0,
            unknown_observed: 0,
        })
    }

    /// Draws a uniform `u in [0,1)`, locates the first column whose cumulative
    /// probability is `>= u`, skips forward past any zero-probability columns, moves
    /// the chain into that column's row, and returns the new length.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u32 {
        let u: f64 = rng.gen_range(0.0..1.0);
        let row = &self.cumulative[self.current_row];

        let mut idx = row.iter().position(|&c| c >= u).unwrap_or(row.len() - 1);
        while idx + 1 < row.len() && (row[idx] - row.get(idx.wrapping_sub(1)).copied().unwrap_or(0.0)) <= 0.0 {
            idx += 1;
        }

        self.current_row = idx;
        self.lengths[idx]
    }

    /// Server-side mirror of [`Self::next`]: classifies an *observed* length into the
    /// chain's state space, advancing `current_row` to match. Returns `None` (and
    /// counts an "unknown") when the observed length isn't one of the chain's states.
    pub fn count_edge_transition(&mut self, observed_len: u32) -> Option<usize> {
        match self.lengths.iter().position(|&l| l == observed_len) {
            Some(idx) => {
                self.current_row = idx;
                Some(idx)
            }
            None => {
                self.unknown_observed += 1;
                None
            }
        }
    }

    pub fn unknown_observed(&self) -> u64 {
        self.unknown_observed
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn parses_two_state_chain() {
        let gen = MarkovLengthGenerator::parse("<100|0.5,0.5<200|0.3,0.7").unwrap();
        assert_eq!(gen.lengths(), &[100, 200]);
    }

    #[test]
    fn rejects_row_not_summing_to_one() {
        let err = MarkovLengthGenerator::parse("<100|0.5,0.4<200|0.3,0.7");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = MarkovLengthGenerator::parse("<100|1.0<200|0.5,0.5");
        assert!(err.is_err());
    }

    #[test]
    fn next_is_deterministic_for_a_fixed_rng() {
        let mut gen = MarkovLengthGenerator::parse("<64|1.0").unwrap();
        // StepRng always yields the same u64, so gen_range(0.0..1.0) is deterministic.
        let mut rng = StepRng::new(0, 1);
        for _ in 0..5 {
            assert_eq!(gen.next(&mut rng), 64);
        }
    }

    #[test]
    fn count_edge_transition_flags_unknown_lengths() {
        let mut gen = MarkovLengthGenerator::parse("<100|1.0<200|1.0").unwrap();
        assert_eq!(gen.count_edge_transition(200), Some(1));
        assert_eq!(gen.count_edge_transition(9999), None);
        assert_eq!(gen.unknown_observed(), 1);
    }
}
