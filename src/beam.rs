//! Beam search over token log-probabilities.
//!
//! The search is model-agnostic: the caller runs the decoder on every live
//! beam, hands back one log-softmax row per beam and calls [`BeamSearch::step`]
//! until [`BeamSearch::is_done`]. Finished hypotheses are ranked by their
//! summed log-probability divided by their length.

use std::cmp::Ordering;

/// A partial caption kept alive by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub tokens: Vec<u32>,
    /// Sum of the log-probabilities of every generated token.
    pub score: f32,
}

impl Hypothesis {
    fn normalized_score(&self) -> f32 {
        self.score / self.tokens.len() as f32
    }
}

#[derive(Debug)]
pub struct BeamSearch {
    num_beams: usize,
    eos_token_id: u32,
    early_stopping: bool,
    beams: Vec<Hypothesis>,
    /// Best finished hypotheses, highest normalized score first.
    finished: Vec<Hypothesis>,
    done: bool,
}

impl BeamSearch {
    pub fn new(prefix: Vec<u32>, num_beams: usize, eos_token_id: u32, early_stopping: bool) -> Self {
        Self {
            num_beams: num_beams.max(1),
            eos_token_id,
            early_stopping,
            beams: vec![Hypothesis {
                tokens: prefix,
                score: 0.0,
            }],
            finished: Vec::new(),
            done: false,
        }
    }

    /// Hypotheses still being extended, best first.
    pub fn beams(&self) -> &[Hypothesis] {
        &self.beams
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Length of the live hypotheses, prefix included.
    pub fn sequence_len(&self) -> usize {
        self.beams.first().map_or(0, |beam| beam.tokens.len())
    }

    /// Extends the search by one token. `log_probs[i]` is the log-softmax over
    /// the vocabulary for `self.beams()[i]`.
    pub fn step(&mut self, log_probs: &[Vec<f32>]) {
        if self.done {
            return;
        }
        debug_assert_eq!(log_probs.len(), self.beams.len());

        // two candidates per beam are enough to refill every beam even if
        // half of them end the sequence
        let per_beam = 2 * self.num_beams;
        let mut candidates: Vec<(f32, usize, u32)> = self
            .beams
            .iter()
            .zip(log_probs)
            .enumerate()
            .flat_map(|(beam_idx, (beam, row))| {
                top_k(row, per_beam)
                    .into_iter()
                    .map(move |(token, lp)| (beam.score + lp, beam_idx, token))
            })
            .collect();
        candidates.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

        let mut next = Vec::with_capacity(self.num_beams);
        for (rank, (score, beam_idx, token)) in candidates.into_iter().enumerate() {
            let parent = &self.beams[beam_idx];
            if token == self.eos_token_id {
                // an ended sequence only counts if it ranked among the top beams
                if rank < self.num_beams {
                    self.add_finished(Hypothesis {
                        tokens: parent.tokens.clone(),
                        score,
                    });
                }
                continue;
            }

            let mut tokens = parent.tokens.clone();
            tokens.push(token);
            next.push(Hypothesis { tokens, score });
            if next.len() == self.num_beams {
                break;
            }
        }
        self.beams = next;
        self.done = self.beams.is_empty() || self.enough_finished();
    }

    /// Returns the tokens of the best hypothesis, prefix included.
    pub fn finish(mut self) -> Vec<u32> {
        if !self.done {
            for beam in std::mem::take(&mut self.beams) {
                self.add_finished(beam);
            }
        }
        self.finished
            .into_iter()
            .next()
            .map(|best| best.tokens)
            .unwrap_or_default()
    }

    fn add_finished(&mut self, hypothesis: Hypothesis) {
        self.finished.push(hypothesis);
        self.finished
            .sort_by(|a, b| b.normalized_score().total_cmp(&a.normalized_score()));
        self.finished.truncate(self.num_beams);
    }

    fn enough_finished(&self) -> bool {
        if self.finished.len() < self.num_beams {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        // keep going while a live beam could still beat the worst kept result
        match (self.finished.last(), self.beams.first()) {
            (Some(worst), Some(best_live)) => {
                worst.normalized_score() >= best_live.normalized_score()
            }
            _ => true,
        }
    }
}

/// The `k` largest entries of `row` as `(index, value)`, in no particular order.
fn top_k(row: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = row
        .iter()
        .enumerate()
        .map(|(idx, &value)| (idx as u32, value))
        .collect();
    let k = k.min(indexed.len());
    if k > 0 && k < indexed.len() {
        indexed.select_nth_unstable_by(k - 1, |a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
        });
    }
    indexed.truncate(k);
    indexed
}
