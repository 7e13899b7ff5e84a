//! The Viterbi decoder (`spec.md` §4.D): chooses the most likely candidate
//! at each observation by maximizing the product of emission and transition
//! probability across an optional k-step lookahead window. Grounded in
//! `pyosmroute/osm/_hiddenmarkovmodel.py`'s `HiddenMarkovModel.viterbi`/
//! `viterbi_lookahead`/`_lookahead_matrix`.
//!
//! `path[t].probability` is the *cumulative* product of the winning chain's
//! one-step factors from the last restart up to `t` (see `DESIGN.md` for why
//! this diverges from the original Python, which records only the current
//! step's tensor-max value): `spec.md` §8 Scenario S5 is only reproducible
//! if the recorded probability compounds across steps, so that is what this
//! decoder does. The lookahead window still only *chooses* `j0` by looking
//! ahead `k` steps; the value multiplied into the running total is always
//! the immediate one-step factor for the chosen `j0`, never the whole
//! window's product, so overlapping lookahead windows at consecutive `t`
//! never double-count a future step's contribution.

use crate::transition::TransitionTable;

/// One decoded step: the chosen candidate index into `StateSpace[t]`, or
/// `None` for an unresolvable break, plus the recorded probability
/// (`spec.md` §3 `Path`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    pub chosen: Option<usize>,
    pub probability: f64,
}

impl PathStep {
    fn unresolved() -> Self {
        PathStep {
            chosen: None,
            probability: 0.0,
        }
    }
}

/// Returns `None` if `values` is empty or every entry is exactly `0.0`
/// (`spec.md` §4.D: "If the tensor is all-zero... record (∅, 0)"), else the
/// index and value of the first maximal entry.
fn argmax_nonzero(values: &[f64]) -> Option<(usize, f64)> {
    if values.is_empty() || values.iter().all(|&v| v == 0.0) {
        return None;
    }
    values
        .iter()
        .enumerate()
        .fold(None, |best, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

/// Row-major unravel of a flat index into per-axis indices for `dims`.
fn unravel(mut flat_index: usize, dims: &[usize]) -> Vec<usize> {
    let mut out = vec![0usize; dims.len()];
    for d in (0..dims.len()).rev() {
        out[d] = flat_index % dims[d];
        flat_index /= dims[d];
    }
    out
}

/// Builds the `(k+1)`-dimensional lookahead tensor (`spec.md` §4.D) flattened
/// in row-major order, plus its shape. `t0` is the observation index being
/// decided; `prev_i` is the candidate index chosen at `t0-1`.
fn lookahead_tensor(
    eprobs: &[Vec<f64>],
    tprobs: &mut dyn TransitionTable,
    prev_i: usize,
    t0: usize,
    lookahead: usize,
) -> (Vec<f64>, Vec<usize>) {
    let dims: Vec<usize> = (0..=lookahead).map(|plust| eprobs[t0 + plust].len()).collect();
    let mut flat = Vec::with_capacity(dims.iter().product());
    let mut index = vec![0usize; dims.len()];
    fill_axis(0, &dims, &mut index, prev_i, t0, eprobs, tprobs, &mut flat);
    (flat, dims)
}

#[allow(clippy::too_many_arguments)]
fn fill_axis(
    dim: usize,
    dims: &[usize],
    index: &mut [usize],
    prev_i: usize,
    t0: usize,
    eprobs: &[Vec<f64>],
    tprobs: &mut dyn TransitionTable,
    out: &mut Vec<f64>,
) {
    if dim == dims.len() {
        let mut prob = 1.0;
        for plust in 0..dims.len() {
            let t = t0 + plust - 1;
            let i = if plust == 0 { prev_i } else { index[plust - 1] };
            let j = index[plust];
            let (tprob, _nodes) = tprobs.get(t, i, j);
            prob *= tprob * eprobs[t0 + plust][j];
        }
        out.push(prob);
        return;
    }
    for v in 0..dims[dim] {
        index[dim] = v;
        fill_axis(dim + 1, dims, index, prev_i, t0, eprobs, tprobs, out);
    }
}

/// Decodes the most likely sequence of candidate indices (`spec.md` §4.D).
///
/// `eprobs[t][i]` is the emission probability of candidate `i` at
/// observation `t`; `tprobs` supplies `T[t, i, j]` on demand (lazy or
/// eager, see [`crate::transition`]). `lookahead` is the number of future
/// observations considered when choosing the current state (`0` reproduces
/// a greedy decoder).
pub fn decode(eprobs: &[Vec<f64>], tprobs: &mut dyn TransitionTable, lookahead: usize) -> Vec<PathStep> {
    let numobs = eprobs.len();
    let mut path: Vec<PathStep> = Vec::with_capacity(numobs);

    for t in 0..numobs {
        let prev = if t > 0 { Some(path[t - 1]) } else { None };

        let step = match prev.and_then(|p| p.chosen) {
            None => match argmax_nonzero(&eprobs[t]) {
                Some((i, v)) => PathStep {
                    chosen: Some(i),
                    probability: v,
                },
                None => {
                    log::debug!("unresolvable break in viterbi at t={t}");
                    PathStep::unresolved()
                }
            },
            Some(prev_i) => {
                let k = lookahead.min(numobs - t - 1);
                let (flat, dims) = lookahead_tensor(eprobs, tprobs, prev_i, t, k);
                match argmax_nonzero(&flat) {
                    None => {
                        log::debug!("unresolvable break in viterbi at t={t}");
                        PathStep::unresolved()
                    }
                    Some((flat_idx, _)) => {
                        let multi = unravel(flat_idx, &dims);
                        let j0 = multi[0];
                        let (immediate_tprob, _) = tprobs.get(t - 1, prev_i, j0);
                        let immediate = immediate_tprob * eprobs[t][j0];
                        PathStep {
                            chosen: Some(j0),
                            probability: prev.unwrap().probability * immediate,
                        }
                    }
                }
            }
        };
        path.push(step);
    }

    path
}
