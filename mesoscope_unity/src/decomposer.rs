//! Cue→Trial Decomposer (§4.7): a pure function turning a Unity
//! wall-cue sequence into a trial-index sequence plus cumulative
//! distance targets.

use crate::error::DecomposeError;

/// Number of trailing cue bytes reported in a decomposition failure.
const ERROR_CONTEXT_BYTES: usize = 20;

/// Greedy longest-match decomposition (§4.7).
///
/// `motifs[i]` is the cue-byte pattern for trial `i`; `distances[i]` is
/// that trial's length in cm. Motifs are tried longest-first (stable
/// sort on length) at every position so a shorter motif that happens
/// to be a prefix of a longer one never shadows it.
pub fn decompose(
    cues: &[u8],
    motifs: &[Vec<u8>],
    distances: &[f64],
) -> Result<(Vec<usize>, Vec<f64>), DecomposeError> {
    assert_eq!(motifs.len(), distances.len(), "motifs and distances must be parallel");

    let min_len = motifs.iter().map(|m| m.len()).min().unwrap_or(0);
    if min_len == 0 {
        return Err(DecomposeError { position: 0, next_bytes: cues.to_vec() });
    }

    let mut order: Vec<usize> = (0..motifs.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(motifs[i].len()));

    let max_trials = cues.len() / min_len + 1;

    let mut trial_indices = Vec::new();
    let mut cumulative_distances = Vec::new();
    let mut cumulative = 0.0;
    let mut position = 0;

    while position < cues.len() {
        if trial_indices.len() >= max_trials {
            return Err(DecomposeError {
                position,
                next_bytes: cues[position..cues.len().min(position + ERROR_CONTEXT_BYTES)].to_vec(),
            });
        }

        let matched = order.iter().copied().find(|&i| {
            let motif = &motifs[i];
            position + motif.len() <= cues.len() && &cues[position..position + motif.len()] == motif.as_slice()
        });

        match matched {
            Some(i) => {
                position += motifs[i].len();
                cumulative += distances[i];
                trial_indices.push(i);
                cumulative_distances.push(cumulative);
            }
            None => {
                return Err(DecomposeError {
                    position,
                    next_bytes: cues[position..cues.len().min(position + ERROR_CONTEXT_BYTES)].to_vec(),
                });
            }
        }
    }

    Ok((trial_indices, cumulative_distances))
}
