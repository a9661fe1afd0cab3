use ndarray::ArrayView1;

use super::tensor::Candidate;

/// Candidate box with its winning class attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_id: usize,
    pub confidence: f32,
}

/// Argmax over class scores. On ties the lowest class index wins.
///
/// NaN scores are skipped. Returns `None` when no score is a number.
pub fn best_class(scores: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    let mut scores = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan());
    let first = scores.next()?;

    Some(scores.fold(first, |(best_idx, best_score), (idx, score)| {
        if score > best_score {
            (idx, score)
        } else {
            (best_idx, best_score)
        }
    }))
}

/// Keeps candidates whose best class score is strictly above `threshold`.
///
/// Input order is preserved.
pub fn filter_candidates<I>(candidates: I, threshold: f32) -> FilterCandidates<I::IntoIter>
where
    I: IntoIterator,
{
    FilterCandidates {
        inner: candidates.into_iter(),
        threshold,
    }
}

/// Iterator returned by [`filter_candidates`].
#[derive(Debug, Clone)]
pub struct FilterCandidates<I> {
    inner: I,
    threshold: f32,
}

impl<'a, I> Iterator for FilterCandidates<I>
where
    I: Iterator<Item = Candidate<'a>>,
{
    type Item = ScoredCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        for candidate in self.inner.by_ref() {
            let Some((class_id, confidence)) = best_class(candidate.class_scores.view()) else {
                continue;
            };

            if confidence <= self.threshold {
                continue;
            }

            return Some(ScoredCandidate {
                index: candidate.index,
                center_x: candidate.center_x,
                center_y: candidate.center_y,
                width: candidate.width,
                height: candidate.height,
                class_id,
                confidence,
            });
        }
        None
    }
}
