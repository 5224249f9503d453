//! Reciprocal Rank Fusion of the dense and lexical result lists.

use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use recipedb_core::types::{Chunk, ChunkId, RankedChunk, RankedList, SourceKind};
use recipedb_core::{Error, Result};

/// Where a fused chunk sat in each input list (0-based), if it appeared there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FusionTrace {
    pub dense_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracedChunk {
    pub ranked: RankedChunk,
    pub trace: FusionTrace,
}

struct Candidate {
    chunk: Chunk,
    score: f64,
    trace: FusionTrace,
}

/// Fuse two ranked lists with RRF: each list contributes `1 / (k_const + rank + 1)`.
pub fn fuse(dense: &RankedList, lexical: &RankedList, k_const: i64, top_k: usize) -> Result<RankedList> {
    let traced = fuse_with_trace(dense, lexical, k_const, top_k)?;
    Ok(RankedList::from_ordered(traced.into_iter().map(|t| (t.ranked.chunk, t.ranked.score)).collect()))
}

/// Like [`fuse`] but keeps the per-list ranks of every output chunk.
pub fn fuse_with_trace(
    dense: &RankedList,
    lexical: &RankedList,
    k_const: i64,
    top_k: usize,
) -> Result<Vec<TracedChunk>> {
    if k_const <= 0 {
        return Err(Error::InvalidParameter(format!("rrf k must be positive, got {k_const}")));
    }
    if top_k == 0 {
        return Err(Error::InvalidParameter("top_k must be positive".into()));
    }

    let mut arena: Vec<Candidate> = Vec::with_capacity(dense.len() + lexical.len());
    let mut slots: HashMap<ChunkId, usize> = HashMap::new();
    accumulate(&mut arena, &mut slots, dense, k_const, SourceKind::Dense);
    accumulate(&mut arena, &mut slots, lexical, k_const, SourceKind::Lexical);

    arena.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    arena.truncate(top_k);

    let fused: Vec<TracedChunk> = arena
        .into_iter()
        .enumerate()
        .map(|(rank, mut c)| {
            c.chunk.metadata.final_score = Some(c.score);
            TracedChunk { ranked: RankedChunk { chunk: c.chunk, rank, score: c.score }, trace: c.trace }
        })
        .collect();
    for t in &fused {
        debug!(
            chunk = %t.ranked.chunk.id,
            rank = t.ranked.rank,
            score = t.ranked.score,
            dense_rank = ?t.trace.dense_rank,
            lexical_rank = ?t.trace.lexical_rank,
            "fused"
        );
    }
    Ok(fused)
}

fn accumulate(
    arena: &mut Vec<Candidate>,
    slots: &mut HashMap<ChunkId, usize>,
    list: &RankedList,
    k_const: i64,
    source: SourceKind,
) {
    for (position, hit) in list.iter().enumerate() {
        let slot = *slots.entry(hit.chunk.id.clone()).or_insert_with(|| {
            arena.push(Candidate { chunk: hit.chunk.clone(), score: 0.0, trace: FusionTrace::default() });
            arena.len() - 1
        });
        let candidate = &mut arena[slot];
        let seen = match source {
            SourceKind::Dense => &mut candidate.trace.dense_rank,
            SourceKind::Lexical => &mut candidate.trace.lexical_rank,
        };
        // A chunk repeated within one list only counts at its best rank.
        if seen.is_none() {
            *seen = Some(position);
            candidate.score += 1.0 / (k_const as f64 + position as f64 + 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipedb_core::types::{Category, ChunkMetadata, Difficulty, DocumentId};

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: ChunkId::new(id),
            parent_id: DocumentId::new(format!("doc-{id}")),
            content: id.to_string(),
            metadata: ChunkMetadata {
                source: format!("{id}.md"),
                category: Category::Other,
                name: id.to_string(),
                difficulty: Difficulty::Unknown,
                section: None,
                chunk_index: 0,
                total_chunks: 1,
                final_score: None,
            },
        }
    }

    fn list(ids: &[&str]) -> RankedList {
        RankedList::from_ordered(ids.iter().map(|id| (chunk(id), 1.0)).collect())
    }

    fn ids(list: &RankedList) -> Vec<&str> { list.iter().map(|r| r.chunk.id.as_str()).collect() }

    #[test]
    fn scores_follow_the_reciprocal_rank_formula() {
        let fused = fuse(&list(&["a", "b"]), &list(&["b", "c"]), 60, 10).unwrap();
        assert_eq!(ids(&fused), vec!["b", "a", "c"]);
        let b = fused.get(0).unwrap();
        assert!((b.score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert_eq!(b.chunk.metadata.final_score, Some(b.score));
        assert!((fused.get(1).unwrap().score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused.get(2).unwrap().score - 1.0 / 62.0).abs() < 1e-12);
        let ranks: Vec<usize> = fused.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn equal_scores_break_ties_by_chunk_id() {
        let fused = fuse(&list(&["z"]), &list(&["m"]), 60, 10).unwrap();
        assert_eq!(ids(&fused), vec!["m", "z"]);
        assert_eq!(fused.get(0).unwrap().score, fused.get(1).unwrap().score);
    }

    #[test]
    fn chunk_in_both_lists_beats_single_list_peer() {
        let fused = fuse(&list(&["x", "y"]), &list(&["q", "y"]), 60, 10).unwrap();
        assert_eq!(fused.get(0).unwrap().chunk.id.as_str(), "y");
    }

    #[test]
    fn output_is_truncated_to_top_k() {
        let fused = fuse(&list(&["a", "b", "c"]), &list(&["d", "e"]), 60, 2).unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn empty_inputs_fuse_to_empty_and_one_sided_input_keeps_order() {
        assert!(fuse(&RankedList::new(), &RankedList::new(), 60, 3).unwrap().is_empty());
        let fused = fuse(&list(&["c", "a", "b"]), &RankedList::new(), 60, 3).unwrap();
        assert_eq!(ids(&fused), vec!["c", "a", "b"]);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let a = list(&["a"]);
        assert!(matches!(fuse(&a, &a, 0, 3), Err(Error::InvalidParameter(_))));
        assert!(matches!(fuse(&a, &a, -5, 3), Err(Error::InvalidParameter(_))));
        assert!(matches!(fuse(&a, &a, 60, 0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn duplicates_within_one_list_count_once() {
        let fused = fuse(&list(&["a", "a"]), &RankedList::new(), 60, 3).unwrap();
        assert_eq!(fused.len(), 1);
        assert!((fused.get(0).unwrap().score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn fusion_is_deterministic_and_traced() {
        let d = list(&["a", "b", "c"]);
        let l = list(&["c", "d"]);
        assert_eq!(fuse(&d, &l, 60, 4).unwrap(), fuse(&d, &l, 60, 4).unwrap());

        let traced = fuse_with_trace(&d, &l, 60, 4).unwrap();
        let c = traced.iter().find(|t| t.ranked.chunk.id.as_str() == "c").unwrap();
        assert_eq!(c.trace, FusionTrace { dense_rank: Some(2), lexical_rank: Some(0) });
        let d_hit = traced.iter().find(|t| t.ranked.chunk.id.as_str() == "d").unwrap();
        assert_eq!(d_hit.trace.dense_rank, None);
    }

    #[test]
    fn smaller_k_const_widens_the_gap_between_ranks() {
        let d = list(&["a", "b"]);
        let gap = |k| {
            let f = fuse(&d, &RankedList::new(), k, 2).unwrap();
            f.get(0).unwrap().score - f.get(1).unwrap().score
        };
        assert!(gap(1) > gap(60));
    }
}
