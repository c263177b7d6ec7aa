//! Structural properties of chunked batching over randomized piano rolls.

use ndarray::{s, Array2, Array3, Axis};
use pianoroll_batcher::batching::{batch_sequences, rolled_length};
use pianoroll_batcher::validation::validate_split;
use pianoroll_batcher::{BatchError, SequenceMetadata, SplitData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Helpers
// ============================================================================

fn random_rolls(rng: &mut StdRng, count: usize, max_len: usize, dims: usize) -> Vec<Array2<f64>> {
    (0..count)
        .map(|_| {
            let len = rng.random_range(1..=max_len);
            Array2::from_shape_fn((len, dims), |_| rng.random_bool(0.2) as u8 as f64)
        })
        .collect()
}

/// Concatenate chunks back into one `(T * L, N, D)` array.
fn unchunk(chunks: &[Array3<f64>]) -> Array3<f64> {
    let views: Vec<_> = chunks.iter().map(|c| c.view()).collect();
    ndarray::concatenate(Axis(0), &views).unwrap()
}

// ============================================================================
// Shape and length invariants
// ============================================================================

#[test]
fn test_chunk_counts_and_shapes() {
    let mut rng = StdRng::seed_from_u64(11);
    for l in [1usize, 3, 8, 50] {
        let rolls = random_rolls(&mut rng, 12, 40, 5);
        let batched = batch_sequences(&rolls, Some(l), None).unwrap();
        let longest = rolls.iter().map(|r| r.nrows()).max().unwrap();

        assert_eq!(batched.num_time_batches(), longest.div_ceil(l));
        assert_eq!(batched.targets.len(), batched.num_time_batches());
        assert_eq!(batched.rolled_lengths.len(), batched.num_time_batches());
        for (b, t) in batched.batches.iter().zip(&batched.targets) {
            assert_eq!(b.dim(), (l, 12, 5));
            assert_eq!(b.dim(), t.dim());
        }
    }
}

#[test]
fn test_rolled_lengths_bounded_and_sum_to_unrolled() {
    let mut rng = StdRng::seed_from_u64(12);
    let rolls = random_rolls(&mut rng, 20, 100, 3);
    let l = 7;
    let batched = batch_sequences(&rolls, Some(l), None).unwrap();

    for (t, rolled) in batched.rolled_lengths.iter().enumerate() {
        for (s, &r) in rolled.iter().enumerate() {
            let unrolled = batched.unrolled_lengths[s];
            assert!(r <= l);
            if t * l >= unrolled {
                assert_eq!(r, 0);
            }
            assert_eq!(r, rolled_length(unrolled, t, l));
        }
    }
    for (s, &unrolled) in batched.unrolled_lengths.iter().enumerate() {
        let total: usize = batched.rolled_lengths.iter().map(|r| r[s]).sum();
        assert_eq!(total, unrolled);
        assert_eq!(unrolled, rolls[s].nrows() - 1);
    }
}

#[test]
fn test_identical_inputs_give_identical_outputs() {
    let mut rng = StdRng::seed_from_u64(13);
    let rolls = random_rolls(&mut rng, 9, 30, 4);

    let a = batch_sequences(&rolls, Some(6), Some(3)).unwrap();
    let b = batch_sequences(&rolls, Some(6), Some(3)).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Targets and padding
// ============================================================================

#[test]
fn test_targets_are_next_frames() {
    let mut rng = StdRng::seed_from_u64(14);
    let rolls = random_rolls(&mut rng, 10, 25, 6);
    let batched = batch_sequences(&rolls, Some(4), None).unwrap();
    let targets = unchunk(&batched.targets);

    for (s, roll) in rolls.iter().enumerate() {
        let unrolled = batched.unrolled_lengths[s];
        for i in 1..=unrolled {
            assert_eq!(targets.slice(s![i - 1, s, ..]), roll.row(i), "seq {s} step {i}");
        }
    }
}

#[test]
fn test_inputs_keep_frames_before_unrolled_length() {
    let mut rng = StdRng::seed_from_u64(15);
    let rolls = random_rolls(&mut rng, 10, 25, 6);
    let batched = batch_sequences(&rolls, Some(4), None).unwrap();
    let inputs = unchunk(&batched.batches);

    for (s, roll) in rolls.iter().enumerate() {
        for i in 0..batched.unrolled_lengths[s] {
            assert_eq!(inputs.slice(s![i, s, ..]), roll.row(i));
        }
    }
}

#[test]
fn test_padding_is_zero_in_inputs_and_targets() {
    let rolls = vec![Array2::from_elem((9, 3), 1.0), Array2::from_elem((4, 3), 1.0)];
    let batched = batch_sequences(&rolls, Some(5), None).unwrap();
    let inputs = unchunk(&batched.batches);
    let targets = unchunk(&batched.targets);

    // sequence 1: unrolled length 3, everything from step 3 on is zero
    assert!(inputs.slice(s![3.., 1, ..]).iter().all(|&v| v == 0.0));
    assert!(targets.slice(s![3.., 1, ..]).iter().all(|&v| v == 0.0));
    // the final frame of a sequence is only ever seen as a target
    assert!(targets.slice(s![7, 0, ..]).iter().all(|&v| v == 1.0));
    assert!(inputs.slice(s![8, 0, ..]).iter().all(|&v| v == 0.0));
}

// ============================================================================
// Chunk cap filtering
// ============================================================================

#[test]
fn test_cap_excludes_exactly_the_long_sequences() {
    let mut rng = StdRng::seed_from_u64(16);
    let rolls = random_rolls(&mut rng, 30, 60, 2);
    let (l, m) = (8, 4);
    let batched = batch_sequences(&rolls, Some(l), Some(m)).unwrap();

    let expected: Vec<usize> = rolls
        .iter()
        .enumerate()
        .filter(|(_, r)| r.nrows() <= l * m)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(batched.kept_indices, expected);
    assert!(batched.num_time_batches() <= m);
    for (slot, &idx) in batched.kept_indices.iter().enumerate() {
        assert_eq!(batched.unrolled_lengths[slot], rolls[idx].nrows() - 1);
    }
}

#[test]
fn test_cap_above_need_is_inert() {
    let rolls = vec![Array2::from_elem((6, 2), 1.0), Array2::from_elem((2, 2), 1.0)];
    let capped = batch_sequences(&rolls, Some(3), Some(100)).unwrap();
    let uncapped = batch_sequences(&rolls, Some(3), None).unwrap();
    assert_eq!(capped, uncapped);
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn test_two_sequences_three_step_chunks() {
    let rolls = vec![Array2::from_elem((5, 2), 1.0), Array2::from_elem((3, 2), 1.0)];
    let batched = batch_sequences(&rolls, Some(3), None).unwrap();

    assert_eq!(batched.num_time_batches(), 2);
    assert_eq!(batched.unrolled_lengths, vec![4, 2]);
    assert_eq!(batched.rolled_lengths, vec![vec![3, 2], vec![1, 0]]);
}

#[test]
fn test_only_sequence_over_cap_is_empty_input() {
    let rolls = vec![Array2::from_elem((10, 2), 1.0)];
    let result = batch_sequences(&rolls, Some(4), Some(2));
    assert!(matches!(result, Err(BatchError::EmptyInput(_))));
}

#[test]
fn test_no_chunk_length_means_single_chunk() {
    let mut rng = StdRng::seed_from_u64(17);
    let rolls = random_rolls(&mut rng, 5, 20, 3);
    let batched = batch_sequences(&rolls, None, None).unwrap();
    let longest = rolls.iter().map(|r| r.nrows()).max().unwrap();

    assert_eq!(batched.num_time_batches(), 1);
    assert_eq!(batched.time_batch_len, longest);
}

#[test]
fn test_random_splits_pass_structural_validation() {
    let mut rng = StdRng::seed_from_u64(18);
    for seed_round in 0..5 {
        let rolls = random_rolls(&mut rng, 15, 70, 4);
        let l = rng.random_range(1..20);
        let batched = batch_sequences(&rolls, Some(l), None).unwrap();
        let metadata: Vec<_> = (0..rolls.len())
            .map(|i| SequenceMetadata::named(format!("r{seed_round}_{i}")))
            .collect();
        let split = SplitData::from_batched(batched, &metadata).unwrap();

        let result = validate_split(&split);
        assert!(!result.has_errors(), "round {seed_round}: {result}");
    }
}
