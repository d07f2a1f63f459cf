//! Reservoir dynamics and persistence.

use manest::errors::ManestError;
use manest::text::reservoir::*;
use manest::text::tokenizer::ResonantTokenizer;

fn corpus_inputs(tok: &mut ResonantTokenizer, text: &str) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    tok.encode(text).to_parts()
}

// ---------------------------------------------------------------------------
// Boundedness
// ---------------------------------------------------------------------------

#[test]
fn test_state_bounded_over_ten_thousand_steps() {
    let dim = 16;
    let mut tok = ResonantTokenizer::new(dim);
    let text: String = "the quick brown fox jumps over the lazy dog. ".repeat(230);
    let (re, im) = corpus_inputs(&mut tok, &text);
    assert!(re.len() >= 10_000);

    let mut res = ReservoirLayer::new(dim);
    let bound = res.state_bound();
    let norm_bound = bound * (dim as f64).sqrt() * (1.0 + 1e-9);

    for t in 0..re.len() {
        let features = res.forward(&re[t], &im[t]);
        assert!(features.iter().all(|f| f.is_finite()), "non-finite feature at step {}", t);
        for z in res.state() {
            assert!(z.norm() <= bound * (1.0 + 1e-9), "|z| = {} > {} at step {}", z.norm(), bound, t);
        }
        assert!(res.state_norm() <= norm_bound, "norm {} at step {}", res.state_norm(), t);
    }
}

#[test]
fn test_bounded_under_aggressive_physics() {
    let dim = 8;
    let mut res = ReservoirLayer::with_seed(dim, 3);
    // Large coupling, large step, almost no damping.
    res.set_config(1e6, 10.0, 1e-3, 1e-4).unwrap();
    let bound = res.state_bound();

    let mut tok = ResonantTokenizer::new(dim);
    let (re, im) = corpus_inputs(&mut tok, &"xyzzy ".repeat(2000));
    for t in 0..re.len() {
        res.forward(&re[t], &im[t]);
        assert!(res.state().iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        assert!(res.state().iter().all(|z| z.norm() <= bound * (1.0 + 1e-9)));
    }
}

#[test]
fn test_bounded_with_oversized_inputs() {
    let dim = 8;
    let mut res = ReservoirLayer::new(dim);
    let bound = res.state_bound();
    let big = vec![1e12; dim];
    for _ in 0..500 {
        res.forward(&big, &big);
    }
    assert!(res.state().iter().all(|z| z.norm().is_finite() && z.norm() <= bound * (1.0 + 1e-9)));
}

#[test]
fn test_different_sequences_different_states() {
    let dim = 16;
    let mut tok = ResonantTokenizer::new(dim);
    let (re1, im1) = corpus_inputs(&mut tok, "the cat sat");
    let (re2, im2) = corpus_inputs(&mut tok, "a dog ran!!");

    let mut a = ReservoirLayer::new(dim);
    let mut b = ReservoirLayer::new(dim);
    for t in 0..re1.len() {
        a.forward(&re1[t], &im1[t]);
        b.forward(&re2[t], &im2[t]);
    }
    let diff: f64 = a.get_state().iter().zip(b.get_state()).map(|(x, y)| (x - y).abs()).sum();
    assert!(diff > 1e-3, "different sequences should give different states: diff={}", diff);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_save_load_continues_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    let dim = 12;

    let mut tok = ResonantTokenizer::new(dim);
    let (re, im) = corpus_inputs(&mut tok, "resonance keeps its phase, ");
    let (re2, im2) = corpus_inputs(&mut tok, "and continues after reload.");

    let mut original = ReservoirLayer::with_seed(dim, 11);
    original.set_config(5.0, 0.3, 0.7, 0.02).unwrap();
    for t in 0..re.len() {
        original.forward(&re[t], &im[t]);
    }
    original.save(&path).unwrap();

    let mut restored = ReservoirLayer::new(dim);
    restored.load(&path).unwrap();
    assert_eq!(restored.config(), original.config());
    assert_eq!(restored.get_state(), original.get_state());

    for t in 0..re2.len() {
        let expected = original.forward(&re2[t], &im2[t]);
        let got = restored.forward(&re2[t], &im2[t]);
        assert_eq!(got, expected, "diverged at step {}", t);
    }
}

#[test]
fn test_set_config_after_load_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    ReservoirLayer::new(4).save(&path).unwrap();

    let mut res = ReservoirLayer::new(4);
    assert!(res.set_config(1.0, 0.1, 1.0, 0.1).is_ok());
    res.load(&path).unwrap();
    assert!(res.is_finalized());
    assert!(matches!(res.set_config(1.0, 0.1, 1.0, 0.1), Err(ManestError::Reconfigure(_))));
}

#[test]
fn test_load_wrong_dim_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    ReservoirLayer::new(6).save(&path).unwrap();

    let mut res = ReservoirLayer::new(4);
    let err = res.load(&path).unwrap_err();
    assert!(matches!(err, ManestError::CorruptArtifact { .. }), "{}", err);
    assert!(!res.is_finalized());
}

#[test]
fn test_load_garbage_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    std::fs::write(&path, b"definitely not a brain").unwrap();

    let err = ReservoirLayer::new(4).load(&path).unwrap_err();
    assert!(matches!(err, ManestError::CorruptArtifact { .. }), "{}", err);
}

#[test]
fn test_load_missing_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReservoirLayer::new(4).load(dir.path().join("nope.nawa")).unwrap_err();
    assert!(matches!(err, ManestError::CorruptArtifact { .. }));
}

#[test]
fn test_vocabulary_travels_with_brain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    let dim = 8;

    let mut tok = ResonantTokenizer::new(dim);
    tok.encode_ids("Salam, dunia!");
    let res = ReservoirLayer::new(dim);
    res.save_with_vocabulary(&path, &tok).unwrap();

    let (res_back, tok_back) = ReservoirLayer::load_with_vocabulary(&path, dim).unwrap();
    assert_eq!(res_back.get_state(), res.get_state());
    assert_eq!(tok_back.symbols(), tok.symbols());
    for i in 0..tok.vocab_size() {
        assert_eq!(tok_back.embedding(i), tok.embedding(i));
    }
}

#[test]
fn test_brain_without_vocabulary_is_corrupt_for_session_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nawa");
    ReservoirLayer::new(4).save(&path).unwrap();
    assert!(matches!(
        ReservoirLayer::load_with_vocabulary(&path, 4),
        Err(ManestError::CorruptArtifact { .. })
    ));
}
