//! End-to-end: corpus on disk, training, reload, headless chat.

use std::path::Path;

use manest::config::{BrainConfig, CoreConfig, StorageConfig, TrainingConfig};
use manest::errors::ManestError;
use manest::text::chat::{CancelToken, ChatSession, ScriptedConsole, StopReason};
use manest::text::corpus::load_corpus;
use manest::text::engine::BrainEngine;
use manest::text::readout::ReadoutLayer;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn config(name: &str, dir: &Path) -> BrainConfig {
    BrainConfig {
        name: name.to_string(),
        core: CoreConfig { dim: 8 },
        training: TrainingConfig { alpha: 0.1 },
        storage: StorageConfig { path: dir.join("brains") },
        ..BrainConfig::default()
    }
}

#[test]
fn test_learns_repeating_pattern_in_sample() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = "ab ab ab ab";
    let mut engine = BrainEngine::initialize(config("Echo", dir.path())).unwrap();
    let mut replay = engine.reservoir.clone();

    let report = engine.fit_corpus(corpus).unwrap();
    assert_eq!(report.characters, 11);
    assert_eq!(report.vocab_size, 3);

    let chars: Vec<char> = corpus.chars().collect();
    let mut correct = 0;
    for (t, &c) in chars.iter().enumerate() {
        let index = engine.tokenizer.index_of(c).unwrap();
        let (re, im) = engine.tokenizer.embedding(index).unwrap();
        let features = replay.forward(re, im);

        let prediction = engine.readout.predict(&features).unwrap();
        let decoded = engine.tokenizer.decode(&prediction[..8], &prediction[8..]);
        let expected = chars.get(t + 1).copied().unwrap_or(' ');
        if engine.tokenizer.symbol(decoded) == Some(expected) {
            correct += 1;
        }
    }
    let accuracy = correct as f64 / chars.len() as f64;
    assert!(accuracy > 0.5, "in-sample accuracy {:.2}", accuracy);
}

/// Prime with `prompt`, then feed back each decoded symbol for `steps` characters.
fn generate(engine: &mut BrainEngine, prompt: &str, steps: usize) -> String {
    engine.prime(prompt);
    let mut out = String::new();
    for _ in 0..steps {
        let (index, symbol) = engine.predict_next().unwrap();
        out.push(symbol);
        engine.feed_symbol(index).unwrap();
    }
    out
}

fn hits(generated: &str, expected: &str) -> usize {
    generated.chars().zip(expected.chars()).filter(|(g, e)| g == e).count()
}

#[test]
fn test_generation_continues_pattern_better_than_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = "ab ab ab ab";
    let expected = " ab ab ab";

    let mut trained = BrainEngine::new(config("Echo", dir.path())).unwrap();
    trained.fit_corpus(corpus).unwrap();
    let trained_out = generate(&mut trained, "ab", expected.chars().count());

    // Same reservoir and vocabulary, readout fitted on random next symbols.
    let mut baseline = BrainEngine::new(config("Echo", dir.path())).unwrap();
    let ids = baseline.tokenizer.encode_ids(corpus);
    let vocab = baseline.tokenizer.vocab_size();
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut acc = baseline.readout.accumulator();
    for &id in &ids {
        let (re, im) = baseline.tokenizer.embedding(id).unwrap();
        let features = baseline.reservoir.forward(re, im);
        let (tr, ti) = baseline.tokenizer.embedding(rng.gen_range(0..vocab)).unwrap();
        let target: Vec<f64> = tr.iter().chain(ti).copied().collect();
        acc.push(&features, &target).unwrap();
    }
    baseline.readout.fit_accumulated(&acc).unwrap();
    let baseline_out = generate(&mut baseline, "ab", expected.chars().count());

    let trained_hits = hits(&trained_out, expected);
    let baseline_hits = hits(&baseline_out, expected);
    assert!(trained_hits >= 6, "trained generated {:?}", trained_out);
    assert!(
        trained_hits > baseline_hits,
        "trained {:?} ({}) vs baseline {:?} ({})",
        trained_out,
        trained_hits,
        baseline_out,
        baseline_hits
    );
}

#[test]
fn test_retrain_uses_configured_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config("Bot", dir.path());
    BrainEngine::initialize(cfg.clone()).unwrap().train("ab ab ab").unwrap();

    let mut changed = cfg.clone();
    changed.training.alpha = 50.0;
    let mut engine = BrainEngine::initialize(changed.clone()).unwrap();
    assert!(engine.is_trained());
    assert_eq!(engine.readout.alpha(), 50.0);
    engine.train("ab ab ab").unwrap();
    assert_eq!(engine.readout.alpha(), 50.0);

    let mut stored = ReadoutLayer::new(32, 16, 1.0);
    stored.load(changed.readout_file()).unwrap();
    assert_eq!(stored.alpha(), 50.0);

    // Going back to the original config restores its alpha too.
    assert_eq!(BrainEngine::initialize(cfg).unwrap().readout.alpha(), 0.1);
}

#[test]
fn test_failed_readout_write_keeps_previous_brain() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config("Bot", dir.path());
    // A directory where the readout file should go makes its commit fail.
    std::fs::create_dir_all(cfg.readout_file()).unwrap();

    let mut engine = BrainEngine::initialize(cfg.clone()).unwrap();
    assert!(engine.train("ab ab ab").is_err());
    assert!(!cfg.brain_file().exists());
    let leftovers: Vec<_> = std::fs::read_dir(&cfg.storage.path)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p != &cfg.readout_file())
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[test]
fn test_initialize_restores_trained_brain() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config("Mahestra", dir.path());

    let mut engine = BrainEngine::initialize(cfg.clone()).unwrap();
    assert!(!engine.is_trained());
    engine.train("User: Halo. Mahestra: Salam.").unwrap();
    assert!(cfg.brain_file().exists());
    assert!(cfg.readout_file().exists());

    let restored = BrainEngine::initialize(cfg).unwrap();
    assert!(restored.is_trained());
    assert!(restored.reservoir.is_finalized());
    assert_eq!(restored.tokenizer.symbols(), engine.tokenizer.symbols());
    assert_eq!(restored.reservoir.get_state(), engine.reservoir.get_state());
    assert_eq!(restored.readout.weights(), engine.readout.weights());
    assert_eq!(restored.predict_next().unwrap(), engine.predict_next().unwrap());
}

#[test]
fn test_persisted_physics_win_over_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config("Bot", dir.path());
    BrainEngine::initialize(cfg.clone()).unwrap().train("ab ba").unwrap();

    let mut changed = cfg.clone();
    changed.physics.beta = 3.0;
    let engine = BrainEngine::initialize(changed).unwrap();
    assert_eq!(engine.reservoir.config(), cfg.physics);
}

#[test]
fn test_corrupt_brain_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config("Bot", dir.path());
    std::fs::create_dir_all(&cfg.storage.path).unwrap();
    std::fs::write(cfg.brain_file(), b"NAWA garbage").unwrap();

    let err = BrainEngine::initialize(cfg).err().unwrap();
    assert!(matches!(err, ManestError::CorruptArtifact { .. }), "{}", err);
}

#[test]
fn test_train_from_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("a.txt"), "User: Halo.\nBot: Salam.\n").unwrap();
    std::fs::write(data.join("b.txt"), "User: Apa kabar?\nBot: Baik.\n").unwrap();

    let corpus = load_corpus(&data).unwrap();
    assert!(!corpus.contains('\n'));

    let cfg = config("Bot", dir.path());
    let mut engine = BrainEngine::initialize(cfg.clone()).unwrap();
    let report = engine.train(&corpus).unwrap();
    assert_eq!(report.characters, corpus.chars().count());
    assert_eq!(report.feature_dim, 32);
    assert_eq!(report.output_dim, 16);
    assert!(cfg.readout_file().exists());
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("store");
    let toml = format!(
        "name = \"Tiny\"\n[core]\ndim = 4\n[physics]\nbeta = 2.0\ndt = 0.1\nstiffness = 1.0\ndecay = 0.05\n\
         [training]\nalpha = 0.5\n[storage]\npath = {:?}\n",
        storage.display().to_string()
    );
    let path = dir.path().join("brain.toml");
    std::fs::write(&path, toml).unwrap();

    let cfg = BrainConfig::from_file(&path).unwrap();
    let engine = BrainEngine::initialize(cfg).unwrap();
    assert_eq!(engine.dim(), 4);
    assert_eq!(engine.reservoir.config().beta, 2.0);
    assert_eq!(engine.readout.alpha(), 0.5);
    assert!(storage.is_dir());
}

#[test]
fn test_headless_chat_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = BrainEngine::initialize(config("Bot", dir.path())).unwrap();
    engine.train("User: hi Bot: hello User: yo Bot: hey").unwrap();

    let session = ChatSession::new(12, CancelToken::new());
    let mut console = ScriptedConsole::new(["hi", "yo", "exit"]);
    let turns = session.run(&mut engine, &mut console).unwrap();
    assert_eq!(turns, 2);
    assert!(console.output.starts_with("Starting chat with Bot"));
    assert!(console.output.matches("Bot: ").count() >= 2);

    let reply = session.respond(&mut engine, "hi", &mut console).unwrap();
    assert!(reply.text.chars().count() <= 12);
    if reply.stop == StopReason::TurnMarker {
        assert!(reply.text.ends_with("User:"));
    }
}

#[test]
fn test_chat_ends_on_end_of_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = BrainEngine::initialize(config("Bot", dir.path())).unwrap();
    engine.train("ab ab ab").unwrap();

    let mut console = ScriptedConsole::new(["ab"]);
    let turns = ChatSession::new(5, CancelToken::new()).run(&mut engine, &mut console).unwrap();
    assert_eq!(turns, 1);
}
