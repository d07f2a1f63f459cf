//! Chat: autoregressive character generation over a trained engine.
//!
//! Per user turn:
//!   1. Priming: the prompt `"User: {input} {name}:"` is stepped through the
//!      reservoir with no output.
//!   2. Generating: predict → snap to the nearest symbol → emit → feed the
//!      symbol's stored embedding (not the raw prediction) back in.
//!   3. Stopped: the response contains the turn marker `User:`, a newline was
//!      produced, the step budget ran out, or the turn was cancelled.
//!
//! Console I/O goes through the [`Console`] trait so the loop runs headless
//! in tests.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{ManestError, Result};
use super::engine::BrainEngine;

/// Default generation budget per response.
pub const MAX_STEPS: usize = 200;

/// Literal that opens a user turn; generating it ends the response.
pub const TURN_MARKER: &str = "User:";

/// Inputs that end the session (compared case-insensitively).
pub const EXIT_WORDS: [&str; 2] = ["exit", "keluar"];

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Line-oriented text I/O.
pub trait Console {
    /// Write text as-is, flushing so partial lines appear immediately.
    fn emit(&mut self, text: &str) -> io::Result<()>;

    /// Show `prompt` and read one line without its terminator.
    /// `None` means end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Terminal console over stdin/stdout.
pub struct StdConsole {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl StdConsole {
    pub fn new() -> Self {
        Self { stdin: io::stdin(), stdout: io::stdout() }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn emit(&mut self, text: &str) -> io::Result<()> {
        let mut out = self.stdout.lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.emit(prompt)?;
        let mut line = String::new();
        if self.stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Console fed from a fixed list of lines, recording everything emitted.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    inputs: VecDeque<String>,
    pub output: String,
}

impl ScriptedConsole {
    pub fn new<S: Into<String>>(inputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: String::new(),
        }
    }
}

impl Console for ScriptedConsole {
    fn emit(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.output.push_str(prompt);
        Ok(self.inputs.pop_front())
    }
}

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared interrupt flag, checked before every generation step.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    generating: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.cancelled.swap(false, Ordering::SeqCst)
    }

    /// Whether a response is being generated right now.
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    fn set_generating(&self, on: bool) {
        self.generating.store(on, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Generation state machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    TurnMarker,
    Newline,
    MaxSteps,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationState {
    Priming,
    Generating { step: usize },
    Stopped(StopReason),
}

/// One response in progress.
pub struct Generation<'e> {
    engine: &'e mut BrainEngine,
    prompt: String,
    state: GenerationState,
    response: String,
    max_steps: usize,
}

impl<'e> Generation<'e> {
    pub fn new(engine: &'e mut BrainEngine, prompt: impl Into<String>, max_steps: usize) -> Self {
        Self {
            engine,
            prompt: prompt.into(),
            state: GenerationState::Priming,
            response: String::new(),
            max_steps,
        }
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    /// Advance one transition. Returns the character emitted, if any.
    pub fn step(&mut self) -> Result<Option<char>> {
        match self.state {
            GenerationState::Priming => {
                self.engine.prime(&self.prompt);
                self.state = GenerationState::Generating { step: 0 };
                Ok(None)
            }
            GenerationState::Generating { step } if step >= self.max_steps => {
                self.state = GenerationState::Stopped(StopReason::MaxSteps);
                Ok(None)
            }
            GenerationState::Generating { step } => {
                let (index, symbol) = self.engine.predict_next()?;
                self.response.push(symbol);

                if symbol == '\n' {
                    self.state = GenerationState::Stopped(StopReason::Newline);
                } else if self.response.contains(TURN_MARKER) {
                    self.state = GenerationState::Stopped(StopReason::TurnMarker);
                } else {
                    self.engine.feed_symbol(index)?;
                    self.state = GenerationState::Generating { step: step + 1 };
                }
                Ok(Some(symbol))
            }
            GenerationState::Stopped(_) => Ok(None),
        }
    }

    pub fn cancel(&mut self) {
        if !matches!(self.state, GenerationState::Stopped(_)) {
            self.state = GenerationState::Stopped(StopReason::Cancelled);
        }
    }

    pub fn into_response(self) -> String {
        self.response
    }
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

/// Outcome of one response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub stop: StopReason,
}

pub struct ChatSession {
    pub max_steps: usize,
    pub cancel: CancelToken,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self { max_steps: MAX_STEPS, cancel: CancelToken::new() }
    }
}

impl ChatSession {
    pub fn new(max_steps: usize, cancel: CancelToken) -> Self {
        Self { max_steps, cancel }
    }

    /// Generate one response to `input`, streaming characters to `console`.
    pub fn respond(&self, engine: &mut BrainEngine, input: &str, console: &mut dyn Console) -> Result<Reply> {
        if !engine.is_trained() {
            return Err(ManestError::Untrained);
        }
        let prompt = format!("User: {} {}:", input, engine.config.name);
        let mut generation = Generation::new(engine, prompt, self.max_steps);

        self.cancel.set_generating(true);
        let outcome = self.drive(&mut generation, console);
        self.cancel.set_generating(false);
        // An interrupt during the final step belongs to this response.
        self.cancel.take();
        outcome?;

        let stop = match generation.state() {
            GenerationState::Stopped(reason) => reason,
            _ => StopReason::Cancelled,
        };
        debug!(?stop, chars = generation.response().chars().count(), "response finished");
        Ok(Reply { text: generation.into_response(), stop })
    }

    fn drive(&self, generation: &mut Generation<'_>, console: &mut dyn Console) -> Result<()> {
        while !matches!(generation.state(), GenerationState::Stopped(_)) {
            if self.cancel.take() {
                generation.cancel();
                break;
            }
            if let Some(symbol) = generation.step()? {
                let mut buf = [0u8; 4];
                console.emit(symbol.encode_utf8(&mut buf))?;
            }
        }
        Ok(())
    }

    /// Interactive loop until an exit word, end of input, or interrupt at the prompt.
    ///
    /// Refuses to start when the readout is untrained. Returns the number of
    /// completed turns.
    pub fn run(&self, engine: &mut BrainEngine, console: &mut dyn Console) -> Result<usize> {
        if !engine.is_trained() {
            return Err(ManestError::Untrained);
        }
        let name = engine.config.name.clone();
        console.emit(&format!("Starting chat with {name}\n(Type 'exit' to quit)\n\n"))?;

        let mut turns = 0;
        loop {
            let line = console.read_line("User: ")?;
            if self.cancel.take() {
                break;
            }
            let Some(line) = line else { break };
            let input = line.trim();
            if EXIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w)) {
                break;
            }

            console.emit(&format!("{name}: "))?;
            let reply = self.respond(engine, input, console)?;
            if reply.stop != StopReason::Newline {
                console.emit("\n")?;
            }
            turns += 1;
        }
        Ok(turns)
    }
}
