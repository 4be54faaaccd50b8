// UI layer: the console boundary and the command loop. The loop reads a
// command number, runs the bound action to completion and asks again until
// the user enters 0.

use crate::actions;
use crate::api::Transport;
use crate::model::Operation;
use crate::session::Session;
use anyhow::Result;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::time::Duration;

/// Line-based prompt/read plus an output sink.
pub trait Console {
    /// Show `message` and read one line. `Err` means input is gone (EOF,
    /// closed terminal), not that the line was invalid.
    fn prompt(&mut self, message: &str) -> Result<String>;

    fn show(&mut self, text: &str);

    /// Spinner displayed while a request is in flight. Hidden by default.
    fn spinner(&self, _message: &str) -> ProgressBar {
        ProgressBar::hidden()
    }
}

/// Interactive terminal console built on `dialoguer` and `indicatif`.
#[derive(Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn prompt(&mut self, message: &str) -> Result<String> {
        let line: String = Input::new()
            .with_prompt(message)
            .allow_empty(true)
            .interact_text()?;
        Ok(line)
    }

    fn show(&mut self, text: &str) {
        println!("{}", text);
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

/// Console fed from a fixed list of answers; records everything shown.
/// Used to drive the command loop without a terminal.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: VecDeque<String>,
    prompts: Vec<String>,
    output: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Everything shown so far, one line per `show` call.
    pub fn transcript(&self) -> String {
        self.output.join("\n")
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.len()
    }
}

impl Console for ScriptedConsole {
    fn prompt(&mut self, message: &str) -> Result<String> {
        self.prompts.push(message.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no more scripted input"))
    }

    fn show(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}

/// Code returned for empty or non-numeric command input.
pub const UNKNOWN_COMMAND: i64 = -1;

/// Parse raw command input; anything that is not a plain non-negative
/// number maps to [`UNKNOWN_COMMAND`].
pub fn command_code(input: &str) -> i64 {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return UNKNOWN_COMMAND;
    }
    trimmed.parse().unwrap_or(UNKNOWN_COMMAND)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    End,
    Run(Operation),
    Unknown,
}

impl Command {
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            return Command::End;
        }
        u32::try_from(code)
            .ok()
            .and_then(Operation::from_code)
            .map(Command::Run)
            .unwrap_or(Command::Unknown)
    }

    pub fn parse(input: &str) -> Self {
        Self::from_code(command_code(input))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    AwaitingCommand,
    Terminated,
}

pub fn menu_text() -> String {
    let mut lines = vec![
        String::new(),
        ">> Enter a command:".to_string(),
        "   0 => end".to_string(),
    ];
    for op in Operation::ALL {
        lines.push(format!("   {} => {}", op.code(), op.label()));
    }
    lines.join("\n")
}

/// Strictly sequential command loop owning the session for its lifetime.
pub struct Dispatcher<C: Console> {
    session: Session,
    transport: Transport,
    console: C,
    state: DispatcherState,
}

impl<C: Console> Dispatcher<C> {
    pub fn new(session: Session, transport: Transport, console: C) -> Self {
        Self {
            session,
            transport,
            console,
            state: DispatcherState::AwaitingCommand,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read and run one command. Does nothing once terminated.
    pub fn step(&mut self) -> DispatcherState {
        if self.state == DispatcherState::Terminated {
            return self.state;
        }
        self.console.show(&menu_text());
        let input = match self.console.prompt("command") {
            Ok(input) => input,
            Err(e) => {
                tracing::info!(error = %e, "input closed, ending session");
                self.state = DispatcherState::Terminated;
                return self.state;
            }
        };
        match Command::parse(&input) {
            Command::End => {
                tracing::debug!("end of session requested");
                self.state = DispatcherState::Terminated;
            }
            Command::Run(op) => {
                actions::run_action(op, &self.session, &self.transport, &mut self.console);
            }
            Command::Unknown => {
                tracing::debug!(input = %input.trim(), "unknown command");
                self.console.show("** Unknown command, try again...");
            }
        }
        self.state
    }

    /// Run until the user ends the session.
    pub fn run(&mut self) {
        while self.step() == DispatcherState::AwaitingCommand {}
        self.console.show("\n** done **");
    }

    pub fn into_console(self) -> C {
        self.console
    }
}
