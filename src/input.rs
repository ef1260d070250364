use crate::commands::dispatcher::CommandDispatcher;
use crate::config::Config;
use crate::core::error::AssistantError;
use console::style;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::{self, MatchingBracketValidator, Validator};
use rustyline::{CompletionType, Config as LineConfig, Context, EditMode, Editor, Helper};
use std::borrow::Cow;

/// Completes slash commands from the dispatcher's registry and falls back
/// to filename completion for everything else.
pub struct CommandCompleter {
    filenames: FilenameCompleter,
    commands: CommandDispatcher,
}

impl CommandCompleter {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            filenames: FilenameCompleter::new(),
            commands,
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if line.starts_with('/') {
            let partial = &line[1..pos];
            let matches: Vec<Pair> = self
                .commands
                .command_names()
                .into_iter()
                .filter(|name| name.starts_with(partial))
                .map(|name| Pair {
                    display: format!("/{}", name),
                    replacement: name,
                })
                .collect();
            if !matches.is_empty() {
                return Ok((1, matches));
            }
        }
        self.filenames.complete(line, pos, ctx)
    }
}

/// Rustyline glue: completion, bracket highlighting, history hints and
/// bracket validation in one helper.
pub struct ChatHelper {
    completer: CommandCompleter,
    highlighter: MatchingBracketHighlighter,
    hinter: HistoryHinter,
    validator: MatchingBracketValidator,
}

impl ChatHelper {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            completer: CommandCompleter::new(commands),
            highlighter: MatchingBracketHighlighter::new(),
            hinter: HistoryHinter {},
            validator: MatchingBracketValidator::new(),
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }

    fn highlight_candidate<'c>(
        &self,
        candidate: &'c str,
        completion: rustyline::CompletionType,
    ) -> Cow<'c, str> {
        self.highlighter.highlight_candidate(candidate, completion)
    }
}

impl Validator for ChatHelper {
    fn validate(
        &self,
        ctx: &mut validate::ValidationContext,
    ) -> rustyline::Result<validate::ValidationResult> {
        self.validator.validate(ctx)
    }

    fn validate_while_typing(&self) -> bool {
        self.validator.validate_while_typing()
    }
}

pub type ChatEditor = Editor<ChatHelper, FileHistory>;

pub fn create_editor(commands: CommandDispatcher) -> Result<ChatEditor, AssistantError> {
    let config = LineConfig::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut editor = Editor::with_config(config)
        .map_err(|e| AssistantError::Input(format!("Failed to create line editor: {}", e)))?;
    editor.set_helper(Some(ChatHelper::new(commands)));

    let _ = editor.load_history(&Config::history_path());

    Ok(editor)
}

/// Reads one line. `None` means the user asked to leave (Ctrl-C/Ctrl-D).
pub fn read_input(editor: &mut ChatEditor) -> Result<Option<String>, AssistantError> {
    let prompt = if cfg!(windows) && std::env::var("PSModulePath").is_ok() {
        "> ".to_string()
    } else {
        style("> ").bold().cyan().to_string()
    };
    match editor.readline(&prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                if let Err(e) = editor.add_history_entry(&line) {
                    return Err(AssistantError::Input(format!(
                        "Failed to add history entry: {}",
                        e
                    )));
                }
            }
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(err) => Err(AssistantError::Input(format!("Input error: {}", err))),
    }
}

pub fn save_history(editor: &mut ChatEditor) -> Result<(), AssistantError> {
    let path = Config::history_path();
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    editor
        .save_history(&path)
        .map_err(|e| AssistantError::Input(format!("Failed to save history: {}", e)))
}
