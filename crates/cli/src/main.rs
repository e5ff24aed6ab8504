mod config;
mod error;

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use conversation::{
    ChatTurn, Conversation, ErrorKind, ModelReply, OutlineSection, OutlineTemplate, SystemPrompt,
    TEMPLATES, draft_request, find_template, outline_markdown, qa_pairs, truncate_chars,
};
use storage::{Notebook, SessionId, SessionSummary, StoredNote};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "threadball.toml";
const LOG_ENV: &str = "THREADBALL_LOG";
const NEW_SESSION_TITLE: &str = "New conversation";
const TITLE_CHARS: usize = 40;

#[derive(Parser)]
#[command(name = "threadball")]
#[command(about = "Talk an article idea into shape, one question at a time", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new brainstorming session or resume one
    Chat {
        /// Session ID to resume (prefix match supported)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// List sessions, most recently updated first
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print a session's transcript, note cards and draft outline
    Show {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
    },
    /// List the built-in outline templates
    Templates,
    /// Generate a draft outline from a session's notes
    Outline {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Template ID
        #[arg(short, long, default_value = "classic-5-step")]
        template: String,
    },
    /// Print a session's draft outline as Markdown
    Export {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
    },
    /// Delete a session and everything recorded for it
    Delete {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        if let Error::Conversation(e) = &e {
            print_hint(e);
        }
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Chat { session }) => cmd_chat(&cli.config, session.as_deref()).await,
        None => cmd_chat(&cli.config, None).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
        Some(Commands::Show { session }) => cmd_show(&session),
        Some(Commands::Templates) => {
            print_templates();
            Ok(())
        }
        Some(Commands::Outline { session, template }) => {
            cmd_outline(&cli.config, &session, &template).await
        }
        Some(Commands::Export { session }) => cmd_export(&session),
        Some(Commands::Delete { session }) => cmd_delete(&session),
    }
}

fn load_conversation(config_path: &Path) -> Result<Conversation> {
    let config = Config::load_or_default(config_path)?.with_process_env();
    let provider = config.provider()?;
    tracing::info!(provider = %provider.kind(), model = provider.model(), "provider configured");
    Ok(Conversation::from_config(provider, SystemPrompt::default()))
}

// ─────────────────────────────────────────────────────────────────────────────
// chat
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory view of the session being chatted in.
struct ChatState {
    id: SessionId,
    turns: Vec<ChatTurn>,
    options: Option<Vec<String>>,
    template: &'static OutlineTemplate,
}

impl ChatState {
    fn has_user_turn(&self) -> bool {
        self.turns.iter().any(|t| t.role == conversation::Role::User)
    }
}

async fn cmd_chat(config_path: &Path, resume: Option<&str>) -> Result<()> {
    println!("threadball v{}", env!("CARGO_PKG_VERSION"));

    let conv = load_conversation(config_path)?;

    let data_dir = dirs_data_dir().unwrap_or_else(|| ".threadball".into());
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("threadball.db");
    let notebook = Notebook::open(&db_path)?;
    println!("Notebook: {}", db_path.display());

    let mut state = match resume {
        Some(prefix) => resume_session(&notebook, prefix)?,
        None => start_session(&conv, &notebook).await?,
    };

    println!("Session ID: {}", state.id);
    println!("Model: {}", conv.backend());
    println!("Type /help for commands, 'quit' or Ctrl+D to exit.\n");

    if let Some(last) = state.turns.last() {
        print_reply(&last.text, state.options.as_deref());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        if let Some(command) = input.strip_prefix('/') {
            if let Err(e) = run_command(command, &conv, &notebook, &mut state).await {
                report(&e);
            }
            continue;
        }

        let message = pick_option(input, state.options.as_deref()).unwrap_or(input).to_string();
        if let Err(e) = exchange(&conv, &notebook, &mut state, &message).await {
            report(&e);
        }
    }

    println!("\nSession saved. Resume with: threadball chat --session {}", short_id(state.id));
    Ok(())
}

async fn start_session(conv: &Conversation, notebook: &Notebook) -> Result<ChatState> {
    let opening = conv.open().await?;
    let id = notebook.create_session(NEW_SESSION_TITLE)?;
    let turn = ChatTurn::model(opening.text);
    notebook.append_turn(id, &turn, opening.options.as_deref())?;

    Ok(ChatState {
        id,
        turns: vec![turn],
        options: opening.options,
        template: default_template(),
    })
}

fn resume_session(notebook: &Notebook, prefix: &str) -> Result<ChatState> {
    let summary = resolve_session(notebook, prefix)?;
    let stored = notebook.load_turns(summary.id)?;
    let options = stored.last().and_then(|t| t.options.clone());
    let template = notebook
        .load_outline(summary.id)?
        .and_then(|draft| find_template(&draft.template_id))
        .unwrap_or_else(default_template);

    println!("Resuming \"{}\" ({} turns)", summary.title, stored.len());
    Ok(ChatState {
        id: summary.id,
        turns: stored.into_iter().map(|t| t.turn).collect(),
        options,
        template,
    })
}

/// Send one user message and record both sides.
///
/// Nothing is stored when the model call fails, so the user can retry.
async fn exchange(
    conv: &Conversation,
    notebook: &Notebook,
    state: &mut ChatState,
    message: &str,
) -> Result<()> {
    let reply = conv.send(&state.turns, message).await?;
    let first_message = !state.has_user_turn();

    let user = ChatTurn::user(message);
    let model = ChatTurn::model(reply.text.clone());
    notebook.append_exchange(state.id, &user, &model, reply.options.as_deref())?;

    if first_message {
        notebook.rename_session(state.id, &truncate_chars(message, TITLE_CHARS))?;
    }

    state.turns.push(user);
    state.turns.push(model);
    print_model_reply(&reply);
    state.options = reply.options;
    Ok(())
}

async fn run_command(
    command: &str,
    conv: &Conversation,
    notebook: &Notebook,
    state: &mut ChatState,
) -> Result<()> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "help" => print_help(),
        "notes" => {
            let added = harvest_missing(conv, notebook, state.id, &state.turns).await?;
            let notes = notebook.load_note_cards(state.id)?;
            println!("\n{} note card(s), {added} new\n", notes.len());
            print_notes(&notes);
        }
        "edit" => edit_note(notebook, state, arg)?,
        "template" if arg.is_empty() => {
            println!("\nCurrent template: {} ({})\n", state.template.name, state.template.id);
            print_templates();
        }
        "template" => {
            state.template = find_template(arg).ok_or_else(|| Error::UnknownTemplate {
                id: arg.to_string(),
            })?;
            notebook.save_outline(state.id, state.template.id, &state.template.sections())?;
            println!("\nTemplate set to {}. Draft outline reset.\n", state.template.name);
        }
        "outline" if arg == "clear" => {
            if notebook.clear_outline(state.id)? {
                println!("\nDraft outline cleared.\n");
            } else {
                println!("\nNo draft outline to clear.\n");
            }
        }
        "outline" => {
            let sections = build_outline(conv, notebook, state.id, &state.turns, state.template).await?;
            if let Some(sections) = sections {
                print_outline(&sections);
            }
        }
        "export" => match saved_outline(notebook, state.id)? {
            Some(sections) => println!("\n{}\n", outline_markdown(&sections)),
            None => println!("\nNo draft outline yet. Try /outline first.\n"),
        },
        "draft" => match saved_outline(notebook, state.id)? {
            Some(sections) => {
                let request = draft_request(&outline_markdown(&sections));
                exchange(conv, notebook, state, &request).await?;
            }
            None => println!("\nNo draft outline yet. Try /outline first.\n"),
        },
        other => println!("\nUnknown command '/{other}'. Type /help.\n"),
    }
    Ok(())
}

/// Rewrite the answer of the 1-based note `n` given as `"<n> <new answer>"`.
fn edit_note(notebook: &Notebook, state: &mut ChatState, arg: &str) -> Result<()> {
    let usage = || Error::Usage("usage: /edit <note number> <new answer>".into());
    let (n, answer) = arg.split_once(char::is_whitespace).ok_or_else(usage)?;
    let answer = answer.trim();
    let n: usize = n.parse().map_err(|_| usage())?;
    if answer.is_empty() {
        return Err(usage());
    }

    let notes = notebook.load_note_cards(state.id)?;
    let note = n
        .checked_sub(1)
        .and_then(|i| notes.get(i))
        .ok_or_else(|| Error::Usage(format!("no note {n}; there are {}", notes.len())))?;

    notebook.update_note_answer(state.id, note.answer_seq, answer)?;
    if let Some(turn) = state.turns.get_mut(note.answer_seq) {
        turn.text = answer.to_string();
    }
    println!("\nNote {n} updated.\n");
    Ok(())
}

/// Resolve a 1-based option number against the options on screen.
fn pick_option<'a>(input: &str, options: Option<&'a [String]>) -> Option<&'a str> {
    let n: usize = input.parse().ok()?;
    let options = options?;
    n.checked_sub(1)
        .and_then(|i| options.get(i))
        .map(String::as_str)
}

// ─────────────────────────────────────────────────────────────────────────────
// notes & outlines
// ─────────────────────────────────────────────────────────────────────────────

/// Summarize every answered question that has no note card yet.
///
/// Returns the number of cards added.
async fn harvest_missing(
    conv: &Conversation,
    notebook: &Notebook,
    id: SessionId,
    turns: &[ChatTurn],
) -> Result<usize> {
    let known: HashSet<usize> = notebook
        .load_note_cards(id)?
        .into_iter()
        .map(|n| n.answer_seq)
        .collect();
    let pending: Vec<_> = qa_pairs(turns)
        .into_iter()
        .filter(|pair| !known.contains(&pair.answer_index))
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    println!("\nSummarizing {} answer(s)...", pending.len());
    let cards = conv.harvest_notes(&pending).await;

    let mut added = 0;
    for (pair, card) in pending.iter().zip(&cards) {
        if notebook.add_note_card(id, pair.answer_index, card)? {
            added += 1;
        }
    }
    Ok(added)
}

/// Harvest notes, then fill `template` from them and save the draft.
///
/// Returns `None` when the session has no notes to work from.
async fn build_outline(
    conv: &Conversation,
    notebook: &Notebook,
    id: SessionId,
    turns: &[ChatTurn],
    template: &OutlineTemplate,
) -> Result<Option<Vec<OutlineSection>>> {
    harvest_missing(conv, notebook, id, turns).await?;
    let notes: Vec<_> = notebook
        .load_note_cards(id)?
        .into_iter()
        .map(|n| n.card)
        .collect();
    if notes.is_empty() {
        println!("\nNo answered questions yet. Keep talking, then try again.\n");
        return Ok(None);
    }

    println!("Drafting a {} outline from {} note(s)...", template.name, notes.len());
    let sections = conv.generate_outline(&template.sections(), &notes).await?;
    notebook.save_outline(id, template.id, &sections)?;
    Ok(Some(sections))
}

/// The saved draft outline, if it has any sections.
fn saved_outline(notebook: &Notebook, id: SessionId) -> Result<Option<Vec<OutlineSection>>> {
    Ok(notebook
        .load_outline(id)?
        .map(|draft| draft.sections)
        .filter(|sections| !sections.is_empty()))
}

fn default_template() -> &'static OutlineTemplate {
    &TEMPLATES[0]
}

// ─────────────────────────────────────────────────────────────────────────────
// other commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_sessions(limit: usize) -> Result<()> {
    let notebook = open_notebook()?;
    let sessions = notebook.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<5}  {:<5}  TITLE",
        "SESSION ID", "UPDATED", "TURNS", "NOTES"
    );
    println!("{}", "-".repeat(100));

    for summary in sessions.into_iter().take(limit) {
        let updated = Local
            .from_utc_datetime(&summary.updated_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        println!(
            "{:<36}  {:<16}  {:<5}  {:<5}  {}",
            summary.id, updated, summary.turn_count, summary.note_count, summary.title
        );
    }

    Ok(())
}

fn cmd_show(prefix: &str) -> Result<()> {
    let notebook = open_notebook()?;
    let summary = resolve_session(&notebook, prefix)?;

    println!("Session: {}", summary.id);
    println!("Title: {}\n", summary.title);

    for stored in notebook.load_turns(summary.id)? {
        let time = Local
            .from_utc_datetime(&stored.timestamp.naive_utc())
            .format("%H:%M:%S");
        let role = match stored.turn.role {
            conversation::Role::User => "YOU",
            conversation::Role::Model => "THREADBALL",
        };
        println!("[{time}] {role}: {}", stored.turn.text);
        if let Some(options) = &stored.options {
            println!("           options: {}", options.join(" | "));
        }
    }

    let notes = notebook.load_note_cards(summary.id)?;
    if !notes.is_empty() {
        println!("\n=== Notes ===\n");
        print_notes(&notes);
    }

    if let Some(draft) = notebook.load_outline(summary.id)? {
        println!("=== Outline ({}) ===", draft.template_id);
        print_outline(&draft.sections);
    }

    Ok(())
}

async fn cmd_outline(config_path: &Path, prefix: &str, template_id: &str) -> Result<()> {
    let template = find_template(template_id).ok_or_else(|| Error::UnknownTemplate {
        id: template_id.to_string(),
    })?;
    let notebook = open_notebook()?;
    let summary = resolve_session(&notebook, prefix)?;
    let conv = load_conversation(config_path)?;

    let turns: Vec<_> = notebook
        .load_turns(summary.id)?
        .into_iter()
        .map(|t| t.turn)
        .collect();
    if let Some(sections) = build_outline(&conv, &notebook, summary.id, &turns, template).await? {
        print_outline(&sections);
    }
    Ok(())
}

fn cmd_export(prefix: &str) -> Result<()> {
    let notebook = open_notebook()?;
    let summary = resolve_session(&notebook, prefix)?;
    match saved_outline(&notebook, summary.id)? {
        Some(sections) => println!("{}", outline_markdown(&sections)),
        None => println!("No draft outline for session {}", summary.id),
    }
    Ok(())
}

fn cmd_delete(prefix: &str) -> Result<()> {
    let notebook = open_notebook()?;
    let summary = resolve_session(&notebook, prefix)?;
    notebook.delete_session(summary.id)?;
    println!("Deleted session {} ({})", summary.id, summary.title);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// output
// ─────────────────────────────────────────────────────────────────────────────

fn print_model_reply(reply: &ModelReply) {
    print_reply(&reply.text, reply.options.as_deref());
}

fn print_reply(text: &str, options: Option<&[String]>) {
    println!("\n{text}\n");
    if let Some(options) = options {
        for (i, option) in options.iter().enumerate() {
            println!("  [{}] {option}", i + 1);
        }
        println!();
    }
}

fn print_notes(notes: &[StoredNote]) {
    for (i, note) in notes.iter().enumerate() {
        println!("[{}] Q: {}", i + 1, note.card.question_summary);
        println!("    A: {}\n", note.card.answer_summary);
    }
}

fn print_outline(sections: &[OutlineSection]) {
    println!();
    for section in sections {
        println!("{}", section.title);
        println!("  {}\n", section.content);
    }
}

fn print_templates() {
    for template in TEMPLATES {
        println!("{:<16}  {}", template.id, template.name);
        println!("{:<16}  {}\n", "", template.description);
    }
}

fn print_help() {
    println!(
        "
  <text>            reply to Threadball
  <number>          pick one of the suggested replies
  /notes            summarize answered questions into note cards
  /edit <n> <text>  replace the answer of note n
  /template [id]    show or switch the outline template (resets the draft)
  /outline          draft an outline from the notes
  /outline clear    drop the draft outline
  /export           print the draft outline as Markdown
  /draft            ask Threadball to write an article from the outline
  /help             show this help
  quit, exit        leave (the session is saved)
"
    );
}

fn report(e: &Error) {
    eprintln!("Error: {e}\n");
    if let Error::Conversation(e) = e {
        print_hint(e);
    }
}

fn print_hint(e: &conversation::Error) {
    if e.needs_credentials() {
        eprintln!(
            "Hint: check api_key under [provider] in {CONFIG_FILE}, or set {}.",
            config::API_KEY_VAR
        );
        return;
    }
    match e.kind() {
        ErrorKind::NetworkUnreachable => {
            eprintln!("Hint: check your network connection and base_url in {CONFIG_FILE}.")
        }
        ErrorKind::EndpointOrModelNotFound => {
            eprintln!("Hint: check base_url and model under [provider] in {CONFIG_FILE}.")
        }
        ErrorKind::QuotaExceeded => eprintln!("Hint: the provider quota is used up; try again later."),
        _ => {}
    }
}

fn short_id(id: SessionId) -> String {
    id.to_string().chars().take(8).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// notebook location
// ─────────────────────────────────────────────────────────────────────────────

fn open_notebook() -> Result<Notebook> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".threadball".into());
    let db_path = data_dir.join("threadball.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(Notebook::open(&db_path)?)
}

fn resolve_session(notebook: &Notebook, prefix: &str) -> Result<SessionSummary> {
    let mut matching = notebook.sessions_matching(prefix)?;

    match matching.len() {
        0 => Err(Error::SessionNotFound {
            prefix: prefix.to_string(),
        }),
        1 => Ok(matching.remove(0)),
        _ => Err(Error::AmbiguousSession {
            prefix: prefix.to_string(),
            matches: matching.iter().map(|s| s.id.to_string()).collect(),
        }),
    }
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/threadball"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("threadball"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("threadball"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
