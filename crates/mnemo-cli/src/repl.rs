//! REPL – Read-Eval-Print Loop for the Mnemo interactive shell.
//!
//! Supported commands:
//!   /help                    – show this list
//!   /session [id]            – show or switch the current session
//!   /user [id | -]           – show, set or clear the user id stamped on new episodes
//!   /importance [0..1 | -]   – show, set or clear the importance of new episodes
//!   /add <text>              – remember `text` (a line without a leading `/` does the same)
//!   /recall <query> [limit]  – most relevant episodes for the current user
//!   /sessions                – list known sessions
//!   /episodes [session]      – episodes of a session in arrival order
//!   /settings                – interactively edit `~/.mnemo/config.toml`
//!   /quit | /exit            – gracefully exit the CLI

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Runtime;

use mnemo_memory::{DEFAULT_LIMIT, DEFAULT_SESSION, EpisodicMemory, RetrieveFilter, ScoredHit};
use mnemo_runtime::config::{self, Config, EmbeddingProvider};
use mnemo_types::MemoryItem;

// ─────────────────────────────────────────────────────────────────────────────
// Command grammar
// ─────────────────────────────────────────────────────────────────────────────

/// Argument of a command that can show, set or clear a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<T> {
    Show,
    Set(T),
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Session(Option<String>),
    User(Setting<String>),
    Importance(Setting<f64>),
    Add(String),
    Recall { query: String, limit: usize },
    Sessions,
    Episodes(Option<String>),
    Settings,
    Quit,
}

/// Parse one input line.  Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Add(line.to_string())));
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let cmd = match name {
        "/help" => Command::Help,
        "/session" => Command::Session(arg),
        "/user" => Command::User(match rest {
            "" => Setting::Show,
            "-" => Setting::Clear,
            id => Setting::Set(id.to_string()),
        }),
        "/importance" => Command::Importance(match rest {
            "" => Setting::Show,
            "-" => Setting::Clear,
            raw => Setting::Set(parse_importance(raw)?),
        }),
        "/add" => match arg {
            Some(text) => Command::Add(text),
            None => return Err("Usage: /add <text>".into()),
        },
        "/recall" => parse_recall(rest)?,
        "/sessions" => Command::Sessions,
        "/episodes" => Command::Episodes(arg),
        "/settings" => Command::Settings,
        "/quit" | "/exit" => Command::Quit,
        other => {
            return Err(format!(
                "Unknown command: '{}'. Type /help for available commands.",
                other
            ));
        }
    };
    Ok(Some(cmd))
}

fn parse_importance(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(format!("'{}' is not an importance between 0 and 1", raw)),
    }
}

/// `<query> [limit]`: a trailing integer is the limit when a query remains.
fn parse_recall(rest: &str) -> Result<Command, String> {
    if rest.is_empty() {
        return Err("Usage: /recall <query> [limit]".into());
    }
    if let Some((query, last)) = rest.rsplit_once(char::is_whitespace)
        && let Ok(limit) = last.parse::<usize>()
    {
        return Ok(Command::Recall {
            query: query.trim().to_string(),
            limit,
        });
    }
    Ok(Command::Recall {
        query: rest.to_string(),
        limit: DEFAULT_LIMIT,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell state
// ─────────────────────────────────────────────────────────────────────────────

/// Values stamped on every episode added from the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub session: String,
    pub user: Option<String>,
    pub importance: Option<f64>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            session: DEFAULT_SESSION.to_string(),
            user: None,
            importance: None,
        }
    }
}

impl Context {
    /// Memory item for `text` under a fresh id.
    pub fn item(&self, text: &str) -> MemoryItem {
        let mut item =
            MemoryItem::new(uuid::Uuid::new_v4().to_string(), text).with_session(&self.session);
        if let Some(user) = &self.user {
            item = item.with_user(user);
        }
        if let Some(importance) = self.importance {
            item = item.with_importance(importance);
        }
        item
    }

    /// Retrieval filter scoping recall to the current user.
    pub fn filter(&self) -> RetrieveFilter {
        match &self.user {
            Some(user) => RetrieveFilter::new().for_user(user.as_str()),
            None => RetrieveFilter::new(),
        }
    }
}

struct Shell<'a> {
    rt: &'a Runtime,
    memory: &'a EpisodicMemory,
    ctx: Context,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(rt: &Runtime, memory: &EpisodicMemory, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };
    let mut shell = Shell {
        rt,
        memory,
        ctx: Context::default(),
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let prompt = format!("{} ", format!("mnemo[{}]>", shell.ctx.session).bold().cyan());
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Type /quit to exit.".dimmed());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(Some(Command::Settings)) => cmd_settings(&mut editor),
            Ok(Some(cmd)) => shell.execute(cmd),
            Err(msg) => println!("{}", msg.red()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

impl Shell<'_> {
    fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Help => cmd_help(),
            Command::Session(None) => println!("  Current session: {}", self.ctx.session.bold()),
            Command::Session(Some(id)) => {
                println!("{} {}", "✓ Session set to".green(), id.bold());
                self.ctx.session = id;
            }
            Command::User(Setting::Show) => match &self.ctx.user {
                Some(user) => println!("  Current user: {}", user.bold()),
                None => println!("  No user set; episodes are stored without user_id."),
            },
            Command::User(Setting::Set(user)) => {
                println!("{} {}", "✓ User set to".green(), user.bold());
                self.ctx.user = Some(user);
            }
            Command::User(Setting::Clear) => {
                self.ctx.user = None;
                println!("{}", "✓ User cleared".green());
            }
            Command::Importance(Setting::Show) => match self.ctx.importance {
                Some(v) => println!("  Importance of new episodes: {}", format!("{v:.2}").bold()),
                None => println!("  Importance not set; recall treats new episodes as 0.50."),
            },
            Command::Importance(Setting::Set(v)) => {
                self.ctx.importance = Some(v);
                println!("{} {:.2}", "✓ Importance set to".green(), v);
            }
            Command::Importance(Setting::Clear) => {
                self.ctx.importance = None;
                println!("{}", "✓ Importance cleared".green());
            }
            Command::Add(text) => self.cmd_add(&text),
            Command::Recall { query, limit } => self.cmd_recall(&query, limit),
            Command::Sessions => self.cmd_sessions(),
            Command::Episodes(session) => {
                let session = session.unwrap_or_else(|| self.ctx.session.clone());
                self.cmd_episodes(&session);
            }
            // Handled by the loop, which owns the line editor.
            Command::Settings | Command::Quit => {}
        }
    }

    fn cmd_add(&self, text: &str) {
        match self.rt.block_on(self.memory.add(self.ctx.item(text))) {
            Ok(id) => println!(
                "{} {}",
                "✓ Remembered".green(),
                id.chars().take(8).collect::<String>().dimmed()
            ),
            Err(e) => println!("{}: {}", "Failed to remember".red(), e),
        }
    }

    fn cmd_recall(&self, query: &str, limit: usize) {
        let filter = self.ctx.filter();
        let hits = match self.rt.block_on(self.memory.retrieve_scored(query, limit, &filter)) {
            Ok(hits) => hits,
            Err(e) => {
                println!("{}: {}", "Recall failed".red(), e);
                return;
            }
        };
        if hits.is_empty() {
            println!("  {}", "Nothing comes to mind.".dimmed());
            return;
        }
        for (rank, hit) in hits.iter().enumerate() {
            print_hit(rank + 1, hit);
        }
    }

    fn cmd_sessions(&self) {
        let sessions = self.memory.sessions();
        if sessions.is_empty() {
            println!("  {}", "No sessions yet.".dimmed());
            return;
        }
        println!("{}", "Sessions".bold().underline());
        for s in &sessions {
            let marker = if *s == self.ctx.session { "▶" } else { " " };
            let count = self.memory.episodes_for(s).len();
            println!("  {} {} {}", marker.green(), s.bold(), format!("({count})").dimmed());
        }
    }

    fn cmd_episodes(&self, session: &str) {
        match self.rt.block_on(self.memory.session_episodes(session)) {
            Ok(episodes) if episodes.is_empty() => {
                println!("  {} '{}'", "No episodes in session".dimmed(), session)
            }
            Ok(episodes) => {
                println!("{} {}", "Episodes in".bold().underline(), session.bold());
                for ep in &episodes {
                    println!(
                        "  {}  {}",
                        ep.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                        ep.content
                    );
                }
            }
            Err(e) => println!("{}: {}", "Failed to list episodes".red(), e),
        }
    }
}

fn print_hit(rank: usize, hit: &ScoredHit) {
    let session = hit
        .payload
        .metadata
        .get("session_id")
        .map(ToString::to_string)
        .unwrap_or_default();
    println!(
        "  {}. {}  {}",
        rank,
        format!("{:.3}", hit.final_score).yellow(),
        hit.payload.content
    );
    println!(
        "     {}",
        format!(
            "sim {:.2} · rec {:.2} · imp {:.2} · {} · {}",
            hit.similarity,
            hit.recency,
            hit.importance,
            session,
            hit.payload.timestamp.format("%Y-%m-%d %H:%M")
        )
        .dimmed()
    );
}

fn cmd_help() {
    println!();
    println!("{}", "Mnemo Commands".bold().underline());
    println!("  {}        – show or switch the current session", "/session [id]".bold().cyan());
    println!("  {}         – show, set or clear the user id", "/user [id|-]".bold().cyan());
    println!("  {}  – importance of new episodes", "/importance [0..1|-]".bold().cyan());
    println!("  {}           – remember text (or just type it)", "/add <text>".bold().cyan());
    println!("  {} – most relevant episodes", "/recall <query> [limit]".bold().cyan());
    println!("  {}              – list known sessions", "/sessions".bold().cyan());
    println!("  {}   – episodes of a session", "/episodes [session]".bold().cyan());
    println!("  {}              – edit ~/.mnemo/config.toml", "/settings".bold().cyan());
    println!("  {}           – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_settings(editor: &mut DefaultEditor) {
    let mut cfg = load_config_or_default();

    println!("{}", "Settings Editor".bold().underline());
    println!("  {}", "Enter keeps the shown value; '-' clears an optional one.".dimmed());

    let provider = prompt_str(editor, "  Embedding provider (ollama / hash): ", &cfg.embedding_provider.to_string());
    match provider.parse::<EmbeddingProvider>() {
        Ok(p) => cfg.embedding_provider = p,
        Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.embedding_provider),
    }
    if cfg.embedding_provider == EmbeddingProvider::Ollama {
        cfg.embedding_url = prompt_str(editor, "  Ollama URL: ", &cfg.embedding_url);
        cfg.embedding_model = prompt_str(editor, "  Embedding model: ", &cfg.embedding_model);
        let fallback = prompt_str(editor, "  Fallback model: ", cfg.fallback_model.as_deref().unwrap_or("-"));
        cfg.fallback_model = (fallback != "-").then_some(fallback);
    }

    let url = prompt_str(editor, "  Qdrant URL ('-' = in-process): ", or_dash(&cfg.vector_url));
    cfg.vector_url = if url == "-" { String::new() } else { url };
    if !cfg.vector_url.is_empty() {
        cfg.collection = prompt_str(editor, "  Collection: ", &cfg.collection);
    }

    let db = prompt_str(editor, "  Database path: ", &cfg.database_path.display().to_string());
    cfg.database_path = db.into();

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold(),
            "(restart mnemo to apply)".dimmed()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_config_or_default() -> Config {
    match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {} – using defaults", "Config error".red(), e);
            Config::default()
        }
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Prompt with `default` pre-filled.  Returns `default` on an empty answer
/// or when input is interrupted.
fn prompt_str(editor: &mut DefaultEditor, msg: &str, default: &str) -> String {
    match editor.readline_with_initial(msg, (default, "")) {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_memory::{HashEmbedder, InMemoryVectorIndex, SqliteDocumentStore};
    use mnemo_types::MetaValue;

    // ── parse ──

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn plain_text_is_added() {
        assert_eq!(
            parse("  had lunch with Bob "),
            Ok(Some(Command::Add("had lunch with Bob".into())))
        );
    }

    #[test]
    fn recall_takes_trailing_limit() {
        assert_eq!(
            parse("/recall lunch with Bob 3"),
            Ok(Some(Command::Recall { query: "lunch with Bob".into(), limit: 3 }))
        );
        assert_eq!(
            parse("/recall lunch"),
            Ok(Some(Command::Recall { query: "lunch".into(), limit: DEFAULT_LIMIT }))
        );
        // A lone number is the query, not the limit.
        assert_eq!(
            parse("/recall 2024"),
            Ok(Some(Command::Recall { query: "2024".into(), limit: DEFAULT_LIMIT }))
        );
        assert!(parse("/recall").is_err());
    }

    #[test]
    fn importance_must_lie_in_unit_interval() {
        assert_eq!(parse("/importance 0.9"), Ok(Some(Command::Importance(Setting::Set(0.9)))));
        assert_eq!(parse("/importance -"), Ok(Some(Command::Importance(Setting::Clear))));
        assert_eq!(parse("/importance"), Ok(Some(Command::Importance(Setting::Show))));
        assert!(parse("/importance 1.5").is_err());
        assert!(parse("/importance high").is_err());
    }

    #[test]
    fn user_and_session_arguments() {
        assert_eq!(parse("/user alice"), Ok(Some(Command::User(Setting::Set("alice".into())))));
        assert_eq!(parse("/user -"), Ok(Some(Command::User(Setting::Clear))));
        assert_eq!(parse("/session work"), Ok(Some(Command::Session(Some("work".into())))));
        assert_eq!(parse("/episodes"), Ok(Some(Command::Episodes(None))));
    }

    #[test]
    fn unknown_and_incomplete_commands_are_errors() {
        assert!(parse("/frobnicate").is_err());
        assert!(parse("/add").is_err());
        assert_eq!(parse("/exit"), Ok(Some(Command::Quit)));
    }

    // ── context ──

    #[test]
    fn item_carries_session_user_and_importance() {
        let ctx = Context {
            session: "work".into(),
            user: Some("alice".into()),
            importance: Some(0.9),
        };
        let item = ctx.item("standup moved to 10am");
        assert_eq!(item.session_id(), Some("work"));
        assert_eq!(item.metadata.get("user_id"), Some(&MetaValue::from("alice")));
        assert_eq!(item.metadata.get("importance"), Some(&MetaValue::Float(0.9)));
        assert!(item.timestamp.is_some());
        assert_ne!(ctx.item("x").id, ctx.item("x").id);
    }

    #[test]
    fn default_context_has_no_user_filter() {
        let ctx = Context::default();
        assert_eq!(ctx.session, DEFAULT_SESSION);
        assert!(ctx.filter().is_empty());
        assert!(!ctx.item("x").metadata.contains_key("user_id"));
    }

    // ── shell ──

    #[test]
    fn shell_add_and_switch_session() {
        let rt = Runtime::new().unwrap();
        let memory = EpisodicMemory::new(
            Arc::new(SqliteDocumentStore::open_in_memory().unwrap()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(HashEmbedder::default()),
        );
        let mut shell = Shell { rt: &rt, memory: &memory, ctx: Context::default() };

        shell.execute(Command::Add("first thought".into()));
        shell.execute(Command::Session(Some("work".into())));
        shell.execute(Command::Add("second thought".into()));
        shell.execute(Command::Add("third thought".into()));

        assert_eq!(memory.sessions(), vec!["default".to_string(), "work".to_string()]);
        assert_eq!(memory.episodes_for("work").len(), 2);
        assert_eq!(shell.ctx.session, "work");
    }
}
