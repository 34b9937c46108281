//! `mnemo-cli` – Mnemo Command Line Interface
//!
//! Interactive front end to the episodic memory.  It:
//!
//! 1. Checks for `~/.mnemo/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Probes the local Ollama instance when it is the embedding provider and
//!    reports whether the embedding model is pulled.
//! 3. Opens the memory (SQLite document store, vector index, embedder chain)
//!    on a Tokio runtime.
//! 4. Drops the user into an **interactive REPL** where plain lines are
//!    remembered and `/recall` searches them (`/help` lists every command).
//! 5. Intercepts **Ctrl-C** outside the prompt to stop after the current
//!    command.

mod ollama;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use mnemo_runtime::config::{self, Config, EmbeddingProvider};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); MNEMO_LOG_FORMAT=json switches to
    // newline-delimited JSON; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    // User-facing output still uses println!.
    let _telemetry = mnemo_runtime::init_tracing("mnemo");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing the current command …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    // ── Ollama discovery ──────────────────────────────────────────────────
    if cfg.embedding_provider == EmbeddingProvider::Ollama {
        probe_ollama(&cfg);
    }

    // ── Memory ────────────────────────────────────────────────────────────
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    print!("  Opening memory at {} … ", cfg.database_path.display().to_string().dimmed());
    flush();
    let memory = match rt.block_on(mnemo_runtime::open_memory(&cfg)) {
        Ok(memory) => {
            println!("{} ({} session(s))", "OK".green(), memory.sessions().len());
            memory
        }
        Err(e) => {
            println!("{}: {}", "FAILED".red(), e);
            std::process::exit(1);
        }
    };
    let index = if cfg.vector_url.is_empty() {
        "in-process".to_string()
    } else {
        format!("Qdrant {} / {}", cfg.vector_url, cfg.collection)
    };
    println!("  Vector index: {}", index.bold());

    println!();
    println!(
        "  Type anything to remember it, or {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, &memory, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Mnemo First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Mnemo.\n");

    let mut cfg = Config::default();

    println!("  How should episodes be embedded?");
    println!("    1) Local model via Ollama  (default)");
    println!("    2) Built-in hashing embedder  (offline, no model needed)");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.embedding_provider = match choice.trim() {
        "2" => EmbeddingProvider::Hash,
        _ => EmbeddingProvider::Ollama,
    };
    if cfg.embedding_provider == EmbeddingProvider::Ollama {
        cfg.embedding_model = prompt_line(
            &format!("  Embedding model [{}]: ", cfg.embedding_model),
            &cfg.embedding_model,
        );
    }

    cfg.vector_url = prompt_line("  Qdrant URL (empty = in-process index) []: ", "");
    if !cfg.vector_url.is_empty() {
        cfg.collection = prompt_line(
            &format!("  Collection [{}]: ", cfg.collection),
            &cfg.collection,
        );
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn probe_ollama(cfg: &Config) {
    print!("\n  Probing Ollama at {} … ", cfg.embedding_url.dimmed());
    flush();
    match ollama::fetch_models(&cfg.embedding_url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for wanted in std::iter::once(&cfg.embedding_model).chain(cfg.fallback_model.as_ref()) {
                if ollama::has_model(&models, wanted) {
                    println!("    {} {}", "✓".green(), wanted.bold());
                } else {
                    println!(
                        "    {} {} – run `{}`",
                        "✗".red(),
                        wanted.bold(),
                        format!("ollama pull {wanted}").bold()
                    );
                }
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Run `{}`, or switch to the hash embedder in {}.",
                "Episodes cannot be embedded.".dimmed(),
                "ollama serve".bold(),
                "/settings".bold()
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___                      "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  ___ __ _  ___     "#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ -_)  ' \/ _ \    "#.bold().cyan());
    println!("{}", r#"/_/  /_/_//_/\__/_/_/_/\___/    "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Mnemo".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Episodic memory with semantic recall");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn flush() {
    use std::io::Write;
    std::io::stdout().flush().ok();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::BufRead;
    print!("{}", msg);
    flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
