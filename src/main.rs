use std::io::ErrorKind;

use anyhow::{Context, Result};
use chrono::Utc;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use issue_ql::config::{ConfigError, QueryConfig};
use issue_ql::sql_translator::SqlTranslator;
use issue_ql::{lexer, parser, EvaluationContext, QueryCompiler};

const DEFAULT_CONFIG: &str = "issue_ql.json";
const DEFAULT_USER: &str = "anonymous";

const HELP: &str = "\
Enter a query to compile it, for example:
  status = Open AND assignee = currentUser() ORDER BY updated DESC

Commands:
  :tokens <query>   show the token stream
  :ast <query>      show the syntax tree
  :fields           list queryable fields
  :help             show this message
  :quit             exit";

/// Loads the config named by `ISSUE_QL_CONFIG`. A missing default file means
/// built-in defaults; any other failure is an error.
fn load_config() -> Result<QueryConfig> {
    let explicit = std::env::var("ISSUE_QL_CONFIG").ok();
    let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    match QueryConfig::from_json_file(&path) {
        Ok(config) => {
            info!(
                path = %path,
                fields = config.fields.len(),
                table = %config.table,
                "loaded config"
            );
            Ok(config)
        }
        Err(ConfigError::Io { source, .. })
            if explicit.is_none() && source.kind() == ErrorKind::NotFound =>
        {
            info!(path = %path, "no config file, using defaults");
            Ok(QueryConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("loading {path}")),
    }
}

struct Session {
    compiler: QueryCompiler,
    translator: SqlTranslator,
    user: String,
}

impl Session {
    fn handle(&self, line: &str) -> Result<()> {
        if let Some(rest) = line.strip_prefix(":tokens") {
            self.show_tokens(rest.trim());
        } else if let Some(rest) = line.strip_prefix(":ast") {
            self.show_ast(rest.trim());
        } else if line == ":fields" {
            self.show_fields();
        } else if line == ":help" {
            println!("{HELP}");
        } else {
            self.compile(line)?;
        }
        Ok(())
    }

    fn compile(&self, text: &str) -> Result<()> {
        let ctx = EvaluationContext::new(self.user.clone(), Utc::now());
        match self.compiler.compile(text, &ctx) {
            Ok(compiled) => {
                println!("{}", serde_json::to_string_pretty(&compiled)?);
                let result = self.translator.translate(&compiled);
                println!("\n{}", result.sql);
                for optimization in &result.optimizations {
                    println!("  applied: {optimization:?}");
                }
            }
            Err(e) => {
                warn!(code = e.code(), "query rejected");
                println!("{}", e.render(text));
            }
        }
        Ok(())
    }

    fn show_tokens(&self, text: &str) {
        match lexer::tokenize(text) {
            Ok(tokens) => {
                for token in tokens {
                    println!("{:>4}..{:<4} {:?}", token.span.start, token.span.end, token.kind);
                }
            }
            Err(e) => println!("{}", issue_ql::QueryError::from(e).render(text)),
        }
    }

    fn show_ast(&self, text: &str) {
        let parsed = lexer::tokenize(text)
            .map_err(issue_ql::QueryError::from)
            .and_then(|tokens| parser::parse(&tokens).map_err(issue_ql::QueryError::from));
        match parsed {
            Ok(query) => println!("{query:#?}"),
            Err(e) => println!("{}", e.render(text)),
        }
    }

    fn show_fields(&self) {
        for field in self.compiler.registry().fields() {
            let aliases = if field.aliases.is_empty() {
                String::new()
            } else {
                format!(" ({})", field.aliases.join(", "))
            };
            let order = if field.orderable { "" } else { ", not orderable" };
            println!("  {}{aliases}: {}{order}", field.canonical_name, field.value_type);
        }
    }
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let config = load_config()?;
    let session = Session {
        compiler: QueryCompiler::from_config(&config)?,
        translator: SqlTranslator::from_config(config),
        user: std::env::var("ISSUE_QL_USER").unwrap_or_else(|_| DEFAULT_USER.to_string()),
    };

    // One-shot mode: compile the arguments and exit.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return session.handle(&args.join(" "));
    }

    println!("issue-ql (user '{}'), :help for commands", session.user);
    let mut editor = DefaultEditor::new().context("initialising line editor")?;
    loop {
        match editor.readline("iql> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line == ":quit" || line == ":q" {
                    break;
                }
                session.handle(line)?;
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
