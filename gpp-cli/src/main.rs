//! CLI entry point for gpp

mod render;

use anyhow::Result;
use clap::Parser;
use console::style;
use gpp_agent::{SessionError, SessionManager, SessionMode, TurnRequest};
use gpp_core::config::{default_home, Config, ConfigLoader};
use gpp_core::logging::init_logging;
use gpp_core::{ChatStore, HistoryBrowser, ParameterSet, PersonaResolver};
use gpp_providers::ApiTarget;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

const GPT_3_MODEL: &str = "gpt-3.5-turbo";
const GPT_4_MODEL: &str = "gpt-4-turbo";

/// The gpp command is an interface to OpenAI's conversation models.
///
/// Provide the question as arguments, or pipe it in without arguments.
/// Prefix the question with dots (one is enough) to continue the previous
/// conversation. "gpp list [N|all|files]" lists stored conversations and
/// "gpp recall [N]" shows one of them.
#[derive(Parser, Debug)]
#[command(name = "gpp")]
#[command(version)]
struct Cli {
    /// Question to ask
    question: Vec<String>,

    /// Start a new conversation (default)
    #[arg(short = 'n', long = "new", overrides_with = "continue_")]
    new: bool,

    /// Continue the previous conversation
    #[arg(short = 'c', long = "continue", overrides_with = "new")]
    continue_: bool,

    /// System persona: a name from the persona directory, inline text, or 'none'
    #[arg(short, long, default_value = gpp_core::chat::DEFAULT_PERSONA)]
    system: String,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Shortcut for --model=gpt-3.5-turbo
    #[arg(short = '3', conflicts_with_all = ["model", "gpt_4"])]
    gpt_3: bool,

    /// Shortcut for --model=gpt-4-turbo
    #[arg(short = '4', conflicts_with = "model")]
    gpt_4: bool,

    /// How creative/random generated text should be (0 to 3)
    #[arg(long, value_parser = parse_temperature)]
    temperature: Option<f64>,

    /// Cut-off point for what tokens to consider in output (0 to 1)
    #[arg(long, value_parser = parse_top_p)]
    top_p: Option<f64>,

    /// Output tokens as they are generated (default)
    #[arg(long, overrides_with = "no_stream")]
    stream: bool,

    /// Wait for the complete answer before printing it
    #[arg(long, overrides_with = "stream")]
    no_stream: bool,

    /// Print the API responses as JSON
    #[arg(long, overrides_with = "no_json")]
    json: bool,

    /// Print text (default)
    #[arg(long, overrides_with = "json")]
    no_json: bool,

    /// API to use: 'openai', 'azure' or the base URL of a compatible server
    #[arg(long, env = "GPP_API")]
    api: Option<String>,

    /// Directory holding chats, personas, credentials and config
    #[arg(long, env = "GPP_HOME")]
    home: Option<PathBuf>,
}

impl Cli {
    fn mode(&self) -> SessionMode {
        if self.continue_ && !self.new {
            SessionMode::Continue
        } else {
            SessionMode::New
        }
    }

    fn streaming(&self) -> bool {
        self.stream || !self.no_stream
    }

    fn json_output(&self) -> bool {
        self.json && !self.no_json
    }

    /// Parameters given on the command line
    fn explicit_params(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        let model = if self.gpt_3 {
            Some(GPT_3_MODEL.to_string())
        } else if self.gpt_4 {
            Some(GPT_4_MODEL.to_string())
        } else {
            self.model.clone()
        };
        if let Some(model) = model {
            params.set("model", model);
        }
        if let Some(temperature) = self.temperature {
            params.set("temperature", temperature);
        }
        if let Some(top_p) = self.top_p {
            params.set("top_p", top_p);
        }
        params
    }
}

fn parse_bounded(value: &str, max: f64) -> std::result::Result<f64, String> {
    let number: f64 = value
        .parse()
        .map_err(|_| format!("{:?} is not a number", value))?;
    if !(0.0..=max).contains(&number) {
        return Err(format!("{} is not in the range 0 to {}", number, max));
    }
    Ok(number)
}

fn parse_temperature(value: &str) -> std::result::Result<f64, String> {
    parse_bounded(value, 3.0)
}

fn parse_top_p(value: &str) -> std::result::Result<f64, String> {
    parse_bounded(value, 1.0)
}

/// History commands given in place of a question
#[derive(Debug, Clone, PartialEq, Eq)]
enum HistoryCommand {
    List(Option<usize>),
    ListAll,
    ListFiles,
    Recall(usize),
}

impl HistoryCommand {
    /// `list`, `list N`, `list all`, `list files`, `recall`, `recall N`;
    /// anything else is a question
    fn parse(question: &[String], default_count: usize) -> Option<Self> {
        let words: Vec<&str> = question.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["list"] => Some(HistoryCommand::List(Some(default_count))),
            ["list", "all"] => Some(HistoryCommand::ListAll),
            ["list", "files"] => Some(HistoryCommand::ListFiles),
            ["list", n] => n.parse().ok().map(|n: usize| {
                HistoryCommand::List(if n == 0 { None } else { Some(n) })
            }),
            ["recall"] => Some(HistoryCommand::Recall(1)),
            ["recall", n] => n.parse().ok().map(HistoryCommand::Recall),
            _ => None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home = cli.home.clone().unwrap_or_else(default_home);
    std::fs::create_dir_all(&home)?;
    let config_loader = ConfigLoader::with_dir(&home);
    let config = config_loader.load()?;

    let log_dir = config_loader.log_dir(&config);
    std::fs::create_dir_all(&log_dir)?;
    let _log_guard = init_logging(&config.logging, &log_dir);
    debug!("Using gpp home {}", home.display());

    let store = ChatStore::open(&home)?;
    let personas = PersonaResolver::for_store(&store)?;

    let outcome = match HistoryCommand::parse(&cli.question, config.list_count) {
        Some(command) => run_history(&store, command, cli.json_output()),
        None => run_ask(&cli, &config, &home, &store, &personas).await,
    };

    match outcome {
        Ok(()) => Ok(()),
        // Resolution problems are reported but are not failures of gpp
        Err(e) if e.is_resolution_failure() => {
            info!("Nothing done: {}", e);
            report_error(&e);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

fn report_error(err: &SessionError) {
    eprintln!("{} {}", style("Error:").red(), err);
}

fn run_history(store: &ChatStore, command: HistoryCommand, json: bool) -> Result<(), SessionError> {
    let history = HistoryBrowser::new(store);
    let mut out = io::stdout().lock();

    let written = match command {
        HistoryCommand::List(limit) => list(&history, limit, &mut out)?,
        HistoryCommand::ListAll => list(&history, None, &mut out)?,
        HistoryCommand::ListFiles => {
            let paths = history.record_paths()?;
            paths
                .iter()
                .try_for_each(|path| writeln!(out, "{}", path.display()))
        }
        HistoryCommand::Recall(n) => {
            let (handle, record) = history.recall(n)?;
            debug!("Recalling {}", handle);
            if json {
                render::print_json(&mut out, &record)
            } else {
                render::print_record(&mut out, &record, render::terminal_width())
            }
        }
    };
    written.map_err(|e| SessionError::Core(e.into()))
}

fn list(
    history: &HistoryBrowser<'_>,
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<io::Result<()>, SessionError> {
    let summaries = history.summarize(limit, render::terminal_width())?;
    Ok(summaries
        .iter()
        .try_for_each(|summary| writeln!(out, "{}", render::summary_line(summary))))
}

async fn run_ask(
    cli: &Cli,
    config: &Config,
    home: &std::path::Path,
    store: &ChatStore,
    personas: &PersonaResolver,
) -> Result<(), SessionError> {
    let manager = SessionManager::new(store, personas, config.defaults.to_parameter_set());
    let request = TurnRequest::new(cli.question.clone())
        .with_mode(cli.mode())
        .with_persona(cli.system.clone())
        .with_explicit(cli.explicit_params());

    let turn = manager.prepare(request, io::stdin().lock())?;
    if turn.persona_mismatch {
        eprintln!(
            "{}",
            style("Warning: Can't override system with continuation").red()
        );
    }

    let api = cli.api.as_deref().or(config.api.as_deref());
    let target = ApiTarget::resolve(api, home);
    let client = target.client(home, turn.model())?;
    info!("Asking {} via {:?}", turn.model(), target);

    let stream = cli.streaming();
    let json = cli.json_output();
    let mut out = io::stdout();
    let mut echoed = false;
    let completed = manager
        .run(&client, turn, stream, |fragment| {
            echoed = true;
            // Echo failures are ignored; the answer is still saved
            let _ = if json {
                render::print_json(&mut out, &fragment.raw)
            } else if let Some(text) = fragment.text() {
                write!(out, "{}", text).and_then(|_| out.flush())
            } else {
                Ok(())
            };
        })
        .await;

    if stream && !json && (echoed || completed.is_ok()) {
        let _ = writeln!(io::stdout());
    }
    let completed = completed?;

    if !stream {
        let mut out = io::stdout().lock();
        let printed = if json {
            completed
                .response
                .raw_responses
                .iter()
                .try_for_each(|raw| render::print_json(&mut out, raw))
        } else {
            writeln!(out, "{}", completed.response.content)
        };
        printed.map_err(|e| SessionError::Core(e.into()))?;
    }

    debug!("Saved conversation {}", completed.handle);
    Ok(())
}
