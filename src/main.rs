use clap::{Parser, Subcommand, builder::styling};
use etl_runtime::cli;
use etl_runtime::config::{ConfigFormat, RuntimeConfig, load_config_file};
use etl_runtime::error::{EtlError, exit_code_of, share};
use etl_runtime::events::{AppReady, AppStopping, ConfigFailed, EventBus, UnhandledRuntimeError};
use etl_runtime::ui::ConsoleUi;
use etl_runtime::workflow::Runtime;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// ETL Runtime: run composable Extract-Transform-Load workflows from a configuration file
#[derive(Parser)]
#[command(name = "etl-runtime", version, styles = STYLES)]
struct Cli {
    /// The configuration file defining the workflows to run
    #[arg(
        short,
        long,
        global = true,
        env = "ETL_RUNTIME_CONFIG",
        default_value = "etl-runtime.toml"
    )]
    config: PathBuf,

    /// Syntax of the configuration file
    #[arg(
        long,
        global = true,
        value_enum,
        env = "ETL_RUNTIME_CONFIG_FORMAT",
        default_value_t = ConfigFormat::Auto
    )]
    config_format: ConfigFormat,

    /// Log level used when LOG_LEVEL is not set
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Print more about what is happening (repeatable)
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// The dotenv file to source settings from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the workflows defined in the configuration
    List,

    /// Run workflows concurrently
    Run {
        /// Ids of the workflows to run; all workflows when omitted
        workflows: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = dotenvy::from_filename(&cli.env) {
        if !e.not_found() {
            eprintln!("{} {}", "Failed to read dotenv file:".red(), e);
        }
    }

    let log_level = match cli.debug {
        true => "debug",
        false => cli.log_level.as_str(),
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let events = Arc::new(EventBus::new());
    let ui = ConsoleUi::new(verbosity(cli.verbose));
    let subscriptions = ui.start(&events);

    let code = match load_config(&cli) {
        Ok(config) => {
            events.send(&AppReady);
            let code = execute(&cli.command, &config, events.clone()).await;
            events.send(&AppStopping);
            code
        }
        Err(e) => {
            let code = e.exit_code();
            let message = format!("Unable to load the configuration: {}", e);
            log::error!("{}", message);
            events.send(&ConfigFailed {
                message,
                error: Some(share(e.into())),
            });
            code
        }
    };

    ui.stop(&events, subscriptions);
    ExitCode::from(code)
}

/// Highest of the `-v` count and `ETL_RUNTIME_VERBOSITY`
fn verbosity(flag_count: u8) -> u8 {
    std::env::var("ETL_RUNTIME_VERBOSITY")
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map_or(flag_count, |v| v.max(flag_count))
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig, EtlError> {
    let mut config = load_config_file(&cli.config, cli.config_format)?;
    config.apply_env_overrides()?;
    log::debug!(
        "Loaded {} workflow(s) from {}",
        config.workflows.len(),
        cli.config.display()
    );
    Ok(config)
}

async fn execute(command: &Commands, config: &RuntimeConfig, events: Arc<EventBus>) -> u8 {
    let runtime =
        Runtime::new(config.workflow_factories(), events.clone()).with_max_workers(config.max_workers);

    let result = match command {
        Commands::List => cli::list_workflows(&runtime, &mut std::io::stdout()).map(|_| ()),
        Commands::Run { workflows } => cli::run_workflows(&runtime, workflows).await.map(|_| ()),
    };

    match result {
        Ok(()) => 0,
        Err(report) => {
            let code = exit_code_of(&report);
            let message = format!("{:#}", report);
            log::error!("{}", message);
            let error = Some(share(report));
            match code {
                2 | 3 => events.send(&ConfigFailed { message, error }),
                _ => events.send(&UnhandledRuntimeError { message, error }),
            }
            code
        }
    }
}
