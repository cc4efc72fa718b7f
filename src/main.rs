use clap::{Arg, ArgAction, Command};
use howto::command_generator::{CommandGenerator, ConversationMode};
use howto::completion_client::OpenAiClient;
use howto::config::Config;
use howto::credentials::{ConfigCredentialProvider, CredentialProvider};
use howto::error::HowtoError;
use howto::providers::SystemTimeProvider;
use howto::state_store::FileStateStore;
use howto::{setup, usage_examples};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("howto")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn a natural-language request into a shell command")
        .arg(Arg::new("prompt")
            .help("What you want to do, e.g. `tar without compression`")
            .num_args(1..))
        .arg(Arg::new("setup")
            .long("setup")
            .help("Run the setup wizard")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("config")
            .long("config")
            .help("Show configuration information")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("change-prompt")
            .long("change-prompt")
            .help("Change the system message sent with every request")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Log progress to stderr")
            .action(ArgAction::SetTrue))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<HowtoError>()
                .map(HowtoError::exit_code)
                .unwrap_or(1);
            eprintln!("❌ {:#}", e);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let config_path = Config::get_config_path()?;
    let store = FileStateStore::new(Config::get_state_path()?);

    if matches.get_flag("setup") {
        setup::run_setup(&config_path, &store)?;
        return Ok(());
    }

    if matches.get_flag("config") {
        Config::show_config_info()?;
        return Ok(());
    }

    if matches.get_flag("change-prompt") {
        setup::change_system_message(&config_path)?;
        return Ok(());
    }

    let prompt = matches
        .get_many::<String>("prompt")
        .unwrap_or_default()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    if prompt.trim().is_empty() {
        eprintln!("Usage: howto <prompt>");
        eprintln!("Example: {}", usage_examples::random_example());
        return Err(HowtoError::Usage("No prompt given. Use 'howto --help' for usage information.".to_string()).into());
    }

    if !config_path.exists() {
        info!("No config at {}, running setup", config_path.display());
        setup::run_setup(&config_path, &store)?;
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if e.is_recoverable() => {
            warn!("{}", e);
            eprintln!("⚠️  {}", e);
            eprintln!("Let's set howto up again.");
            setup::run_setup(&config_path, &store)?;
            Config::load()?
        }
        Err(e) => return Err(e.into()),
    };

    let credential = ConfigCredentialProvider::new(&config).api_key()?;
    info!("Processing prompt: {:?}", prompt);

    let generator = CommandGenerator::new(
        Box::new(FileStateStore::new(Config::get_state_path()?)),
        Box::new(OpenAiClient::new()?),
        Box::new(SystemTimeProvider),
    );

    let generation = match generator.generate(&prompt, &config, &credential).await {
        Ok(generation) => generation,
        Err(e @ HowtoError::Storage(_)) => {
            eprintln!("⚠️  {}", e);
            if !setup::offer_state_reset(&store)? {
                return Err(e.into());
            }
            generator.generate(&prompt, &config, &credential).await?
        }
        Err(e) => return Err(e.into()),
    };

    if generation.mode == ConversationMode::Continuing {
        for message in &generation.context {
            eprintln!("{}: {}", message.role, message.content);
        }
    }

    if let Some(e) = &generation.save_error {
        eprintln!("⚠️  Could not save conversation history: {}", e);
    }

    if generation.command.is_empty() {
        anyhow::bail!("The model returned an empty command. Please rephrase your request.");
    }

    println!("{}", generation.command);
    Ok(())
}
