//! Interactive setup: first-run wizard, system message changes and state recovery.
//!
//! Every dialog has a `*_with_io` variant taking the input and output
//! streams so it can be driven from tests.

use crate::config::{Config, DEFAULT_MODEL, DEFAULT_SHELL, DEFAULT_SYSTEM_MESSAGE};
use crate::credentials::{API_KEY_ENV, KeyringSecretStore, SecretStore, validate_api_key};
use crate::state_store::StateStore;
use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use tracing::{info, warn};

/// Asks `question` until the answer passes `validate`.
///
/// An empty answer yields `default` when one is given.
pub fn ask_question_with_io<R: BufRead, W: Write>(
    question: &str,
    default: Option<&str>,
    validate: &dyn Fn(&str) -> bool,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    loop {
        write!(output, "{}", question)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("Input closed before an answer was given");
        }
        let answer = line.trim();

        if answer.is_empty() {
            if let Some(default) = default {
                return Ok(default.to_string());
            }
        }
        if validate(answer) {
            return Ok(answer.to_string());
        }
        writeln!(output, "Invalid answer, please try again.")?;
    }
}

/// Asks for a secret until it passes `validate`.
///
/// With `interactive` set the answer is read from the terminal without echo;
/// otherwise a line is read from `input`.
pub fn ask_secret_with_io<R: BufRead, W: Write>(
    question: &str,
    interactive: bool,
    validate: &dyn Fn(&str) -> bool,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    loop {
        let line = if interactive {
            output.flush()?;
            rpassword::prompt_password(question).context("Failed to read from the terminal")?
        } else {
            write!(output, "{}", question)?;
            output.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                bail!("Input closed before an answer was given");
            }
            line
        };

        let answer = line.trim();
        if validate(answer) {
            return Ok(answer.to_string());
        }
        writeln!(output, "Invalid answer, please try again.")?;
    }
}

fn ask_yes_no<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    let answer = ask_question_with_io(
        question,
        None,
        &|a: &str| matches!(a.to_lowercase().as_str(), "y" | "n" | "yes" | "no"),
        input,
        output,
    )?;
    Ok(answer.to_lowercase().starts_with('y'))
}

fn non_empty(answer: &str) -> bool {
    !answer.is_empty()
}

/// Where the setup wizard finds and keeps the API key.
pub struct SetupEnv<'a> {
    pub secrets: &'a dyn SecretStore,
    /// Value of `OPENAI_API_KEY`, if set.
    pub env_key: Option<String>,
    /// Whether stdin is a terminal (the key is then read without echo).
    pub interactive: bool,
}

/// Runs the setup wizard and writes the resulting config.
///
/// A typed API key goes to the secret store; the config file only holds it
/// when the secret store is unusable. Returns `None` when an existing config
/// was kept.
pub fn run_setup_with_io<R: BufRead, W: Write>(
    config_path: &Path,
    store: &dyn StateStore,
    env: &SetupEnv<'_>,
    input: &mut R,
    output: &mut W,
) -> Result<Option<Config>> {
    let existing = config_path.exists();
    if existing {
        writeln!(output, "Config file already exists at {}", config_path.display())?;
        match Config::load_from(config_path) {
            Ok(config) => writeln!(output, "Config:\n{}", config.display_masked())?,
            Err(e) => writeln!(output, "Existing config is unreadable: {}", e)?,
        }
        if !ask_yes_no("Do you want to overwrite it? (y/n) ", input, output)? {
            writeln!(output, "Howto is all set up! Try `howto tar without compression`")?;
            return Ok(None);
        }
    }

    writeln!(
        output,
        "Setting up howto{}...",
        if existing { "" } else { " for the first time" }
    )?;

    let openai_api_key = if env.env_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        writeln!(output, "Detected {} environment variable, it will be used with howto.", API_KEY_ENV)?;
        None
    } else {
        let stored = env.secrets.get().ok().flatten().filter(|k| validate_api_key(k).is_ok());
        if stored.is_some()
            && ask_yes_no("An API key is already stored in the system keychain. Keep it? (y/n) ", input, output)?
        {
            None
        } else {
            writeln!(
                output,
                "{} is not set. You can get a key from https://platform.openai.com/account/api-keys",
                API_KEY_ENV
            )?;
            let key = ask_secret_with_io(
                "Please enter your OpenAI API key: ",
                env.interactive,
                &|a: &str| validate_api_key(a).is_ok(),
                input,
                output,
            )?;
            match env.secrets.set(&key) {
                Ok(()) => {
                    writeln!(output, "API key saved to the system keychain.")?;
                    None
                }
                Err(e) => {
                    warn!("Secret store unavailable: {}", e);
                    writeln!(
                        output,
                        "Could not use the system keychain ({}); the key will be stored in {}.",
                        e,
                        config_path.display()
                    )?;
                    Some(key)
                }
            }
        }
    };

    let shell = ask_question_with_io(
        &format!("What shell do you use? (default: {}) ", DEFAULT_SHELL),
        Some(DEFAULT_SHELL),
        &non_empty,
        input,
        output,
    )?
    .to_lowercase();

    let model = ask_question_with_io(
        &format!("What model do you want to use? (default: {}) ", DEFAULT_MODEL),
        Some(DEFAULT_MODEL),
        &non_empty,
        input,
        output,
    )?;

    let config = Config {
        shell,
        model,
        system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        openai_api_key,
        ..Config::default()
    };
    config
        .save_to(config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    store.reset().context("Failed to initialize conversation state")?;
    info!("Setup complete");

    writeln!(output, "\nSetup complete. Try `howto tar without compression`\n")?;
    Ok(Some(config))
}

pub fn run_setup(config_path: &Path, store: &dyn StateStore) -> Result<Option<Config>> {
    let stdin = io::stdin();
    let secrets = KeyringSecretStore::new();
    let env = SetupEnv {
        secrets: &secrets,
        env_key: std::env::var(API_KEY_ENV).ok(),
        interactive: stdin.is_terminal(),
    };
    run_setup_with_io(config_path, store, &env, &mut stdin.lock(), &mut io::stdout())
}

/// Replaces the system message in the config at `config_path`.
pub fn change_system_message_with_io<R: BufRead, W: Write>(
    config_path: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<Config> {
    let mut config = Config::load_from(config_path).context("Error reading config file")?;
    writeln!(output, "Current system message: {}", config.system_message)?;

    config.system_message = ask_question_with_io(
        "What do you want the system message to be? ",
        None,
        &non_empty,
        input,
        output,
    )?;
    config.save_to(config_path).context("Error writing config file")?;

    writeln!(output, "\nSystem message changed to `{}`\n", config.system_message)?;
    Ok(config)
}

pub fn change_system_message(config_path: &Path) -> Result<Config> {
    let stdin = io::stdin();
    change_system_message_with_io(config_path, &mut stdin.lock(), &mut io::stdout())
}

/// Offers to discard unreadable conversation state. Returns whether it was reset.
pub fn offer_state_reset_with_io<R: BufRead, W: Write>(
    store: &dyn StateStore,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    if !ask_yes_no(
        "The conversation history could not be read. Delete it and start over? (y/n) ",
        input,
        output,
    )? {
        return Ok(false);
    }
    store.reset().context("Failed to reset conversation state")?;
    writeln!(output, "Conversation history reset.")?;
    Ok(true)
}

pub fn offer_state_reset(store: &dyn StateStore) -> Result<bool> {
    let stdin = io::stdin();
    offer_state_reset_with_io(store, &mut stdin.lock(), &mut io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::test_support::MemorySecretStore;
    use crate::state_store::FileStateStore;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn run_with(
        dir: &TempDir,
        secrets: &MemorySecretStore,
        env_key: Option<&str>,
        answers: &str,
    ) -> (Result<Option<Config>>, String) {
        let store = FileStateStore::new(dir.path().join("state.json"));
        let env = SetupEnv {
            secrets,
            env_key: env_key.map(String::from),
            interactive: false,
        };
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = run_setup_with_io(&dir.path().join("config.json"), &store, &env, &mut input, &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    fn run(dir: &TempDir, env_key: Option<&str>, answers: &str) -> (Result<Option<Config>>, String) {
        run_with(dir, &MemorySecretStore::default(), env_key, answers)
    }

    #[test]
    fn test_ask_question_uses_default_on_empty_answer() {
        let mut input = Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        let answer = ask_question_with_io("Shell? ", Some("bash"), &non_empty, &mut input, &mut output).unwrap();
        assert_eq!(answer, "bash");
    }

    #[test]
    fn test_ask_question_repeats_until_valid() {
        let mut input = Cursor::new(b"maybe\ny\n".to_vec());
        let mut output = Vec::new();
        assert!(ask_yes_no("Ok? ", &mut input, &mut output).unwrap());
        assert!(String::from_utf8(output).unwrap().contains("Invalid answer"));
    }

    #[test]
    fn test_ask_question_fails_on_closed_input() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        assert!(ask_question_with_io("Key? ", None, &non_empty, &mut input, &mut output).is_err());
    }

    #[test]
    fn test_first_setup_with_env_key() {
        let dir = TempDir::new().unwrap();
        let (result, output) = run(&dir, Some("sk-env"), "fish\n\n");

        let config = result.unwrap().unwrap();
        assert_eq!(config.shell, "fish");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.openai_api_key.is_none(), "env key is not copied into the file");
        assert!(output.contains("for the first time"));
        assert!(dir.path().join("state.json").exists());
        assert_eq!(Config::load_from(&dir.path().join("config.json")).unwrap(), config);
    }

    #[test]
    fn test_setup_stores_typed_key_in_secret_store() {
        let dir = TempDir::new().unwrap();
        let secrets = MemorySecretStore::default();
        let (result, output) = run_with(&dir, &secrets, None, "not-a-key\nsk-typed\n\ngpt-4o\n");

        let config = result.unwrap().unwrap();
        assert!(config.openai_api_key.is_none(), "key must not be written to config.json");
        assert_eq!(secrets.get().unwrap().as_deref(), Some("sk-typed"));
        assert!(output.contains("saved to the system keychain"));
        assert!(output.contains("Invalid answer"));
        assert_eq!(config.shell, DEFAULT_SHELL);
        assert_eq!(config.model, "gpt-4o");

        let on_disk = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(!on_disk.contains("sk-typed"));
    }

    #[test]
    fn test_setup_falls_back_to_config_without_keychain() {
        let dir = TempDir::new().unwrap();
        let (result, output) = run_with(&dir, &MemorySecretStore::broken(), None, "sk-typed\n\n\n");

        let config = result.unwrap().unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-typed"));
        assert!(output.contains("Could not use the system keychain"));
    }

    #[test]
    fn test_setup_keeps_stored_key() {
        let dir = TempDir::new().unwrap();
        let secrets = MemorySecretStore::with_secret("sk-stored");
        let (result, _) = run_with(&dir, &secrets, None, "y\nzsh\n\n");

        let config = result.unwrap().unwrap();
        assert_eq!(config.shell, "zsh");
        assert!(config.openai_api_key.is_none());
        assert_eq!(secrets.get().unwrap().as_deref(), Some("sk-stored"));
    }

    #[test]
    fn test_setup_replaces_stored_key_when_declined() {
        let dir = TempDir::new().unwrap();
        let secrets = MemorySecretStore::with_secret("sk-stored");
        let (result, _) = run_with(&dir, &secrets, None, "n\nsk-fresh\n\n\n");

        assert!(result.unwrap().is_some());
        assert_eq!(secrets.get().unwrap().as_deref(), Some("sk-fresh"));
    }

    #[test]
    fn test_ask_secret_reads_line_when_not_interactive() {
        let mut input = Cursor::new(b"  sk-piped  \n".to_vec());
        let mut output = Vec::new();
        let key = ask_secret_with_io("Key: ", false, &non_empty, &mut input, &mut output).unwrap();

        assert_eq!(key, "sk-piped");
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown, "Key: ");
    }

    #[test]
    fn test_ask_secret_fails_on_closed_input() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        assert!(ask_secret_with_io("Key: ", false, &non_empty, &mut input, &mut output).is_err());
    }

    #[test]
    fn test_existing_config_kept_when_declined() {
        let dir = TempDir::new().unwrap();
        let original = Config {
            shell: "zsh".to_string(),
            ..Config::default()
        };
        original.save_to(&dir.path().join("config.json")).unwrap();

        let (result, output) = run(&dir, Some("sk-env"), "n\n");
        assert!(result.unwrap().is_none());
        assert!(output.contains("already exists"));
        assert_eq!(Config::load_from(&dir.path().join("config.json")).unwrap(), original);
    }

    #[test]
    fn test_change_system_message() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        Config::default().save_to(&path).unwrap();

        let mut input = Cursor::new(b"Answer with a single fish command.\n".to_vec());
        let mut output = Vec::new();
        let config = change_system_message_with_io(&path, &mut input, &mut output).unwrap();

        assert_eq!(config.system_message, "Answer with a single fish command.");
        assert_eq!(Config::load_from(&path).unwrap().system_message, config.system_message);
    }

    #[test]
    fn test_change_system_message_without_config_fails() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new(b"anything\n".to_vec());
        let mut output = Vec::new();
        assert!(change_system_message_with_io(&dir.path().join("config.json"), &mut input, &mut output).is_err());
    }

    #[test]
    fn test_offer_state_reset() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        std::fs::write(dir.path().join("state.json"), "garbage").unwrap();
        assert!(store.load().is_err());

        let mut output = Vec::new();
        assert!(!offer_state_reset_with_io(&store, &mut Cursor::new(b"n\n".to_vec()), &mut output).unwrap());
        assert!(store.load().is_err());

        assert!(offer_state_reset_with_io(&store, &mut Cursor::new(b"y\n".to_vec()), &mut output).unwrap());
        assert!(store.load().unwrap().history.is_empty());
    }
}
