//! Howto - turn a natural-language request into a shell command.
//!
//! The request is sent to a chat-completion API together with a short
//! system message. Answers given less than a minute apart are treated as a
//! single conversation, so follow-ups such as "now include hidden files"
//! refine the previous command instead of starting over.
//!
//! # Architecture
//!
//! - [`config`] - Configuration file, paths and defaults
//! - [`credentials`] - API key resolution
//! - [`conversation`] - Messages and persisted conversation state
//! - [`state_store`] - Locked, atomic persistence of the conversation
//! - [`http_client`] - HTTP client abstraction
//! - [`completion_client`] - Chat completion requests and answer cleanup
//! - [`command_generator`] - Fresh/continuing decision and history updates
//! - [`setup`] - Interactive setup dialogs
//! - [`usage_examples`] - Example prompts shown in help output
//! - [`providers`] - Shared dependency injection traits
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use howto::command_generator::CommandGenerator;
//! use howto::completion_client::OpenAiClient;
//! use howto::config::Config;
//! use howto::providers::SystemTimeProvider;
//! use howto::state_store::FileStateStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let generator = CommandGenerator::new(
//!         Box::new(FileStateStore::new(Config::get_state_path()?)),
//!         Box::new(OpenAiClient::new()?),
//!         Box::new(SystemTimeProvider),
//!     );
//!
//!     let generation = generator.generate("tar without compression", &config, "sk-...").await?;
//!     println!("{}", generation.command);
//!     Ok(())
//! }
//! ```

pub mod command_generator;
pub mod completion_client;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod providers;
pub mod setup;
pub mod state_store;
pub mod usage_examples;
