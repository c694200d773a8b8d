pub mod settings;

pub use settings::{
    AgentConfig, LoggingConfig, PromptsConfig, ServerConfig, SessionConfig, Settings,
};
