use anyhow::Result;
use config::{Config, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    /// Base URL of the agent runtime that hosts constructed agents.
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_network_id")]
    pub network_id: String,
    /// Per-request timeout for every agent runtime call. A hung external
    /// call must not pin a capacity slot indefinitely.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
    /// Where the exported wallet blob is persisted between constructions.
    #[serde(default = "default_wallet_path")]
    pub wallet_data_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Soft admission valve bounding concurrent agent constructions,
    /// not a hard multiplexing limit.
    pub max_active_sessions: usize,
    pub inactivity_timeout_secs: u64,
    /// When true, sending to an unknown id transparently starts a session;
    /// when false it is a NotFound error. Both behaviors exist in deployed
    /// variants, so this stays configurable.
    pub auto_create_on_miss: bool,
    /// Failed constructions a queued id survives before being dropped.
    pub max_admission_attempts: u32,
    pub max_message_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: 20,
            inactivity_timeout_secs: 600,
            auto_create_on_miss: true,
            max_admission_attempts: 5,
            max_message_chars: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub activity_log_path: String,
    /// Queue capacity (max events in memory before drops)
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log_path: "logs/activity.log".to_string(),
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    /// Instructions handed to the runtime at agent construction.
    pub base_instructions: String,
    /// Per-message wrapper; `{message}` is replaced with the user text.
    pub mode_wrapper: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            base_instructions: DEFAULT_BASE_INSTRUCTIONS.clone(),
            mode_wrapper: DEFAULT_MODE_WRAPPER.clone(),
        }
    }
}

static DEFAULT_BASE_INSTRUCTIONS: Lazy<String> = Lazy::new(|| {
    r#"
You are an onchain development assistant that responds in one of these modes:
[requirements, research, development, audit, deployment, general].

1) REQUIREMENTS
   - Start with "REQUIREMENTS" on its own line.
   - Then "Project: <short name/description>".
   - Then bullet points, one requirement each.

2) DEVELOPMENT
   - Start with "DEVELOPMENT" on its own line.
   - Then "Project: <name>" and "Files: N" listing each file.
   - For each file, print "File X: <filename>" and enclose contents in
     triple backticks.

3) RESEARCH
   - Start with "RESEARCH" on its own line.
   - Summarize the analysis in bullet points or short sections, including
     key features, market analysis, and a risk breakdown.

4) AUDIT
   - Start with "AUDIT" on its own line.
   - Provide security checks, vulnerabilities, and recommended fixes in
     bullet points.

5) DEPLOYMENT
   - Start with "DEPLOYMENT" on its own line.
   - List deployment steps in order, mentioning testnet vs mainnet where
     relevant.

6) GENERAL
   - Start with "GENERAL" on its own line.
   - Provide a direct, helpful answer if none of the above modes apply.

No matter what, choose the best matching mode. If uncertain, use GENERAL.
You can interact onchain through your wallet tools. If you ever need funds,
you can request them from a faucet when on a test network. If you cannot do
something with the current tools, politely explain that it is not supported.
"#
    .trim()
    .to_string()
});

static DEFAULT_MODE_WRAPPER: Lazy<String> = Lazy::new(|| {
    r#"
You will read the user's message and first determine which of the following
modes best applies: (requirements, research, development, audit, deployment,
or general).

Then produce the response strictly in that mode's format described above.
If it's unclear, use "general".

User message: "{message}"
"#
    .trim()
    .to_string()
});

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_network_id() -> String {
    "base-sepolia".to_string()
}

fn default_agent_timeout() -> u64 {
    120
}

fn default_wallet_path() -> String {
    "wallet_data.txt".to_string()
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
