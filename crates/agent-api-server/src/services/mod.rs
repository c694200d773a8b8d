pub mod agent_service;
pub mod session;
pub mod wallet;

pub use agent_service::AgentService;
pub use session::SessionManager;
pub use wallet::WalletStore;
