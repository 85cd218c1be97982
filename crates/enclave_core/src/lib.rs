pub mod accounts;
pub mod domain;
pub mod filesystem;
pub mod memory;
pub mod password;
pub mod paths;
pub mod ports;
pub mod registry;
pub mod security;
pub mod seed;
pub mod terminal;
pub mod tokens;
pub mod validation;

pub use accounts::{AccountService, NewAccount};
pub use domain::{
    AccessLevel, AuthContext, AuthSession, ClientInfo, EventFilter, EventType, FilesystemNode,
    NodeType, Role, SecurityEvent, SecurityStats, TerminalSession, TerminalType, User,
    UserCredentials,
};
pub use filesystem::{CreateNode, FilesystemError, FilesystemService};
pub use memory::InMemoryStore;
pub use password::PasswordService;
pub use ports::{
    AlertNotifier, DatabaseService, PortError, PortResult, RateDecision, RateLimitStore,
};
pub use registry::{AuthError, LoginOutcome, Registration, SessionRegistry};
pub use security::SecurityLogger;
pub use terminal::{CommandResult, TerminalError, TerminalService};
pub use tokens::{TokenPair, TokenService, TokenSettings};
