pub mod db;
pub mod notifier;
pub mod rate_limit;

pub use db::DbAdapter;
pub use notifier::TracingNotifier;
pub use rate_limit::{spawn_sweeper, InMemoryRateLimiter};
