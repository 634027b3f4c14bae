pub mod auth;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{AuthUser, Claims};
pub use rate_limit::RateLimiter;
