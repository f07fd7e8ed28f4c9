pub mod hpp;
pub mod logging;
pub mod rate_limit;
pub mod security_headers;

pub use hpp::QueryParams;
pub use logging::RequestLogger;
pub use rate_limit::{RateLimit, RateLimitPolicy, RateLimiter};
pub use security_headers::{cors, security_headers};
