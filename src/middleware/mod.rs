//! HTTP middleware for the request pipeline.
//!
//! # Architecture
//!
//! ```text
//! Request → Metrics → Trace → Recover → CORS → Rate Limit → Authenticate → Router → Guard → Handler
//!              ↓                 ↓                  ↓             ↓                      ↓
//!          counters         500 + close        429 + Retry   401 + Vary          401 / 403
//! ```
//!
//! The stack outside the router is assembled once in `routes::build_router`;
//! guards wrap individual handlers.

pub mod authenticate;
pub mod authorize;
pub mod ip;
pub mod metrics;
pub mod rate_limit;
pub mod recover;

pub use authenticate::{AuthenticateLayer, authenticate};
pub use authorize::{Guards, RequireLayer, Requirement, authorize};
pub use ip::{CidrRange, ClientIpError, IpSource, TrustedProxyConfig, client_ip};
pub use metrics::{MetricsLayer, RequestMetrics};
pub use rate_limit::{ClientRegistry, RateLimitError, RateLimitLayer};
pub use recover::recover_panic;
