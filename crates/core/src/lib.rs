// Otter Core
//
// Shared auth primitives for the gateway edge and the backends behind it.
//
// Key design decisions:
// - A Principal is decoded per request and never mutated afterwards
// - Credential mechanisms (JWT cookie, forwarded header) sit behind SessionResolver
// - The guard is a pure function of (principal, service) and fails closed
// - The service registry is built once at startup and shared read-only
// - All HTTP-facing failures go through ApiError so status codes stay consistent

pub mod cors;
pub mod error;
pub mod guard;
pub mod principal;
pub mod registry;
pub mod resolver;
pub mod telemetry;
pub mod token;

// Re-exports for convenience
pub use cors::cors_layer;
pub use error::{ApiError, ErrorResponse};
pub use guard::{authorize, AccessDenied};
pub use principal::{Principal, USER_HEADER};
pub use registry::{ServiceEntry, ServiceRegistry};
pub use resolver::{
    CookieTokenResolver, ForwardedPrincipal, ForwardedPrincipalResolver, SessionResolver,
    ACCESS_COOKIE,
};
pub use token::{RefreshClaims, TokenConfig, TokenError, TokenPair, TokenService};
