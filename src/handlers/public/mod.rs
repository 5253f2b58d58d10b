// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition plus the service banner and health check.

pub mod auth;
pub mod meta;

pub use auth::{login, refresh, signup};
pub use meta::{health, root};
