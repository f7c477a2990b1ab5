//! Handler tables for the session-protocol services.
//!
//! Only the services with real protocol behavior live here. The remaining
//! legacy services (messaging, associations, rankings, records) are pure
//! persistence glue; they hang off the same dispatcher shape and are left to
//! deployment-specific registries.

use crate::dispatch::ServiceRegistry;

pub mod account;
pub mod connect;
pub mod playnow;
pub mod presence;

/// Builds the standard registry: `fsys`, `acct`, `pres`, `pnow`.
pub fn standard_registry() -> ServiceRegistry {
    ServiceRegistry::new()
        .register(connect::handlers())
        .register(account::handlers())
        .register(presence::handlers())
        .register(playnow::handlers())
}
