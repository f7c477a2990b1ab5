//! `fsys` — the connect service.
//!
//! Owns connection initialization (the hello transaction), keepalive in both
//! directions, and the teardown notices. These transactions are the only
//! ones a connection may run before it has an authenticated identity.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use packet::{ServiceCode, Value, ValueMap};

use crate::dispatch::{Context, HandlerFuture, ServiceHandlers};
use crate::error::Outcome;
use crate::session::{account_identity, persona_identity, ClientType};

pub const CODE: ServiceCode = ServiceCode::new(*b"fsys");

pub const TXN_HELLO: &str = "Hello";
pub const TXN_PING: &str = "Ping";
pub const TXN_MEMCHECK: &str = "MemCheck";
pub const TXN_GOODBYE: &str = "Goodbye";
pub const TXN_SUICIDE: &str = "Suicide";
pub const TXN_GET_PING_SITES: &str = "GetPingSites";

pub fn handlers() -> ServiceHandlers {
    ServiceHandlers::new(CODE)
        .resolver(TXN_HELLO, handle_hello)
        .resolver(TXN_PING, handle_ping)
        .resolver(TXN_MEMCHECK, handle_memcheck)
        .resolver(TXN_GOODBYE, handle_goodbye)
        .resolver(TXN_SUICIDE, handle_suicide)
        .resolver(TXN_GET_PING_SITES, handle_get_ping_sites)
        .creator(TXN_PING, create_ping)
        .creator(TXN_MEMCHECK, create_memcheck)
        .creator(TXN_GOODBYE, create_goodbye)
}

/// First transaction on every connection: records the client's metadata and
/// negotiated fragment size, then points it at the right theater endpoint.
fn handle_hello(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let data = cx.data;
        let client_type = ClientType::parse(data.get_str("clientType"));

        cx.state.initialized = true;
        cx.state.fragment_size = data.get_int("fragmentSize").unwrap_or(-1);
        cx.state.client_type = Some(client_type);

        info!(
            client = data.get_str("clientString").unwrap_or("?"),
            version = data.get_str("clientVersion").unwrap_or("?"),
            sdk = data.get_str("SDKVersion").unwrap_or("?"),
            locale = data.get_str("locale").unwrap_or("?"),
            fragment_size = cx.state.fragment_size,
            "connection initialized"
        );

        let settings = &cx.session.settings;
        let (theater_host, theater_port) = match client_type {
            ClientType::Client => (
                settings.theater_client_host.clone(),
                settings.theater_client_port,
            ),
            ClientType::Server => (
                settings.theater_server_host.clone(),
                settings.theater_server_port,
            ),
        };

        let mut partition = ValueMap::new();
        partition.set("domain", settings.domain.clone());
        partition.set("subDomain", settings.sub_domain.clone());

        let mut body = ValueMap::new();
        // 0 makes the client fall back to its built-in 200s activity timeout.
        body.set("activityTimeoutSecs", 0i64);
        body.set("curTime", legacy_timestamp());
        body.set("domainPartition", partition);
        body.set("messengerIp", settings.messenger_host.clone());
        body.set("messengerPort", settings.messenger_port as i64);
        body.set("theaterIp", theater_host);
        body.set("theaterPort", theater_port as i64);
        Ok(Outcome::Response(body))
    })
}

fn handle_ping(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Outcome::Skip) })
}

fn handle_memcheck(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Outcome::Skip) })
}

/// Clean logout: drop the presence registrations right away instead of
/// letting them age out through the grace window.
fn handle_goodbye(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        info!(
            reason = cx.data.get_str("reason").unwrap_or("?"),
            message = cx.data.get_str("message").unwrap_or(""),
            "client said goodbye"
        );
        if let Some(account) = &cx.state.account {
            cx.session.directory.unregister(&account_identity(account.id));
        }
        if let Some(persona) = &cx.state.persona {
            cx.session.directory.unregister(&persona_identity(persona.id));
        }
        Ok(Outcome::Skip)
    })
}

fn handle_suicide(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        debug!("suicide transaction received, ignoring");
        Ok(Outcome::Skip)
    })
}

fn handle_get_ping_sites(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let addr = cx.session.settings.theater_client_host.clone();
        let sites: Vec<Value> = ["nrt", "gva", "sjc", "iad"]
            .into_iter()
            .map(|name| {
                let mut site = ValueMap::new();
                site.set("name", name);
                site.set("type", 0i64);
                site.set("addr", addr.clone());
                Value::Map(site)
            })
            .collect();

        let mut body = ValueMap::new();
        body.set("pingSite", sites);
        body.set("minPingSitesToPing", 0i64);
        Ok(Outcome::Response(body))
    })
}

fn create_ping(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Outcome::Response(ValueMap::new())) })
}

/// Timer-driven liveness probe. The original servers always send an empty
/// check list; the salt is echoed back by well-behaved clients.
fn create_memcheck(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body = ValueMap::new();
        body.set("memcheck", Vec::<Value>::new());
        body.set("type", 0i64);
        body.set("salt", memcheck_salt());
        Ok(Outcome::Response(body))
    })
}

/// Session-superseded teardown notice, pushed to a connection whose identity
/// just logged in somewhere else.
fn create_goodbye(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body = ValueMap::new();
        body.set(
            "reason",
            cx.data.get_str("reason").unwrap_or("CONFLICTING_SESSION"),
        );
        Ok(Outcome::Response(body))
    })
}

fn legacy_timestamp() -> String {
    Utc::now().format("%b-%d-%Y %H:%M:%S UTC").to_string()
}

fn memcheck_salt() -> String {
    format!("{:010}", Uuid::new_v4().as_u128() % 10_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salt_is_ten_digits() {
        let salt = memcheck_salt();
        assert_eq!(salt.len(), 10);
        assert!(salt.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn legacy_timestamp_shape() {
        let stamp = legacy_timestamp();
        assert!(stamp.ends_with(" UTC"));
        assert_eq!(stamp.split(['-', ' ']).count(), 5);
    }
}
