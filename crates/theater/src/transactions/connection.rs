//! `CONN`, `USER`, `ECHO`, `PING` — connection lifecycle.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use packet::ValueMap;

use crate::error::TheaterError;
use crate::session::theater_identity;
use crate::transactor::{HandlerFuture, TheaterContext};

/// First transaction on every connection; records the client metadata and
/// fixes the activity timeout the client will keep itself alive under.
pub fn connect(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        if cx.state.initialized {
            warn!("client is already initialized");
            return Ok(());
        }
        let prot = cx
            .message
            .get_int("PROT")
            .ok_or(TheaterError::MissingField("PROT"))?;
        for required in ["PROD", "VERS", "PLAT", "LOCALE", "SDKVERSION"] {
            if cx.message.get_str(required).is_none() {
                return Err(TheaterError::MissingField(required));
            }
        }

        cx.state.initialized = true;
        cx.state.protocol_version = Some(prot);
        cx.state.platform = cx.message.get_str("PLAT").map(ToString::to_string);
        cx.state.locale = cx.message.get_str("LOCALE").map(ToString::to_string);

        info!(
            product = cx.message.get_str("PROD").unwrap_or("?"),
            version = cx.message.get_str("VERS").unwrap_or("?"),
            platform = cx.message.get_str("PLAT").unwrap_or("?"),
            "theater connection initialized"
        );

        let mut body = ValueMap::new();
        body.set("TIME", unix_time());
        body.set("activityTimeoutSecs", 240i64);
        body.set("PROT", prot);
        cx.sink.send(body);
        Ok(())
    })
}

/// Persona login by session key. The key was issued by the session service;
/// resolving it here is what ties the two connections to one identity.
pub fn login(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let lkey = cx
            .message
            .get_str("LKEY")
            .ok_or(TheaterError::MissingField("LKEY"))?;
        let persona = cx
            .session
            .accounts
            .persona_by_session_key(lkey)
            .await
            .map_err(|_| TheaterError::InvalidLoginKey)?;

        info!(name = %persona.name, persona_id = persona.id, "persona logged in");
        cx.session.directory.register(
            &theater_identity(persona.id),
            cx.session.handle.clone(),
            None,
        );

        let mut body = ValueMap::new();
        body.set("NAME", persona.name.clone());
        cx.state.persona = Some(persona);
        cx.sink.send(body);
        Ok(())
    })
}

/// NAT probe: mirrors the observed address back, usable at any time.
pub fn echo(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body = ValueMap::new();
        body.set("TXN", "ECHO");
        body.set("IP", cx.session.peer.ip().to_string());
        body.set("PORT", cx.session.peer.port() as i64);
        body.set("ERR", 0i64);
        body.set("TYPE", 1i64);
        body.set("TID", cx.message.get_int("TID").unwrap_or(0));
        cx.sink.send(body);
        Ok(())
    })
}

/// Keepalive: the transactor already pinned the response tid to 0.
pub fn ping(cx: TheaterContext<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        cx.sink.send(ValueMap::new());
        Ok(())
    })
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
