//! `pres` — presence status and subscriptions.
//!
//! A connection subscribes to the personas it cares about; when one of them
//! updates its status, the updater's connection fans the event out through
//! the router. Targets that are offline simply miss the event.

use tracing::debug;

use directory::PushEvent;
use packet::{ServiceCode, Value, ValueMap};

use crate::dispatch::{Context, HandlerFuture, ServiceHandlers};
use crate::error::Outcome;
use crate::session::persona_identity;

pub const CODE: ServiceCode = ServiceCode::new(*b"pres");

pub const TXN_SET_PRESENCE_STATUS: &str = "SetPresenceStatus";
pub const TXN_PRESENCE_SUBSCRIBE: &str = "PresenceSubscribe";
pub const TXN_PRESENCE_UNSUBSCRIBE: &str = "PresenceUnsubscribe";
pub const TXN_ASYNC_STATUS_EVENT: &str = "AsyncPresenceStatusEvent";

pub fn handlers() -> ServiceHandlers {
    ServiceHandlers::new(CODE)
        .resolver(TXN_SET_PRESENCE_STATUS, handle_set_presence_status)
        .resolver(TXN_PRESENCE_SUBSCRIBE, handle_presence_subscribe)
        .resolver(TXN_PRESENCE_UNSUBSCRIBE, handle_presence_unsubscribe)
        .creator(TXN_ASYNC_STATUS_EVENT, create_async_status_event)
}

fn subscription_targets(data: &packet::Packet) -> Vec<String> {
    data.get("requests")
        .and_then(Value::as_list)
        .map(|requests| {
            requests
                .iter()
                .filter_map(|request| {
                    request
                        .as_map()
                        .and_then(|map| map.get("userId"))
                        .and_then(Value::as_int)
                })
                .map(|user_id| persona_identity(user_id as u64))
                .collect()
        })
        .unwrap_or_default()
}

fn handle_presence_subscribe(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        for identity in subscription_targets(cx.data) {
            if !cx.state.subscriptions.contains(&identity) {
                cx.state.subscriptions.push(identity);
            }
        }
        debug!(count = cx.state.subscriptions.len(), "presence subscriptions updated");
        Ok(Outcome::Response(ValueMap::new()))
    })
}

fn handle_presence_unsubscribe(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let targets = subscription_targets(cx.data);
        cx.state
            .subscriptions
            .retain(|identity| !targets.contains(identity));
        Ok(Outcome::Response(ValueMap::new()))
    })
}

/// Publishes this connection's status to everyone it is associated with.
/// Delivery is best-effort per target; the response to the caller does not
/// depend on who was reachable.
fn handle_set_presence_status(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut event = ValueMap::new();
        if let Some(persona) = &cx.state.persona {
            let mut owner = ValueMap::new();
            owner.set("id", persona.id);
            owner.set("name", persona.name.clone());
            owner.set("type", 1i64);
            event.set("owner", owner);
        }
        if let Some(status) = cx.data.get("status") {
            event.set("status", status.clone());
        }

        for identity in &cx.state.subscriptions {
            cx.session.router.notify(
                identity,
                PushEvent::new(CODE.as_str(), TXN_ASYNC_STATUS_EVENT, event.clone()),
            );
        }
        Ok(Outcome::Response(ValueMap::new()))
    })
}

fn create_async_status_event(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move { Ok(Outcome::Response(cx.data.body().clone())) })
}
