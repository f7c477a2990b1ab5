//! `pnow` — play-now matchmaking.
//!
//! `Start` allocates a matchmaking ticket and immediately answers; the
//! search result arrives later as an unscheduled `Status` push on the same
//! connection. Pushing to ourselves goes through the same handle the router
//! would use, so the status packet is emitted after the `Start` response is
//! already on the wire.

use tracing::debug;

use directory::PushEvent;
use packet::{ServiceCode, Value, ValueMap};

use crate::dispatch::{Context, HandlerFuture, ServiceHandlers};
use crate::error::{ErrorCode, Outcome, TransactionError};

pub const CODE: ServiceCode = ServiceCode::new(*b"pnow");

pub const TXN_START: &str = "Start";
pub const TXN_STATUS: &str = "Status";

pub fn handlers() -> ServiceHandlers {
    ServiceHandlers::new(CODE)
        .resolver(TXN_START, handle_start)
        .creator(TXN_STATUS, create_status)
}

fn partition(cx: &Context<'_>) -> String {
    format!(
        "/{}/{}",
        cx.session.settings.domain, cx.session.settings.sub_domain
    )
}

fn handle_start(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let ticket = cx.session.counters.next("pnow:matchmaking");
        cx.state.matchmaking_id = Some(ticket);
        debug!(ticket, "matchmaking started");

        // Queue the status push; it is delivered once this response is out.
        let mut status_input = ValueMap::new();
        if let Some(gid) = cx.data.get_path("players.0.props.{gid}").cloned() {
            status_input.set("gid", gid);
        }
        if let Some(lid) = cx.data.get_path("players.0.props.{lid}").cloned() {
            status_input.set("lid", lid);
        }
        cx.session
            .handle
            .deliver(PushEvent::new(CODE.as_str(), TXN_STATUS, status_input));

        let mut id = ValueMap::new();
        id.set("id", ticket);
        id.set("partition", partition(&cx));

        let mut body = ValueMap::new();
        body.set("id", id);
        Ok(Outcome::Response(body))
    })
}

fn create_status(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let ticket = cx
            .state
            .matchmaking_id
            .take()
            .ok_or_else(|| TransactionError::new(ErrorCode::SystemError))?;

        let mut id = ValueMap::new();
        id.set("id", ticket);
        id.set("partition", partition(&cx));

        let mut games = Vec::new();
        if let (Some(gid), Some(lid)) = (cx.data.get_int("gid"), cx.data.get_int("lid")) {
            let mut game = ValueMap::new();
            game.set("fit", 1001i64);
            game.set("gid", gid);
            game.set("lid", lid);
            games.push(Value::Map(game));
        }

        let mut props = ValueMap::new();
        props.set("{resultType}", "JOIN");
        props.set("{games}", games);

        let mut body = ValueMap::new();
        body.set("id", id);
        body.set("sessionState", "COMPLETE");
        body.set("props", props);
        Ok(Outcome::Response(body))
    })
}
