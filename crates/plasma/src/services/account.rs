//! `acct` — account and persona transactions.
//!
//! The handlers here are thin adapters between packets and the
//! [`AccountStore`](crate::store::AccountStore) collaborator. The one piece
//! of real protocol logic is duplicate-login eviction: a successful login
//! registers the identity in the presence directory and pushes a teardown
//! notice at whichever connection held it before.

use tracing::info;
use uuid::Uuid;

use directory::PushEvent;
use packet::{Packet, ServiceCode, Value, ValueMap};

use crate::dispatch::{Context, HandlerFuture, ServiceHandlers};
use crate::error::{ErrorCode, Outcome, TransactionError};
use crate::services::connect;
use crate::session::{account_identity, persona_identity};

pub const CODE: ServiceCode = ServiceCode::new(*b"acct");

pub const TXN_NU_ADD_ACCOUNT: &str = "NuAddAccount";
pub const TXN_NU_LOGIN: &str = "NuLogin";
pub const TXN_NU_GET_PERSONAS: &str = "NuGetPersonas";
pub const TXN_NU_ADD_PERSONA: &str = "NuAddPersona";
pub const TXN_NU_LOGIN_PERSONA: &str = "NuLoginPersona";
pub const TXN_GET_COUNTRY_LIST: &str = "GetCountryList";
pub const TXN_NU_GET_TOS: &str = "NuGetTos";
pub const TXN_NU_ENTITLE_GAME: &str = "NuEntitleGame";

pub fn handlers() -> ServiceHandlers {
    ServiceHandlers::new(CODE)
        .resolver(TXN_NU_ADD_ACCOUNT, handle_nu_add_account)
        .resolver(TXN_NU_LOGIN, handle_nu_login)
        .resolver(TXN_NU_GET_PERSONAS, handle_nu_get_personas)
        .resolver(TXN_NU_ADD_PERSONA, handle_nu_add_persona)
        .resolver(TXN_NU_LOGIN_PERSONA, handle_nu_login_persona)
        .resolver(TXN_GET_COUNTRY_LIST, handle_get_country_list)
        .resolver(TXN_NU_GET_TOS, handle_nu_get_tos)
        .resolver(TXN_NU_ENTITLE_GAME, handle_nu_entitle_game)
}

fn require_str<'p>(data: &'p Packet, key: &str) -> Result<&'p str, TransactionError> {
    data.get_str(key)
        .ok_or_else(|| TransactionError::new(ErrorCode::ParametersError))
}

fn handle_nu_add_account(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let nuid = require_str(cx.data, "nuid")?;
        let password = require_str(cx.data, "password")?;
        let account = cx.session.accounts.create_account(nuid, password).await?;

        info!(nuid, account_id = account.id, "account created");
        let mut body = ValueMap::new();
        body.set("userId", account.id);
        body.set("nuid", account.nuid);
        Ok(Outcome::Response(body))
    })
}

/// Account login. Enforces the one-live-session-per-identity invariant:
/// whoever held this identity before gets an unscheduled teardown notice,
/// then the directory points at us.
fn handle_nu_login(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let nuid = require_str(cx.data, "nuid")?;
        let password = require_str(cx.data, "password")?;
        let account = cx.session.accounts.authenticate(nuid, password).await?;

        supersede(cx.session, &account_identity(account.id));
        cx.state.account = Some(account.clone());

        info!(nuid, account_id = account.id, "account logged in");
        let mut body = ValueMap::new();
        body.set("nuid", account.nuid);
        body.set("userId", account.id);
        body.set("profileId", account.id);
        body.set("lkey", Uuid::new_v4().simple().to_string());
        Ok(Outcome::Response(body))
    })
}

fn handle_nu_get_personas(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let account = current_account(&cx)?;
        let names: Vec<Value> = cx
            .session
            .accounts
            .personas(account)
            .await
            .into_iter()
            .map(|persona| Value::Str(persona.name))
            .collect();

        let mut body = ValueMap::new();
        body.set("personas", names);
        Ok(Outcome::Response(body))
    })
}

fn handle_nu_add_persona(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let account = current_account(&cx)?;
        let name = require_str(cx.data, "name")?;
        let persona = cx.session.accounts.add_persona(account, name).await?;

        info!(name = %persona.name, persona_id = persona.id, "persona created");
        Ok(Outcome::Response(ValueMap::new()))
    })
}

/// Persona login: issues the session key the theater protocol later
/// presents, and registers the persona identity for push routing.
fn handle_nu_login_persona(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let account = current_account(&cx)?;
        let name = require_str(cx.data, "name")?;
        let persona = cx.session.accounts.persona_by_name(account, name).await?;
        let lkey = cx.session.accounts.issue_session_key(&persona).await;

        supersede(cx.session, &persona_identity(persona.id));
        cx.state.persona = Some(persona.clone());

        info!(name = %persona.name, persona_id = persona.id, "persona logged in");
        let mut body = ValueMap::new();
        body.set("lkey", lkey);
        body.set("profileId", persona.id);
        body.set("userId", persona.id);
        Ok(Outcome::Response(body))
    })
}

fn handle_get_country_list(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let countries: Vec<Value> = [
            ("US", "United States of America"),
            ("CA", "Canada"),
            ("GB", "United Kingdom"),
            ("DE", "Germany"),
            ("FR", "France"),
            ("PL", "Poland"),
        ]
        .into_iter()
        .map(|(iso, description)| {
            let mut country = ValueMap::new();
            country.set("ISOCode", iso);
            country.set("description", description);
            Value::Map(country)
        })
        .collect();

        let mut body = ValueMap::new();
        body.set("countryList", countries);
        Ok(Outcome::Response(body))
    })
}

fn handle_nu_get_tos(_cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut body = ValueMap::new();
        body.set("tos", "Welcome back to the battlefield.");
        body.set("version", "2.0");
        Ok(Outcome::Response(body))
    })
}

/// Entitles the account behind an activation key. Callable without a logged
/// session (the retail first-run flow), in which case the credentials ride
/// along in the request.
fn handle_nu_entitle_game(cx: Context<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let account_id = match &cx.state.account {
            Some(account) => account.id,
            None => {
                let nuid = require_str(cx.data, "nuid")?;
                let password = require_str(cx.data, "password")?;
                cx.session.accounts.authenticate(nuid, password).await?.id
            }
        };
        let key = require_str(cx.data, "key")?;
        cx.session.accounts.entitle_game(account_id, key).await?;

        info!(account_id, "game entitled");
        let mut body = ValueMap::new();
        body.set("nuid", cx.data.get_str("nuid").unwrap_or(""));
        Ok(Outcome::Response(body))
    })
}

fn current_account(cx: &Context<'_>) -> Result<u64, TransactionError> {
    cx.state
        .account
        .as_ref()
        .map(|account| account.id)
        .ok_or_else(|| TransactionError::new(ErrorCode::SessionNotAuthorized))
}

/// Evicts whichever other connection currently serves `identity`, then
/// registers ours. The displaced connection gets exactly one unscheduled
/// teardown notice; delivery failure means it is already gone.
fn supersede(session: &crate::session::PlasmaSession, identity: &str) {
    if let Some(previous) = session
        .directory
        .register(identity, session.handle.clone(), None)
    {
        info!(
            identity,
            displaced = previous.connection_id(),
            "identity logged in elsewhere, superseding"
        );
        let mut notice = ValueMap::new();
        notice.set("reason", "CONFLICTING_SESSION");
        previous.deliver(PushEvent::new(
            connect::CODE.as_str(),
            connect::TXN_GOODBYE,
            notice,
        ));
    }
}
