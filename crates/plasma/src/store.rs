//! Account/identity persistence collaborator.
//!
//! The transactor core does not care where accounts live; handlers talk to
//! this narrow trait and nothing else. [`MemoryAccountStore`] is the bundled
//! implementation — DashMap-backed, read-after-write consistent, good enough
//! for tests and single-node deployments. A database-backed implementation
//! slots in behind the same trait.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{ErrorCode, TransactionError};

/// An authenticated account (the billing-level identity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: u64,
    pub nuid: String,
}

/// A persona under an account (the in-game identity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub id: u64,
    pub account_id: u64,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,
    #[error("invalid password")]
    InvalidPassword,
    #[error("name already registered")]
    AlreadyRegistered,
    #[error("not entitled to this game")]
    NotEntitled,
    #[error("activation code not found")]
    CodeNotFound,
    #[error("activation code already used")]
    CodeAlreadyUsed,
    #[error("session key not recognized")]
    UnknownSessionKey,
}

impl From<StoreError> for TransactionError {
    fn from(error: StoreError) -> Self {
        let code = match error {
            StoreError::UserNotFound => ErrorCode::UserNotFound,
            StoreError::InvalidPassword => ErrorCode::InvalidPassword,
            StoreError::AlreadyRegistered => ErrorCode::AlreadyRegistered,
            StoreError::NotEntitled => ErrorCode::NotEntitledToGame,
            StoreError::CodeNotFound => ErrorCode::CodeNotFound,
            StoreError::CodeAlreadyUsed => ErrorCode::CodeAlreadyUsed,
            StoreError::UnknownSessionKey => ErrorCode::SessionNotAuthorized,
        };
        TransactionError::new(code)
    }
}

/// Identity lookup, creation, and session-key bookkeeping.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, nuid: &str, password: &str) -> Result<Account, StoreError>;
    async fn authenticate(&self, nuid: &str, password: &str) -> Result<Account, StoreError>;

    async fn personas(&self, account_id: u64) -> Vec<Persona>;
    async fn add_persona(&self, account_id: u64, name: &str) -> Result<Persona, StoreError>;
    async fn persona_by_name(&self, account_id: u64, name: &str) -> Result<Persona, StoreError>;

    /// Issues an opaque session key (`lkey`) for a persona. The key is what
    /// the game-hosting protocol presents to resume the identity.
    async fn issue_session_key(&self, persona: &Persona) -> String;
    async fn persona_by_session_key(&self, key: &str) -> Result<Persona, StoreError>;

    async fn entitle_game(&self, account_id: u64, key: &str) -> Result<(), StoreError>;
    async fn is_entitled(&self, account_id: u64, game_tag: &str) -> bool;
}

struct StoredAccount {
    account: Account,
    password: String,
}

struct SerialKey {
    targets: Vec<String>,
    used: bool,
}

/// In-memory [`AccountStore`].
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, StoredAccount>,
    personas: DashMap<u64, Vec<Persona>>,
    session_keys: DashMap<String, Persona>,
    entitlements: DashMap<u64, Vec<String>>,
    serial_keys: DashMap<String, SerialKey>,
    next_account_id: AtomicU64,
    next_persona_id: AtomicU64,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an activation key valid for the given game tags.
    pub fn add_serial_key(&self, key: &str, targets: &[&str]) {
        self.serial_keys.insert(
            key.to_string(),
            SerialKey {
                targets: targets.iter().map(ToString::to_string).collect(),
                used: false,
            },
        );
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, nuid: &str, password: &str) -> Result<Account, StoreError> {
        if self.accounts.contains_key(nuid) {
            return Err(StoreError::AlreadyRegistered);
        }
        let account = Account {
            id: self.next_account_id.fetch_add(1, Ordering::Relaxed) + 1,
            nuid: nuid.to_string(),
        };
        self.accounts.insert(
            nuid.to_string(),
            StoredAccount {
                account: account.clone(),
                password: password.to_string(),
            },
        );
        Ok(account)
    }

    async fn authenticate(&self, nuid: &str, password: &str) -> Result<Account, StoreError> {
        let stored = self.accounts.get(nuid).ok_or(StoreError::UserNotFound)?;
        if stored.password != password {
            return Err(StoreError::InvalidPassword);
        }
        Ok(stored.account.clone())
    }

    async fn personas(&self, account_id: u64) -> Vec<Persona> {
        self.personas
            .get(&account_id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    async fn add_persona(&self, account_id: u64, name: &str) -> Result<Persona, StoreError> {
        let taken = self
            .personas
            .iter()
            .any(|list| list.iter().any(|p| p.name == name));
        if taken {
            return Err(StoreError::AlreadyRegistered);
        }
        let persona = Persona {
            id: self.next_persona_id.fetch_add(1, Ordering::Relaxed) + 1,
            account_id,
            name: name.to_string(),
        };
        self.personas
            .entry(account_id)
            .or_default()
            .push(persona.clone());
        Ok(persona)
    }

    async fn persona_by_name(&self, account_id: u64, name: &str) -> Result<Persona, StoreError> {
        self.personas
            .get(&account_id)
            .and_then(|list| list.iter().find(|p| p.name == name).cloned())
            .ok_or(StoreError::UserNotFound)
    }

    async fn issue_session_key(&self, persona: &Persona) -> String {
        let key = Uuid::new_v4().simple().to_string();
        self.session_keys.insert(key.clone(), persona.clone());
        key
    }

    async fn persona_by_session_key(&self, key: &str) -> Result<Persona, StoreError> {
        self.session_keys
            .get(key)
            .map(|p| p.clone())
            .ok_or(StoreError::UnknownSessionKey)
    }

    async fn entitle_game(&self, account_id: u64, key: &str) -> Result<(), StoreError> {
        let mut serial = self
            .serial_keys
            .get_mut(key)
            .ok_or(StoreError::CodeNotFound)?;
        if serial.used {
            return Err(StoreError::CodeAlreadyUsed);
        }
        serial.used = true;
        let mut entitled = self.entitlements.entry(account_id).or_default();
        for target in &serial.targets {
            if !entitled.contains(target) {
                entitled.push(target.clone());
            }
        }
        Ok(())
    }

    async fn is_entitled(&self, account_id: u64, game_tag: &str) -> bool {
        self.entitlements
            .get(&account_id)
            .is_some_and(|tags| tags.iter().any(|t| t == game_tag))
    }
}
