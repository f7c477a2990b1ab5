//! Typed transaction errors surfaced to the client.
//!
//! Every failure a handler can produce maps to a numeric code plus a
//! localized message, delivered in an error-kind response packet. The
//! connection itself never pays for a failed transaction — error replies
//! complete the transaction like any other response.

use thiserror::Error;

use packet::{Value, ValueMap};

/// Wire-level error codes understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SessionNotAuthorized = 20,
    ParametersError = 21,
    NotInitialized = 22,
    SystemError = 99,
    UserNotFound = 101,
    TransactionDataNotFound = 104,
    NotEntitledToGame = 120,
    InvalidPassword = 122,
    AlreadyRegistered = 160,
    CodeAlreadyUsed = 180,
    CodeNotFound = 181,
    TosOutOfDate = 260,
    RecordNotFound = 5000,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// The human-readable message shipped alongside the numeric code.
    pub fn localized_message(self) -> &'static str {
        match self {
            ErrorCode::SessionNotAuthorized => "Session Not Authorized",
            ErrorCode::ParametersError => {
                "The required parameters for this call are missing or invalid"
            }
            ErrorCode::NotInitialized => "The client did not send up the initial hello packet",
            ErrorCode::SystemError => "System Error",
            ErrorCode::UserNotFound => "The user was not found",
            ErrorCode::TransactionDataNotFound => {
                "The data necessary for this transaction was not found"
            }
            ErrorCode::NotEntitledToGame => "The user is not entitled to access this game",
            ErrorCode::InvalidPassword => "The password the user specified is incorrect",
            ErrorCode::AlreadyRegistered => "That account name is already taken",
            ErrorCode::CodeAlreadyUsed => "That code has already been used",
            ErrorCode::CodeNotFound => "The code is not valid for registering this game",
            ErrorCode::TosOutOfDate => "The TOS Content is out of date.",
            ErrorCode::RecordNotFound => "Record not found",
        }
    }
}

/// A failed transaction, carried back to the client as an error packet.
#[derive(Debug, Clone, Error)]
#[error("transaction failed with {code:?}")]
pub struct TransactionError {
    pub code: ErrorCode,
    /// Extra per-error payload (`errorContainer` on the wire, usually empty).
    pub container: Vec<Value>,
}

impl TransactionError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            container: Vec::new(),
        }
    }

    pub fn with_container(code: ErrorCode, container: Vec<Value>) -> Self {
        Self { code, container }
    }
}

/// What a handler hands back to the transactor on success.
#[derive(Debug)]
pub enum Outcome {
    /// A response body to encode and send.
    Response(ValueMap),
    /// No response is expected (pure notifications, keepalive replies).
    Skip,
}

/// The result type every handler returns.
pub type HandlerResult = Result<Outcome, TransactionError>;
