use std::fmt;

use coffer_crypto::CryptoError;

/// Payload attached to a two-factor challenge from the server.
///
/// When the server rejects a login pending 2FA it may identify the account
/// and hand out a voucher the device can present on later attempts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OtpChallenge {
    pub login_id: Option<Vec<u8>>,
    pub voucher_id: Option<String>,
    pub voucher_auth: Option<Vec<u8>>,
    pub reset_token: Option<String>,
}

/// Errors surfaced by the login engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginError {
    // Server-classified
    Username,
    Password,
    Pin2,
    Recovery2,
    Otp(OtpChallenge),
    Server(u16, String),

    // Transport
    Network(String),
    Protocol(String),

    // Tree integrity
    KeyIntegrity(String),
    ServerLostChildren,
    MissingAuth,
    NoAuth,
    MissingLogin,
    InvalidStash(String),
    InvalidUsername,

    // Local
    Storage(String),
    Crypto(CryptoError),
    Internal(String),
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username => write!(f, "No account exists for this username."),
            Self::Password => write!(f, "Invalid password."),
            Self::Pin2 => write!(f, "Invalid PIN."),
            Self::Recovery2 => write!(f, "Invalid recovery answers."),
            Self::Otp(_) => write!(f, "A 2-factor code is required to log in."),
            Self::Server(code, msg) => write!(f, "Server error ({code}): {msg}"),
            Self::Network(msg) => write!(f, "Cannot reach the login server: {msg}"),
            Self::Protocol(msg) => write!(f, "Unexpected server reply: {msg}"),
            Self::KeyIntegrity(msg) => write!(f, "Login data is damaged: {msg}"),
            Self::ServerLostChildren => {
                write!(f, "The server sent fewer child logins than exist locally.")
            }
            Self::MissingAuth => write!(f, "This login has no authentication secret."),
            Self::NoAuth => write!(f, "No authentication material available for this call."),
            Self::MissingLogin => write!(f, "Cannot find the requested login in the tree."),
            Self::InvalidStash(msg) => write!(f, "Invalid login stash: {msg}"),
            Self::InvalidUsername => write!(f, "Invalid username."),
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
            Self::Crypto(err) => write!(f, "Cryptographic operation failed: {err}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for LoginError {}

impl From<CryptoError> for LoginError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<reqwest::Error> for LoginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network("request timed out".into())
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, LoginError>;
