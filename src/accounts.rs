//! Account list parsing
//!
//! The account list is line-oriented, one account per line, colon-delimited:
//!
//! ```text
//! username:password
//! username:password:token
//! token
//! ```
//!
//! Each parsed account becomes one independently scheduled farming task.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Login material for one account
///
/// Immutable once loaded; which variant is present drives the session
/// builder's branch selection (password login vs direct token use).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credentials {
    /// Username and password; the login endpoint issues the token
    Password {
        /// Account username
        username: String,
        /// Account password
        password: String,
    },

    /// Username and password plus a pre-issued token; the token wins and the
    /// password login is skipped
    PasswordWithToken {
        /// Account username
        username: String,
        /// Account password
        password: String,
        /// Pre-issued access token
        token: String,
    },

    /// Bare token; the username is recovered from the current-user profile
    Token {
        /// Pre-issued access token
        token: String,
    },
}

impl Credentials {
    /// Parses one account line
    ///
    /// Returns a configuration error for an empty line or one with more than
    /// three colon-separated fields.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim_end_matches(['\r', '\n']).trim();
        if trimmed.is_empty() {
            return Err(Error::Config {
                message: "empty account line".into(),
                key: Some("accounts".into()),
            });
        }

        let fields: Vec<&str> = trimmed.split(':').collect();
        match fields.as_slice() {
            [token] => Ok(Credentials::Token {
                token: (*token).to_string(),
            }),
            [username, password] => Ok(Credentials::Password {
                username: (*username).to_string(),
                password: (*password).to_string(),
            }),
            [username, password, token] => Ok(Credentials::PasswordWithToken {
                username: (*username).to_string(),
                password: (*password).to_string(),
                token: (*token).to_string(),
            }),
            _ => Err(Error::Config {
                message: format!("malformed account line: {trimmed}"),
                key: Some("accounts".into()),
            }),
        }
    }

    /// Username, if this credential carries one
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::Password { username, .. }
            | Credentials::PasswordWithToken { username, .. } => Some(username),
            Credentials::Token { .. } => None,
        }
    }

    /// Password, if this credential carries one
    pub fn password(&self) -> Option<&str> {
        match self {
            Credentials::Password { password, .. }
            | Credentials::PasswordWithToken { password, .. } => Some(password),
            Credentials::Token { .. } => None,
        }
    }

    /// Pre-issued token, if this credential carries one
    pub fn token(&self) -> Option<&str> {
        match self {
            Credentials::PasswordWithToken { token, .. } | Credentials::Token { token } => {
                Some(token)
            }
            Credentials::Password { .. } => None,
        }
    }

    /// Cache key for this account: the username when present, else the token
    pub fn cache_key(&self) -> &str {
        match self {
            Credentials::Password { username, .. }
            | Credentials::PasswordWithToken { username, .. } => username,
            Credentials::Token { token } => token,
        }
    }
}

/// Parses an account list, skipping blank lines
pub fn parse_accounts(contents: &str) -> Result<Vec<Credentials>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Credentials::parse)
        .collect()
}

/// Reads and parses an account list file
pub fn load_accounts(path: &Path) -> Result<Vec<Credentials>> {
    let contents = std::fs::read_to_string(path)?;
    parse_accounts(&contents)
}
