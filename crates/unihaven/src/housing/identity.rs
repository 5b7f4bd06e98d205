use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::domain::{require_text, NewUniversity, University, ValidationError};
use super::store::{HousingStore, StoreError};

/// Scheme expected in `Authorization: Token <value>`.
pub const AUTH_SCHEME: &str = "Token";

const TOKEN_DRAW_ATTEMPTS: usize = 4;

/// Opaque per-university secret. Comparison runs in constant time and `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct UniversityToken(String);

impl UniversityToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Parses a presented credential into canonical (lowercase, hyphenated) form.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let uuid = Uuid::parse_str(raw.trim()).map_err(|_| AuthError::Malformed)?;
        Ok(Self(uuid.hyphenated().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, presented: &UniversityToken) -> bool {
        constant_time_eq(self.0.as_bytes(), presented.0.as_bytes())
    }
}

impl fmt::Debug for UniversityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UniversityToken(<redacted>)")
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}

/// Extracts the token from a raw `Authorization` header value.
pub fn token_from_header(header: Option<&str>) -> Result<UniversityToken, AuthError> {
    let value = header.ok_or(AuthError::Missing)?;
    let (scheme, credential) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case(AUTH_SCHEME) {
        return Err(AuthError::Malformed);
    }
    UniversityToken::parse(credential)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no authorization token provided")]
    Missing,
    #[error("authorization header must look like 'Token <uuid>'")]
    Malformed,
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Mints university tokens and resolves presented tokens back to their university.
pub struct TokenRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for TokenRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TokenRegistry<S>
where
    S: HousingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Draws a fresh token that no registered university holds yet.
    pub fn issue_token(&self) -> Result<UniversityToken, StoreError> {
        for _ in 0..TOKEN_DRAW_ATTEMPTS {
            let token = UniversityToken::generate();
            if self.store.find_university_by_token(&token)?.is_none() {
                return Ok(token);
            }
            debug!("token collision, drawing again");
        }
        Err(StoreError::Conflict("unable to mint a unique token".to_string()))
    }

    /// Registers a university and returns it with its freshly minted token.
    pub fn register(
        &self,
        draft: NewUniversity,
    ) -> Result<(University, UniversityToken), RegistrationError> {
        require_text("name", &draft.name)?;
        require_text("country", &draft.country)?;

        let token = self.issue_token()?;
        let university = self.store.insert_university(draft, token.clone())?;
        info!(university = %university.id, name = %university.name, "university registered");
        Ok((university, token))
    }

    pub fn validate_token(&self, token: &UniversityToken) -> Result<University, AuthError> {
        self.store
            .find_university_by_token(token)?
            .ok_or(AuthError::InvalidToken)
    }

    /// Resolves a raw `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<University, AuthError> {
        let token = token_from_header(header)?;
        self.validate_token(&token)
    }
}
