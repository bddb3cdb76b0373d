use std::{
    fmt,
    str::FromStr,
    sync::{Arc, LazyLock},
    time::{SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

/// Lifetime of a token issued with an expiry.
const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

static DISPLAY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_ ]{3,20}$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// Role
///
/// The two privilege levels a token can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(TokenError::InvalidRole(other.to_string())),
        }
    }
}

/// Claims
///
/// The signed payload of a session token. `sub` is the customer id for user tokens
/// and a random id for admin tokens. `jti` is fresh per issue, so two tokens never
/// share a string. Tokens without `exp` never expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub action: String,
    pub iss: String,
    pub iat: u64,
    pub jti: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid subject id: {0}")]
    InvalidSubject(String),

    #[error("invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("action not allowed: {0}")]
    InvalidAction(String),

    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("unexpected signing method: {0:?}")]
    UnexpectedAlgorithm(Algorithm),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// True when the failure comes from server configuration rather than the input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TokenError::MissingSecret)
    }
}

/// TokenService
///
/// Issues and validates HMAC-signed session tokens. Cheap to clone; the secret and
/// the action allow-list are shared.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<str>,
    issuer: Arc<str>,
    allowed_actions: Arc<[String]>,
}

impl TokenService {
    pub fn new(secret: &str, issuer: &str, allowed_actions: Vec<String>) -> Self {
        Self {
            secret: Arc::from(secret),
            issuer: Arc::from(issuer),
            allowed_actions: Arc::from(allowed_actions),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, &config.issuer, config.allowed_actions.clone())
    }

    pub fn is_allowed_action(&self, action: &str) -> bool {
        self.allowed_actions.iter().any(|allowed| allowed == action)
    }

    /// issue
    ///
    /// Validates every input, then signs an HS256 token. With `with_expiry` the token
    /// lapses after 30 days.
    pub fn issue(
        &self,
        subject_id: &str,
        display_name: &str,
        role: &str,
        action: &str,
        with_expiry: bool,
    ) -> Result<String, TokenError> {
        let sub = Uuid::parse_str(subject_id)
            .map_err(|_| TokenError::InvalidSubject(subject_id.to_string()))?;
        if !DISPLAY_NAME.is_match(display_name) {
            return Err(TokenError::InvalidDisplayName(display_name.to_string()));
        }
        let role = role.parse::<Role>()?;
        if !self.is_allowed_action(action) {
            return Err(TokenError::InvalidAction(action.to_string()));
        }
        let key = self.key_bytes()?;

        let iat = now_secs();
        let claims = Claims {
            sub,
            name: display_name.to_string(),
            role,
            action: action.to_string(),
            iss: self.issuer.to_string(),
            iat,
            jti: Uuid::new_v4(),
            exp: with_expiry.then_some(iat + TOKEN_TTL_SECS),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(key))?)
    }

    /// validate
    ///
    /// Accepts only HMAC algorithms, checks the signature and, when present, the expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token)?;
        if !matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::UnexpectedAlgorithm(header.alg));
        }
        let key = self.key_bytes()?;

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &DecodingKey::from_secret(key), &validation)?;
        Ok(data.claims)
    }

    fn key_bytes(&self) -> Result<&[u8], TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(self.secret.as_bytes())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    fn service() -> TokenService {
        TokenService::new(
            "unit-test-secret",
            "Rubicon BMS",
            vec!["ADMIN".to_string(), "READ".to_string()],
        )
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let tokens = service();
        let subject = Uuid::new_v4();
        let token = tokens.issue(&subject.to_string(), "Acme Co", "user", "READ", false).unwrap();

        let claims = tokens.validate(&token).unwrap();
        assert_eq!(claims.sub, subject);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.action, "READ");
        assert_eq!(claims.iss, "Rubicon BMS");
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn expiry_is_thirty_days() {
        let tokens = service();
        let token = tokens
            .issue(&Uuid::new_v4().to_string(), "Admin", "admin", "ADMIN", true)
            .unwrap();
        let claims = tokens.validate(&token).unwrap();
        assert_eq!(claims.exp, Some(claims.iat + TOKEN_TTL_SECS));
    }

    #[test]
    fn issue_rejects_bad_inputs() {
        let tokens = service();
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            tokens.issue("not-a-uuid", "Admin", "admin", "ADMIN", false),
            Err(TokenError::InvalidSubject(_))
        ));
        assert!(matches!(
            tokens.issue(&id, "ab", "admin", "ADMIN", false),
            Err(TokenError::InvalidDisplayName(_))
        ));
        assert!(matches!(
            tokens.issue(&id, "Acme-Co", "admin", "ADMIN", false),
            Err(TokenError::InvalidDisplayName(_))
        ));
        assert!(matches!(
            tokens.issue(&id, "Admin", "root", "ADMIN", false),
            Err(TokenError::InvalidRole(_))
        ));
        assert!(matches!(
            tokens.issue(&id, "Admin", "admin", "DELETE", false),
            Err(TokenError::InvalidAction(_))
        ));
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let tokens = TokenService::new("", "Rubicon BMS", vec!["ADMIN".to_string()]);
        let err = tokens
            .issue(&Uuid::new_v4().to_string(), "Admin", "admin", "ADMIN", false)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = TokenService::new("another-secret", "Rubicon BMS", vec!["ADMIN".to_string()]);
        let token = other
            .issue(&Uuid::new_v4().to_string(), "Admin", "admin", "ADMIN", false)
            .unwrap();
        assert!(matches!(service().validate(&token), Err(TokenError::Jwt(_))));
    }

    #[test]
    fn same_inputs_issue_distinct_tokens() {
        let tokens = service();
        let subject = Uuid::new_v4().to_string();
        let first = tokens.issue(&subject, "Acme Co", "user", "READ", false).unwrap();
        let second = tokens.issue(&subject, "Acme Co", "user", "READ", false).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn expired_token_is_rejected() {
        let iat = now_secs() - 2 * TOKEN_TTL_SECS;
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: "Admin".to_string(),
            role: Role::Admin,
            action: "ADMIN".to_string(),
            iss: "Rubicon BMS".to_string(),
            iat,
            jti: Uuid::new_v4(),
            exp: Some(iat + TOKEN_TTL_SECS),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        let err = service().validate(&token).unwrap_err();
        assert!(matches!(err, TokenError::Jwt(ref e) if matches!(e.kind(), ErrorKind::ExpiredSignature)));
    }

    #[test]
    fn rsa_header_is_rejected() {
        // {"alg":"RS256","typ":"JWT"} . {} . junk signature
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.e30.c2lnbmF0dXJl";
        assert!(matches!(
            service().validate(token),
            Err(TokenError::UnexpectedAlgorithm(Algorithm::RS256))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(service().validate("not.a.token").is_err());
    }
}
