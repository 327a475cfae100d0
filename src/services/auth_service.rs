use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::accounts::UserStore;
use crate::error::AuthError;
use crate::middleware::auth::Claims;
use crate::models::{User, UserId};

pub const USERNAME_MIN_LEN: usize = 4;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
/// One year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
    token_ttl_secs: u64,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: impl Into<String>, token_ttl_secs: u64) -> Self {
        Self {
            users,
            jwt_secret: jwt_secret.into(),
            token_ttl_secs: token_ttl_secs.min(MAX_TOKEN_TTL_SECS),
            hash_cost: DEFAULT_COST,
        }
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<UserId, AuthError> {
        let username = validate_username(username)?;
        if password.len() < PASSWORD_MIN_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                PASSWORD_MIN_LEN
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hash_password(password, self.hash_cost).await?,
            created_at: Utc::now(),
        };
        self.users.create_user(&user).await?;
        tracing::info!("User {} registered", user.id);
        Ok(user.id)
    }

    /// Verify credentials and issue a bearer token.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let username = validate_username(username)?;
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            tracing::warn!("Failed sign-in for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        self.generate_token(&user)
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        let exp = (Utc::now() + Duration::seconds(self.token_ttl_secs as i64)).timestamp() as usize;
        let claims = Claims {
            user_id: user.id.to_string(),
            username: user.username.clone(),
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?;
        Ok(token)
    }

    pub fn parse_token(&self, token: &str) -> Result<Claims, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)
    }
}

// bcrypt blocks for hundreds of ms at DEFAULT_COST; run it on the blocking pool.
async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    Ok(tokio::task::spawn_blocking(move || hash(password, cost)).await??)
}

async fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let (password, password_hash) = (password.to_string(), password_hash.to_string());
    Ok(tokio::task::spawn_blocking(move || verify(password, &password_hash)).await??)
}

fn validate_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "username must be {}-{} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    Ok(username)
}
