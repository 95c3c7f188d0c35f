//! Linking tokens: short-lived JWTs that let a user claim a pooled device
//! or hub.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::sync::Arc;

use crate::db::repository::FullRepository;
use crate::db::services;
use crate::error::{DomainError, DomainResult};
use crate::models::{is_hub_id, DeviceId, HubId, UserId, HUB_ID_PREFIX};

pub const DEFAULT_TOKEN_EXPIRY_MINUTES: i64 = 60;

/// Secret used when none is configured. Not suitable for production.
pub const FALLBACK_LINKING_SECRET: &str = "your-secret-key-here";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingClaims {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub exp: i64,
}

/// What a successful link attached, and to which hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Hub(HubId),
    Device { device_id: DeviceId, hub_id: HubId },
}

impl LinkOutcome {
    pub fn hub_id(&self) -> &HubId {
        match self {
            Self::Hub(hub_id) => hub_id,
            Self::Device { hub_id, .. } => hub_id,
        }
    }
}

#[derive(Clone)]
pub struct LinkingService {
    repository: Arc<dyn FullRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl LinkingService {
    pub fn new(repository: Arc<dyn FullRepository>, secret: Option<&str>) -> Self {
        let secret = match secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("No linking secret configured; using the built-in fallback");
                FALLBACK_LINKING_SECRET
            }
        };
        Self {
            repository,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for a pooled device or hub.
    pub async fn generate_linking_token(&self, id: &str, expiry_minutes: i64) -> DomainResult<String> {
        if !self.repository.is_in_pool(id).await? {
            return Err(DomainError::not_found(format!(
                "{} is not available for linking",
                id
            )));
        }

        let item_type = if is_hub_id(id) {
            self.repository
                .get_hub(&HubId::from(id))
                .await?
                .hub_type
                .as_str()
                .to_string()
        } else {
            self.repository
                .get_device(&DeviceId::from(id))
                .await?
                .device_type()
                .to_string()
        };

        let claims = LinkingClaims {
            id: id.to_string(),
            item_type,
            exp: (Utc::now() + Duration::minutes(expiry_minutes)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DomainError::internal(format!("Failed to sign linking token: {}", e)))
    }

    /// Verify a token and return its claims.
    pub fn decode_token(&self, token: &str) -> DomainResult<LinkingClaims> {
        decode::<LinkingClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => DomainError::unauthorized("Linking token has expired"),
                _ => DomainError::unauthorized(format!("Invalid linking token: {}", e)),
            })
    }

    /// Claim the item named by `token` for `user_id`.
    ///
    /// A hub becomes owned by the user. A device joins the user's default
    /// hub, so a user without one cannot claim devices yet.
    pub async fn process_linking(&self, token: &str, user_id: &UserId) -> DomainResult<LinkOutcome> {
        let claims = self.decode_token(token)?;

        if !self.repository.is_in_pool(&claims.id).await? {
            return Err(DomainError::conflict(format!(
                "{} is no longer available for linking",
                claims.id
            )));
        }

        let outcome = if claims.item_type.starts_with(HUB_ID_PREFIX) {
            self.link_hub(&HubId::from(claims.id), user_id).await?
        } else {
            self.link_device(&DeviceId::from(claims.id), user_id).await?
        };
        Ok(outcome)
    }

    async fn link_hub(&self, hub_id: &HubId, user_id: &UserId) -> DomainResult<LinkOutcome> {
        let repo = self.repository.as_ref();
        let hub = repo.get_hub(hub_id).await?;
        services::create_hub(repo, hub_id, user_id, hub).await?;
        repo.remove_from_pool(hub_id.as_str()).await?;

        let mut user = services::setup_new_user(repo, user_id, Map::new()).await?;
        user.grant_hub(hub_id);
        repo.put_user(&user).await?;

        info!("User {} linked hub {}", user_id, hub_id);
        Ok(LinkOutcome::Hub(hub_id.clone()))
    }

    async fn link_device(&self, device_id: &DeviceId, user_id: &UserId) -> DomainResult<LinkOutcome> {
        let repo = self.repository.as_ref();
        let user = repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("User {} not found", user_id)))?;
        let hub_id = user.default_hub_id.ok_or_else(|| {
            DomainError::validation(format!(
                "User {} has no default hub to add the device to",
                user_id
            ))
        })?;

        services::assign_device_to_hub(repo, device_id, &hub_id).await?;
        info!("User {} linked device {} into hub {}", user_id, device_id, hub_id);
        Ok(LinkOutcome::Device {
            device_id: device_id.clone(),
            hub_id,
        })
    }
}
