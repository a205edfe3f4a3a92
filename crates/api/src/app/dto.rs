use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolegate_auth::{AuditRecord, ChangeType, Operation, Principal, Role};
use rolegate_core::{IdentityId, TokenId};
use rolegate_infra::AccessError;
use rolegate_infra::audit_store::{AuditQuery, DEFAULT_AUDIT_LIMIT};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRoleRequest {
    pub role: String,
    pub target_id: String,
}

/// Optional optimistic-concurrency precondition for profile updates.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionQuery {
    pub expected_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListQuery {
    pub target_id: Option<String>,
    pub change_type: Option<String>,
    pub limit: Option<usize>,
}

impl AuditListQuery {
    pub fn into_query(self) -> Result<AuditQuery, AccessError> {
        Ok(AuditQuery {
            target_id: self.target_id.map(parse_identity_id).transpose()?,
            change_type: self
                .change_type
                .map(|c| c.parse::<ChangeType>())
                .transpose()?,
            limit: self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainQuery {
    pub operation: String,
    pub collection: String,
    pub resource_id: Option<String>,
}

impl ExplainQuery {
    pub fn operation(&self) -> Result<Operation, AccessError> {
        Ok(self.operation.parse::<Operation>()?)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub identity_id: IdentityId,
    pub role: Role,
    pub token_id: TokenId,
    pub expires_at: DateTime<Utc>,
}

impl From<&Principal> for WhoAmIResponse {
    fn from(p: &Principal) -> Self {
        Self {
            identity_id: p.identity_id.clone(),
            role: p.role,
            token_id: p.token_id,
            expires_at: p.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub records: Vec<AuditRecord>,
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_identity_id(raw: String) -> Result<IdentityId, AccessError> {
    IdentityId::new(raw).map_err(|_| AccessError::InvalidArgument("malformed identity id".to_string()))
}
