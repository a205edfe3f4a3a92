//! Declarative access policy evaluation.
//!
//! Policies are static data: a mapping from collection name to per-operation
//! [`Rule`](rules::Rule) trees. [`evaluate`] is a single generic interpreter
//! over that data.
//!
//! - No IO
//! - No panics
//! - Default deny: a collection without rules, or an operation without a rule,
//!   is denied for every caller.

pub mod fields;
pub mod rules;
pub mod ruleset;

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use rolegate_core::{DomainError, IdentityId};

use crate::{Principal, Profile};

pub use fields::{FieldKind, FieldSpec, FieldViolation, Schema};
pub use rules::Rule;
pub use ruleset::{CollectionRules, RuleSet, collections, default_rules};

/// Data operation being authorized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DomainError::validation(format!("unknown operation '{other}'"))),
        }
    }
}

/// Existing resource as seen by the evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub owner_id: Option<IdentityId>,
    pub status: Option<String>,
    pub fields: Map<String, Value>,
}

impl Resource {
    /// Field name holding a document's owner.
    pub const OWNER_FIELD: &'static str = "ownerId";
    /// Field name holding a document's publication status.
    pub const STATUS_FIELD: &'static str = "status";

    /// Build from a generic document's fields (`ownerId`, `status` are lifted).
    pub fn document(fields: Map<String, Value>) -> Self {
        let owner_id = fields
            .get(Self::OWNER_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| IdentityId::new(s).ok());
        let status = fields
            .get(Self::STATUS_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            owner_id,
            status,
            fields,
        }
    }

    /// A profile is owned by the identity it describes.
    pub fn profile(profile: &Profile) -> Self {
        Self {
            owner_id: Some(profile.identity_id.clone()),
            status: None,
            fields: profile.to_fields(),
        }
    }
}

/// Everything the evaluator may look at for one access.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub operation: Operation,
    pub collection: &'a str,
    /// `None` for unauthenticated callers.
    pub caller: Option<&'a Principal>,
    /// The stored resource (absent for `create`).
    pub resource: Option<&'a Resource>,
    /// Fields being written (`create`/`update`).
    pub request_fields: Option<&'a Map<String, Value>>,
}

impl<'a> PolicyInput<'a> {
    pub fn new(operation: Operation, collection: &'a str, caller: Option<&'a Principal>) -> Self {
        Self {
            operation,
            collection,
            caller,
            resource: None,
            request_fields: None,
        }
    }

    pub fn with_resource(mut self, resource: &'a Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_request(mut self, fields: &'a Map<String, Value>) -> Self {
        self.request_fields = Some(fields);
        self
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// No rules exist for the collection.
    UnknownCollection,
    /// The collection has rules, but none for this operation.
    NoRuleForOperation,
    /// The operation's rule held.
    RuleSatisfied { rule: String },
    /// The operation's rule did not hold.
    RuleFailed { rule: String },
}

/// Decision plus the reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub decision: Decision,
    pub collection: String,
    pub operation: Operation,
    pub rule_set_version: &'static str,
    pub reason: DecisionReason,
}

/// Evaluate against the deployed rule set.
pub fn evaluate(input: &PolicyInput<'_>) -> Decision {
    default_rules().evaluate(input)
}

/// Explain a decision against the deployed rule set.
pub fn explain(input: &PolicyInput<'_>) -> Explanation {
    default_rules().explain(input)
}
