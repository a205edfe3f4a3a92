use serde_json::{Map, Value};

use crate::Role;

use super::{PolicyInput, Schema};

/// A declarative predicate over a [`PolicyInput`].
///
/// Rules are pure data; [`Rule::holds`] is the only interpreter.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Caller presents a valid session.
    Authenticated,
    /// Caller's claimed role is exactly this role.
    HasRole(Role),
    /// Caller is the resource owner.
    CallerOwnsResource,
    /// Stored resource has this status.
    ResourceStatusIs(&'static str),
    /// None of these fields are modified by the request unless the caller has `role`.
    FieldsUnchangedUnless {
        fields: &'static [&'static str],
        role: Role,
    },
    /// None of these fields are modified by the request, by anyone.
    FieldsUnchanged(&'static [&'static str]),
    /// Request fields satisfy the schema.
    RequestMatches(&'static Schema),
    AnyOf(Vec<Rule>),
    AllOf(Vec<Rule>),
}

impl Rule {
    pub fn holds(&self, input: &PolicyInput<'_>) -> bool {
        match self {
            Rule::Authenticated => input.caller.is_some(),
            Rule::HasRole(role) => input.caller.is_some_and(|c| c.role == *role),
            Rule::CallerOwnsResource => match (input.caller, input.resource) {
                (Some(caller), Some(resource)) => {
                    resource.owner_id.as_ref() == Some(&caller.identity_id)
                }
                _ => false,
            },
            Rule::ResourceStatusIs(status) => input
                .resource
                .and_then(|r| r.status.as_deref())
                .is_some_and(|s| s == *status),
            Rule::FieldsUnchangedUnless { fields, role } => {
                input.caller.is_some_and(|c| c.role == *role) || !modifies_any(input, fields)
            }
            Rule::FieldsUnchanged(fields) => !modifies_any(input, fields),
            Rule::RequestMatches(schema) => input
                .request_fields
                .is_some_and(|req| schema.validate(req).is_ok()),
            Rule::AnyOf(rules) => rules.iter().any(|r| r.holds(input)),
            Rule::AllOf(rules) => rules.iter().all(|r| r.holds(input)),
        }
    }

    /// Compact human-readable form, used in decision explanations.
    pub fn describe(&self) -> String {
        match self {
            Rule::Authenticated => "authenticated".to_string(),
            Rule::HasRole(role) => format!("role == {role}"),
            Rule::CallerOwnsResource => "caller owns resource".to_string(),
            Rule::ResourceStatusIs(status) => format!("resource.status == {status:?}"),
            Rule::FieldsUnchangedUnless { fields, role } => {
                format!("unchanged {fields:?} unless role == {role}")
            }
            Rule::FieldsUnchanged(fields) => format!("unchanged {fields:?}"),
            Rule::RequestMatches(schema) => format!("request matches {}", schema.name),
            Rule::AnyOf(rules) => join(rules, " || "),
            Rule::AllOf(rules) => join(rules, " && "),
        }
    }
}

fn join(rules: &[Rule], sep: &str) -> String {
    let parts: Vec<String> = rules.iter().map(Rule::describe).collect();
    format!("({})", parts.join(sep))
}

fn modifies_any(input: &PolicyInput<'_>, fields: &[&str]) -> bool {
    let Some(request) = input.request_fields else {
        return false;
    };
    let stored = input.resource.map(|r| &r.fields);
    affected_keys(stored, request)
        .iter()
        .any(|k| fields.contains(k))
}

/// Keys the request would change: present in the request with a value that
/// differs from the stored one (or absent from the stored resource).
pub fn affected_keys<'r>(
    stored: Option<&Map<String, Value>>,
    request: &'r Map<String, Value>,
) -> Vec<&'r str> {
    request
        .iter()
        .filter(|(k, v)| stored.and_then(|s| s.get(k.as_str())) != Some(*v))
        .map(|(k, _)| k.as_str())
        .collect()
}
