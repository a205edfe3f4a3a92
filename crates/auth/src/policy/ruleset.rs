use std::collections::HashMap;
use std::sync::OnceLock;

use crate::Role;

use super::fields::MESSAGE_SCHEMA;
use super::{Decision, DecisionReason, Explanation, Operation, PolicyInput, Rule};

/// Collection identifiers known to the deployed rule set.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const AUDIT: &str = "audit";
    pub const MESSAGES: &str = "messages";
    pub const PROJECTS: &str = "projects";
    pub const BLOG_POSTS: &str = "blog_posts";
}

/// Version tag of the deployed rule set; bump with every rule change.
pub const RULE_SET_VERSION: &str = "2024-06-01";

/// Per-operation rules for one collection. `None` means deny.
#[derive(Debug, Clone, Default)]
pub struct CollectionRules {
    pub create: Option<Rule>,
    pub read: Option<Rule>,
    pub update: Option<Rule>,
    pub delete: Option<Rule>,
}

impl CollectionRules {
    pub fn rule(&self, op: Operation) -> Option<&Rule> {
        match op {
            Operation::Create => self.create.as_ref(),
            Operation::Read => self.read.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }
}

/// Mapping from collection name to its rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: &'static str,
    collections: HashMap<&'static str, CollectionRules>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            version: "empty",
            collections: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, name: &'static str, rules: CollectionRules) -> Self {
        self.collections.insert(name, rules);
        self
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionRules> {
        self.collections.get(name)
    }

    pub fn evaluate(&self, input: &PolicyInput<'_>) -> Decision {
        self.explain(input).decision
    }

    pub fn explain(&self, input: &PolicyInput<'_>) -> Explanation {
        let (decision, reason) = match self.collection(input.collection) {
            None => (Decision::Deny, DecisionReason::UnknownCollection),
            Some(rules) => match rules.rule(input.operation) {
                None => (Decision::Deny, DecisionReason::NoRuleForOperation),
                Some(rule) if rule.holds(input) => (
                    Decision::Allow,
                    DecisionReason::RuleSatisfied {
                        rule: rule.describe(),
                    },
                ),
                Some(rule) => (
                    Decision::Deny,
                    DecisionReason::RuleFailed {
                        rule: rule.describe(),
                    },
                ),
            },
        };

        tracing::trace!(
            collection = input.collection,
            operation = %input.operation,
            decision = ?decision,
            "policy evaluated"
        );

        Explanation {
            decision,
            collection: input.collection.to_string(),
            operation: input.operation,
            rule_set_version: self.version,
            reason,
        }
    }
}

/// The deployed rule set.
pub fn default_rules() -> &'static RuleSet {
    static RULES: OnceLock<RuleSet> = OnceLock::new();
    RULES.get_or_init(build_default_rules)
}

fn elevated() -> Rule {
    Rule::HasRole(Role::Elevated)
}

fn public_content() -> CollectionRules {
    CollectionRules {
        create: Some(elevated()),
        read: Some(Rule::AnyOf(vec![
            Rule::ResourceStatusIs("published"),
            elevated(),
        ])),
        update: Some(elevated()),
        delete: Some(elevated()),
    }
}

fn build_default_rules() -> RuleSet {
    let profiles = CollectionRules {
        create: None,
        read: Some(Rule::AnyOf(vec![Rule::CallerOwnsResource, elevated()])),
        update: Some(Rule::AllOf(vec![
            Rule::AnyOf(vec![Rule::CallerOwnsResource, elevated()]),
            Rule::FieldsUnchanged(&["identityId", "email", "createdAt", "createdBy"]),
            Rule::FieldsUnchangedUnless {
                fields: &["role", "isActive"],
                role: Role::Elevated,
            },
        ])),
        delete: None,
    };

    let messages = CollectionRules {
        create: Some(Rule::RequestMatches(&MESSAGE_SCHEMA)),
        read: Some(elevated()),
        update: Some(elevated()),
        delete: Some(elevated()),
    };

    let audit = CollectionRules {
        read: Some(elevated()),
        ..Default::default()
    };

    RuleSet {
        version: RULE_SET_VERSION,
        collections: HashMap::new(),
    }
    .with_collection(collections::PROFILES, profiles)
    .with_collection(collections::MESSAGES, messages)
    .with_collection(collections::AUDIT, audit)
    .with_collection(collections::PROJECTS, public_content())
    .with_collection(collections::BLOG_POSTS, public_content())
}
