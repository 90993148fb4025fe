//! Field-level access voters
//!
//! A field's access list is an extra restriction on top of whatever the
//! backend enforces. Voters run in order; the first [`Access::Deny`] fails the
//! check and anything short of a deny allows.

use crate::core::account::Account;
use crate::core::record::Record;
use axum::http::Method;
use std::fmt;
use std::sync::Arc;

/// What the caller is about to do with a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOperation {
    View,
    Edit,
}

/// A single voter's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
    /// No opinion
    Ignore,
}

/// Everything a voter may look at
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    pub operation: AccessOperation,
    pub account: &'a Account,
    pub method: &'a Method,
    pub record: Option<&'a Record>,
}

/// Custom voter function
pub type VoterFn = Arc<dyn Fn(&AccessContext<'_>) -> Access + Send + Sync>;

/// Access voter for a field
#[derive(Clone)]
pub enum AccessVoter {
    /// Deny anonymous callers
    Authenticated,

    /// Deny callers that have none of these roles
    HasRole(Vec<String>),

    /// Deny one operation outright (`DenyOperation(Edit)` makes a field read-only)
    DenyOperation(AccessOperation),

    /// Custom voter
    Custom(VoterFn),
}

impl AccessVoter {
    /// Wrap a closure as a voter
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&AccessContext<'_>) -> Access + Send + Sync + 'static,
    {
        AccessVoter::Custom(Arc::new(f))
    }

    pub fn vote(&self, context: &AccessContext<'_>) -> Access {
        match self {
            AccessVoter::Authenticated => {
                if context.account.is_anonymous() {
                    Access::Deny
                } else {
                    Access::Allow
                }
            }

            AccessVoter::HasRole(roles) => {
                if roles.iter().any(|role| context.account.has_role(role)) {
                    Access::Allow
                } else {
                    Access::Deny
                }
            }

            AccessVoter::DenyOperation(operation) => {
                if *operation == context.operation {
                    Access::Deny
                } else {
                    Access::Ignore
                }
            }

            AccessVoter::Custom(f) => f(context),
        }
    }

    /// Parse a voter from its config string
    ///
    /// `authenticated`, `read_only`, `role:<name>`. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "authenticated" => Some(AccessVoter::Authenticated),
            "read_only" => Some(AccessVoter::DenyOperation(AccessOperation::Edit)),
            s => s
                .strip_prefix("role:")
                .map(|role| AccessVoter::HasRole(vec![role.to_string()])),
        }
    }
}

impl fmt::Debug for AccessVoter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessVoter::Authenticated => write!(f, "Authenticated"),
            AccessVoter::HasRole(roles) => write!(f, "HasRole({:?})", roles),
            AccessVoter::DenyOperation(op) => write!(f, "DenyOperation({:?})", op),
            AccessVoter::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Run voters in order; any deny fails, everything else allows
pub fn check_access(voters: &[AccessVoter], context: &AccessContext<'_>) -> bool {
    !voters
        .iter()
        .any(|voter| voter.vote(context) == Access::Deny)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(
        operation: AccessOperation,
        account: &'a Account,
        method: &'a Method,
    ) -> AccessContext<'a> {
        AccessContext {
            operation,
            account,
            method,
            record: None,
        }
    }

    #[test]
    fn test_no_voters_allows() {
        let account = Account::anonymous();
        let ctx = context(AccessOperation::View, &account, &Method::GET);
        assert!(check_access(&[], &ctx));
    }

    #[test]
    fn test_authenticated_voter() {
        let anonymous = Account::anonymous();
        let user = Account::authenticated("1", vec![]);
        let voters = [AccessVoter::Authenticated];

        assert!(!check_access(
            &voters,
            &context(AccessOperation::View, &anonymous, &Method::GET)
        ));
        assert!(check_access(
            &voters,
            &context(AccessOperation::View, &user, &Method::GET)
        ));
    }

    #[test]
    fn test_single_deny_wins() {
        let editor = Account::authenticated("1", vec!["editor".to_string()]);
        let voters = [
            AccessVoter::HasRole(vec!["editor".to_string()]),
            AccessVoter::custom(|_| Access::Deny),
            AccessVoter::custom(|_| Access::Allow),
        ];
        assert!(!check_access(
            &voters,
            &context(AccessOperation::View, &editor, &Method::GET)
        ));
    }

    #[test]
    fn test_ignore_is_allow() {
        let account = Account::anonymous();
        let voters = [AccessVoter::custom(|_| Access::Ignore)];
        assert!(check_access(
            &voters,
            &context(AccessOperation::Edit, &account, &Method::POST)
        ));
    }

    #[test]
    fn test_read_only_voter() {
        let account = Account::anonymous();
        let voters = [AccessVoter::parse("read_only").unwrap()];
        assert!(check_access(
            &voters,
            &context(AccessOperation::View, &account, &Method::GET)
        ));
        assert!(!check_access(
            &voters,
            &context(AccessOperation::Edit, &account, &Method::PATCH)
        ));
    }

    #[test]
    fn test_parse_voters() {
        assert!(matches!(
            AccessVoter::parse("authenticated"),
            Some(AccessVoter::Authenticated)
        ));
        match AccessVoter::parse("role:admin") {
            Some(AccessVoter::HasRole(roles)) => assert_eq!(roles, vec!["admin"]),
            other => panic!("Expected HasRole, got {:?}", other),
        }
        assert!(AccessVoter::parse("whatever").is_none());
    }
}
