// =============================================================================
// ACL — role to allowed channel-pattern mapping
// =============================================================================

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Internal,
}

impl FromStr for Role {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "internal" => Ok(Role::Internal),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

pub struct Acl {
    rules: HashMap<Role, Vec<String>>,
}

impl Default for Acl {
    /// `user` sees `market:tick:*`, `indicators:*`; `admin` additionally sees
    /// `market:ohlc:*`, `market:depth:*`, `engine:signal:*`,
    /// `engine:decision:*`; `internal` sees `*`.
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert(Role::User, vec!["market:tick:*".to_string(), "indicators:*".to_string()]);
        rules.insert(
            Role::Admin,
            vec![
                "market:tick:*".to_string(),
                "market:ohlc:*".to_string(),
                "market:depth:*".to_string(),
                "indicators:*".to_string(),
                "engine:signal:*".to_string(),
                "engine:decision:*".to_string(),
            ],
        );
        rules.insert(Role::Internal, vec!["*".to_string()]);
        Self { rules }
    }
}

impl Acl {
    /// Whether `role` may subscribe to the requested channel pattern.
    /// `requested` may itself be an exact channel or a `*`-glob; it is
    /// allowed only if it is fully contained within one of the role's
    /// allowed patterns.
    pub fn allows(&self, role: Role, requested: &str) -> bool {
        self.rules.get(&role).map(|patterns| patterns.iter().any(|allowed| subsumes(allowed, requested))).unwrap_or(false)
    }
}

/// `allowed` subsumes `requested` if every channel matching `requested` also
/// matches `allowed` — true when `allowed` is `*`, or when `requested`'s
/// literal prefix (up to its own wildcard, if any) starts with `allowed`'s
/// prefix.
fn subsumes(allowed: &str, requested: &str) -> bool {
    if allowed == "*" {
        return true;
    }
    let allowed_prefix = allowed.strip_suffix('*').unwrap_or(allowed);
    let requested_prefix = requested.strip_suffix('*').unwrap_or(requested);
    if allowed.ends_with('*') {
        requested_prefix.starts_with(allowed_prefix)
    } else {
        requested_prefix == allowed_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_may_subscribe_to_tick_channel() {
        let acl = Acl::default();
        assert!(acl.allows(Role::User, "market:tick:BANKNIFTY"));
        assert!(acl.allows(Role::User, "market:tick:*"));
    }

    #[test]
    fn user_may_not_subscribe_to_signal_channel() {
        let acl = Acl::default();
        assert!(!acl.allows(Role::User, "engine:signal:BANKNIFTY"));
    }

    #[test]
    fn user_may_not_subscribe_to_ohlc_or_depth_channels() {
        let acl = Acl::default();
        assert!(!acl.allows(Role::User, "market:ohlc:BANKNIFTY:1m"));
        assert!(!acl.allows(Role::User, "market:depth:BANKNIFTY"));
    }

    #[test]
    fn admin_sees_ohlc_and_depth_channels() {
        let acl = Acl::default();
        assert!(acl.allows(Role::Admin, "market:ohlc:BANKNIFTY:1m"));
        assert!(acl.allows(Role::Admin, "market:depth:BANKNIFTY"));
    }

    #[test]
    fn admin_sees_signal_and_decision_channels() {
        let acl = Acl::default();
        assert!(acl.allows(Role::Admin, "engine:signal:BANKNIFTY"));
        assert!(acl.allows(Role::Admin, "engine:decision:BANKNIFTY"));
    }

    #[test]
    fn internal_sees_everything() {
        let acl = Acl::default();
        assert!(acl.allows(Role::Internal, "anything:at:all"));
    }

    #[test]
    fn a_broader_wildcard_request_than_allowed_is_rejected() {
        let acl = Acl::default();
        // user is allowed market:tick:* specifically, not all of market:*
        assert!(!acl.allows(Role::User, "market:*"));
    }
}
