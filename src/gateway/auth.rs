// =============================================================================
// Gateway Token Authentication
// =============================================================================
//
// Tokens are presented as a WebSocket query parameter (`?token=...`) since
// the upgrade handshake has no body for a bearer header. Each configured
// token maps to a role; comparison is constant-time to avoid a timing
// side-channel on the token value, the same property the teacher's
// `AuthBearer` extractor gives bearer-header auth.
// =============================================================================

use std::collections::HashMap;
use std::str::FromStr;

use tracing::warn;

use super::acl::Role;

/// Compare two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

pub struct TokenRegistry {
    tokens: HashMap<String, Role>,
}

impl TokenRegistry {
    pub fn new(tokens: HashMap<String, Role>) -> Self {
        Self { tokens }
    }

    /// Parse `TICKCORE_GATEWAY_TOKENS` as a comma-separated `token:role` list,
    /// e.g. `abc123:admin,def456:user`. Malformed entries are skipped with a
    /// warning rather than failing startup.
    pub fn from_env() -> Self {
        let mut tokens = HashMap::new();
        if let Ok(raw) = std::env::var("TICKCORE_GATEWAY_TOKENS") {
            for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match entry.split_once(':') {
                    Some((token, role)) => match Role::from_str(role) {
                        Ok(role) => {
                            tokens.insert(token.to_string(), role);
                        }
                        Err(_) => warn!(entry, "unknown role in TICKCORE_GATEWAY_TOKENS entry, skipping"),
                    },
                    None => warn!(entry, "malformed TICKCORE_GATEWAY_TOKENS entry, skipping"),
                }
            }
        }
        Self::new(tokens)
    }

    /// Resolve a presented token to its role, in constant time with respect
    /// to each candidate comparison.
    pub fn resolve(&self, presented: &str) -> Option<Role> {
        self.tokens.iter().find(|(token, _)| constant_time_eq(token.as_bytes(), presented.as_bytes())).map(|(_, role)| *role)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_identical_and_different() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn resolve_matches_configured_token_to_its_role() {
        let mut tokens = HashMap::new();
        tokens.insert("secret-admin".to_string(), Role::Admin);
        let registry = TokenRegistry::new(tokens);
        assert_eq!(registry.resolve("secret-admin"), Some(Role::Admin));
        assert_eq!(registry.resolve("unknown"), None);
    }
}
