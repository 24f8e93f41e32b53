// 👤 Identity - Who is acting
//
// Every mutation records updated_by; the caller resolves it through one of
// these providers and hands the engine a plain string.

/// Resolves the acting user, if the request carries one
pub trait IdentityProvider {
    fn current_actor(&self) -> Option<String>;
}

/// Always the same actor (batch jobs, CLI)
pub struct StaticIdentity(pub String);

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Operating-system user of the current process
pub struct EnvIdentity;

impl IdentityProvider for EnvIdentity {
    fn current_actor(&self) -> Option<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
    }
}

/// Provider's actor, trimmed, falling back when absent or blank
pub fn resolve_actor(provider: &dyn IdentityProvider, fallback: &str) -> String {
    provider
        .current_actor()
        .map(|actor| actor.trim().to_string())
        .filter(|actor| !actor.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Anonymous;

    impl IdentityProvider for Anonymous {
        fn current_actor(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_resolve_actor() {
        assert_eq!(resolve_actor(&StaticIdentity("alice".into()), "system"), "alice");
        assert_eq!(resolve_actor(&StaticIdentity("  ".into()), "system"), "system");
        assert_eq!(resolve_actor(&Anonymous, "system"), "system");
    }
}
