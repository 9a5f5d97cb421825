//! Route access policies, registered once at startup and looked up by route name.

use std::collections::HashMap;

use rocket::Route;

use crate::auth::{AuthError, AuthResult};

/// What the access guard requires before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutePolicy {
    Public,
    Authenticated,
    AdminOnly,
}

impl RoutePolicy {
    pub fn label(&self) -> &'static str {
        match self {
            RoutePolicy::Public => "public",
            RoutePolicy::Authenticated => "authenticated",
            RoutePolicy::AdminOnly => "admin",
        }
    }
}

/// Static lookup table from Rocket route name to [`RoutePolicy`].
#[derive(Debug, Clone, Default)]
pub struct RoutePolicies {
    by_route: HashMap<String, RoutePolicy>,
}

impl RoutePolicies {
    pub fn builder() -> RoutePoliciesBuilder {
        RoutePoliciesBuilder::default()
    }

    /// Policy for `route_name`; unknown routes require authentication.
    pub fn resolve(&self, route_name: Option<&str>) -> RoutePolicy {
        match route_name.and_then(|name| self.by_route.get(name)) {
            Some(policy) => *policy,
            None => {
                log::warn!(
                    "no access policy registered for route {:?}; requiring authentication",
                    route_name
                );
                RoutePolicy::Authenticated
            }
        }
    }

    /// Routes among `routes` with no registered policy, as `METHOD uri (name)`.
    pub fn unregistered<'r>(&self, routes: impl IntoIterator<Item = &'r Route>) -> Vec<String> {
        routes
            .into_iter()
            .filter(|route| {
                route
                    .name
                    .as_deref()
                    .is_none_or(|name| !self.by_route.contains_key(name))
            })
            .map(|route| {
                format!(
                    "{} {} ({})",
                    route.method,
                    route.uri.as_str(),
                    route.name.as_deref().unwrap_or("unnamed")
                )
            })
            .collect()
    }

    /// Fails when any of `routes` would fall back to the default policy.
    pub fn ensure_covers<'r>(&self, routes: impl IntoIterator<Item = &'r Route>) -> AuthResult<()> {
        let missing = self.unregistered(routes);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Config(format!(
                "routes without an access policy: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.by_route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_route.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RoutePoliciesBuilder {
    entries: Vec<(String, RoutePolicy)>,
}

impl RoutePoliciesBuilder {
    pub fn register(mut self, route_name: impl Into<String>, policy: RoutePolicy) -> Self {
        self.entries.push((route_name.into(), policy));
        self
    }

    pub fn register_all(mut self, entries: &[(&str, RoutePolicy)]) -> Self {
        self.entries
            .extend(entries.iter().map(|(name, policy)| (name.to_string(), *policy)));
        self
    }

    pub fn build(self) -> AuthResult<RoutePolicies> {
        let mut by_route = HashMap::with_capacity(self.entries.len());
        for (name, policy) in self.entries {
            if by_route.insert(name.clone(), policy).is_some() {
                return Err(AuthError::Config(format!(
                    "route '{name}' registered with more than one access policy"
                )));
            }
        }
        Ok(RoutePolicies { by_route })
    }
}
