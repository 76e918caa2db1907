//! Canonical cache keys.
//!
//! Keys serialize as `<namespace>:<tenant-part>[:<qualifier>]` where the
//! tenant part is `global` or `center:<id>`. The namespace never contains `:`
//! and the tenant part has a fixed shape, so the serialization is injective.

use super::error::{CacheError, Result};
use std::fmt;

const GLOBAL_PART: &str = "global";
const TENANT_PREFIX: &str = "center";

/// Characters with special meaning in match patterns
const GLOB_META: &[char] = &['*', '?', '[', ']', '\\'];

/// Partition a cache entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Shared by every tenant
    Global,
    /// Owned by a single tenant (center)
    Tenant(i64),
}

impl TenantScope {
    /// `None` maps to `Global`, mirroring nullable tenant ids at call sites
    pub fn from_option(id: Option<i64>) -> Self {
        id.map_or(Self::Global, Self::Tenant)
    }

    fn write_part(&self, out: &mut String) {
        match self {
            Self::Global => out.push_str(GLOBAL_PART),
            Self::Tenant(id) => {
                out.push_str(TENANT_PREFIX);
                out.push(':');
                out.push_str(&id.to_string());
            }
        }
    }
}

impl From<Option<i64>> for TenantScope {
    fn from(id: Option<i64>) -> Self {
        Self::from_option(id)
    }
}

/// A validated cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    scope: TenantScope,
    qualifier: Option<String>,
}

impl CacheKey {
    /// Key without qualifier
    pub fn new(namespace: &str, scope: TenantScope) -> Result<Self> {
        validate_namespace(namespace)?;
        Ok(Self {
            namespace: namespace.to_string(),
            scope,
            qualifier: None,
        })
    }

    /// Key with a trailing qualifier (e.g. a lookup table name)
    pub fn qualified(namespace: &str, scope: TenantScope, qualifier: &str) -> Result<Self> {
        validate_namespace(namespace)?;
        validate_qualifier(qualifier)?;
        Ok(Self {
            namespace: namespace.to_string(),
            scope,
            qualifier: Some(qualifier.to_string()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scope(&self) -> TenantScope {
        self.scope
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Same namespace and qualifier, different scope
    pub fn with_scope(&self, scope: TenantScope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    /// Serialized form used by the backends
    pub fn as_string(&self) -> String {
        let mut out = String::with_capacity(self.namespace.len() + 24);
        out.push_str(&self.namespace);
        out.push(':');
        self.scope.write_part(&mut out);
        if let Some(qualifier) = &self.qualifier {
            out.push(':');
            out.push_str(qualifier);
        }
        out
    }

    /// Pattern matching the key of every tenant, `<namespace>:center:*[:<qualifier>]`.
    ///
    /// The global key is not matched; callers delete it separately.
    pub fn all_tenants_pattern(namespace: &str, qualifier: Option<&str>) -> Result<String> {
        validate_namespace(namespace)?;
        let mut pattern = format!("{namespace}:{TENANT_PREFIX}:*");
        if let Some(qualifier) = qualifier {
            validate_qualifier(qualifier)?;
            pattern.push(':');
            pattern.push_str(qualifier);
        }
        Ok(pattern)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Build the serialized key for a namespace, scope and optional qualifier
pub fn build_key(namespace: &str, scope: TenantScope, qualifier: Option<&str>) -> Result<String> {
    let key = match qualifier {
        Some(qualifier) => CacheKey::qualified(namespace, scope, qualifier)?,
        None => CacheKey::new(namespace, scope)?,
    };
    Ok(key.as_string())
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidKey("namespace is empty".to_string()));
    }
    if namespace.contains(':') {
        return Err(CacheError::InvalidKey(format!(
            "namespace '{namespace}' contains ':'"
        )));
    }
    validate_chars("namespace", namespace)
}

fn validate_qualifier(qualifier: &str) -> Result<()> {
    if qualifier.is_empty() {
        return Err(CacheError::InvalidKey("qualifier is empty".to_string()));
    }
    validate_chars("qualifier", qualifier)
}

fn validate_chars(what: &str, value: &str) -> Result<()> {
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || GLOB_META.contains(c))
    {
        return Err(CacheError::InvalidKey(format!(
            "{what} '{value}' contains reserved character {c:?}"
        )));
    }
    Ok(())
}
