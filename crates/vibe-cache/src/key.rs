//! Stable cache keys for optimization plans
//!
//! Keys are a SHA-256 digest of the canonical JSON of every field that
//! discriminates one plan from another. Two structurally equal inputs
//! always hash identically; object identity plays no part.

use serde::Serialize;
use sha2::{Digest, Sha256};
use vibe_core::{
    Complexity, ContextSummary, EssentialRequirements, Requirements, Scale, TechnicalLevel, UserContext, UserType,
};

/// Requirement fields that participate in the cache key
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequirementMaterial<'a> {
    pub explicit: &'a [String],
    pub implicit: &'a [String],
    pub functional: &'a [String],
    pub domain: Option<&'a str>,
    pub complexity: Complexity,
}

/// User-context fields that participate in the cache key
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ContextMaterial {
    pub user_type: UserType,
    pub technical_level: TechnicalLevel,
    pub scale: Scale,
}

/// Anything that can supply requirement key material
pub trait RequirementKey {
    fn requirement_material(&self) -> RequirementMaterial<'_>;
}

/// Anything that can supply user-context key material
pub trait ContextKey {
    fn context_material(&self) -> ContextMaterial;
}

impl RequirementKey for Requirements {
    fn requirement_material(&self) -> RequirementMaterial<'_> {
        RequirementMaterial {
            explicit: &self.explicit,
            implicit: &self.implicit,
            functional: &self.functional,
            domain: self.domain.as_deref(),
            complexity: self.complexity,
        }
    }
}

impl RequirementKey for EssentialRequirements {
    fn requirement_material(&self) -> RequirementMaterial<'_> {
        RequirementMaterial {
            explicit: &self.explicit,
            implicit: &self.implicit,
            functional: &[],
            domain: self.domain.as_deref(),
            complexity: self.complexity,
        }
    }
}

impl ContextKey for UserContext {
    fn context_material(&self) -> ContextMaterial {
        ContextMaterial {
            user_type: self.user_type.unwrap_or_default(),
            technical_level: self.technical_level.unwrap_or_default(),
            scale: self.scale.unwrap_or_default(),
        }
    }
}

impl ContextKey for ContextSummary {
    fn context_material(&self) -> ContextMaterial {
        ContextMaterial {
            user_type: self.user_type,
            technical_level: self.technical_level,
            scale: self.scale,
        }
    }
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    requirements: RequirementMaterial<'a>,
    context: ContextMaterial,
}

/// Compute the cache key for a requirement/context pair
pub fn generate_cache_key(requirements: &impl RequirementKey, context: &impl ContextKey) -> String {
    let material = KeyMaterial {
        requirements: requirements.requirement_material(),
        context: context.context_material(),
    };
    // Plain strings and enums always serialize
    let json = serde_json::to_string(&material).unwrap_or_default();
    let hash = Sha256::digest(json.as_bytes());
    format!("{hash:x}")
}
