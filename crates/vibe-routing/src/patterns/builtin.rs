use std::collections::BTreeMap;
use std::sync::Arc;

use vibe_core::{Complexity, PatternDefaults, Scale, UserType};

use super::{DEFAULT_PATTERN, Pattern, PatternRepository, normalize, validate};
use crate::error::PatternError;

/// Version tag of the built-in pattern set
pub const BUILTIN_VERSION: &str = "builtin-1";

/// Fixed in-memory pattern set
#[derive(Debug, Clone)]
pub struct InMemoryPatternRepository {
    version: String,
    patterns: Arc<[Pattern]>,
}

impl InMemoryPatternRepository {
    /// Serve a custom pattern set
    pub fn new(version: impl Into<String>, mut patterns: Vec<Pattern>) -> Result<Self, PatternError> {
        validate(&patterns)?;
        normalize(&mut patterns);

        Ok(Self {
            version: version.into(),
            patterns: patterns.into(),
        })
    }

    /// The built-in library of common web project domains
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_VERSION.to_owned(),
            patterns: builtin_patterns().into(),
        }
    }
}

impl Default for InMemoryPatternRepository {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternRepository for InMemoryPatternRepository {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn patterns(&self) -> Result<Arc<[Pattern]>, PatternError> {
        Ok(Arc::clone(&self.patterns))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn technical(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

fn builtin_patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            id: "storefront".to_owned(),
            domains: strings(&[
                "online store",
                "store",
                "shop",
                "cart",
                "checkout",
                "ecommerce",
                "e-commerce",
                "products",
                "sell",
                "payments",
                "inventory",
            ]),
            user_types: vec![UserType::Entrepreneur, UserType::SmallBusiness],
            complexity: Complexity::Medium,
            scale: Scale::Medium,
            average_token_savings: 45,
            requirements: PatternDefaults {
                implicit: strings(&[
                    "product catalog",
                    "shopping cart",
                    "secure checkout",
                    "payment processing",
                    "order management",
                    "responsive design",
                    "basic seo",
                ]),
                technical: technical(&[
                    ("frontend", "react"),
                    ("backend", "node"),
                    ("database", "postgres"),
                    ("payments", "stripe"),
                ]),
            },
        },
        Pattern {
            id: "content_publishing".to_owned(),
            domains: strings(&[
                "blog",
                "articles",
                "posts",
                "publish",
                "newsletter",
                "content",
                "cms",
                "magazine",
            ]),
            user_types: vec![UserType::Creator, UserType::SmallBusiness],
            complexity: Complexity::Low,
            scale: Scale::Medium,
            average_token_savings: 40,
            requirements: PatternDefaults {
                implicit: strings(&[
                    "post editor",
                    "categories and tags",
                    "rss feed",
                    "seo metadata",
                    "comment moderation",
                    "responsive design",
                ]),
                technical: technical(&[("frontend", "static site"), ("content", "markdown"), ("hosting", "cdn")]),
            },
        },
        Pattern {
            id: "personal_utility".to_owned(),
            domains: strings(&[
                "todo",
                "tracker",
                "habit",
                "reminder",
                "notes",
                "calculator",
                "planner",
                "to-do",
            ]),
            user_types: vec![UserType::General, UserType::Student],
            complexity: Complexity::Low,
            scale: Scale::Small,
            average_token_savings: 50,
            requirements: PatternDefaults {
                implicit: strings(&["simple interface", "local persistence", "data export"]),
                technical: technical(&[("frontend", "react"), ("storage", "local")]),
            },
        },
        Pattern {
            id: "saas_dashboard".to_owned(),
            domains: strings(&[
                "dashboard",
                "saas",
                "analytics",
                "subscription",
                "admin panel",
                "metrics",
                "reporting",
                "multi-tenant",
                "charts",
            ]),
            user_types: vec![UserType::Developer, UserType::Enterprise, UserType::Entrepreneur],
            complexity: Complexity::High,
            scale: Scale::Large,
            average_token_savings: 35,
            requirements: PatternDefaults {
                implicit: strings(&[
                    "authentication",
                    "role-based access",
                    "billing integration",
                    "data visualization",
                    "audit logging",
                    "api access",
                ]),
                technical: technical(&[
                    ("frontend", "react"),
                    ("backend", "rust"),
                    ("database", "postgres"),
                    ("auth", "oauth"),
                ]),
            },
        },
        Pattern {
            id: "portfolio".to_owned(),
            domains: strings(&[
                "portfolio",
                "showcase",
                "gallery",
                "resume",
                "my work",
                "case studies",
                "projects",
            ]),
            user_types: vec![UserType::Designer, UserType::Creator, UserType::Student],
            complexity: Complexity::Low,
            scale: Scale::Small,
            average_token_savings: 55,
            requirements: PatternDefaults {
                implicit: strings(&[
                    "project gallery",
                    "contact form",
                    "about page",
                    "responsive design",
                    "optimized images",
                ]),
                technical: technical(&[("frontend", "static site"), ("hosting", "cdn")]),
            },
        },
        Pattern {
            id: DEFAULT_PATTERN.to_owned(),
            domains: Vec::new(),
            user_types: Vec::new(),
            complexity: Complexity::Medium,
            scale: Scale::Medium,
            average_token_savings: 20,
            requirements: PatternDefaults {
                implicit: strings(&["responsive design", "basic seo"]),
                technical: BTreeMap::new(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_is_valid() {
        let repo = InMemoryPatternRepository::builtin();
        let patterns = repo.patterns().unwrap();
        validate(&patterns).unwrap();
        assert!(patterns.iter().any(|p| p.id == DEFAULT_PATTERN));
        assert_eq!(repo.version(), BUILTIN_VERSION);
    }

    #[test]
    fn builtin_keywords_are_lowercase() {
        let patterns = InMemoryPatternRepository::builtin().patterns().unwrap();
        for pattern in patterns.iter() {
            for keyword in &pattern.domains {
                assert_eq!(keyword, &keyword.to_lowercase(), "pattern {}", pattern.id);
            }
        }
    }

    #[test]
    fn custom_sets_are_normalized() {
        let repo = InMemoryPatternRepository::new(
            "v2",
            vec![Pattern {
                id: "bookings".to_owned(),
                domains: vec![" Appointment ".to_owned()],
                user_types: Vec::new(),
                complexity: Complexity::Low,
                scale: Scale::Small,
                average_token_savings: 30,
                requirements: PatternDefaults::default(),
            }],
        )
        .unwrap();
        assert_eq!(repo.patterns().unwrap()[0].domains, vec!["appointment"]);
    }
}
