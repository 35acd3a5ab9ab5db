//! Shared requests, contexts, and plans

use std::sync::Arc;

use vibe_config::Config;
use vibe_core::{
    Complexity, NormalizedRequest, OptimizationPlan, Requirements, Scale, TechnicalLevel, TokenSavings, UserContext,
    UserType,
};
use vibe_routing::{HandlerDescriptor, InMemoryPatternRepository, Router};

/// A router over the built-in pattern library
pub fn router(config: &Config) -> Router {
    Router::new(config, Arc::new(InMemoryPatternRepository::builtin()))
}

/// Handlers declared in the configuration
pub fn handlers(config: &Config) -> Vec<HandlerDescriptor> {
    config.handlers.iter().map(HandlerDescriptor::from).collect()
}

/// The usual trio of specialists plus a generalist
pub fn standard_config() -> super::config::ConfigBuilder {
    super::config::ConfigBuilder::new()
        .with_handler("shop-builder", &["storefront"], 0.8)
        .with_handler("blog-builder", &["content_publishing"], 0.7)
        .with_handler("folio-builder", &["portfolio"], 0.6)
        .with_handler("general", &["general"], 0.5)
}

/// A feature-rich online store request
pub fn store_request() -> NormalizedRequest {
    NormalizedRequest {
        description: "Build an online store for my bakery with a cart and checkout".to_owned(),
        keywords: vec!["ecommerce".to_owned(), "bakery".to_owned()],
        requirements: Requirements {
            functional: ["search", "order tracking", "gift cards"].map(String::from).to_vec(),
            ..Requirements::default()
        }
        .with_explicit([
            "product catalog",
            "shopping cart",
            "checkout",
            "card payments",
            "pickup scheduling",
            "order emails",
            "seasonal menu",
            "customer accounts",
        ]),
    }
}

/// A personal blog request
pub fn blog_request() -> NormalizedRequest {
    NormalizedRequest {
        description: "I want a blog to publish articles about travel with a newsletter".to_owned(),
        keywords: vec!["blog".to_owned()],
        requirements: Requirements::default().with_explicit([
            "article editor",
            "categories",
            "newsletter signup",
            "comments",
            "photo galleries",
            "search",
        ]),
    }
}

/// A request that names no recognizable domain
pub fn vague_request() -> NormalizedRequest {
    NormalizedRequest {
        description: "something nice".to_owned(),
        ..NormalizedRequest::default()
    }
}

pub fn small_business() -> UserContext {
    UserContext {
        user_id: Some("usr_bakery".to_owned()),
        user_type: Some(UserType::SmallBusiness),
        technical_level: Some(TechnicalLevel::Beginner),
        scale: Some(Scale::Small),
        goals: vec!["sell_online".to_owned()],
        ..UserContext::default()
    }
}

/// Requirements distinguished only by their first explicit item
pub fn numbered_requirements(n: usize) -> Requirements {
    Requirements {
        complexity: Complexity::Medium,
        ..Requirements::default()
    }
    .with_explicit([format!("feature-{n}"), "shared".to_owned()])
}

/// A plan with the given savings percentage
pub fn plan_with_savings(percentage: f64) -> OptimizationPlan {
    let saved = (percentage * 10.0).round() as i64;
    OptimizationPlan {
        token_savings: Some(TokenSavings {
            baseline: 1000,
            optimized: (1000 - saved) as u64,
            saved,
            percentage,
        }),
        ..OptimizationPlan::default()
    }
}
