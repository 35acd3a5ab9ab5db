//! Programmatic configuration builder for integration tests

use std::time::Duration;

use vibe_config::{Config, HandlerConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with the shipped defaults
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_cache_size(mut self, max_size: usize) -> Self {
        self.config.cache.max_size = max_size;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.config.decision.min_confidence = Some(min);
        self
    }

    pub fn with_availability_checks(mut self) -> Self {
        self.config.decision.check_handler_availability = true;
        self
    }

    /// Register a handler specializing in the given pattern ids
    pub fn with_handler(mut self, id: &str, domains: &[&str], token_efficiency: f64) -> Self {
        self.config.handlers.push(HandlerConfig {
            id: id.to_owned(),
            domains: domains.iter().map(|d| (*d).to_owned()).collect(),
            capabilities: Vec::new(),
            token_efficiency,
            requires_full_requirements: false,
        });
        self
    }

    /// Build and validate
    pub fn build(self) -> Config {
        self.config.validate().expect("test configuration is valid");
        self.config
    }
}
