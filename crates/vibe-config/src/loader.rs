use std::collections::HashSet;
use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails,
    /// or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if TOML parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_cache()?;
        self.validate_decision()?;
        self.validate_handlers()?;
        Ok(())
    }

    fn validate_cache(&self) -> anyhow::Result<()> {
        if self.cache.max_size == 0 {
            anyhow::bail!("cache.max_size must be greater than 0");
        }

        if !(0.0..=100.0).contains(&self.cache.min_savings_threshold) {
            anyhow::bail!("cache.min_savings_threshold must be between 0 and 100");
        }

        if self.cache.ttl.is_zero() {
            anyhow::bail!("cache.ttl must be greater than 0");
        }

        Ok(())
    }

    fn validate_decision(&self) -> anyhow::Result<()> {
        let decision = &self.decision;

        if decision.default_handler.trim().is_empty() {
            anyhow::bail!("decision.default_handler must not be empty");
        }

        let unit_values = [
            ("decision.low_confidence_floor", Some(decision.low_confidence_floor)),
            ("decision.min_confidence", decision.min_confidence),
            ("decision.token_boost_weight", Some(decision.token_boost_weight)),
            ("decision.history_weight", Some(decision.history_weight)),
        ];
        for (name, value) in unit_values {
            if let Some(value) = value
                && !(0.0..=1.0).contains(&value)
            {
                anyhow::bail!("{name} must be between 0 and 1, got {value}");
            }
        }

        if decision.decision_log_size == 0 {
            anyhow::bail!("decision.decision_log_size must be greater than 0");
        }

        Ok(())
    }

    fn validate_handlers(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();

        for handler in &self.handlers {
            if handler.id.trim().is_empty() {
                anyhow::bail!("handler ids must not be empty");
            }

            if !seen.insert(handler.id.as_str()) {
                anyhow::bail!("duplicate handler id '{}'", handler.id);
            }

            if !(0.0..=1.0).contains(&handler.token_efficiency) {
                anyhow::bail!(
                    "handler '{}' token_efficiency must be between 0 and 1, got {}",
                    handler.id,
                    handler.token_efficiency
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use crate::{Config, ExportProtocol, LogFormat};

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.ttl, Duration::from_secs(86_400));
        assert!((config.cache.min_savings_threshold - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.compression.max_essential_explicit, 5);
        assert_eq!(config.compression.max_essential_implicit, 8);
        assert_eq!(config.decision.default_handler, "general");
        assert_eq!(config.cost.base_tokens, 200);
        assert!(config.patterns.path.is_none());
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
            [cache]
            max_size = 10
            ttl = "50ms"
            min_savings_threshold = 25.0
            cleanup_interval = "1m"

            [compression]
            max_essential_explicit = 3

            [cost]
            base_tokens = 300

            [decision]
            default_handler = "generalist"
            min_confidence = 0.6
            optimize_for_tokens = false

            [patterns]
            path = "patterns.toml"

            [[handlers]]
            id = "storefront-builder"
            domains = ["storefront"]
            capabilities = ["payments", "catalog"]
            token_efficiency = 0.8

            [telemetry]
            log_format = "json"

            [telemetry.exporter]
            endpoint = "http://localhost:4317"
            protocol = "http_proto"
        "#;

        let config = Config::from_toml(raw).unwrap();
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.ttl, Duration::from_millis(50));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.compression.max_essential_explicit, 3);
        assert_eq!(config.compression.max_essential_implicit, 8);
        assert_eq!(config.cost.base_tokens, 300);
        assert_eq!(config.cost.explicit_weight, 50);
        assert_eq!(config.decision.default_handler, "generalist");
        assert_eq!(config.decision.min_confidence, Some(0.6));
        assert!(!config.decision.optimize_for_tokens);
        assert_eq!(config.handlers.len(), 1);
        assert!((config.handlers[0].token_efficiency - 0.8).abs() < f64::EPSILON);
        assert!(!config.handlers[0].requires_full_requirements);

        let exporter = config.telemetry.exporter.unwrap();
        assert_eq!(exporter.protocol, ExportProtocol::HttpProto);
        assert_eq!(exporter.interval, Duration::from_secs(30));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::from_toml("[cache]\nmax_entries = 5").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = Config::from_toml("[cache]\nttl = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn rejects_zero_cache_size() {
        let err = Config::from_toml("[cache]\nmax_size = 0").unwrap_err();
        assert!(err.to_string().contains("max_size"));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = Config::from_toml("[cache]\nmin_savings_threshold = 130.0").unwrap_err();
        assert!(err.to_string().contains("min_savings_threshold"));
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let err = Config::from_toml("[decision]\nmin_confidence = 1.5").unwrap_err();
        assert!(err.to_string().contains("decision.min_confidence"));
    }

    #[test]
    fn rejects_duplicate_handlers() {
        let raw = "[[handlers]]\nid = \"a\"\n\n[[handlers]]\nid = \"a\"\n";
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate handler id 'a'"));
    }

    #[test]
    fn rejects_bad_token_efficiency() {
        let raw = "[[handlers]]\nid = \"a\"\ntoken_efficiency = 2.0\n";
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("token_efficiency"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nmax_size = 42").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.cache.max_size, 42);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load(std::path::Path::new("/nonexistent/vibe.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vibe.toml"));
    }
}
