mod harness;

use std::sync::Arc;

use harness::fixtures;
use vibe_config::Config;
use vibe_core::{NormalizedRequest, UserContext, UserType};
use vibe_routing::{PatternRepository, Router, TomlPatternRepository};

const PATTERNS: &str = r#"
version = "2026-10"

[[patterns]]
id = "bookings"
domains = ["appointment", "booking", "salon"]
user_types = ["small_business"]
average_token_savings = 40

[patterns.requirements]
implicit = ["calendar sync", "reminder emails"]
technical = { frontend = "react", calendar = "ical" }

[[patterns]]
id = "general"
"#;

fn salon_request() -> NormalizedRequest {
    NormalizedRequest {
        description: "Appointment booking for my salon".to_owned(),
        ..NormalizedRequest::default()
    }
}

#[test]
fn config_file_drives_patterns_and_handlers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let patterns_path = dir.path().join("patterns.toml");
    std::fs::write(&patterns_path, PATTERNS)?;

    let config_path = dir.path().join("vibe.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[cache]
max_size = 50
ttl = "1h"

[decision]
default_handler = "concierge"

[patterns]
path = "{}"

[[handlers]]
id = "bookings-pro"
domains = ["bookings"]
capabilities = ["calendar"]
token_efficiency = 0.9

[[handlers]]
id = "concierge"
domains = ["general"]
"#,
            patterns_path.display()
        ),
    )?;

    let config = Config::load(&config_path)?;
    assert_eq!(config.cache.max_size, 50);
    assert_eq!(config.handlers.len(), 2);

    let path = config.patterns.path.clone().unwrap();
    let repository = Arc::new(TomlPatternRepository::load(path)?);
    assert_eq!(repository.version(), "2026-10");

    let router = Router::new(&config, repository);
    let handlers = fixtures::handlers(&config);
    let context = UserContext {
        user_type: Some(UserType::SmallBusiness),
        ..UserContext::default()
    };

    let result = router.route(&salon_request(), &context, &handlers);
    assert_eq!(result.domain.domain, "bookings");
    assert_eq!(result.domain.pattern_version, "2026-10");
    assert_eq!(result.decision.handler_id, "bookings-pro");
    assert_eq!(result.plan.pattern_defaults.implicit, vec!["calendar sync", "reminder emails"]);

    let vague = NormalizedRequest {
        description: "help".to_owned(),
        ..NormalizedRequest::default()
    };
    let result = router.route(&vague, &context, &handlers);
    assert!(result.decision.fallback);
    assert_eq!(result.decision.handler_id, "concierge");

    Ok(())
}

#[test]
fn reload_picks_up_a_new_version() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("patterns.toml");
    std::fs::write(&path, PATTERNS)?;

    let repository = TomlPatternRepository::load(&path)?;
    std::fs::write(&path, PATTERNS.replace("2026-10", "2026-11"))?;

    assert_eq!(repository.reload()?, "2026-11");
    assert_eq!(repository.version(), "2026-11");
    Ok(())
}

#[test]
fn invalid_reload_keeps_the_served_set() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("patterns.toml");
    std::fs::write(&path, PATTERNS)?;

    let repository = TomlPatternRepository::load(&path)?;
    std::fs::write(&path, "version = \"broken\"\n[[patterns]]\nid = \"\"\n")?;

    assert!(repository.reload().is_err());
    assert_eq!(repository.version(), "2026-10");
    assert_eq!(repository.patterns()?.len(), 2);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let err = Config::from_toml("[cache]\nmax_size = 0\n").unwrap_err();
    assert!(err.to_string().contains("max_size"));

    assert!(Config::from_toml("[decision]\nunknown = true\n").is_err());
}
