//! JSON-lines request handling

use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use vibe_config::Config;
use vibe_core::{NormalizedRequest, UserContext};
use vibe_routing::{DomainPatternLibrary, HandlerDescriptor, Outcome, Router};

/// One input line
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    Outcome {
        outcome: OutcomeReport,
    },
    Route {
        request: NormalizedRequest,
        #[serde(default)]
        context: UserContext,
    },
}

#[derive(Debug, Deserialize)]
struct OutcomeReport {
    decision_id: Uuid,
    #[serde(flatten)]
    outcome: Outcome,
}

/// Handle one input line and produce its output record
pub fn process_line(router: &Router, handlers: &[HandlerDescriptor], line: &str) -> Value {
    let input = match serde_json::from_str::<Input>(line) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed input line");
            return json!({ "error": format!("invalid input: {e}") });
        }
    };

    match input {
        Input::Route { request, context } => {
            let result = router.route(&request, &context, handlers);
            serde_json::to_value(&result).unwrap_or_else(|e| json!({ "error": e.to_string() }))
        }
        Input::Outcome { outcome } => match router.record_outcome(outcome.decision_id, &outcome.outcome) {
            Ok(()) => json!({ "decision_id": outcome.decision_id, "recorded": true }),
            Err(e) => json!({ "decision_id": outcome.decision_id, "recorded": false, "error": e.to_string() }),
        },
    }
}

/// Handlers from config, or one generalist per pattern when none are configured
pub fn handlers_for(config: &Config, library: &DomainPatternLibrary) -> Vec<HandlerDescriptor> {
    if !config.handlers.is_empty() {
        return config.handlers.iter().map(HandlerDescriptor::from).collect();
    }

    let handlers: Vec<_> = library
        .patterns()
        .iter()
        .map(|p| HandlerDescriptor::new(p.id.clone()).with_domains([p.id.clone()]))
        .collect();

    tracing::info!(handlers = handlers.len(), "no handlers configured, using one per pattern");
    handlers
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vibe_routing::InMemoryPatternRepository;

    use super::*;

    const STORE: &str = r#"{"request":{"description":"online store with cart and checkout","requirements":{"explicit":["catalog","cart"]}},"context":{"user_id":"usr_1"}}"#;

    fn setup() -> (Router, Vec<HandlerDescriptor>) {
        let config = Config::default();
        let router = Router::new(&config, Arc::new(InMemoryPatternRepository::builtin()));
        let handlers = handlers_for(&config, router.library());
        (router, handlers)
    }

    #[test]
    fn default_handlers_follow_patterns() {
        let (_, handlers) = setup();
        let ids: Vec<_> = handlers.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"storefront"));
        assert!(ids.contains(&"general"));
    }

    #[test]
    fn routes_then_records_outcome() {
        let (router, handlers) = setup();

        let routed = process_line(&router, &handlers, STORE);
        assert_eq!(routed["decision"]["handler_id"], "storefront");
        assert_eq!(routed["domain"]["domain"], "storefront");

        let decision_id = routed["decision"]["decision_id"].as_str().unwrap();
        let line = format!(r#"{{"outcome":{{"decision_id":"{decision_id}","success":true,"tokens_used":300}}}}"#);
        let recorded = process_line(&router, &handlers, &line);
        assert_eq!(recorded["recorded"], true);
        assert_eq!(router.engine().performance("storefront").total_requests, 1);
    }

    #[test]
    fn unknown_decision_is_reported() {
        let (router, handlers) = setup();
        let line = format!(r#"{{"outcome":{{"decision_id":"{}","success":false}}}}"#, Uuid::nil());
        let output = process_line(&router, &handlers, &line);
        assert_eq!(output["recorded"], false);
        assert!(output["error"].as_str().unwrap().contains("unknown decision"));
    }

    #[test]
    fn malformed_lines_yield_errors() {
        let (router, handlers) = setup();
        let output = process_line(&router, &handlers, "{not json");
        assert!(output["error"].as_str().unwrap().starts_with("invalid input"));

        let output = process_line(&router, &handlers, r#"{"something":"else"}"#);
        assert!(output.get("error").is_some());
    }
}
