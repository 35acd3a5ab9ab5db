use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource as semconv;
use vibe_config::TelemetryConfig;

/// Resource identifying this router process on exported metrics
///
/// Configured attributes are appended after the service identity and may
/// not override it.
pub fn build_resource(config: &TelemetryConfig) -> Resource {
    let mut attrs = vec![
        KeyValue::new(semconv::SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];

    attrs.extend(
        config
            .resource_attributes
            .iter()
            .filter(|(key, _)| key.as_str() != semconv::SERVICE_NAME && key.as_str() != semconv::SERVICE_VERSION)
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
    );

    Resource::builder_empty().with_attributes(attrs).build()
}
