//! Connector registry
//!
//! Maps connector names to factories. The registry is built once at process
//! start and handed to the pipelines by reference; an unknown name is a
//! configuration error for the record that referenced it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConnectionParams;

use super::mock::{MockFeature, MockSource};
use super::{ConnectorError, ConnectorResult, FeatureConnector, SourceConnector};

/// Factory for source connectors. Receives the owning source's validated
/// connection parameters.
pub type SourceConnectorFactory =
    Arc<dyn Fn(&ConnectionParams) -> ConnectorResult<Arc<dyn SourceConnector>> + Send + Sync>;

/// Factory for feature connectors.
pub type FeatureConnectorFactory =
    Arc<dyn Fn() -> ConnectorResult<Arc<dyn FeatureConnector>> + Send + Sync>;

/// Registry of connector implementations
#[derive(Default)]
pub struct ConnectorRegistry {
    sources: HashMap<String, SourceConnectorFactory>,
    features: HashMap<String, FeatureConnectorFactory>,
}

impl ConnectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin connectors registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_source("mock", |params| Ok(Arc::new(MockSource::new(params)?) as _));
        registry.register_feature("mock", || Ok(Arc::new(MockFeature::default()) as _));
        registry.register_feature("moving_average", || {
            Ok(Arc::new(crate::feature::MovingAverage::default()) as _)
        });

        registry
    }

    /// Register a source connector factory under a name
    pub fn register_source<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ConnectionParams) -> ConnectorResult<Arc<dyn SourceConnector>>
            + Send
            + Sync
            + 'static,
    {
        self.sources.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a feature connector factory under a name
    pub fn register_feature<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> ConnectorResult<Arc<dyn FeatureConnector>> + Send + Sync + 'static,
    {
        self.features.insert(name.to_string(), Arc::new(factory));
    }

    /// Construct a source connector by registered name
    pub fn source(
        &self,
        name: &str,
        params: &ConnectionParams,
    ) -> ConnectorResult<Arc<dyn SourceConnector>> {
        let factory = self.sources.get(name).ok_or_else(|| {
            ConnectorError::Configuration(format!("Unknown source connector: {}", name))
        })?;
        factory(params)
    }

    /// Construct a feature connector by registered name
    pub fn feature(&self, name: &str) -> ConnectorResult<Arc<dyn FeatureConnector>> {
        let factory = self.features.get(name).ok_or_else(|| {
            ConnectorError::Configuration(format!("Unknown feature connector: {}", name))
        })?;
        factory()
    }

    /// Registered source connector names
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.keys().map(|s| s.as_str()).collect()
    }

    /// Registered feature connector names
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ConnectorRegistry::with_builtins();
        let params = ConnectionParams::default();

        assert!(registry.source("mock", &params).is_ok());
        assert!(registry.feature("moving_average").is_ok());
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let registry = ConnectorRegistry::with_builtins();
        let params = ConnectionParams::default();

        let err = registry.source("mt5", &params).unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));

        let err = registry.feature("correlation").unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }
}
