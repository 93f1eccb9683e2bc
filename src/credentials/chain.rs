//! Ordered fallback over several credential providers.

use std::sync::Arc;

use log::debug;

use super::{CredentialError, CredentialProvider, CredentialRecord, ProviderFailure};

/// Tries each provider in order; the first usable record wins.
///
/// The chain holds no cached credential of its own. A chain is itself a
/// provider, so chains nest.
#[derive(Clone, Default)]
pub struct ChainProvider {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Append a provider at the lowest priority.
    pub fn push(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl CredentialProvider for ChainProvider {
    fn name(&self) -> String {
        let names: Vec<String> = self.providers.iter().map(|p| p.name()).collect();
        format!("chain({})", names.join(", "))
    }

    #[tracing::instrument(skip(self))]
    fn get_credentials(&self) -> Result<CredentialRecord, CredentialError> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name();
            match provider.get_credentials() {
                Ok(record) if record.is_usable() => {
                    debug!("Using tracking credentials from {} provider", name);
                    return Ok(record);
                }
                Ok(_) => {
                    debug!("{} provider returned credentials without a host", name);
                    failures.push(ProviderFailure {
                        provider: name,
                        reason: "returned credentials without a host".to_string(),
                    });
                }
                Err(e) => {
                    debug!("{} provider failed: {}", name, e);
                    failures.push(ProviderFailure {
                        provider: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(CredentialError::Exhausted { failures })
    }

    fn refresh(&self) {
        for provider in &self.providers {
            provider.refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MockCredentialProvider, StaticProvider};

    fn ok_provider(name: &'static str, host: &'static str) -> MockCredentialProvider {
        let mut provider = MockCredentialProvider::new();
        provider.expect_name().return_const(name.to_string());
        provider
            .expect_get_credentials()
            .times(1)
            .returning(move || Ok(CredentialRecord::new(host)));
        provider
    }

    fn failing_provider(name: &'static str, reason: &'static str) -> MockCredentialProvider {
        let mut provider = MockCredentialProvider::new();
        provider.expect_name().return_const(name.to_string());
        provider
            .expect_get_credentials()
            .times(1)
            .returning(move || Err(CredentialError::Unavailable(reason.to_string())));
        provider
    }

    fn untouched_provider(name: &'static str) -> MockCredentialProvider {
        let mut provider = MockCredentialProvider::new();
        provider.expect_name().return_const(name.to_string());
        provider.expect_get_credentials().never();
        provider
    }

    #[test]
    fn test_first_usable_provider_wins() {
        let chain = ChainProvider::new(vec![
            Arc::new(failing_provider("first", "nope")),
            Arc::new(ok_provider("second", "https://second")),
            Arc::new(untouched_provider("third")),
        ]);

        let record = chain.get_credentials().unwrap();
        assert_eq!(record.host(), "https://second");
    }

    #[test]
    fn test_first_provider_short_circuits() {
        let chain = ChainProvider::new(vec![
            Arc::new(ok_provider("first", "https://first")),
            Arc::new(untouched_provider("second")),
        ]);

        assert_eq!(chain.get_credentials().unwrap().host(), "https://first");
    }

    #[test]
    fn test_empty_host_is_skipped() {
        let chain = ChainProvider::new(vec![
            Arc::new(ok_provider("blank", "")),
            Arc::new(ok_provider("real", "https://real")),
        ]);

        assert_eq!(chain.get_credentials().unwrap().host(), "https://real");
    }

    #[test]
    fn test_all_failures_are_aggregated_in_order() {
        let chain = ChainProvider::new(vec![
            Arc::new(failing_provider("alpha", "alpha is down")),
            Arc::new(ok_provider("beta", "")),
            Arc::new(failing_provider("gamma", "gamma has no token")),
        ]);

        let err = chain.get_credentials().unwrap_err();
        let CredentialError::Exhausted { failures } = &err else {
            panic!("expected exhausted error, got {:?}", err);
        };
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].provider, "alpha");
        assert_eq!(failures[1].provider, "beta");
        assert_eq!(failures[2].provider, "gamma");

        let msg = err.to_string();
        let a = msg.find("alpha is down").unwrap();
        let b = msg.find("without a host").unwrap();
        let g = msg.find("gamma has no token").unwrap();
        assert!(a < b && b < g);
    }

    #[test]
    fn test_empty_chain_fails() {
        let chain = ChainProvider::default();
        assert!(chain.is_empty());
        assert!(matches!(
            chain.get_credentials(),
            Err(CredentialError::Exhausted { .. })
        ));
    }

    #[test]
    fn test_refresh_reaches_every_provider_once() {
        let providers: Vec<Arc<dyn CredentialProvider>> = (0..3)
            .map(|_| {
                let mut provider = MockCredentialProvider::new();
                provider.expect_refresh().times(1).return_const(());
                provider.expect_get_credentials().never();
                Arc::new(provider) as Arc<dyn CredentialProvider>
            })
            .collect();

        ChainProvider::new(providers).refresh();
    }

    #[test]
    fn test_nested_chain() {
        let inner = ChainProvider::new(vec![Arc::new(StaticProvider::new(CredentialRecord::new(
            "https://inner",
        )))]);
        let outer = ChainProvider::default()
            .push(Arc::new(failing_provider("outer", "nothing")))
            .push(Arc::new(inner));

        assert_eq!(outer.len(), 2);
        assert_eq!(outer.get_credentials().unwrap().host(), "https://inner");
        assert_eq!(outer.name(), "chain(outer, chain(static))");
    }
}
