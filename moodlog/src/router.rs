//! Ordered fallback across vendors.
//!
//! A router holds the providers configured for one operation in preference
//! order. Each request tries them in turn, once each, and returns the first
//! success. There is no backoff and no memory of past failures.

use std::future::Future;
use std::sync::Arc;

use crate::error::{CompanionError, VendorError};
use crate::vendor::Vendor;

/// Providers for one operation, most preferred first.
pub struct FallbackRouter<P: ?Sized> {
    operation: &'static str,
    hint: &'static str,
    providers: Vec<Arc<P>>,
}

impl<P: ?Sized> Clone for FallbackRouter<P> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation,
            hint: self.hint,
            providers: self.providers.clone(),
        }
    }
}

impl<P: ?Sized + Vendor> FallbackRouter<P> {
    /// `hint` names the credentials that would enable a provider; it is
    /// reported when the list is empty.
    pub const fn new(operation: &'static str, hint: &'static str) -> Self {
        Self {
            operation,
            hint,
            providers: Vec::new(),
        }
    }

    /// Append a provider at the lowest preference.
    #[must_use]
    pub fn with(mut self, provider: Arc<P>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Provider names in preference order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn providers(&self) -> &[Arc<P>] {
        &self.providers
    }

    /// Run `call` against each provider until one succeeds.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, CompanionError>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, VendorError>>,
    {
        let mut last_error = None;

        for (attempt, provider) in self.providers.iter().enumerate() {
            let vendor = provider.name();
            match call(Arc::clone(provider)).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation = self.operation,
                            vendor,
                            attempt,
                            "fallback provider succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(operation = self.operation, vendor, %error, "provider failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last) => Err(CompanionError::AllProvidersFailed {
                operation: self.operation,
                last,
            }),
            None => Err(CompanionError::Configuration {
                operation: self.operation,
                hint: self.hint,
            }),
        }
    }
}
