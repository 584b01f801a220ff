use crate::layer::EnrichLayer;
use crate::logger::Logger;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Route every `tracing` event in the process through `logger`.
///
/// **Parameters**
/// - `logger`: fully configured [`Logger`]; it keeps being usable directly.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`EnrichLayer`] as the global
/// default subscriber. Fails if a global subscriber is already set.
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), SetGlobalDefaultError> {
    let subscriber = Registry::default().with(EnrichLayer::new(logger));
    tracing::subscriber::set_global_default(subscriber)
}
