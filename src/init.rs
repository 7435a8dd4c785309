use crate::error::InitError;
use crate::layer::TimberLayer;
use crate::timber::Timber;
use std::collections::BTreeMap;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::{Layer as _, SubscriberExt};
use tracing_subscriber::Registry;

/// Configuration of the globally installed [`TimberLayer`].
///
/// **Fields**
/// - `max_level`: most verbose level forwarded to Timber.
/// - `default_fields`: metadata attached to every entry; span and event
///   fields override it on key collision.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is added
///   next to the `TimberLayer` so events are also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub max_level: LevelFilter,
    pub default_fields: BTreeMap<String, serde_json::Value>,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            max_level: LevelFilter::INFO,
            default_fields: BTreeMap::new(),
            enable_stdout: true,
        }
    }
}

impl LayerConfig {
    /// Build the [`TimberLayer`] described by this config.
    pub fn build_layer(&self, timber: Timber) -> TimberLayer {
        self.default_fields.iter().fold(
            TimberLayer::new(timber).with_max_level(self.max_level),
            |layer, (key, value)| layer.with_default_field(key.clone(), value.clone()),
        )
    }
}

/// Install a global `tracing` subscriber forwarding events to `timber`.
///
/// **Parameters**
/// - `timber`: sink handle receiving one entry per event.
/// - `config`: [`LayerConfig`] controlling filtering, default metadata and
///   console output.
///
/// **Returns**
/// - `Err(InitError::SetGlobalDefault)` if a global subscriber was already
///   installed.
pub fn init_tracing_with_config(timber: Timber, config: LayerConfig) -> Result<(), InitError> {
    let layer = config.build_layer(timber);

    // The fmt layer changes the subscriber type, hence two branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(config.max_level);
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing(timber: Timber) -> Result<(), InitError> {
    init_tracing_with_config(timber, LayerConfig::default())
}
