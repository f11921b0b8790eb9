//! Prometheus counters for logins, session capacity and the thumbnail cache.

use domains::{DomainError, Result};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum LoginOutcome {
    Ok,
    Failed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LoginLabels {
    pub outcome: LoginOutcome,
}

pub struct Metrics {
    registry: Registry,
    logins: Family<LoginLabels, Counter>,
    sessions_rejected: Counter,
    thumbnails_generated: Counter,
    thumbnail_hits: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("canopy");
        let logins = Family::<LoginLabels, Counter>::default();
        let sessions_rejected = Counter::default();
        let thumbnails_generated = Counter::default();
        let thumbnail_hits = Counter::default();

        registry.register("logins", "Login attempts by outcome", logins.clone());
        registry.register(
            "sessions_rejected",
            "Logins refused because the session store was full",
            sessions_rejected.clone(),
        );
        registry.register(
            "thumbnails_generated",
            "Thumbnails generated from uploads",
            thumbnails_generated.clone(),
        );
        registry.register(
            "thumbnail_cache_hits",
            "Thumbnails served from the cache directory",
            thumbnail_hits.clone(),
        );

        Self {
            registry,
            logins,
            sessions_rejected,
            thumbnails_generated,
            thumbnail_hits,
        }
    }

    pub fn login(&self, outcome: LoginOutcome) {
        self.logins.get_or_create(&LoginLabels { outcome }).inc();
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.inc();
    }

    pub fn thumbnail_served(&self, generated: bool) {
        if generated {
            self.thumbnails_generated.inc();
        } else {
            self.thumbnail_hits.inc();
        }
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        encode(&mut out, &self.registry).map_err(DomainError::internal)?;
        Ok(out)
    }
}
