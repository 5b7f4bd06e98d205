use std::sync::Arc;

use super::audit::AuditTrail;
use super::catalog::Catalog;
use super::identity::TokenRegistry;
use super::lifecycle::ReservationLifecycle;
use super::notification::{MailChannel, NotificationDispatcher};
use super::ratings::RatingService;
use super::store::HousingStore;

/// Service facade wiring every housing component onto one store and mail channel.
pub struct UniHavenService<S, M> {
    store: Arc<S>,
    registry: TokenRegistry<S>,
    catalog: Catalog<S>,
    lifecycle: ReservationLifecycle<S, M>,
    ratings: RatingService<S>,
    audit: AuditTrail<S>,
}

impl<S, M> UniHavenService<S, M>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    pub fn new(store: Arc<S>, mail: Arc<M>, from_address: impl Into<String>) -> Self {
        let audit = AuditTrail::new(store.clone());
        let notifier = NotificationDispatcher::new(store.clone(), mail, from_address);

        Self {
            registry: TokenRegistry::new(store.clone()),
            catalog: Catalog::new(store.clone(), audit.clone()),
            lifecycle: ReservationLifecycle::new(store.clone(), notifier, audit.clone()),
            ratings: RatingService::new(store.clone(), audit.clone()),
            audit,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &TokenRegistry<S> {
        &self.registry
    }

    pub fn catalog(&self) -> &Catalog<S> {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &ReservationLifecycle<S, M> {
        &self.lifecycle
    }

    pub fn ratings(&self) -> &RatingService<S> {
        &self.ratings
    }

    pub fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }
}
