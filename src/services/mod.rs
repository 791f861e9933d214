use crate::catalog::BoatCatalog;
use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::services::approval::ApprovalService;
use crate::services::intake::IntakeService;
use crate::store::BookingStore;
use chrono_tz::Tz;
use std::sync::Arc;

pub mod approval;
pub mod dedup;
pub mod intake;

// Container for all services injected into route handlers.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
    pub approval: Arc<ApprovalService>,
    pub store: Arc<dyn BookingStore>,
    pub fallback_mailto: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn BoatCatalog>,
        notifier: Arc<dyn Notifier>,
        tz: Tz,
        config: &AppConfig,
    ) -> Self {
        let intake = IntakeService::new(store.clone(), catalog, notifier, tz, config);
        let approval =
            ApprovalService::new(store.clone(), config.booking.owner_action_token.clone());

        Self {
            intake: Arc::new(intake),
            approval: Arc::new(approval),
            store,
            fallback_mailto: config.email.fallback_to.clone(),
        }
    }
}
