use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use log::debug;

use super::*;
use crate::band::BandOrientation;

/// Controllers keyed by band orientation, with a default for every orientation
/// that has no entry.
pub struct ExtractionControllerFactory {
    controllers: RwLock<HashMap<BandOrientation, Arc<dyn ExtractionController>>>,
    default: Arc<dyn ExtractionController>,
}

impl ExtractionControllerFactory {
    /// No registrations, every orientation goes to the given default.
    pub fn with_default(default: Arc<dyn ExtractionController>) -> Self {
        Self {
            controllers: RwLock::new(HashMap::new()),
            default,
        }
    }

    /// Register a controller, replacing any previous one for the orientation.
    pub fn register(&self, orientation: BandOrientation, controller: Arc<dyn ExtractionController>) {
        debug!("Registering extraction controller for {orientation} bands");
        self.controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(orientation, controller);
    }

    pub fn controller_by(&self, orientation: BandOrientation) -> Arc<dyn ExtractionController> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&orientation)
            .cloned()
            .unwrap_or_else(|| self.default_controller())
    }

    pub fn default_controller(&self) -> Arc<dyn ExtractionController> {
        Arc::clone(&self.default)
    }
}

impl Default for ExtractionControllerFactory {
    /// Crosstab bands get the [CrosstabExtractionController], the rest the
    /// [DefaultExtractionController].
    fn default() -> Self {
        let factory = Self::with_default(Arc::new(DefaultExtractionController));
        factory.register(BandOrientation::Crosstab, Arc::new(CrosstabExtractionController));
        factory
    }
}

impl std::fmt::Debug for ExtractionControllerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.controllers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ExtractionControllerFactory")
            .field("registered", &registry.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
