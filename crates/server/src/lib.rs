use db::DBService;
use services::services::garment_ai::GarmentAiService;

pub mod error;
pub mod routes;

/// Shared handles passed to every route
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    garment_ai: GarmentAiService,
}

impl AppState {
    pub fn new(db: DBService, garment_ai: GarmentAiService) -> Self {
        Self { db, garment_ai }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn garment_ai(&self) -> &GarmentAiService {
        &self.garment_ai
    }
}
