use nbgwas_common::TaskStore;
use std::sync::Arc;

use crate::config::RestConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: TaskStore,
    pub config: Arc<RestConfig>,
}

impl AppState {
    pub fn new(config: RestConfig) -> Self {
        let store = TaskStore::new(&config.job_path, config.id_strategy.build());
        Self {
            store,
            config: Arc::new(config),
        }
    }
}
