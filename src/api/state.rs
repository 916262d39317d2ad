use crate::config::Config;
use crate::store::DataStore;
use std::sync::Arc;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub store: DataStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: DataStore, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}
