use std::sync::Arc;

use dialog_core::{ChatDispatcher, GenerationEngine, SessionStore};

use crate::metrics::DialogMetrics;
use crate::mode_store::ModeStore;

pub type Dispatcher = ChatDispatcher<dyn SessionStore, dyn GenerationEngine>;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub modes: Arc<dyn ModeStore>,
    pub metrics: Arc<DialogMetrics>,
}
