use std::sync::Arc;

use flowbridge_ingress::Pipeline;
use flowbridge_lifecycle::LifecycleManager;
use flowbridge_state_store::StateStore;
use flowbridge_templates::TemplateRegistry;

/// Everything a handler needs, shared behind one `Arc` and cloned cheaply
/// into every request (the same shape the ingress pipeline itself uses for
/// its internals).
pub struct AppState<S: StateStore> {
    pub pipeline: Pipeline<S>,
    pub lifecycle: Arc<LifecycleManager>,
    /// The same registry instance the pipeline dispatches through, kept
    /// here too so `/rpa/test` can dry-run a handler without touching the
    /// queue.
    pub registry: Arc<TemplateRegistry>,
    pub renewal_window: time::Duration,
    /// `None` disables the function-key check entirely (local development).
    pub function_key: Option<String>,
}

pub type SharedState<S> = Arc<AppState<S>>;
