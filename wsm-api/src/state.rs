use wsm_manager::WorkspaceManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: WorkspaceManager,
    pub invoke_token: Option<String>,
}

impl AppState {
    pub fn new(manager: WorkspaceManager) -> Self {
        Self {
            manager,
            invoke_token: None,
        }
    }

    pub fn with_invoke_token(mut self, token: Option<String>) -> Self {
        self.invoke_token = token;
        self
    }
}
