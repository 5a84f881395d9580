use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum_test::TestServer;
use clinic_core::testing::{MemoryClinicStore, ScriptedMediaStore, in_memory_coordinator_with};
use clinic_server::{
    AppState,
    infra::config::Config,
    routes::create_app,
};

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryClinicStore>,
    pub media: Arc<ScriptedMediaStore>,
}

pub fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".into(),
        server_port: 0,
        max_upload_bytes: 1024 * 1024,
        ..Config::default()
    }
}

/// The full router over in-memory stores.
pub fn build_test_app() -> Result<TestApp> {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: Config) -> Result<TestApp> {
    let (coordinator, store, media) = in_memory_coordinator_with(config.coordinator);
    let state = AppState::new(Arc::new(config), coordinator, None);
    let server = TestServer::builder()
        .build(create_app(state.clone()))
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        store,
        media,
    })
}
