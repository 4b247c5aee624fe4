#![allow(dead_code)]

use betty_chat::services::mock::MockChatGateway;
use betty_chat::{ConversationHandle, HttpChatGateway, SessionController};
use betty_core::auth::MemoryTokenStore;
use betty_core::config::ApiSettings;
use betty_core::retry::RetryConfig;
use std::sync::{Arc, Once};
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_CONVERSATION_ID: &str = "conv-42";

static TRACING: Once = Once::new();

/// Route test logs through the libtest capture. `RUST_LOG` selects the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Wiremock backend plus an HTTP gateway pointed at it.
pub struct TestBackend {
    pub server: MockServer,
    pub gateway: HttpChatGateway,
    pub tokens: Arc<MemoryTokenStore>,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        Self::spawn_with_timeout(5).await
    }

    pub async fn spawn_with_timeout(request_timeout_secs: u64) -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let tokens = Arc::new(MemoryTokenStore::with_token(TEST_TOKEN));

        let settings = ApiSettings {
            base_url: server.uri(),
            request_timeout_secs,
            user_agent: "betty-test".to_string(),
        };
        let gateway = HttpChatGateway::new(&settings, RetryConfig::quick(), tokens.clone())
            .expect("Failed to build gateway");

        TestBackend {
            server,
            gateway,
            tokens,
        }
    }

    pub async fn requests(&self) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .expect("Request recording is disabled")
    }
}

/// Controller wired to a scripted gateway.
pub fn mock_session(handle: ConversationHandle) -> (Arc<MockChatGateway>, SessionController) {
    init_tracing();
    let gateway = Arc::new(MockChatGateway::new());
    let controller = SessionController::new(gateway.clone(), handle);
    (gateway, controller)
}

pub fn existing() -> ConversationHandle {
    ConversationHandle::Existing(TEST_CONVERSATION_ID.to_string())
}
