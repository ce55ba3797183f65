//! Service configuration for the back-office core.

use pretty_simple_display::{DebugPretty, DisplaySimple};
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::env;

const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WORKFLOW_NAMESPACE: &str = "backoffice";
const DEFAULT_WORKFLOW_TASK_QUEUE: &str = "backoffice-lifecycle";

/// Environment-driven configuration for both the HTTP server and the
/// workflow worker binaries.
#[derive(DebugPretty, DisplaySimple, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Redis connection string for the write-through position cache.
    pub redis_url: String,
    /// Address of the durable workflow runtime.
    pub workflow_address: String,
    /// Workflow namespace.
    pub workflow_namespace: String,
    /// Workflow task queue.
    pub workflow_task_queue: String,
    /// Listen address for the HTTP server binary.
    pub http_bind_addr: String,
}

impl Default for ServiceConfig {
    #[cfg(not(target_arch = "wasm32"))]
    fn default() -> Self {
        Self::from_env()
    }

    #[cfg(target_arch = "wasm32")]
    fn default() -> Self {
        Self::local()
    }
}

impl ServiceConfig {
    /// Read configuration from environment variables, loading a `.env` file
    /// first if one is present.
    #[cfg(not(target_arch = "wasm32"))]
    fn from_env() -> Self {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/backoffice".to_string());
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let workflow_address =
            env::var("WORKFLOW_ADDRESS").unwrap_or_else(|_| "http://localhost:7233".to_string());
        let workflow_namespace = env::var("WORKFLOW_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_WORKFLOW_NAMESPACE.to_string());
        let workflow_task_queue = env::var("WORKFLOW_TASK_QUEUE")
            .unwrap_or_else(|_| DEFAULT_WORKFLOW_TASK_QUEUE.to_string());
        let http_bind_addr = env::var("BACKOFFICE_HTTP_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_HTTP_BIND_ADDR.to_string());

        Self {
            database_url,
            redis_url,
            workflow_address,
            workflow_namespace,
            workflow_task_queue,
            http_bind_addr,
        }
    }

    /// Configuration pointing at the conventional local-development
    /// endpoints, independent of the environment.
    pub fn local() -> Self {
        Self {
            database_url: "postgres://localhost/backoffice".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            workflow_address: "http://localhost:7233".to_string(),
            workflow_namespace: DEFAULT_WORKFLOW_NAMESPACE.to_string(),
            workflow_task_queue: DEFAULT_WORKFLOW_TASK_QUEUE.to_string(),
            http_bind_addr: DEFAULT_HTTP_BIND_ADDR.to_string(),
        }
    }

    /// Set the HTTP server's bind address.
    pub fn with_http_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_bind_addr = addr.into();
        self
    }

    /// Set the workflow task queue.
    pub fn with_workflow_task_queue(mut self, queue: impl Into<String>) -> Self {
        self.workflow_task_queue = queue.into();
        self
    }
}
