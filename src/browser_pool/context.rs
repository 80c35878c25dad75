//! Rendering contexts: a short-lived, isolated session within a rendering
//! engine that owns cookies, cache, and request interception for one
//! navigation. Pools per-page sessions rather than whole browsers,
//! reusing a CDP `page.execute(...)` idiom for the per-page setup
//! commands.

use anyhow::{Context as _, Result};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::request_filter::{FilterDecision, RequestFilter};

/// Injected before any page script runs; zeroes CSS animation/transition
/// durations so rendering settles immediately.
const FREEZE_ANIMATIONS_SCRIPT: &str = r#"
(() => {
  const style = document.createElement('style');
  style.textContent = `*, *::before, *::after {
    animation-duration: 0s !important;
    animation-delay: 0s !important;
    transition-duration: 0s !important;
    transition-delay: 0s !important;
  }`;
  document.documentElement.appendChild(style);
})();
"#;

/// A rendering context borrowed from an engine for the duration of one
/// navigation. Dropping it ends the interception task; the underlying
/// engine is returned to the pool separately by the owning guard.
pub struct RenderingContext {
    page: Page,
    interception_task: Option<JoinHandle<()>>,
}

impl RenderingContext {
    /// Open a fresh page on `engine`, apply the per-page optimizations,
    /// and wire request interception through `filter`.
    pub async fn new(
        page: Page,
        request_timeout: Duration,
        filter: Arc<RequestFilter>,
    ) -> Result<Self> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams {
            source: FREEZE_ANIMATIONS_SCRIPT.to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        })
        .await
        .context("failed to inject animation-freeze script")?;

        page.execute(SetDownloadBehaviorParams::builder().behavior(
            chromiumoxide::cdp::browser_protocol::page::SetDownloadBehaviorBehavior::Deny,
        ).build().map_err(anyhow::Error::msg)?)
        .await
        .context("failed to set download behavior")?;

        let _ = page.execute(FetchEnableParams {
            patterns: Some(vec![RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: None,
                request_stage: None,
            }]),
            handle_auth_requests: Some(false),
        })
        .await
        .context("failed to enable request interception")?;

        let interception_task = spawn_interception_loop(page.clone(), filter).await;

        Ok(Self {
            page,
            interception_task: Some(interception_task),
        })
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        if let Some(task) = self.interception_task.take() {
            task.abort();
        }
    }
}

async fn spawn_interception_loop(page: Page, filter: Arc<RequestFilter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = match page.event_listener::<EventRequestPaused>().await {
            Ok(events) => events,
            Err(e) => {
                warn!("failed to subscribe to request interception events: {e}");
                return;
            }
        };

        while let Some(event) = events.next().await {
            let url = event.request.url.clone();
            let resource_type = event.resource_type.unwrap_or(ResourceType::Other);
            let is_favicon = url.to_lowercase().ends_with("favicon.ico");
            let request_id = event.request_id.clone();

            let decision = filter.decide(&url, resource_type, is_favicon);
            let result = match decision {
                FilterDecision::Continue => {
                    page.execute(ContinueRequestParams::builder().request_id(request_id).build().expect("request_id set"))
                        .await
                        .map(|_| ())
                }
                FilterDecision::Abort => {
                    debug!("aborting filtered request: {url}");
                    page.execute(
                        FailRequestParams::builder()
                            .request_id(request_id)
                            .error_reason(ErrorReason::BlockedByClient)
                            .build()
                            .expect("request_id and error_reason set"),
                    )
                    .await
                    .map(|_| ())
                }
            };
            if let Err(e) = result {
                debug!("request interception response failed (page likely navigating away): {e}");
            }
        }
    })
}
