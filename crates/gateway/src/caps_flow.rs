//! Capability request dispatch: seed bundle rewriting, the locally served
//! long-poll endpoint, and named-upload forwarding.

use std::sync::Arc;

use {
    serde_json::Value,
    tracing::{debug, warn},
};

use {
    gridway_caps::{HandlerKind, RewriteRule},
    gridway_protocol::{CapabilityBundle, PollRequest, constants::LOCAL_EQ_PREFIX},
};

use crate::state::Gateway;

/// Which phase of a proxied capability call is being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsStage {
    Request,
    Response,
}

/// What the proxying engine should do with the capability call.
#[derive(Debug)]
pub enum CapsOutcome {
    /// Forward to the upstream URL (the body may have been modified in
    /// place).
    Forward,
    /// Forward to this URL instead of the original target.
    ForwardTo(String),
    /// The gateway produced the response body itself.
    Respond(Value),
    /// No response; tear the channel down with a non-200 status.
    CloseChannel,
}

/// Capability names rewritten in every seed bundle. The event queue is
/// served locally; the upload caps are redirected to the home inventory
/// service.
const UPLOAD_CAP_NAMES: &[&str] = &[
    "UpdateScriptAgent",
    "UpdateNotecardAgentInventory",
    "UpdateScriptAgentInventory",
    "NewFileAgentInventory",
];

impl Gateway {
    /// Dispatch one intercepted capability call.
    pub async fn handle_caps(&self, token: &str, stage: CapsStage, body: &mut Value) -> CapsOutcome {
        let Some(entry) = self.state.caps.lookup(token) else {
            return CapsOutcome::Forward;
        };

        match entry.kind {
            HandlerKind::Seed => {
                if stage == CapsStage::Response {
                    self.rewrite_seed_response(&entry.region, body).await;
                }
                CapsOutcome::Forward
            },
            HandlerKind::EventQueue => {
                if stage != CapsStage::Request {
                    return CapsOutcome::Forward;
                }
                self.long_poll(token, body).await
            },
            HandlerKind::NamedUpload => match entry.forward_url {
                Some(url) => CapsOutcome::ForwardTo(url),
                None => CapsOutcome::Forward,
            },
            HandlerKind::PassThrough => CapsOutcome::Forward,
        }
    }

    /// One long-poll round against the queue the token names.
    async fn long_poll(&self, token: &str, body: &Value) -> CapsOutcome {
        let request = match PollRequest::from_value(body) {
            Ok(r) => r,
            Err(e) => {
                warn!(token, error = %e, "malformed long-poll request, closing channel");
                return CapsOutcome::CloseChannel;
            },
        };

        let queue_id = queue_id_from_token(token);
        let Some(queue) = self.state.broker.get(queue_id) else {
            warn!(token, "no event queue for token");
            return CapsOutcome::CloseChannel;
        };

        match queue.poll(request).await {
            Some(response) => CapsOutcome::Respond(response.to_value()),
            None => {
                // The channel is finished; release the queue entry.
                self.state.broker.remove(queue_id);
                self.state.caps.remove(queue_id);
                CapsOutcome::CloseChannel
            },
        }
    }

    /// Rewrite a seed capability response bundle in place.
    async fn rewrite_seed_response(&self, region: &std::net::SocketAddr, body: &mut Value) {
        let Some(mut bundle) = CapabilityBundle::from_value(body.clone()) else {
            return;
        };
        let Some(runtime) = self.state.runtime().await else {
            return;
        };
        let Some(session) = runtime.manager.main_session().await else {
            return;
        };

        let login_uri = self.state.transport.login_uri();
        let mut rules = vec![RewriteRule {
            name: "EventQueueGet",
            local_url: format!("{login_uri}{LOCAL_EQ_PREFIX}{}/", session.queue_id),
            kind: HandlerKind::EventQueue,
            forward_url: None,
        }];
        for name in UPLOAD_CAP_NAMES {
            if let Some(upstream) = runtime.upload_caps.get(*name) {
                rules.push(RewriteRule {
                    name,
                    local_url: format!("{login_uri}{}", upstream.trim_start_matches('/')),
                    kind: HandlerKind::NamedUpload,
                    forward_url: Some(upstream.clone()),
                });
            } else {
                debug!(name, "inventory service offers no such upload cap");
            }
        }

        self.state.caps.rewrite_bundle(&mut bundle, *region, &rules);
        *body = bundle.into_value();
    }
}

/// The queue id is the last path segment of the locally served event-queue
/// URL (`…/eq-prefix/<queue-id>/`). Bare queue ids pass through untouched.
fn queue_id_from_token(token: &str) -> &str {
    token.trim_end_matches('/').rsplit('/').next().unwrap_or(token)
}
