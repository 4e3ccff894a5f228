//! Process-wide table of intercepted capability paths.

use std::net::SocketAddr;

use {dashmap::DashMap, tracing::debug};

use gridway_protocol::CapabilityBundle;

/// How an intercepted capability request should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// A region seed capability; responses carry a bundle to rewrite.
    Seed,
    /// The locally served long-poll event queue, keyed by queue id.
    EventQueue,
    /// A named inventory upload cap served by the home inventory service.
    NamedUpload,
    /// Known but untouched; forward as-is.
    PassThrough,
}

/// One registered capability path.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub token: String,
    /// The region (or queue owner) this path belongs to.
    pub region: SocketAddr,
    pub kind: HandlerKind,
    /// Upstream URL to forward to, when the kind calls for forwarding.
    pub forward_url: Option<String>,
}

/// A single rewrite instruction for [`CapabilityRegistry::rewrite_bundle`].
#[derive(Debug, Clone)]
pub struct RewriteRule {
    /// Well-known capability name to look for in the bundle.
    pub name: &'static str,
    /// Locally addressable URL to put in its place.
    pub local_url: String,
    pub kind: HandlerKind,
    pub forward_url: Option<String>,
}

/// Token → entry table. Tokens are unique; a re-registration of the same
/// token wins over the previous entry.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: DashMap<String, CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, replacing any previous holder of the token.
    pub fn register(&self, entry: CapabilityEntry) {
        debug!(token = %entry.token, kind = ?entry.kind, "registering cap");
        self.entries.insert(entry.token.clone(), entry);
    }

    /// Register only if the token is not already present. Returns whether
    /// the entry was inserted. Atomic per token.
    pub fn register_if_absent(&self, entry: CapabilityEntry) -> bool {
        let mut inserted = false;
        self.entries.entry(entry.token.clone()).or_insert_with(|| {
            inserted = true;
            entry
        });
        inserted
    }

    pub fn lookup(&self, token: &str) -> Option<CapabilityEntry> {
        self.entries.get(token).map(|e| e.clone())
    }

    pub fn remove(&self, token: &str) -> Option<CapabilityEntry> {
        self.entries.remove(token).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite recognized capability names in a bundle to locally served
    /// URLs, registering an entry per rewritten name. Names absent from the
    /// bundle are skipped; unrecognized names are left untouched.
    ///
    /// Each individual registration is atomic, but the bundle as a whole is
    /// rewritten in place entry by entry.
    pub fn rewrite_bundle(
        &self,
        bundle: &mut CapabilityBundle,
        region: SocketAddr,
        rules: &[RewriteRule],
    ) {
        for rule in rules {
            if !bundle.contains(rule.name) {
                debug!(name = rule.name, "bundle has no such cap, skipping");
                continue;
            }
            bundle.set_url(rule.name, rule.local_url.clone());
            self.register_if_absent(CapabilityEntry {
                token: rule.local_url.clone(),
                region,
                kind: rule.kind.clone(),
                forward_url: rule.forward_url.clone(),
            });
        }
    }
}
