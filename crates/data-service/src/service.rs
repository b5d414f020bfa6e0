//! The request pipeline.
//!
//! ```text
//! credential ─► authenticate ─► authorize ─► resolve ─► slice ─► negotiate
//!                                                                   │
//!                          response ◄─ cache.get_or_compute(read + serialize)
//! ```
//!
//! Nothing touches an adapter or the cache before the policy has allowed
//! the action.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, instrument, warn};

use access_policy::{
    narrow_columns, redact_metadata, redacted_columns, AccessPolicy, Action, AuthConfig,
    Authenticator, Credential, Principal, RedactionRule,
};
use adapters::{resolve, Adapter, Node};
use codecs::{CodecRegistry, MediaRange};
use result_cache::{CacheConfig, CacheKey, CacheStats, CacheStatus, ResultCache};
use search::{NodeSummary, Redactor, SearchPage, SearchRequest, SearchView, Visibility};
use slicer::{BackendPool, SliceEngine, SliceSpec};
use tree_common::{ContentVersion, DataError, DataResult, ErrorKind, NodePath, Structure};

use crate::config::BackendConfig;

/// Serialized data for one request.
#[derive(Debug, Clone)]
pub struct DataResponse {
    pub bytes: Bytes,
    pub media_type: String,
    /// Entity tag derived from the content version.
    pub freshness_token: String,
    pub content_version: ContentVersion,
    pub cached: bool,
}

/// Startup-time assembly of a [`DataService`].
pub struct ServiceBuilder {
    root: Arc<dyn Adapter>,
    policy: AccessPolicy,
    auth: AuthConfig,
    codecs: CodecRegistry,
    backend: BackendConfig,
    cache: CacheConfig,
}

impl ServiceBuilder {
    pub fn new(root: Arc<dyn Adapter>) -> Self {
        Self {
            root,
            policy: AccessPolicy::default(),
            auth: AuthConfig::default(),
            codecs: CodecRegistry::with_builtins(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    pub fn policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn build(self) -> DataService {
        let pool = BackendPool::new(self.backend.pool_config());
        DataService {
            root: self.root,
            policy: Arc::new(self.policy),
            authenticator: Authenticator::new(&self.auth),
            codecs: self.codecs,
            engine: SliceEngine::new(pool, self.backend.max_parallel_chunks),
            cache: ResultCache::from_config(&self.cache),
        }
    }
}

/// Metadata, data and search over one tree.
///
/// Built once at startup and shared behind an `Arc`; every part is
/// read-only except the cache, which synchronises itself.
pub struct DataService {
    root: Arc<dyn Adapter>,
    policy: Arc<AccessPolicy>,
    authenticator: Authenticator,
    codecs: CodecRegistry,
    engine: SliceEngine,
    cache: ResultCache,
}

fn observe<T>(operation: &'static str, started: Instant, result: &DataResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    counter!("data_requests_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("data_request_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = result {
        match e.kind() {
            ErrorKind::BackendError | ErrorKind::InternalError => {
                warn!(operation, error = %e, "Request failed")
            }
            _ => debug!(operation, error = %e, "Request rejected"),
        }
    }
}

/// Hide redacted metadata fields and table columns from a summary.
fn redact_summary(summary: &mut NodeSummary, redactions: &[RedactionRule]) {
    redact_metadata(redactions, &mut summary.metadata);
    if let Structure::Table(table) = &mut summary.structure {
        let hidden = redacted_columns(redactions);
        table.columns.retain(|c| !hidden.contains(&c.name.as_str()));
    }
}

/// Drop redacted columns from a table selection. Fails when nothing the
/// caller asked for is left.
fn narrow_selection(node: &Node, mut spec: SliceSpec, redactions: &[RedactionRule]) -> DataResult<SliceSpec> {
    let Structure::Table(table) = &node.structure else {
        return Ok(spec);
    };
    if redacted_columns(redactions).is_empty() {
        return Ok(spec);
    }
    let requested = if spec.columns.is_empty() {
        table.column_names()
    } else {
        std::mem::take(&mut spec.columns)
    };
    let visible = narrow_columns(redactions, requested);
    if visible.is_empty() {
        return Err(DataError::forbidden(&node.path, Action::ReadData));
    }
    spec.columns = visible;
    Ok(spec)
}

impl DataService {
    pub fn builder(root: Arc<dyn Adapter>) -> ServiceBuilder {
        ServiceBuilder::new(root)
    }

    /// Resolve a credential to a principal. `None` is the anonymous caller
    /// when that is allowed.
    pub fn authenticate(&self, credential: Option<&Credential>) -> DataResult<Principal> {
        Ok(self.authenticator.authenticate(credential)?)
    }

    fn authorize(&self, principal: &Principal, path: &NodePath, action: Action) -> DataResult<Vec<RedactionRule>> {
        self.policy
            .authorize(principal, path, action)
            .into_result(path, action)
    }

    /// Node description with redactions applied. Requires `read_metadata`.
    #[instrument(skip(self, credential), fields(path = %path))]
    pub async fn metadata(&self, credential: Option<&Credential>, path: &NodePath) -> DataResult<NodeSummary> {
        let started = Instant::now();
        let result = self.metadata_inner(credential, path).await;
        observe("metadata", started, &result);
        result
    }

    async fn metadata_inner(&self, credential: Option<&Credential>, path: &NodePath) -> DataResult<NodeSummary> {
        let principal = self.authenticate(credential)?;
        let redactions = self.authorize(&principal, path, Action::ReadMetadata)?;
        let node = resolve(&self.root, path).await?;

        let mut summary = NodeSummary::from(node);
        redact_summary(&mut summary, &redactions);
        Ok(summary)
    }

    /// Sliced, serialized data. Requires `read_data`.
    ///
    /// `formats` is the caller's weighted preference list; an empty list
    /// takes the default codec for the node's kind.
    #[instrument(skip(self, credential, slice, formats), fields(path = %path))]
    pub async fn data(
        &self,
        credential: Option<&Credential>,
        path: &NodePath,
        slice: SliceSpec,
        formats: &[MediaRange],
    ) -> DataResult<DataResponse> {
        let started = Instant::now();
        let result = self.data_inner(credential, path, slice, formats).await;
        observe("data", started, &result);
        result
    }

    async fn data_inner(
        &self,
        credential: Option<&Credential>,
        path: &NodePath,
        slice: SliceSpec,
        formats: &[MediaRange],
    ) -> DataResult<DataResponse> {
        let principal = self.authenticate(credential)?;
        let redactions = self.authorize(&principal, path, Action::ReadData)?;
        let node = resolve(&self.root, path).await?;

        let spec = narrow_selection(&node, slice, &redactions)?;
        let resolved = spec.resolve(&node.structure)?;
        let codec = self
            .codecs
            .negotiate_for_shape(node.kind, &resolved.output_shape(), formats)?;

        let key = CacheKey::new(
            node.path.clone(),
            node.content_version.clone(),
            resolved.canonical(&node.structure.shape()),
            codec.media_type(),
        );
        debug!(key = %key, "Data request");

        let content_version = node.content_version.clone();
        let compute = {
            let engine = self.engine.clone();
            let codecs = self.codecs.clone();
            let codec = Arc::clone(&codec);
            move || async move {
                let payload = engine.read_resolved(&node, &resolved).await?;
                Ok::<Bytes, DataError>(codecs.serialize(&payload, codec.as_ref())?)
            }
        };
        let lookup = self.cache.get_or_compute(key, compute).await?;

        Ok(DataResponse {
            bytes: lookup.bytes,
            media_type: codec.media_type().to_string(),
            freshness_token: content_version.freshness_token(),
            content_version,
            cached: lookup.status == CacheStatus::Hit,
        })
    }

    /// One page of nodes under `request.root` matching the query. Requires
    /// `search` on the root; nodes the principal may not read metadata for
    /// are left out along with everything below them.
    #[instrument(skip(self, credential, request), fields(root = %request.root))]
    pub async fn search(&self, credential: Option<&Credential>, request: SearchRequest) -> DataResult<SearchPage> {
        let started = Instant::now();
        let result = self.search_inner(credential, request).await;
        observe("search", started, &result);
        result
    }

    async fn search_inner(&self, credential: Option<&Credential>, request: SearchRequest) -> DataResult<SearchPage> {
        let principal = self.authenticate(credential)?;
        self.authorize(&principal, &request.root, Action::Search)?;

        let visible: Visibility = {
            let policy = Arc::clone(&self.policy);
            let principal = principal.clone();
            Arc::new(move |path: &NodePath| policy.permits(&principal, path, Action::ReadMetadata))
        };
        // Queries only ever see what the metadata endpoint would return.
        let redact: Redactor = {
            let policy = Arc::clone(&self.policy);
            Arc::new(move |summary: &mut NodeSummary| {
                let decision = policy.authorize(&principal, &summary.path, Action::ReadMetadata);
                redact_summary(summary, decision.redactions());
            })
        };
        search::search(&self.root, request, SearchView::new(visible, redact)).await
    }

    /// The root adapter answers.
    pub async fn ready(&self) -> DataResult<()> {
        self.root
            .structure()
            .await
            .map(|_| ())
            .map_err(|e| DataError::Backend(e.at(&NodePath::root())))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Whether requests without a credential are served.
    pub fn allows_anonymous(&self) -> bool {
        self.authenticator.allows_anonymous()
    }
}
