//! The `Orm` factory
//!
//! An `Orm` owns what every session shares: the entity registry, the
//! storage backend, the codec registry and the backend-specific encoding.
//! It holds no entity state. Sessions come only from [`Orm::fork`].
//!
//! # Example
//!
//! ```ignore
//! use strata_engine::{Orm, OrmConfig};
//!
//! let orm = Orm::open(OrmConfig::relational(), registry)?;
//! let mut em = orm.fork();
//! let user = em.create("User", [("email", "a@x")])?;
//! em.flush().await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_core::{EntityMetadata, Limits, MetadataRegistry, Result};
use strata_mapping::{CodecRegistry, DocumentEncoding, Encoding, Extractor, TextEncoding};
use strata_storage::{Backend, BackendKind, DocumentStore, RelationalStore};
use tracing::info;

use crate::config::OrmConfig;
use crate::session::EntityManager;

struct OrmInner {
    config: OrmConfig,
    registry: MetadataRegistry,
    backend: Arc<dyn Backend>,
    encoding: Arc<dyn Encoding>,
    codecs: Arc<CodecRegistry>,
    limits: Limits,
    next_session: AtomicU64,
}

/// Shared entry point; cheap to clone
#[derive(Clone)]
pub struct Orm {
    inner: Arc<OrmInner>,
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("backend", &self.inner.backend.kind())
            .field("entities", &self.inner.registry.len())
            .finish()
    }
}

impl Orm {
    /// Open the backend named by `config` and create missing collections
    pub fn open(config: OrmConfig, registry: MetadataRegistry) -> Result<Self> {
        Self::builder(config, registry).open()
    }

    /// Builder for custom codecs or a pre-built backend
    pub fn builder(config: OrmConfig, registry: MetadataRegistry) -> OrmBuilder {
        OrmBuilder {
            config,
            registry,
            codecs: None,
            backend: None,
        }
    }

    /// Start a new session
    pub fn fork(&self) -> EntityManager {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        EntityManager::new(self.clone(), id)
    }

    /// Configuration the ORM was opened with
    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Entity registry
    pub fn registry(&self) -> &MetadataRegistry {
        &self.inner.registry
    }

    /// Look up an entity or fail with `InvalidInput`
    pub fn metadata(&self, entity: &str) -> Result<Arc<EntityMetadata>> {
        self.inner.registry.require(entity)
    }

    /// Shared backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// Backend kind
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Codec registry
    pub fn codecs(&self) -> &CodecRegistry {
        &self.inner.codecs
    }

    pub(crate) fn encoding(&self) -> &dyn Encoding {
        self.inner.encoding.as_ref()
    }

    pub(crate) fn extractor(&self) -> Extractor<'_> {
        Extractor::new(&self.inner.codecs, self.inner.limits)
    }

    /// Create collections for every registered entity that lacks one
    pub fn ensure_schema(&self) -> Result<()> {
        for entity in self.inner.registry.iter() {
            self.inner.backend.ensure_collection(entity)?;
        }
        Ok(())
    }

    /// Drop and recreate the collection of every registered entity
    ///
    /// All stored rows are lost. Open sessions keep their (now stale)
    /// identity maps.
    pub fn refresh_schema(&self) -> Result<()> {
        for entity in self.inner.registry.iter() {
            self.inner.backend.drop_collection(&entity.collection)?;
            self.inner.backend.ensure_collection(entity)?;
        }
        info!(
            target: "strata::session",
            backend = %self.inner.backend.kind(),
            entities = self.inner.registry.len(),
            "schema refreshed"
        );
        Ok(())
    }
}

/// Builder for [`Orm`]
pub struct OrmBuilder {
    config: OrmConfig,
    registry: MetadataRegistry,
    codecs: Option<CodecRegistry>,
    backend: Option<Arc<dyn Backend>>,
}

impl OrmBuilder {
    /// Use a custom codec registry instead of the standard one
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    /// Use an existing backend; the config's backend settings are ignored
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Open the backend and create missing collections
    pub fn open(self) -> Result<Orm> {
        self.config.validate()?;
        let limits = self.config.limits()?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => open_backend(&self.config)?,
        };

        let codecs = Arc::new(self.codecs.unwrap_or_else(CodecRegistry::standard));
        let encoding: Arc<dyn Encoding> = match backend.kind() {
            BackendKind::Document => Arc::new(DocumentEncoding::new(Arc::clone(&codecs))),
            BackendKind::Relational => Arc::new(TextEncoding::new(Arc::clone(&codecs))),
        };

        let orm = Orm {
            inner: Arc::new(OrmInner {
                config: self.config,
                registry: self.registry,
                backend,
                encoding,
                codecs,
                limits,
                next_session: AtomicU64::new(1),
            }),
        };
        orm.ensure_schema()?;
        info!(
            target: "strata::session",
            backend = %orm.backend_kind(),
            entities = orm.registry().len(),
            "orm opened"
        );
        Ok(orm)
    }
}

fn open_backend(config: &OrmConfig) -> Result<Arc<dyn Backend>> {
    Ok(match config.backend_kind()? {
        BackendKind::Document => Arc::new(DocumentStore::new()),
        BackendKind::Relational => match &config.path {
            Some(path) => Arc::new(RelationalStore::open(path)?),
            None => Arc::new(RelationalStore::open_in_memory()?),
        },
    })
}
