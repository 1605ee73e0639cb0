use crate::{
    LazyResolver,
    phases::{
        AnnotationArgumentsResolver, BodyResolver, ImportsResolver, StatusResolver, TypesResolver,
    },
};
use phasec_error::{ResolveError, ResolveResult};
use phasec_tree::ResolvePhase;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One resolver per phase after `Raw`, validated when built.
pub struct LazyResolverRegistry {
    resolvers: FxHashMap<ResolvePhase, Arc<dyn LazyResolver>>,
}

impl LazyResolverRegistry {
    pub fn builder() -> LazyResolverRegistryBuilder {
        LazyResolverRegistryBuilder::default()
    }

    pub fn standard() -> LazyResolverRegistry {
        LazyResolverRegistryBuilder::standard()
            .build()
            .expect("bug! standard resolvers cover every phase")
    }

    pub fn resolver(&self, phase: ResolvePhase) -> &dyn LazyResolver {
        self.resolvers
            .get(&phase)
            .map(|resolver| resolver.as_ref())
            .expect("bug! registry is validated when built")
    }
}

#[derive(Default)]
pub struct LazyResolverRegistryBuilder {
    resolvers: FxHashMap<ResolvePhase, Arc<dyn LazyResolver>>,
    duplicate: Option<ResolvePhase>,
}

impl LazyResolverRegistryBuilder {
    /// A builder holding the built-in resolver of every phase.
    pub fn standard() -> LazyResolverRegistryBuilder {
        LazyResolverRegistryBuilder::default()
            .register(ImportsResolver)
            .register(AnnotationArgumentsResolver)
            .register(TypesResolver)
            .register(StatusResolver)
            .register(BodyResolver)
    }

    pub fn register(self, resolver: impl LazyResolver + 'static) -> Self {
        self.register_shared(Arc::new(resolver))
    }

    pub fn register_shared(mut self, resolver: Arc<dyn LazyResolver>) -> Self {
        let phase = resolver.phase();
        if self.resolvers.insert(phase, resolver).is_some() {
            self.duplicate.get_or_insert(phase);
        }
        self
    }

    /// Installs `resolver` in place of whatever serves its phase.
    pub fn replace(mut self, resolver: impl LazyResolver + 'static) -> Self {
        let resolver: Arc<dyn LazyResolver> = Arc::new(resolver);
        self.resolvers.insert(resolver.phase(), resolver);
        self
    }

    pub fn build(self) -> ResolveResult<LazyResolverRegistry> {
        if let Some(phase) = self.duplicate {
            return Err(ResolveError::DuplicateResolver(phase));
        }
        if let Some(missing) = ResolvePhase::LAST
            .iter_until()
            .find(|phase| !self.resolvers.contains_key(phase))
        {
            return Err(ResolveError::UnregisteredPhase(missing));
        }
        Ok(LazyResolverRegistry {
            resolvers: self.resolvers,
        })
    }
}
