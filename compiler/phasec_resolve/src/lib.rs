mod checker;
mod collector;
mod keepers;
pub mod phases;
mod registry;
mod resolver;
mod scope;
mod session;
mod symbols;

pub use collector::{ContextCollector, RecordingCollector};
pub use registry::{LazyResolverRegistry, LazyResolverRegistryBuilder};
pub use resolver::{LazyResolver, ResolveCx};
pub use scope::{Lookup, Namespace, ScopeSnapshot, ScopeTower};
pub use session::{ResolveSession, ResolveTarget, SessionConfig};
pub use symbols::SymbolProvider;
