mod declaration;
mod keeper;

pub use declaration::{DeclarationKeeper, DeclarationScope, KeeperGuard};
pub use keeper::{Field, PreservedState, Projection, StateKeeper, StateKeeperScope};
