pub mod builder;
pub mod fields;
pub mod node;
pub mod phase;
pub mod pretty;
pub mod tree;
pub mod visit;

pub use builder::TreeBuilder;
pub use phase::ResolvePhase;
pub use tree::{Node, Tree};

index_vec::define_index_type! {
    pub struct NodeId = u32;
}
