mod arena;
pub mod error;
pub mod ids;
pub mod node;
pub mod search_tree;
pub mod snapshot;
pub mod stats;
