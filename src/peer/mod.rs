pub mod client;
pub mod node;
pub mod registry;
pub mod server;

pub use node::PeerNode;
pub use registry::PeerRegistry;
