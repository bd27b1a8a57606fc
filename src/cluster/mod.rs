//! C4 (dispatch half) — routing submissions between the local pool and
//! remote HTTP executors, and the wire protocol that talks to them.

/// `ClusterDispatcher` and its routing/streaming operations.
pub mod dispatcher;
/// `RemoteNode`, the routing candidate type.
pub mod node;
/// The HTTP wire protocol spoken to a remote node.
pub mod transport;

pub use dispatcher::{ClusterDispatcher, DispatchHandle, TokenStream};
pub use node::RemoteNode;
pub use transport::SubmitRequest;
