//! Methods: the single envelope for queries and actions.
//!
//! - `types`: the method value and its invariants
//! - `codec`: bincode wire format and numbered frames
//! - `registry`: handlers selected by type tag
//! - `reply`: signed replies correlated by frame number

pub mod codec;
pub mod registry;
pub mod reply;
pub mod types;

pub use codec::{decode, decode_envelope, decode_reply, encode, encode_reply, Frame, WIRE_VERSION};
pub use registry::{Execution, ExecutionContext, MethodHandler, MethodRegistry};
pub use reply::{RemoteError, RemoteErrorKind, Reply, ReplyOutcome};
pub use types::{
    create_method, ActionId, Method, MethodKind, MethodScope, MethodSignature, MethodType,
};
