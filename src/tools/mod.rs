//! Tool infrastructure: registry, argument validation, access policy and the
//! per-group handlers.

pub mod access;
pub mod definitions;
pub mod handlers;
pub mod registry;
pub mod validate;

pub use access::ToolAccessPolicy;
pub use definitions::{builtin_descriptors, ToolGroup, ToolId};
pub use handlers::HandlerContext;
pub use registry::{ParamDef, ParamType, RiskSemantic, ToolDescriptor, ToolRegistry};
pub use validate::{validate, ValidatedArgs};
