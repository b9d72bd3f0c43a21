//! Request DSL: the declarative schema clients submit, its parser, and the
//! structural validation pass that runs before graph compilation.

pub mod parser;
pub mod schema;
pub mod validator;

pub use parser::{parse_request, RequestFormat};
pub use schema::{
    AxisSpec, ConnectorSpec, DomainSpec, InputSpec, OperationSpec, RequestSchema,
};
pub use validator::validate_request_schema;
