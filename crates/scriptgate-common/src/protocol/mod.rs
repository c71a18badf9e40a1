pub mod error;
pub mod execute;
pub mod requests;
pub mod responses;


pub use error::{ScriptgateError, Result};
pub use execute::{ExecuteRequest, ExecuteResponse, EXECUTE_METHOD};
pub use requests::{Request, RequestId, MethodName, RpcArgs};
pub use responses::{Response, RpcResult};
