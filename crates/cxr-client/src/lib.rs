//! # CXR客户端模块
//!
//! 提供与诊断服务端通信的基础设施，包括：
//! - 凭证持久化与会话守卫
//! - HTTP传输层抽象（reqwest 实现）
//! - 请求编排器：加载状态、响应分类、错误文案
//! - REST 接口目录

pub mod credentials;
pub mod endpoints;
pub mod orchestrator;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, CREDENTIAL_KEY};
pub use orchestrator::{Fallbacks, LoadState, RequestOrchestrator, Settlement};
pub use session::{Route, SessionContext};
pub use transport::{
    ApiRequest, ApiResponse, FilePart, HttpMethod, HttpTransport, MultipartForm, RequestBody,
    ReqwestTransport,
};
