//! # CXR
//!
//! 胸部X光 COVID-19 辅助诊断客户端。本包只聚合各个子 crate，
//! 供演示程序使用；实际功能见 `cxr-core`、`cxr-client` 与 `cxr-workflow`。

pub use cxr_client as client;
pub use cxr_core as core;
pub use cxr_workflow as workflow;
