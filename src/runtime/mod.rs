//! Application lifecycle
//!
//! - `lifetime`: 服务组装与优雅关闭
//! - `modes`: HTTP 服务器与命令行入口

pub mod lifetime;
pub mod modes;
