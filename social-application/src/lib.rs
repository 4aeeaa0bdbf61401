//! 社交实体图应用层（social-application）
//!
//! 在领域层之上处理一次请求：
//! - 请求上下文（`context`）：访问者、参数、过滤链、Cookie 与业务语境；
//! - 输入层（`input`）与表单暂存（`sticky_form`、`client_state`）；
//! - 实时搜索（`livesearch`）及其端点；
//! - 命令/查询总线与群组成员关系、删除的命令处理器（`handlers`）。
//!
pub mod client_state;
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod config;
pub mod context;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod inmemory_command_bus;
pub mod inmemory_query_bus;
pub mod input;
pub mod livesearch;
pub mod query;
pub mod query_bus;
pub mod query_handler;
pub mod sticky_form;

pub use inmemory_command_bus::InMemoryCommandBus;
pub use inmemory_query_bus::InMemoryQueryBus;
