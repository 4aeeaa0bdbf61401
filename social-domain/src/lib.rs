//! 社交实体图领域层（social-domain）
//!
//! 提供社交站点通用的实体/关系数据模型：
//! - 实体（`entity`）与值对象（`value_object`）：GUID、类型、访问级别、多值元数据
//! - 访问控制（`access`）：读取权限的纯函数判定
//! - 持久化（`persist`）：属性存储、关系图、读穿透缓存与内存/Postgres 实现
//! - 群组外观（`group`）与旧式好友接口适配（`compat`）、好友关系（`friendship`）
//! - 领域事件（`domain_event`）与进程内事件系统（`eventing`）
//! - 实时搜索的匹配规则与检索协议（`search`）
//!
//! 本 crate 仅依赖 trait 对象组织协作者，存储后端可替换；
//! 请求级状态（访问者、输入参数）由上层显式传入，不使用全局变量。
//!
//! 典型用法：
//! 1. 用 `DomainServices` 装配存储、关系图与事件总线；
//! 2. 通过 `Group::create/load` 得到群组外观并调用 `Joinable` 能力；
//! 3. 在事件总线上订阅 `join:group`、`leave:group` 等事件。
//!
pub mod access;
pub mod compat;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod friendship;
pub mod group;
pub mod persist;
pub mod search;
pub mod services;
pub mod value_object;
