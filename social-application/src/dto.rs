use serde::Serialize;

/// 数据传输对象（DTO）
///
/// 查询的输出载体，序列化友好，与领域模型解耦。
pub trait Dto: Serialize + Send + Sync + 'static {}
