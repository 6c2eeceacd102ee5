//! 基础设施层（Infrastructure）
//!
//! 持有外部协作者的接口契约，只暴露能力：
//! - `SubmissionStore` - 提交存储的窄 CRUD 接口（实现可以是 SQLite、内存等）
//! - `BroadcastChannel` - 实时广播的发布契约（fire-and-forget）
//!
//! 队列本身不关心存储引擎和推送通道的实现，
//! 全部通过这里的 trait 注入

pub mod broadcast;
pub mod store;

pub use broadcast::{BroadcastChannel, EventBus, ScoredEvent};
pub use store::{MemoryStore, SubmissionStore};
