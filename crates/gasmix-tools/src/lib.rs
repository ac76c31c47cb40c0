//! # Gasmix Tools - 共享数据结构和算法
//!
//! **依赖原则**: 不依赖驱动层与控制层，只有纯数据和纯函数
//!
//! ## 包含模块
//!
//! - `sequence` - 序列输入解析与校验（时间/设定值对、半手动三元组、时间表）
//! - `filter` - 标量卡尔曼滤波
//! - `statistics` - 采样统计
//! - `config` - TOML 配置文件

pub mod config;
pub mod filter;
pub mod sequence;
pub mod statistics;

// 重新导出常用类型
pub use config::{ConfigError, RigConfig};
pub use filter::KalmanFilter;
pub use sequence::{
    Schedule, ScheduleEntry, Sequence, SequenceInput, SequenceStage, TripleStage,
    ValidationError, build_schedule, validate_pairs, validate_triples,
};
pub use statistics::SampleStats;
