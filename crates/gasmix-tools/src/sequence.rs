//! # 序列输入校验
//!
//! 输入语法：逗号分隔的十进制数，token 两侧空白会被忽略。
//!
//! - 自动模式：`(时间 s, 设定值 ppm)` 成对出现
//! - 半手动模式：`(时间 min, 通道1 sccm, 通道2 sccm)` 三个一组
//!
//! 内联文本与文件走同一套语法和校验；校验失败不会丢弃或修正任何阶段。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 设定值上限（ppm）
pub const MAX_SETPOINT_PPM: f64 = 20_000.0;

/// 单路流量上限（sccm）
pub const MAX_CHANNEL_FLOW_SCCM: f64 = 500.0;

/// 输入校验错误
///
/// 阶段 / 组编号均从 1 开始。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Sequence input is empty")]
    Empty,

    #[error("Value #{position} ('{token}') is not a valid number")]
    InvalidNumber { position: usize, token: String },

    #[error("Expected (time, setpoint) pairs, got an odd number of values ({count})")]
    OddCount { count: usize },

    #[error("Expected (minutes, channel1, channel2) triples, got {count} values")]
    NotTriples { count: usize },

    #[error("Stage {stage}: time must be greater than 0 (got {value})")]
    NonPositiveTime { stage: usize, value: f64 },

    #[error("Stage {stage}: setpoint {value} is outside [0, 20000] ppm")]
    SetpointOutOfRange { stage: usize, value: f64 },

    #[error("Set {set}: flow {value} is outside [0, 500] sccm")]
    FlowOutOfRange { set: usize, value: f64 },

    #[error("Set {set}: duration must not be negative (got {value} min)")]
    NegativeDuration { set: usize, value: f64 },

    /// 单段或累计时长超出 `Duration` 可表示范围（秒）
    #[error("Stage {stage}: time {value} s is too long")]
    DurationTooLong { stage: usize, value: f64 },

    #[error("Failed to read sequence file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Sequence file {path} is empty")]
    EmptyFile { path: PathBuf },
}

/// 自动模式的单个阶段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStage {
    pub duration_seconds: f64,
    pub setpoint: f64,
}

impl SequenceStage {
    /// 阶段时长（未校验的阶段饱和到 `[0, Duration::MAX]`）
    pub fn duration(&self) -> Duration {
        seconds_saturating(self.duration_seconds)
    }
}

/// 已校验的非空阶段列表（插入顺序即执行顺序）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    stages: Vec<SequenceStage>,
}

impl Sequence {
    /// 从阶段列表构造并校验
    pub fn new(stages: Vec<SequenceStage>) -> Result<Self, ValidationError> {
        if stages.is_empty() {
            return Err(ValidationError::Empty);
        }
        let mut total = Duration::ZERO;
        for (i, stage) in stages.iter().enumerate() {
            let duration = check_stage(i + 1, stage.duration_seconds, stage.setpoint)?;
            total = total
                .checked_add(duration)
                .ok_or(ValidationError::DurationTooLong {
                    stage: i + 1,
                    value: stage.duration_seconds,
                })?;
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[SequenceStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// 恒为 false（空序列无法通过校验）
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceStage> {
        self.stages.iter()
    }

    /// 所有阶段时长之和（倒计时用）
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration()))
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a SequenceStage;
    type IntoIter = std::slice::Iter<'a, SequenceStage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

/// 半手动模式的一组设置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripleStage {
    pub duration_minutes: f64,
    pub channel1_flow: f64,
    pub channel2_flow: f64,
}

/// 时间表条目（绝对起始偏移）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    pub start_offset: Duration,
    pub duration: Duration,
    pub channel1_flow: f64,
    pub channel2_flow: f64,
}

/// 半手动时间表
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.entries
            .last()
            .map(|e| e.start_offset + e.duration)
            .unwrap_or(Duration::ZERO)
    }
}

/// 解析逗号分隔的十进制数
fn parse_tokens(input: &str) -> Result<Vec<f64>, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::Empty);
    }

    input
        .split(',')
        .enumerate()
        .map(|(i, raw)| {
            let token = raw.trim();
            match token.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(ValidationError::InvalidNumber {
                    position: i + 1,
                    token: token.to_string(),
                }),
            }
        })
        .collect()
}

fn seconds_saturating(seconds: f64) -> Duration {
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

fn check_stage(stage: usize, time: f64, setpoint: f64) -> Result<Duration, ValidationError> {
    if !(time > 0.0) {
        return Err(ValidationError::NonPositiveTime { stage, value: time });
    }
    if !(0.0..=MAX_SETPOINT_PPM).contains(&setpoint) {
        return Err(ValidationError::SetpointOutOfRange {
            stage,
            value: setpoint,
        });
    }
    Duration::try_from_secs_f64(time)
        .map_err(|_| ValidationError::DurationTooLong { stage, value: time })
}

fn check_flow(set: usize, flow: f64) -> Result<(), ValidationError> {
    if (0.0..=MAX_CHANNEL_FLOW_SCCM).contains(&flow) {
        Ok(())
    } else {
        Err(ValidationError::FlowOutOfRange { set, value: flow })
    }
}

/// 校验 `(时间, 设定值)` 对
///
/// # 示例
///
/// ```rust
/// use gasmix_tools::validate_pairs;
///
/// let seq = validate_pairs("10,5000,5,3000").unwrap();
/// assert_eq!(seq.len(), 2);
/// assert_eq!(seq.stages()[1].setpoint, 3000.0);
///
/// assert!(validate_pairs("10,25000").is_err());
/// assert!(validate_pairs("10,5000,5").is_err());
/// ```
pub fn validate_pairs(input: &str) -> Result<Sequence, ValidationError> {
    let values = parse_tokens(input)?;
    if values.len() % 2 != 0 {
        return Err(ValidationError::OddCount {
            count: values.len(),
        });
    }

    let stages = values
        .chunks_exact(2)
        .map(|pair| SequenceStage {
            duration_seconds: pair[0],
            setpoint: pair[1],
        })
        .collect();
    Sequence::new(stages)
}

/// 校验 `(分钟, 通道1, 通道2)` 三元组
///
/// 只检查流量上下限；时长的正负留给 [`build_schedule`]。
pub fn validate_triples(input: &str) -> Result<Vec<TripleStage>, ValidationError> {
    let values = parse_tokens(input)?;
    if values.len() % 3 != 0 {
        return Err(ValidationError::NotTriples {
            count: values.len(),
        });
    }

    values
        .chunks_exact(3)
        .enumerate()
        .map(|(i, triple)| {
            let set = i + 1;
            check_flow(set, triple[1])?;
            check_flow(set, triple[2])?;
            Ok(TripleStage {
                duration_minutes: triple[0],
                channel1_flow: triple[1],
                channel2_flow: triple[2],
            })
        })
        .collect()
}

/// 三元组 → 绝对起始偏移时间表
///
/// 第 i 组的起点是前面所有组时长之和；负时长被拒绝，零时长允许。
pub fn build_schedule(triples: &[TripleStage]) -> Result<Schedule, ValidationError> {
    if triples.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut offset = Duration::ZERO;
    let mut entries = Vec::with_capacity(triples.len());
    for (i, triple) in triples.iter().enumerate() {
        let minutes = triple.duration_minutes;
        if !(minutes >= 0.0) || !minutes.is_finite() {
            return Err(ValidationError::NegativeDuration {
                set: i + 1,
                value: minutes,
            });
        }
        let too_long = ValidationError::DurationTooLong {
            stage: i + 1,
            value: minutes * 60.0,
        };
        let duration =
            Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| too_long.clone())?;
        entries.push(ScheduleEntry {
            start_offset: offset,
            duration,
            channel1_flow: triple.channel1_flow,
            channel2_flow: triple.channel2_flow,
        });
        offset = offset.checked_add(duration).ok_or(too_long)?;
    }
    Ok(Schedule { entries })
}

/// 序列输入来源
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceInput {
    /// 直接输入的文本
    Inline(String),
    /// 文本文件（内容两侧空白会被去掉）
    File(PathBuf),
}

impl SequenceInput {
    /// 读取原始文本
    pub fn read_text(&self) -> Result<String, ValidationError> {
        match self {
            SequenceInput::Inline(text) => Ok(text.clone()),
            SequenceInput::File(path) => {
                let content = fs::read_to_string(path).map_err(|e| ValidationError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyFile { path: path.clone() });
                }
                Ok(trimmed.to_string())
            },
        }
    }

    pub fn pairs(&self) -> Result<Sequence, ValidationError> {
        validate_pairs(&self.read_text()?)
    }

    pub fn triples(&self) -> Result<Vec<TripleStage>, ValidationError> {
        validate_triples(&self.read_text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn test_pairs_valid() {
        let seq = validate_pairs("10,5000,5,3000").unwrap();
        assert_eq!(
            seq.stages(),
            &[
                SequenceStage {
                    duration_seconds: 10.0,
                    setpoint: 5000.0
                },
                SequenceStage {
                    duration_seconds: 5.0,
                    setpoint: 3000.0
                },
            ]
        );
        assert_eq!(seq.total_duration(), Duration::from_secs(15));
    }

    #[test]
    fn test_pairs_whitespace_tolerated() {
        let seq = validate_pairs("  10 , 5000,\t5,3000\n").unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_pairs_setpoint_too_high() {
        assert_eq!(
            validate_pairs("10,25000"),
            Err(ValidationError::SetpointOutOfRange {
                stage: 1,
                value: 25000.0
            })
        );
    }

    #[test]
    fn test_pairs_odd_count() {
        assert_eq!(
            validate_pairs("10,5000,5"),
            Err(ValidationError::OddCount { count: 3 })
        );
    }

    #[test]
    fn test_pairs_rules() {
        assert_eq!(validate_pairs(""), Err(ValidationError::Empty));
        assert_eq!(validate_pairs("   "), Err(ValidationError::Empty));
        assert!(matches!(
            validate_pairs("0,100"),
            Err(ValidationError::NonPositiveTime { stage: 1, .. })
        ));
        assert!(matches!(
            validate_pairs("5,100,-1,100"),
            Err(ValidationError::NonPositiveTime { stage: 2, .. })
        ));
        assert!(matches!(
            validate_pairs("5,-1"),
            Err(ValidationError::SetpointOutOfRange { .. })
        ));
        // 边界值
        assert!(validate_pairs("5,0,5,20000").is_ok());
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(
            validate_pairs("10,abc"),
            Err(ValidationError::InvalidNumber {
                position: 2,
                token: "abc".into()
            })
        );
        assert!(matches!(
            validate_pairs("10,,5,3"),
            Err(ValidationError::InvalidNumber { position: 2, .. })
        ));
        assert!(matches!(
            validate_pairs("NaN,100"),
            Err(ValidationError::InvalidNumber { position: 1, .. })
        ));
        assert!(matches!(
            validate_pairs("inf,100"),
            Err(ValidationError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_triples_flow_limit_names_set() {
        assert_eq!(
            validate_triples("1,100,100,2,600,100"),
            Err(ValidationError::FlowOutOfRange {
                set: 2,
                value: 600.0
            })
        );
        let err = validate_triples("1,100,100,2,600,100").unwrap_err();
        assert!(err.to_string().contains("Set 2"));
    }

    #[test]
    fn test_triples_count_and_time_not_checked() {
        assert_eq!(
            validate_triples("1,2,3,4"),
            Err(ValidationError::NotTriples { count: 4 })
        );
        // 时长正负不在这里检查
        let triples = validate_triples("-1,100,100,0,0,500").unwrap();
        assert_eq!(triples.len(), 2);
    }

    #[test]
    fn test_build_schedule_offsets() {
        let triples = validate_triples("1,100,0,0.5,0,100,2,50,50").unwrap();
        let schedule = build_schedule(&triples).unwrap();
        let offsets: Vec<_> = schedule.entries().iter().map(|e| e.start_offset).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(60),
                Duration::from_secs(90)
            ]
        );
        assert_eq!(schedule.total_duration(), Duration::from_secs(210));
        assert_eq!(schedule.entries()[2].channel2_flow, 50.0);
    }

    #[test]
    fn test_build_schedule_rejects_negative_allows_zero() {
        let triples = validate_triples("1,100,0,-2,0,100").unwrap();
        assert_eq!(
            build_schedule(&triples),
            Err(ValidationError::NegativeDuration {
                set: 2,
                value: -2.0
            })
        );

        let triples = validate_triples("0,100,0,1,0,100").unwrap();
        let schedule = build_schedule(&triples).unwrap();
        assert_eq!(schedule.entries()[1].start_offset, Duration::ZERO);
    }

    #[test]
    fn test_huge_times_rejected_without_panic() {
        assert_eq!(
            validate_pairs("1e20,100"),
            Err(ValidationError::DurationTooLong {
                stage: 1,
                value: 1e20
            })
        );
        // 单段可表示，累计溢出
        assert!(matches!(
            validate_pairs("1.5e19,100,1.5e19,100"),
            Err(ValidationError::DurationTooLong { stage: 2, .. })
        ));

        let triples = validate_triples("1e18,100,0").unwrap();
        assert!(matches!(
            build_schedule(&triples),
            Err(ValidationError::DurationTooLong { stage: 1, .. })
        ));
        let triples = validate_triples("1,100,0,2.5e17,0,100,2.5e17,0,100").unwrap();
        assert!(matches!(
            build_schedule(&triples),
            Err(ValidationError::DurationTooLong { stage: 3, .. })
        ));

        let unchecked = SequenceStage {
            duration_seconds: 1e20,
            setpoint: 100.0,
        };
        assert_eq!(unchecked.duration(), Duration::MAX);
    }

    #[test]
    fn test_file_input_same_grammar() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\n  10,5000,5,3000  \n").unwrap();
        let input = SequenceInput::File(file.path().to_path_buf());
        assert_eq!(input.pairs().unwrap(), validate_pairs("10,5000,5,3000").unwrap());
    }

    #[test]
    fn test_file_input_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let input = SequenceInput::File(file.path().to_path_buf());
        assert!(matches!(input.pairs(), Err(ValidationError::EmptyFile { .. })));

        let missing = SequenceInput::File(PathBuf::from("/definitely/not/here.txt"));
        assert!(matches!(missing.triples(), Err(ValidationError::Io { .. })));
    }

    #[test]
    fn test_stage_serializes() {
        let stage = SequenceStage {
            duration_seconds: 10.0,
            setpoint: 5000.0,
        };
        let json = serde_json::to_string(&stage).unwrap();
        assert_eq!(json, r#"{"duration_seconds":10.0,"setpoint":5000.0}"#);
    }

    proptest! {
        #[test]
        fn prop_valid_pairs_preserve_order_and_count(
            stages in prop::collection::vec((0.1f64..1000.0, 0.0f64..=20_000.0), 1..20)
        ) {
            let text = stages
                .iter()
                .map(|(t, s)| format!("{},{}", t, s))
                .collect::<Vec<_>>()
                .join(",");
            let seq = validate_pairs(&text).unwrap();
            prop_assert_eq!(seq.len(), stages.len());
            for (stage, (t, s)) in seq.iter().zip(stages.iter()) {
                prop_assert_eq!(stage.duration_seconds, *t);
                prop_assert_eq!(stage.setpoint, *s);
            }
        }

        #[test]
        fn prop_any_flow_over_limit_rejected(idx in 0usize..5, excess in 0.001f64..1000.0) {
            let mut values: Vec<String> = (0..5)
                .flat_map(|_| ["1", "100", "100"])
                .map(String::from)
                .collect();
            values[idx * 3 + 1] = format!("{}", 500.0 + excess);
            let err = validate_triples(&values.join(",")).unwrap_err();
            let is_expected_set =
                matches!(err, ValidationError::FlowOutOfRange { set, .. } if set == idx + 1);
            prop_assert!(is_expected_set);
        }
    }
}
