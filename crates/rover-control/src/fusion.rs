//! 传感器融合策略
//!
//! 纯函数：距离 + 巡线位 → 执行器决策。没有 IO，没有状态。

use rover_protocol::{LineBits, MotorDuty};

/// 巡线与避障参数
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// 障碍物阈值（厘米，严格小于时触发避障）
    pub obstacle_threshold_cm: f32,
    /// 直行占空比
    pub cruise_duty: i32,
    /// 单侧传感器压线时内侧轮的占空比（急转）
    pub sharp_inner_duty: i32,
    /// 侧 + 中传感器压线时内侧轮的占空比（缓转）
    pub gentle_inner_duty: i32,
    /// 丢线时的低速搜索占空比
    pub search_duty: i32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 20.0,
            cruise_duty: 700,
            sharp_inner_duty: 400,
            gentle_inner_duty: 600,
            search_duty: 300,
        }
    }
}

/// 融合决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionDecision {
    /// 直接下发占空比
    Drive(MotorDuty),
    /// 执行避障动作（停车、鸣笛、拍照、后退）
    AvoidObstacle,
}

/// 计算一次决策
///
/// # 参数
///
/// - `distance_cm`: 前方距离，`None` 表示无读数（不触发避障）
/// - `line_bits`: 巡线读数，`None` 表示读取失败（按丢线处理）
///
/// # 巡线规则（按顺序匹配）
///
/// | 条件 | FL, BL | FR, BR |
/// |---|---|---|
/// | 仅中 | cruise | cruise |
/// | 左且非中 | sharp | cruise |
/// | 右且非中 | cruise | sharp |
/// | 左且中 | gentle | cruise |
/// | 右且中 | cruise | gentle |
/// | 其他 | search | search |
pub fn decide(
    distance_cm: Option<f32>,
    line_bits: Option<LineBits>,
    config: &FusionConfig,
) -> FusionDecision {
    if let Some(distance) = distance_cm
        && distance < config.obstacle_threshold_cm
    {
        return FusionDecision::AvoidObstacle;
    }

    let Some(bits) = line_bits else {
        return FusionDecision::Drive(MotorDuty::uniform(config.search_duty));
    };

    let cruise = config.cruise_duty;
    let duty = match (bits.left(), bits.mid(), bits.right()) {
        (false, true, false) => MotorDuty::uniform(cruise),
        (true, false, _) => split(config.sharp_inner_duty, cruise),
        (_, false, true) => split(cruise, config.sharp_inner_duty),
        (true, true, _) => split(config.gentle_inner_duty, cruise),
        (false, true, true) => split(cruise, config.gentle_inner_duty),
        (false, false, false) => MotorDuty::uniform(config.search_duty),
    };
    FusionDecision::Drive(duty)
}

fn split(left: i32, right: i32) -> MotorDuty {
    MotorDuty::new(left, left, right, right)
}
