//! 预处理: 把原始扫描标准化为后续阶段的统一输入.
//!
//! 轴序在加载时已统一为 \[z, H, W\] (见 `data` 模块), 本阶段负责强度:
//! 非有限值清零, 然后线性归一化到 \[0, 1\]. 产出体数据的 header
//! 是后续实际体积计算的权威分辨率来源.

use crate::pipeline::error::{Stage, StageError};
use crate::T1Scan;

/// 标准化原始扫描. 产出新的实例, 不改动输入元信息.
///
/// 全部体素强度相同 (包括清零后全 0) 的扫描无法归一化,
/// 视为退化结果.
pub(crate) fn standardize(scan: T1Scan) -> Result<T1Scan, StageError> {
    let (header, mut data) = scan.into_parts();

    data.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });

    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in data.iter() {
        lo = lo.min(v);
        hi = hi.max(v);
    }

    if !(hi > lo) {
        return Err(StageError::degenerate(
            Stage::Preprocess,
            format!("扫描强度恒为 {lo}, 无法归一化"),
        ));
    }

    let span = hi - lo;
    data.mapv_inplace(|v| (v - lo) / span);

    Ok(T1Scan::with_data(&header, data))
}
