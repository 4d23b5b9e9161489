//! 后处理: 合并 parcellation 与半球分离结果, 并对齐回预处理坐标系.
//!
//! 双侧结构在 parcellation 结果中共用一个基础编号, 本阶段按半球归属
//! 拆分成最终标签: 左半球取 `2*base - 1`, 右半球取 `2*base`.
//! 半球网络未给出归属的体素被清除. 合并结果按 [`VoxelShift`]
//! 给出的偏移粘贴进预处理形状的全背景体数据中.

use itertools::izip;

use crate::consts::label;
use crate::{Idx3d, NiftiHeaderAttr, ParcelMap, T1Scan, VoxelShift};

/// 合并/对齐错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// parcellation 与半球分离结果形状不一致,
    /// 即二者并非消费同一份剥离体数据.
    ShapeMismatch {
        /// parcellation 结果形状.
        parcel: Idx3d,
        /// 半球分离结果形状.
        hemi: Idx3d,
    },

    /// 偏移与合并输入不对应, 或粘贴范围越出预处理坐标系.
    ShiftMismatch {
        /// 偏移.
        offset: Idx3d,
        /// 偏移记录的剥离体数据形状.
        expected: Idx3d,
        /// 预处理坐标系形状.
        frame: Idx3d,
    },

    /// 基础编号过大, 配对后会溢出 `u16`.
    PairOverflow(u16),

    /// 半球分离结果含有契约之外的体素值.
    BadHemiValue(u16),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::ShapeMismatch { parcel, hemi } => write!(
                f,
                "parcellation 形状 {parcel:?} 与半球分离形状 {hemi:?} 不一致"
            ),
            MergeError::ShiftMismatch {
                offset,
                expected,
                frame,
            } => write!(
                f,
                "偏移 {offset:?} (期望形状 {expected:?}) 与预处理坐标系 {frame:?} 不对应"
            ),
            MergeError::PairOverflow(base) => {
                write!(f, "基础编号 {base} 配对后溢出 u16")
            }
            MergeError::BadHemiValue(v) => {
                write!(f, "半球分离结果含有非法体素值 {v}")
            }
        }
    }
}

impl std::error::Error for MergeError {}

/// 合并 parcellation 与半球分离结果, 对齐回 `frame` 的坐标系.
///
/// `shift` 必须是颅骨剥离阶段为 **本次** 剥离结果产出的偏移;
/// 形状校验会拒绝来自其它运行的偏移.
pub fn merge_aligned(
    parcel: &ParcelMap,
    hemi: &ParcelMap,
    shift: VoxelShift,
    frame: &T1Scan,
) -> Result<ParcelMap, MergeError> {
    if parcel.shape() != hemi.shape() {
        return Err(MergeError::ShapeMismatch {
            parcel: parcel.shape(),
            hemi: hemi.shape(),
        });
    }
    if !shift.fits(parcel.shape(), frame.shape()) {
        return Err(MergeError::ShiftMismatch {
            offset: shift.offset(),
            expected: shift.shape(),
            frame: frame.shape(),
        });
    }

    let mut out = ParcelMap::zeros(frame.header(), frame.shape());
    let (oz, oh, ow) = shift.offset();

    let parcel_view = parcel.data();
    let hemi_view = hemi.data();
    for ((pos, &base), &side) in izip!(parcel_view.indexed_iter(), hemi_view.iter()) {
        if label::is_background(base) {
            continue;
        }
        if base > label::MAX_PAIR_BASE {
            return Err(MergeError::PairOverflow(base));
        }

        let paired = match side {
            label::BACKGROUND => continue,
            label::HEMI_LEFT => label::paired_left(base),
            label::HEMI_RIGHT => label::paired_right(base),
            bad => return Err(MergeError::BadHemiValue(bad)),
        };

        let (z, h, w) = pos;
        out[(oz + z, oh + h, ow + w)] = paired;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{merge_aligned, MergeError};
    use crate::consts::label;
    use crate::{NiftiHeaderAttr, ParcelMap, T1Scan, VoxelShift};
    use ndarray::Array3;

    fn frame(shape: (usize, usize, usize)) -> T1Scan {
        T1Scan::fake(Array3::zeros(shape), [1.0, 1.0, 1.0])
    }

    /// 基础配对与偏移粘贴.
    #[test]
    fn test_merge_basic() {
        let mut parcel = Array3::<u16>::zeros((2, 2, 2));
        let mut hemi = Array3::<u16>::zeros((2, 2, 2));
        // 基础编号 5, 左半球 -> 9; 基础编号 5, 右半球 -> 10.
        parcel[(0, 0, 0)] = 5;
        hemi[(0, 0, 0)] = label::HEMI_LEFT;
        parcel[(0, 0, 1)] = 5;
        hemi[(0, 0, 1)] = label::HEMI_RIGHT;
        // 半球未标注的体素被清除.
        parcel[(1, 1, 1)] = 3;

        let parcel = ParcelMap::fake(parcel, [1.0, 1.0, 1.0]);
        let hemi = ParcelMap::fake(hemi, [1.0, 1.0, 1.0]);
        let shift = VoxelShift::new((1, 2, 3), (2, 2, 2));
        let frame = frame((4, 5, 6));

        let out = merge_aligned(&parcel, &hemi, shift, &frame).unwrap();
        assert_eq!(out.shape(), (4, 5, 6));
        assert_eq!(out[(1, 2, 3)], 9);
        assert_eq!(out[(1, 2, 4)], 10);
        // 其余位置全是背景.
        let nonzero = out.data().iter().filter(|&&v| v != 0).count();
        assert_eq!(nonzero, 2);
    }

    /// 两个输入必须来自同一份剥离体数据.
    #[test]
    fn test_merge_shape_mismatch() {
        let parcel = ParcelMap::fake(Array3::zeros((2, 2, 2)), [1.0, 1.0, 1.0]);
        let hemi = ParcelMap::fake(Array3::zeros((2, 2, 3)), [1.0, 1.0, 1.0]);
        let shift = VoxelShift::new((0, 0, 0), (2, 2, 2));

        let err = merge_aligned(&parcel, &hemi, shift, &frame((4, 4, 4))).unwrap_err();
        assert!(matches!(err, MergeError::ShapeMismatch { .. }));
    }

    /// 来自其它运行 (形状不符) 或越界的偏移被拒绝.
    #[test]
    fn test_merge_shift_mismatch() {
        let parcel = ParcelMap::fake(Array3::zeros((2, 2, 2)), [1.0, 1.0, 1.0]);
        let hemi = parcel.clone();

        let foreign = VoxelShift::new((0, 0, 0), (3, 3, 3));
        let err = merge_aligned(&parcel, &hemi, foreign, &frame((4, 4, 4))).unwrap_err();
        assert!(matches!(err, MergeError::ShiftMismatch { .. }));

        let out_of_frame = VoxelShift::new((3, 3, 3), (2, 2, 2));
        let err = merge_aligned(&parcel, &hemi, out_of_frame, &frame((4, 4, 4))).unwrap_err();
        assert!(matches!(err, MergeError::ShiftMismatch { .. }));
    }

    /// 非法半球值与配对溢出.
    #[test]
    fn test_merge_bad_values() {
        let mut p = Array3::<u16>::zeros((1, 1, 2));
        let mut h = Array3::<u16>::zeros((1, 1, 2));
        p[(0, 0, 0)] = 1;
        h[(0, 0, 0)] = 9; // 契约之外.
        let parcel = ParcelMap::fake(p, [1.0, 1.0, 1.0]);
        let hemi = ParcelMap::fake(h, [1.0, 1.0, 1.0]);
        let shift = VoxelShift::new((0, 0, 0), (1, 1, 2));
        let err = merge_aligned(&parcel, &hemi, shift, &frame((1, 1, 2))).unwrap_err();
        assert_eq!(err, MergeError::BadHemiValue(9));

        let mut p = Array3::<u16>::zeros((1, 1, 1));
        let mut h = Array3::<u16>::zeros((1, 1, 1));
        p[(0, 0, 0)] = label::MAX_PAIR_BASE + 1;
        h[(0, 0, 0)] = label::HEMI_LEFT;
        let parcel = ParcelMap::fake(p, [1.0, 1.0, 1.0]);
        let hemi = ParcelMap::fake(h, [1.0, 1.0, 1.0]);
        let shift = VoxelShift::new((0, 0, 0), (1, 1, 1));
        let err = merge_aligned(&parcel, &hemi, shift, &frame((1, 1, 1))).unwrap_err();
        assert_eq!(err, MergeError::PairOverflow(label::MAX_PAIR_BASE + 1));
    }
}
