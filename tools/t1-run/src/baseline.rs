//! 基线推理后端.
//!
//! 以确定性的非学习变换占位七个网络, 用于在没有真实模型权重的
//! 环境中打通整条流水线: 裁剪取前景包围盒, 剥离按阈值清背景,
//! parcellation 按强度分箱给出基础编号, 半球按宽度中线划分.
//! 输出只保证满足各阶段契约, 不具备解剖学意义.

use ndarray::{s, Array3};
use t1_berry::prelude::*;

/// 前景强度阈值 (针对预处理后的归一化强度).
const FG_THRESHOLD: f32 = 0.05;

/// parcellation 基础编号个数.
const BASE_BINS: u16 = 8;

/// 计算强度大于阈值的体素包围盒, 返回 (偏移, 形状).
fn foreground_bbox(scan: &T1Scan) -> Option<(Idx3d, Idx3d)> {
    let view = scan.data();
    let mut lo = (usize::MAX, usize::MAX, usize::MAX);
    let mut hi = (0usize, 0usize, 0usize);
    let mut any = false;

    for ((z, h, w), &v) in view.indexed_iter() {
        if v > FG_THRESHOLD {
            any = true;
            lo = (lo.0.min(z), lo.1.min(h), lo.2.min(w));
            hi = (hi.0.max(z), hi.1.max(h), hi.2.max(w));
        }
    }

    any.then(|| {
        (
            lo,
            (hi.0 - lo.0 + 1, hi.1 - lo.1 + 1, hi.2 - lo.2 + 1),
        )
    })
}

/// 取前景包围盒的裁剪网络.
pub struct BaselineCrop;

impl CropNet for BaselineCrop {
    fn forward(&self, scan: &T1Scan, _: Device) -> NetResult<T1Scan> {
        match foreground_bbox(scan) {
            Some(((z, h, w), (sz, sh, sw))) => {
                let sub = scan
                    .data()
                    .slice(s![z..z + sz, h..h + sh, w..w + sw])
                    .to_owned();
                Ok(T1Scan::with_data(scan.header(), sub))
            }
            // 没有任何前景: 交回空体数据, 由编排器按退化结果中止.
            None => Ok(T1Scan::with_data(scan.header(), Array3::zeros((0, 0, 0)))),
        }
    }
}

/// 按阈值清背景的剥离网络. 偏移通过在预处理体数据上重算
/// 前景包围盒得到, 与 [`BaselineCrop`] 的结果一致.
pub struct BaselineStrip;

impl StripNet for BaselineStrip {
    fn forward(
        &self,
        cropped: &T1Scan,
        preprocessed: &T1Scan,
        _: Device,
    ) -> NetResult<(T1Scan, VoxelShift)> {
        let (offset, shape) = foreground_bbox(preprocessed)
            .ok_or_else(|| NetError::new("预处理体数据没有任何前景"))?;
        if shape != cropped.shape() {
            return Err(NetError::new("裁剪体数据与前景包围盒形状不一致"));
        }

        let mut data = cropped.data().to_owned();
        data.mapv_inplace(|v| if v > FG_THRESHOLD { v } else { 0.0 });

        Ok((
            T1Scan::with_data(cropped.header(), data),
            VoxelShift::new(offset, shape),
        ))
    }
}

/// 按强度分箱给出基础编号的 parcellation 网络.
pub struct BaselineParcel;

impl ParcelNet for BaselineParcel {
    fn forward(&self, stripped: &T1Scan, _: Device) -> NetResult<ParcelMap> {
        let data = stripped.data().mapv(|v| {
            if v <= FG_THRESHOLD {
                BACKGROUND
            } else {
                (v.min(1.0) * (BASE_BINS - 1) as f32) as u16 + 1
            }
        });
        Ok(ParcelMap::with_data(stripped.header(), data))
    }
}

/// 按宽度中线划分左右的半球分离网络.
pub struct BaselineHemi;

impl HemiNet for BaselineHemi {
    fn forward(&self, stripped: &T1Scan, _: Device) -> NetResult<ParcelMap> {
        let (_, _, ws) = stripped.shape();
        let view = stripped.data();
        let data = Array3::from_shape_fn(stripped.shape(), |(z, h, w)| {
            if view[(z, h, w)] <= FG_THRESHOLD {
                BACKGROUND
            } else if w < ws / 2 {
                HEMI_LEFT
            } else {
                HEMI_RIGHT
            }
        });
        Ok(ParcelMap::with_data(stripped.header(), data))
    }
}

/// 忽略权重文件内容的加载协作者. 用于在真实模型目录布局下
/// 验证模型包的解析流程.
pub struct BaselineLoader;

impl NetLoader for BaselineLoader {
    fn load_crop(&self, _: &std::path::Path) -> NetResult<Box<dyn CropNet>> {
        Ok(Box::new(BaselineCrop))
    }

    fn load_strip(&self, _: &std::path::Path) -> NetResult<Box<dyn StripNet>> {
        Ok(Box::new(BaselineStrip))
    }

    fn load_parcel(&self, _: &std::path::Path, _: View) -> NetResult<Box<dyn ParcelNet>> {
        Ok(Box::new(BaselineParcel))
    }

    fn load_hemi(&self, _: &std::path::Path, _: View) -> NetResult<Box<dyn HemiNet>> {
        Ok(Box::new(BaselineHemi))
    }
}

/// 直接组装基线模型包, 不要求任何权重文件存在.
pub fn bundle() -> ModelBundle {
    ModelBundle::from_parts(
        Box::new(BaselineCrop),
        Box::new(BaselineStrip),
        Box::new(BaselineParcel),
        Box::new(BaselineParcel),
        Box::new(BaselineParcel),
        Box::new(BaselineHemi),
        Box::new(BaselineHemi),
    )
}
