//! 推理阶段契约.
//!
//! 五类网络 (裁剪 / 颅骨剥离 / parcellation / 半球分离) 的内部实现是外部
//! 协作者, 本 crate 只规定它们的输入输出契约. 七个网络实例由
//! [`ModelBundle`] 持有, 通过 [`NetLoader`] 协作者从模型目录解析得到.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::bundle;
use crate::{ParcelMap, T1Scan, VoxelShift};

/// 本次运行的计算设备. 运行开始时解析一次, 之后作为只读上下文在
/// 各阶段之间共享, 任何阶段都不得中途改写.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Device {
    /// 加速器 (GPU 等).
    Accelerator,

    /// 通用处理器.
    Cpu,
}

impl Device {
    /// 探测最优可用设备. 加速器可用时选加速器, 否则回退到通用处理器.
    /// 选择是一种回退, 永远不会出错.
    pub fn detect() -> Device {
        match std::env::var("CUDA_VISIBLE_DEVICES") {
            Ok(v) if !v.trim().is_empty() => Device::Accelerator,
            _ => Device::Cpu,
        }
    }

    /// 是否为加速器.
    #[inline]
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Accelerator => write!(f, "accelerator"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// 网络推理的运行时错误, 由外部实现报告.
#[derive(Debug, Clone)]
pub struct NetError {
    msg: String,
}

impl NetError {
    /// 以给定描述创建错误.
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for NetError {}

/// 网络推理结果.
pub type NetResult<T> = Result<T, NetError>;

/// parcellation / 半球分离网络的视角.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum View {
    /// 冠状位.
    Coronal,

    /// 矢状位.
    Sagittal,

    /// 轴位.
    Axial,
}

impl View {
    /// 视角名.
    pub fn name(&self) -> &'static str {
        match self {
            View::Coronal => "coronal",
            View::Sagittal => "sagittal",
            View::Axial => "axial",
        }
    }
}

/// 裁剪网络: 从预处理后的全脑扫描中提取更紧致的包围体.
///
/// 输入只在本次调用期间有效, 实现不得在调用之外保留其引用;
/// 输出必须是新的实例.
pub trait CropNet {
    /// 前向推理.
    fn forward(&self, scan: &T1Scan, device: Device) -> NetResult<T1Scan>;
}

/// 颅骨剥离网络: 从裁剪体和预处理体中剥出脑组织,
/// 并给出剥离结果相对预处理坐标系的体素偏移.
///
/// 返回的偏移必须恰好描述返回的那份剥离体数据.
pub trait StripNet {
    /// 前向推理.
    fn forward(
        &self,
        cropped: &T1Scan,
        preprocessed: &T1Scan,
        device: Device,
    ) -> NetResult<(T1Scan, VoxelShift)>;
}

/// 单视角 parcellation 网络: 为剥离体的每个体素给出解剖区域的
/// **基础编号** (双侧结构共用一个编号, 左右在后处理阶段拆分).
pub trait ParcelNet {
    /// 前向推理. 输出形状必须与输入一致.
    fn forward(&self, stripped: &T1Scan, device: Device) -> NetResult<ParcelMap>;
}

/// 单视角半球分离网络: 为剥离体的每个体素标记左/右半球归属.
/// 输出体素值限于 `consts::label::{BACKGROUND, HEMI_LEFT, HEMI_RIGHT}`.
pub trait HemiNet {
    /// 前向推理. 输出形状必须与输入一致.
    fn forward(&self, stripped: &T1Scan, device: Device) -> NetResult<ParcelMap>;
}

/// 一次运行所需的全部七个网络.
pub struct ModelBundle {
    /// 裁剪网络.
    pub cnet: Box<dyn CropNet>,

    /// 颅骨剥离网络.
    pub ssnet: Box<dyn StripNet>,

    /// 三个视角的 parcellation 网络.
    pub pnet_coronal: Box<dyn ParcelNet>,
    /// 同上.
    pub pnet_sagittal: Box<dyn ParcelNet>,
    /// 同上.
    pub pnet_axial: Box<dyn ParcelNet>,

    /// 两个视角的半球分离网络.
    pub hnet_coronal: Box<dyn HemiNet>,
    /// 同上.
    pub hnet_axial: Box<dyn HemiNet>,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelBundle { .. }")
    }
}

/// 模型包解析错误. 属于输入错误, 在任何推理阶段运行之前快速失败.
#[derive(Debug)]
pub enum BundleError {
    /// 模型目录不存在或不是目录.
    MissingDir(PathBuf),

    /// 缺少指定的权重文件.
    MissingModel(&'static str),

    /// 权重文件存在, 但加载失败.
    Load {
        /// 出错的权重文件名.
        model: &'static str,
        /// 外部加载器报告的错误.
        source: NetError,
    },
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::MissingDir(p) => {
                write!(f, "模型目录 `{}` 不存在", p.display())
            }
            BundleError::MissingModel(m) => write!(f, "模型包缺少权重文件 `{m}`"),
            BundleError::Load { model, source } => {
                write!(f, "权重文件 `{model}` 加载失败: {source}")
            }
        }
    }
}

impl std::error::Error for BundleError {}

/// 模型加载协作者. 由外部推理后端实现, 从权重文件构造网络实例.
pub trait NetLoader {
    /// 加载裁剪网络.
    fn load_crop(&self, path: &Path) -> NetResult<Box<dyn CropNet>>;

    /// 加载颅骨剥离网络.
    fn load_strip(&self, path: &Path) -> NetResult<Box<dyn StripNet>>;

    /// 加载指定视角的 parcellation 网络.
    fn load_parcel(&self, path: &Path, view: View) -> NetResult<Box<dyn ParcelNet>>;

    /// 加载指定视角的半球分离网络.
    fn load_hemi(&self, path: &Path, view: View) -> NetResult<Box<dyn HemiNet>>;
}

impl ModelBundle {
    /// 直接由七个网络实例组装模型包. 测试或内置后端使用.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        cnet: Box<dyn CropNet>,
        ssnet: Box<dyn StripNet>,
        pnet_coronal: Box<dyn ParcelNet>,
        pnet_sagittal: Box<dyn ParcelNet>,
        pnet_axial: Box<dyn ParcelNet>,
        hnet_coronal: Box<dyn HemiNet>,
        hnet_axial: Box<dyn HemiNet>,
    ) -> Self {
        Self {
            cnet,
            ssnet,
            pnet_coronal,
            pnet_sagittal,
            pnet_axial,
            hnet_coronal,
            hnet_axial,
        }
    }

    /// 从模型目录解析全部七个网络.
    ///
    /// 先校验 [`bundle::ALL`] 列出的权重文件齐全, 再交由 `loader` 逐个
    /// 加载. 任何缺失或加载失败都会在流水线开始之前返回错误.
    pub fn resolve(dir: &Path, loader: &dyn NetLoader) -> Result<Self, BundleError> {
        if !dir.is_dir() {
            return Err(BundleError::MissingDir(dir.to_owned()));
        }
        for name in bundle::ALL {
            if !dir.join(name).is_file() {
                return Err(BundleError::MissingModel(name));
            }
        }

        let load = |model: &'static str| dir.join(model);
        let wrap = |model: &'static str| {
            move |source: NetError| BundleError::Load { model, source }
        };

        Ok(Self {
            cnet: loader
                .load_crop(&load(bundle::CNET))
                .map_err(wrap(bundle::CNET))?,
            ssnet: loader
                .load_strip(&load(bundle::SSNET))
                .map_err(wrap(bundle::SSNET))?,
            pnet_coronal: loader
                .load_parcel(&load(bundle::PNET_CORONAL), View::Coronal)
                .map_err(wrap(bundle::PNET_CORONAL))?,
            pnet_sagittal: loader
                .load_parcel(&load(bundle::PNET_SAGITTAL), View::Sagittal)
                .map_err(wrap(bundle::PNET_SAGITTAL))?,
            pnet_axial: loader
                .load_parcel(&load(bundle::PNET_AXIAL), View::Axial)
                .map_err(wrap(bundle::PNET_AXIAL))?,
            hnet_coronal: loader
                .load_hemi(&load(bundle::HNET_CORONAL), View::Coronal)
                .map_err(wrap(bundle::HNET_CORONAL))?,
            hnet_axial: loader
                .load_hemi(&load(bundle::HNET_AXIAL), View::Axial)
                .map_err(wrap(bundle::HNET_AXIAL))?,
        })
    }
}

/// 获取 `{用户主目录}/openmap-t1/MODEL_FOLDER` 目录, 即模型包的默认位置.
pub fn home_bundle_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("openmap-t1");
    ans.push("MODEL_FOLDER");
    Some(ans)
}
