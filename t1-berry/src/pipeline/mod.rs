//! 流水线编排.
//!
//! 按严格线性顺序驱动各推理阶段, 串接中间体数据, 最终产出对齐标签、
//! 体积统计表与落盘产物. 整条流水线只有一个逻辑控制流: 阶段之间没有
//! 并行, 前一阶段的输出就绪之前后一阶段绝不开始. 设备在运行开始时
//! 解析一次, 作为只读上下文传给每个阶段.
//!
//! 状态机:
//!
//! ```text
//! Idle -> Preprocessing -> Cropping -> Stripping -> Parcellating
//!      -> HemisphereSeparating -> Postprocessing -> Aggregating
//!      -> Writing -> Complete
//! ```
//!
//! 任何非终态都可因不可恢复错误一步转入唯一的 `Failed` 终态.
//! 单个阶段没有重试; 失败的运行必须以全新输入从 `Idle` 重新开始.

use std::path::{Path, PathBuf};

use ndarray::Zip;

mod error;
mod preproc;
pub mod postproc;

pub use error::{InputError, RunError, Stage, StageCause, StageError};

use crate::atlas::LabelAtlas;
use crate::consts::label;
use crate::nets::{Device, ModelBundle};
use crate::report::{self, RegionTable};
use crate::{artifact, NiftiHeaderAttr, ParcelMap, T1Scan};

/// 流水线状态.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PipelineState {
    /// 尚未启动.
    Idle,

    /// 预处理中.
    Preprocessing,

    /// 裁剪中.
    Cropping,

    /// 颅骨剥离中.
    Stripping,

    /// 多视角 parcellation 中.
    Parcellating,

    /// 半球分离中.
    HemisphereSeparating,

    /// 后处理中.
    Postprocessing,

    /// 体积统计中.
    Aggregating,

    /// 产物写出中.
    Writing,

    /// 成功终态.
    Complete,

    /// 失败终态.
    Failed,
}

/// 诊断信息: 各阶段边界产生的人类可读事件序列.
///
/// 只追加, 单一写者; 仅用于可观测性, 绝不参与控制流.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    events: Vec<String>,
}

impl Diagnostics {
    fn push(&mut self, event: String) {
        log::info!("{event}");
        self.events.push(event);
    }

    /// 按发生顺序返回全部事件.
    #[inline]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// 事件条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 是否尚无事件.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// 一次运行的配置. 同一个编排器实现服务所有调用方,
/// 差异只体现在配置上.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// 产物输出目录.
    pub output_dir: PathBuf,

    /// 标签资源文件路径. 文件缺失只降级 (显示名留空), 不失败.
    pub label_path: PathBuf,
}

impl RunConfig {
    /// 创建配置.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(output_dir: P, label_path: Q) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_owned(),
            label_path: label_path.as_ref().to_owned(),
        }
    }
}

/// 一次成功运行的全部产出.
#[derive(Debug)]
pub struct RunOutput {
    /// 对齐回预处理坐标系的最终标签体数据.
    pub label: ParcelMap,

    /// 分区体积表, 按编号升序.
    pub table: RegionTable,

    /// 成功落盘的产物路径.
    pub written: Vec<PathBuf>,
}

/// 流水线编排器.
#[derive(Debug)]
pub struct Pipeline {
    config: RunConfig,
    state: PipelineState,
    diag: Diagnostics,
}

impl Pipeline {
    /// 以给定配置创建处于 `Idle` 状态的编排器.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            diag: Diagnostics::default(),
        }
    }

    /// 当前状态.
    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 诊断事件.
    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// 运行配置.
    #[inline]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 执行一次完整运行.
    ///
    /// 运行要么产出完整一致的产物集 (进入 `Complete`), 要么什么都不产出
    /// (进入 `Failed`); 不存在部分成功. 输入体数据被本次运行独占消费.
    ///
    /// # 注意
    ///
    /// 编排器必须处于 `Idle` 状态, 否则程序 panic:
    /// 失败的运行必须以全新输入从 `Idle` 重新开始.
    pub fn run(
        &mut self,
        scan: T1Scan,
        bundle: &ModelBundle,
        device: Device,
    ) -> Result<RunOutput, RunError> {
        assert!(
            matches!(self.state, PipelineState::Idle),
            "流水线必须从 Idle 状态启动"
        );
        self.diag.push(format!("流水线启动, 设备: {device}"));

        match self.run_inner(scan, bundle, device) {
            Ok(out) => {
                self.state = PipelineState::Complete;
                self.diag.push(format!(
                    "流水线完成: {} 个区域, {} 个产物",
                    out.table.len(),
                    out.written.len()
                ));
                Ok(out)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                self.diag.push(format!("流水线失败: {e}"));
                Err(e)
            }
        }
    }

    fn enter(&mut self, state: PipelineState) {
        log::debug!("进入状态 {state:?}");
        self.state = state;
    }

    fn run_inner(
        &mut self,
        scan: T1Scan,
        bundle: &ModelBundle,
        device: Device,
    ) -> Result<RunOutput, RunError> {
        if scan.size() == 0 {
            return Err(InputError::EmptyVolume.into());
        }

        self.enter(PipelineState::Preprocessing);
        let pre = preproc::standardize(scan)?;
        self.diag.push(format!("预处理完成, 形状 {:?}", pre.shape()));

        self.enter(PipelineState::Cropping);
        let cropped = bundle
            .cnet
            .forward(&pre, device)
            .map_err(|e| StageError::new(Stage::Crop, StageCause::Net(e)))?;
        if cropped.size() == 0 {
            return Err(StageError::degenerate(Stage::Crop, "空的裁剪区域").into());
        }
        self.diag
            .push(format!("裁剪完成, 形状 {:?}", cropped.shape()));

        self.enter(PipelineState::Stripping);
        let (stripped, shift) = bundle
            .ssnet
            .forward(&cropped, &pre, device)
            .map_err(|e| StageError::new(Stage::Strip, StageCause::Net(e)))?;
        self.diag
            .push(format!("颅骨剥离完成, 偏移 {:?}", shift.offset()));

        // parcellation 与半球分离之间没有数据依赖, 但按现有行为
        // 仍保持顺序执行. 二者消费同一份剥离体数据.
        self.enter(PipelineState::Parcellating);
        let parcel = parcellate(&stripped, bundle, device)?;
        self.diag.push(format!(
            "parcellation 完成, 最大基础编号 {}",
            parcel.max_label()
        ));

        self.enter(PipelineState::HemisphereSeparating);
        let hemi = hemisphere(&stripped, bundle, device)?;
        let sides = report::histogram(hemi.data());
        self.diag.push(format!(
            "半球分离完成, 左 {} / 右 {} 体素",
            sides.get(&label::HEMI_LEFT).copied().unwrap_or(0),
            sides.get(&label::HEMI_RIGHT).copied().unwrap_or(0)
        ));

        self.enter(PipelineState::Postprocessing);
        let final_map = postproc::merge_aligned(&parcel, &hemi, shift, &pre)
            .map_err(|e| StageError::new(Stage::Postprocess, StageCause::Merge(e)))?;
        self.diag
            .push(format!("后处理完成, 对齐到形状 {:?}", final_map.shape()));

        self.enter(PipelineState::Aggregating);
        let atlas = LabelAtlas::open(&self.config.label_path);
        if atlas.is_empty() {
            self.diag
                .push("warning: 标签表为空, 显示名将留空".to_owned());
        }
        let table = report::aggregate(&final_map, &atlas);
        self.diag
            .push(format!("体积统计完成, {} 个区域", table.len()));

        self.enter(PipelineState::Writing);
        let outcome = artifact::write_all(&table, &final_map, &self.config.output_dir)
            .map_err(|e| StageError::new(Stage::Write, StageCause::Write(e)))?;
        for w in &outcome.warnings {
            self.diag.push(format!("warning: {w}"));
        }
        self.diag
            .push(format!("产物写出完成, {} 个文件", outcome.written.len()));

        Ok(RunOutput {
            label: final_map,
            table,
            written: outcome.written,
        })
    }
}

/// 三视角 parcellation 共识: 每个体素上两票以上者胜出,
/// 三方各执一词时取冠状位结果.
fn parcellate(
    stripped: &T1Scan,
    bundle: &ModelBundle,
    device: Device,
) -> Result<ParcelMap, RunError> {
    let net_err = |e| StageError::new(Stage::Parcellate, StageCause::Net(e));
    let c = bundle
        .pnet_coronal
        .forward(stripped, device)
        .map_err(net_err)?;
    let s = bundle
        .pnet_sagittal
        .forward(stripped, device)
        .map_err(net_err)?;
    let a = bundle.pnet_axial.forward(stripped, device).map_err(net_err)?;

    if c.shape() != s.shape() || c.shape() != a.shape() {
        return Err(StageError::degenerate(
            Stage::Parcellate,
            format!(
                "三视角输出形状不一致: {:?} / {:?} / {:?}",
                c.shape(),
                s.shape(),
                a.shape()
            ),
        )
        .into());
    }

    let fused = Zip::from(c.data())
        .and(s.data())
        .and(a.data())
        .map_collect(|&vc, &vs, &va| {
            if vc == vs || vc == va {
                vc
            } else if vs == va {
                vs
            } else {
                vc
            }
        });

    Ok(ParcelMap::with_data(c.header(), fused))
}

/// 双视角半球共识: 一致取其值; 不一致时非背景者优先,
/// 同为非背景时取冠状位结果.
fn hemisphere(
    stripped: &T1Scan,
    bundle: &ModelBundle,
    device: Device,
) -> Result<ParcelMap, RunError> {
    let net_err = |e| StageError::new(Stage::Hemisphere, StageCause::Net(e));
    let c = bundle
        .hnet_coronal
        .forward(stripped, device)
        .map_err(net_err)?;
    let a = bundle.hnet_axial.forward(stripped, device).map_err(net_err)?;

    if c.shape() != a.shape() {
        return Err(StageError::degenerate(
            Stage::Hemisphere,
            format!("双视角输出形状不一致: {:?} / {:?}", c.shape(), a.shape()),
        )
        .into());
    }

    let fused = Zip::from(c.data()).and(a.data()).map_collect(|&vc, &va| {
        if vc == va || !label::is_background(vc) {
            vc
        } else {
            va
        }
    });

    Ok(ParcelMap::with_data(c.header(), fused))
}
