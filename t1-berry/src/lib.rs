#![warn(missing_docs)]

//! 核心库. 提供 3D 脑部 T1 MRI 自动分区 (parcellation) 流水线的编排、
//! 标签表解析、分区体积统计与产物写出.
//!
//! 流水线按 OpenMAP-T1 流程组织: 原始扫描依次经过预处理、裁剪、
//! 颅骨剥离、三视角 parcellation 与双视角半球分离, 后处理阶段把
//! 两路结果合并并对齐回预处理坐标系, 最终产出解剖标签体数据、
//! 分区体积表以及落盘产物 (CSV / 电子表格 / nifti / 预览图).
//!
//! 七个网络的内部实现是外部协作者, 本 crate 只规定其输入输出契约
//! (见 [`nets`] 模块). 模型权重的获取与授权流程不在本 crate 范围内.
//!
//! # 注意
//!
//! 1. 体数据一律按 \[z, H, W\] 轴序访问, 加载时从 nifti 的
//!   \[W, H, z\] 约定置换而来, 写出时做逆置换.
//! 2. 在非期望情况下 (如复用终态编排器), 程序会直接 panic,
//!   而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### 标签表解析 ✅
//!
//! 一行一个区域, 编号查显示名; 资源缺失只降级不失败.
//!
//! 实现位于 `t1-berry/src/atlas`.
//!
//! ### 流水线编排与状态机 ✅
//!
//! 严格线性阶段序列, 单一 `Failed` 终态, 只追加的诊断事件流.
//!
//! 实现位于 `t1-berry/src/pipeline`.
//!
//! ### 推理阶段契约 ✅
//!
//! 七网络模型包、加载协作者与设备回退探测.
//!
//! 实现位于 `t1-berry/src/nets`.
//!
//! ### 分区体积统计 ✅
//!
//! 体素直方图 (可选 rayon 并行), 单体素体积 × 计数, 按编号升序出表.
//!
//! 实现位于 `t1-berry/src/report`.
//!
//! ### 产物写出 ✅
//!
//! CSV 权威产物; 电子表格镜像与预览图尽力而为; 全部按原名覆盖.
//!
//! 实现位于 `t1-berry/src/artifact`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D nii 体数据基础数据结构.
mod data;

pub use data::{NiftiHeaderAttr, ParcelMap, PreviewWrite, T1Scan, VoxelShift};

pub mod consts;

pub mod artifact;
pub mod atlas;
pub mod nets;
pub mod pipeline;
pub mod report;

pub mod prelude;
