//! 🧠欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{NiftiHeaderAttr, ParcelMap, PreviewWrite, T1Scan, VoxelShift};

pub use crate::atlas::LabelAtlas;

pub use crate::nets::{
    CropNet, Device, HemiNet, ModelBundle, NetError, NetLoader, NetResult, ParcelNet, StripNet,
    View,
};

pub use crate::pipeline::{
    InputError, Pipeline, PipelineState, RunConfig, RunError, RunOutput, Stage, StageError,
};

pub use crate::report::{aggregate, RegionRecord, RegionTable};

pub use crate::artifact::{write_all, WriteOutcome};

pub use crate::consts::label::{BACKGROUND, HEMI_LEFT, HEMI_RIGHT};
