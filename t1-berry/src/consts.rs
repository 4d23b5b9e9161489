//! 通用常量.

/// 标签体素值.
pub mod label {
    /// 背景 (未标注) 体素值. 不参与任何统计.
    pub const BACKGROUND: u16 = 0;

    /// 半球分离结果中, 左半球的体素值.
    pub const HEMI_LEFT: u16 = 1;

    /// 半球分离结果中, 右半球的体素值.
    pub const HEMI_RIGHT: u16 = 2;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(v: u16) -> bool {
        matches!(v, BACKGROUND)
    }

    /// 体素是否属于左半球?
    #[inline]
    pub const fn is_left(v: u16) -> bool {
        matches!(v, HEMI_LEFT)
    }

    /// 体素是否属于右半球?
    #[inline]
    pub const fn is_right(v: u16) -> bool {
        matches!(v, HEMI_RIGHT)
    }

    /// 双侧配对编号的上限: base 超过该值时, `paired_right`
    /// 会溢出 `u16`, 后处理阶段应报错.
    pub const MAX_PAIR_BASE: u16 = u16::MAX / 2;

    /// parcellation 基础编号 `base` 对应的左半球最终标签.
    ///
    /// 要求 `1 <= base <= MAX_PAIR_BASE`.
    #[inline]
    pub const fn paired_left(base: u16) -> u16 {
        2 * base - 1
    }

    /// parcellation 基础编号 `base` 对应的右半球最终标签.
    ///
    /// 要求 `1 <= base <= MAX_PAIR_BASE`.
    #[inline]
    pub const fn paired_right(base: u16) -> u16 {
        2 * base
    }
}

/// 模型包内的七个网络权重文件名.
pub mod bundle {
    /// 裁剪网络.
    pub const CNET: &str = "CNet.pth";

    /// 颅骨剥离网络.
    pub const SSNET: &str = "SSNet.pth";

    /// 冠状位 parcellation 网络.
    pub const PNET_CORONAL: &str = "PNet_c.pth";

    /// 矢状位 parcellation 网络.
    pub const PNET_SAGITTAL: &str = "PNet_s.pth";

    /// 轴位 parcellation 网络.
    pub const PNET_AXIAL: &str = "PNet_a.pth";

    /// 冠状位半球分离网络.
    pub const HNET_CORONAL: &str = "HNet_c.pth";

    /// 轴位半球分离网络.
    pub const HNET_AXIAL: &str = "HNet_a.pth";

    /// 模型包必须包含的全部文件.
    pub const ALL: [&str; 7] = [
        CNET,
        SSNET,
        PNET_CORONAL,
        PNET_SAGITTAL,
        PNET_AXIAL,
        HNET_CORONAL,
        HNET_AXIAL,
    ];
}

/// 输出产物文件名. 每次运行按原名覆盖写入, 不做追加或合并.
pub mod artifact {
    /// 分区体积统计表 (权威产物, 必须写出成功).
    pub const VOLUMES_CSV: &str = "T1_280_volumes.csv";

    /// 体积统计表的电子表格镜像 (尽力而为).
    pub const VOLUMES_XLSX: &str = "T1_280_volumes.xlsx";

    /// 电子表格内的工作表名.
    pub const SHEET_NAME: &str = "Brain_Volumes";

    /// 对齐后的最终标签体数据.
    pub const SEGMENT_NII: &str = "T1_280_segment.nii.gz";

    /// 中间轴位切片预览图 (尽力而为).
    pub const PREVIEW_PNG: &str = "T1_280_preview.png";

    /// 表格列名. 各列依次为标签编号、实际体积 (立方毫米)、显示名.
    /// CSV 与电子表格镜像共用.
    pub const COLUMNS: [&str; 3] = ["LabelID", "Volume_mm3", "LabelName"];
}

/// 标签资源文件中, 显示名起始的 token 列号.
/// 前面的列依次为标签编号与六个颜色/属性字段.
pub const ATLAS_NAME_COLUMN: usize = 7;

/// 标签资源文件的注释前缀.
pub const ATLAS_COMMENT: char = '#';
