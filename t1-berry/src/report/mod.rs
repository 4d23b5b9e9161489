//! 分区体积统计.
//!
//! 消费最终标签体数据, 产出按标签编号升序排列的分区体积表.
//! 表在每次运行中全新构建, 绝不与上一次运行的结果合并.

use std::collections::BTreeMap;

use ndarray::ArrayView3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::atlas::LabelAtlas;
use crate::consts::label;
use crate::{NiftiHeaderAttr, ParcelMap};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 统计体数据中各体素值的出现次数.
        pub(crate) fn histogram<T>(view: ArrayView3<'_, T>) -> BTreeMap<T, u64>
        where
            T: num::PrimInt + Send + Sync,
        {
            use rayon::prelude::*;

            view.into_par_iter()
                .fold(BTreeMap::new, |mut m, &v| {
                    *m.entry(v).or_insert(0) += 1;
                    m
                })
                .reduce(BTreeMap::new, |mut a, b| {
                    for (v, c) in b {
                        *a.entry(v).or_insert(0) += c;
                    }
                    a
                })
        }
    } else {
        /// 统计体数据中各体素值的出现次数.
        pub(crate) fn histogram<T>(view: ArrayView3<'_, T>) -> BTreeMap<T, u64>
        where
            T: num::PrimInt,
        {
            let mut m = BTreeMap::new();
            for &v in view.iter() {
                *m.entry(v).or_insert(0) += 1;
            }
            m
        }
    }
}

/// 一个解剖区域在本次运行中的体积记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionRecord {
    /// 标签编号. 恒为正.
    pub id: u16,

    /// 该区域的体素个数.
    pub voxels: u64,

    /// 该区域的实际体积, 以立方毫米为单位.
    /// 恒等于 `voxels` 与单体素体积之积, 不做任何舍入.
    pub volume_mm3: f64,

    /// 显示名. 标签表中无对应条目时为空串.
    pub name: String,
}

/// 本次运行的分区体积表. 记录按标签编号严格升序排列.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionTable {
    rows: Vec<RegionRecord>,
}

impl RegionTable {
    /// 记录条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何非背景区域.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按标签编号升序迭代所有记录.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &RegionRecord> {
        self.rows.iter()
    }

    /// 全部记录的切片视图, 按标签编号升序.
    #[inline]
    pub fn records(&self) -> &[RegionRecord] {
        &self.rows
    }

    /// 查询编号 `id` 的记录.
    pub fn get(&self, id: u16) -> Option<&RegionRecord> {
        // 行序按编号升序, 可二分.
        self.rows
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// 所有记录的体素个数之和, 即标签体数据中非背景体素的总数.
    pub fn total_voxels(&self) -> u64 {
        self.rows.iter().map(|r| r.voxels).sum()
    }

    /// 按实际体积从大到小取前 `k` 条记录. 用于快速人工粗检.
    pub fn top_by_volume(&self, k: usize) -> Vec<&RegionRecord> {
        use ordered_float::NotNan;

        // 体积由有限的体素数与分辨率相乘得到, 不会出现 NaN, 可直接 unwrap.
        let mut heap = binary_heap_plus::BinaryHeap::from_vec_cmp(
            self.rows.iter().collect::<Vec<_>>(),
            |a: &&RegionRecord, b: &&RegionRecord| {
                NotNan::new(a.volume_mm3)
                    .unwrap()
                    .cmp(&NotNan::new(b.volume_mm3).unwrap())
            },
        );

        let mut ans = Vec::with_capacity(k.min(self.rows.len()));
        for _ in 0..k {
            match heap.pop() {
                Some(r) => ans.push(r),
                None => break,
            }
        }
        ans
    }
}

/// 从标签体数据视图和显式体素分辨率构建分区体积表.
///
/// 单体素体积为各方向分辨率之积; 体素值 0 (背景) 被排除, 绝不出现在表中;
/// 任何非零标签都会被保留, 即便只有 1 个体素. 显示名由 `atlas` 解析,
/// 无对应条目时留空.
pub fn aggregate_with_spacing(
    view: ArrayView3<'_, u16>,
    spacing: [f64; 3],
    atlas: &LabelAtlas,
) -> RegionTable {
    let unit: f64 = spacing.iter().product();

    let rows = histogram(view)
        .into_iter()
        .filter(|&(id, _)| !label::is_background(id))
        .map(|(id, voxels)| RegionRecord {
            id,
            voxels,
            volume_mm3: voxels as f64 * unit,
            name: atlas.name_of(id).unwrap_or("").to_owned(),
        })
        .collect();

    RegionTable { rows }
}

/// 从最终标签体数据构建分区体积表. 体素分辨率取自体数据自身的 header.
#[inline]
pub fn aggregate(map: &ParcelMap, atlas: &LabelAtlas) -> RegionTable {
    aggregate_with_spacing(map.data(), map.pix_dim(), atlas)
}
