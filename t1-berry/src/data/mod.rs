use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{Idx2d, Idx3d};

mod save;

pub use save::PreviewWrite;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 按 \[z, H, W\] 形状同步 header 的 dim 字段 (nifti 内部仍为 \[W, H, z\] 序).
#[inline]
fn set_shape_into_header(h: &mut NiftiHeader, (z, hh, w): Idx3d) {
    h.dim = [3, w as u16, hh as u16, z as u16, 1, 1, 1, 1];
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.header().pixdim[1] as f64
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.header().pixdim[2] as f64
    }

    /// 获取空间方向 (相邻切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.header().pixdim[3] as f64
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// nii 格式 3D T1 MRI 扫描, 包括 header 和扫描强度. 强度值以 `f32` 保存.
///
/// 流水线各阶段产出的中间体数据也用该类型表达: 每个阶段都产生新的实例,
/// 而不是就地修改输入.
#[derive(Debug, Clone)]
pub struct T1Scan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for T1Scan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for T1Scan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for T1Scan {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl T1Scan {
    /// 打开 nii 文件格式的 3D T1 扫描. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 以给定 header 的空间元信息和 \[z, H, W\] 序的裸数据创建新的扫描实例.
    /// header 的 dim 字段会按 `data` 的形状同步.
    ///
    /// 各推理阶段用该方法产出新的中间体数据.
    pub fn with_data(header: &NiftiHeader, data: Array3<f32>) -> Self {
        let mut header = Box::new(header.clone());
        let (z, h, w) = data.dim();
        set_shape_into_header(&mut header, (z, h, w));
        Self { header, data }
    }

    /// 根据裸数据和体素分辨率直接创建 `T1Scan` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按 \[z, H, W\] 序组织.
    /// 2. `pix_dim` 按 \[w, h, z\] 格式存储, 以毫米为单位.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let [_, pw, ph, pz, ..] = &mut header.pixdim;
        let [w, h, z] = &pix_dim;
        (*pw, *ph, *pz) = (*w, *h, *z);
        let (dz, dh, dw) = data.dim();
        set_shape_into_header(&mut header, (dz, dh, dw));
        header.intent_name[..4].copy_from_slice(b"fake");
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 拆出 header 与裸数据, 放弃实体本身.
    #[inline]
    pub fn into_parts(self) -> (BoxedHeader, Array3<f32>) {
        (self.header, self.data)
    }
}

/// nii 格式 3D 标签体数据, 包括 header 和各体素的解剖区域编号.
/// 编号以 `u16` 保存, 0 表示背景.
///
/// 半球分离结果也以该类型表达, 体素值限于
/// `consts::label::{BACKGROUND, HEMI_LEFT, HEMI_RIGHT}`.
#[derive(Debug, Clone)]
pub struct ParcelMap {
    header: BoxedHeader,
    data: Array3<u16>,
}

impl NiftiHeaderAttr for ParcelMap {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for ParcelMap {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for ParcelMap {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl ParcelMap {
    /// 打开 nii 文件格式的 3D 标签体数据. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<u16>()?
            .permuted_axes([2, 1, 0].as_slice());

        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<u16>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 以给定 header 的空间元信息和 \[z, H, W\] 序的裸标签数据创建新的实例.
    /// header 的 dim 字段会按 `data` 的形状同步.
    pub fn with_data(header: &NiftiHeader, data: Array3<u16>) -> Self {
        let mut header = Box::new(header.clone());
        let (z, h, w) = data.dim();
        set_shape_into_header(&mut header, (z, h, w));
        Self { header, data }
    }

    /// 以给定 header 的空间元信息创建全背景标签体数据.
    #[inline]
    pub fn zeros(header: &NiftiHeader, shape: Idx3d) -> Self {
        Self::with_data(header, Array3::zeros(shape))
    }

    /// 根据裸标签数据和体素分辨率直接创建 `ParcelMap` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按 \[z, H, W\] 序组织.
    /// 2. `pix_dim` 按 \[w, h, z\] 格式存储, 以毫米为单位.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<u16>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let [_, pw, ph, pz, ..] = &mut header.pixdim;
        let [w, h, z] = &pix_dim;
        (*pw, *ph, *pz) = (*w, *h, *z);
        let (dz, dh, dw) = data.dim();
        set_shape_into_header(&mut header, (dz, dh, dw));
        header.intent_name[..4].copy_from_slice(b"fake");
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u16, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u16, Ix3> {
        self.data.view_mut()
    }

    /// 标签体数据中出现过的最大编号. 全背景时为 0.
    pub fn max_label(&self) -> u16 {
        self.data.iter().copied().max().unwrap_or(0)
    }
}

/// 颅骨剥离结果在预处理坐标系中的体素偏移.
///
/// 由剥离阶段产出, 仅由后处理阶段消费. 偏移必须与产出它的那次剥离结果
/// 严格对应; 来自其它运行的偏移无效, 绝不能复用. 为此该结构同时记录
/// 它所描述的剥离体数据形状, 供后处理阶段校验.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoxelShift {
    offset: Idx3d,
    shape: Idx3d,
}

impl VoxelShift {
    /// 以 \[z, H, W\] 序的偏移和剥离体数据形状创建偏移描述.
    #[inline]
    pub fn new(offset: Idx3d, shape: Idx3d) -> Self {
        Self { offset, shape }
    }

    /// 剥离结果左上前角在预处理坐标系中的体素索引.
    #[inline]
    pub fn offset(&self) -> Idx3d {
        self.offset
    }

    /// 该偏移所描述的剥离体数据形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 校验该偏移是否与给定的剥离体数据对应, 且整体落在 `frame` 形状之内.
    pub fn fits(&self, stripped_shape: Idx3d, frame: Idx3d) -> bool {
        let (oz, oh, ow) = self.offset;
        let (sz, sh, sw) = self.shape;
        let (fz, fh, fw) = frame;
        stripped_shape == self.shape
            && oz + sz <= fz
            && oh + sh <= fh
            && ow + sw <= fw
    }
}

#[cfg(test)]
mod tests {
    use super::{NiftiHeaderAttr, ParcelMap, T1Scan, VoxelShift};
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    /// 测试 fake 实体的形状与分辨率元信息.
    #[test]
    fn test_fake_shape_and_pixdim() {
        let scan = T1Scan::fake(Array3::zeros((4, 5, 6)), [2.0, 3.0, 5.0]);
        assert!(scan.is_faked());
        assert_eq!(scan.shape(), (4, 5, 6));
        assert_eq!(scan.slice_shape(), (5, 6));
        assert_eq!(scan.len_z(), 4);
        assert_eq!(scan.size(), 120);

        // pix_dim 按 [z, h, w] 返回.
        let [z, h, w] = scan.pix_dim();
        assert!(f64_eq(z, 5.0) && f64_eq(h, 3.0) && f64_eq(w, 2.0));
        assert!(!scan.is_isotropic());
    }

    /// 测试体素实际体积为三个方向分辨率之积.
    #[test]
    fn test_voxel_volume() {
        let map = ParcelMap::fake(Array3::zeros((2, 2, 2)), [0.5, 2.0, 3.0]);
        assert!(f64_eq(map.voxel(), 3.0));

        let iso = ParcelMap::fake(Array3::zeros((1, 1, 1)), [1.0, 1.0, 1.0]);
        assert!(iso.is_isotropic());
        assert!(f64_eq(iso.voxel(), 1.0));
    }

    /// 测试索引合法性检查和最大标签.
    #[test]
    fn test_check_and_max_label() {
        let mut data = Array3::<u16>::zeros((3, 3, 3));
        data[(1, 2, 0)] = 7;
        data[(2, 2, 2)] = 3;
        let map = ParcelMap::fake(data, [1.0, 1.0, 1.0]);

        assert!(map.check(&(2, 2, 2)));
        assert!(!map.check(&(3, 0, 0)));
        assert_eq!(map[(1, 2, 0)], 7);
        assert_eq!(map.max_label(), 7);
    }

    /// 测试偏移校验: 形状不一致或越过边界的偏移均不合法.
    #[test]
    fn test_voxel_shift_fits() {
        let shift = VoxelShift::new((1, 2, 3), (4, 4, 4));
        assert_eq!(shift.offset(), (1, 2, 3));

        assert!(shift.fits((4, 4, 4), (5, 6, 7)));
        // 与剥离体数据形状不符.
        assert!(!shift.fits((4, 4, 3), (5, 6, 7)));
        // 粘贴范围越界.
        assert!(!shift.fits((4, 4, 4), (5, 6, 6)));
    }

    /// with_data 应同步 header 的 dim 字段.
    #[test]
    fn test_with_data_syncs_dim() {
        let base = T1Scan::fake(Array3::zeros((4, 5, 6)), [1.0, 1.0, 2.0]);
        let derived = T1Scan::with_data(base.header(), Array3::zeros((2, 3, 4)));
        assert_eq!(derived.shape(), (2, 3, 4));
        // 空间分辨率元信息保持不变.
        assert_eq!(derived.pix_dim(), base.pix_dim());

        let label = ParcelMap::zeros(base.header(), (4, 5, 6));
        assert_eq!(label.shape(), (4, 5, 6));
        assert_eq!(label.max_label(), 0);
    }
}
