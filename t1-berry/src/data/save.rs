//! 体数据的持久化存储.

use std::path::Path;

use nifti::writer::WriterOptions;

use super::{NiftiHeaderAttr, ParcelMap};

/// 表明一个可以输出 **快速预览图** 的体数据对象.
///
/// 预览图仅用于人工粗检, 不承诺与任何查看器的渲染结果一致:
/// 标签编号会被线性压缩到单通道灰度上, 背景恒为黑色.
pub trait PreviewWrite {
    /// 将中间轴位切片的灰度预览图保存到 `path` 路径.
    fn save_preview<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()>;
}

impl PreviewWrite for ParcelMap {
    fn save_preview<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        let (height, width) = self.slice_shape();
        let mid = self.len_z() / 2;
        let max = self.max_label();

        let mut buf = image::GrayImage::new(width as u32, height as u32);
        if max > 0 {
            let volume = self.data();
            let slice = volume.index_axis(ndarray::Axis(0), mid);
            for ((h, w), &v) in slice.indexed_iter() {
                let gray = ((v as u32 * u8::MAX as u32) / max as u32) as u8;
                buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
            }
        }
        buf.save(path)
    }
}

impl ParcelMap {
    /// 将标签体数据按 nifti 格式保存到 `path` 路径. `path` 以 `.gz`
    /// 结尾时输出为压缩格式.
    ///
    /// 空间元信息 (分辨率, 仿射变换) 取自自身 header; 体素以 `u16` 存储.
    /// 目标文件已存在时按原名覆盖.
    pub fn save_nifti<P: AsRef<Path>>(&self, path: P) -> Result<(), nifti::error::NiftiError> {
        // [z, H, W] -> [W, H, z]. `open` 中置换的逆操作.
        let disk_order = self.data().permuted_axes([2, 1, 0]);

        WriterOptions::new(path.as_ref())
            .reference_header(self.header())
            .write_nifti(&disk_order)
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{NiftiHeaderAttr, ParcelMap, PreviewWrite};
    use ndarray::Array3;

    fn sample_map() -> ParcelMap {
        let mut data = Array3::<u16>::zeros((3, 4, 5));
        data[(0, 0, 0)] = 3;
        data[(1, 2, 3)] = 7;
        data[(2, 3, 4)] = 280;
        ParcelMap::fake(data, [1.0, 1.0, 2.0])
    }

    /// nifti 写出后再读回, 数据与分辨率应完全一致.
    #[test]
    fn test_nifti_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.nii.gz");

        let map = sample_map();
        map.save_nifti(&path).unwrap();

        let back = ParcelMap::open(&path).unwrap();
        assert_eq!(back.shape(), map.shape());
        assert_eq!(back.data(), map.data());

        let [bz, bh, bw] = back.pix_dim();
        let [z, h, w] = map.pix_dim();
        assert!((bz - z).abs() < 1e-6 && (bh - h).abs() < 1e-6 && (bw - w).abs() < 1e-6);
    }

    /// 再次写出同名文件应直接覆盖.
    #[test]
    fn test_nifti_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.nii.gz");

        sample_map().save_nifti(&path).unwrap();
        let blank = ParcelMap::fake(Array3::zeros((2, 2, 2)), [1.0, 1.0, 1.0]);
        blank.save_nifti(&path).unwrap();

        let back = ParcelMap::open(&path).unwrap();
        assert_eq!(back.shape(), (2, 2, 2));
        assert_eq!(back.max_label(), 0);
    }

    /// 预览图应成功落盘; 全背景体数据也一样.
    #[test]
    fn test_preview() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("mid.png");
        sample_map().save_preview(&path).unwrap();
        assert!(path.is_file());

        let blank = ParcelMap::fake(Array3::zeros((1, 2, 2)), [1.0, 1.0, 1.0]);
        let path = dir.path().join("blank.png");
        blank.save_preview(&path).unwrap();
        assert!(path.is_file());
    }
}
