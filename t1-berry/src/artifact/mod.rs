//! 产物写出.
//!
//! 一次成功的运行固定产出: 体积统计 CSV (权威产物) 与对齐后的标签体
//! nifti 文件, 二者必须写出成功; 电子表格镜像与切片预览图为尽力而为,
//! 失败只产生 warning, 绝不中止运行. 所有产物都按原名覆盖写入.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rust_xlsxwriter::Workbook;

use crate::consts::artifact;
use crate::data::PreviewWrite;
use crate::report::RegionTable;
use crate::ParcelMap;

/// 必要产物的写出错误.
#[derive(Debug)]
pub enum WriteError {
    /// 底层 I/O 错误.
    Io(io::Error),

    /// 标签体数据序列化错误.
    Nifti(nifti::error::NiftiError),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Io(e) => write!(f, "I/O 错误: {e}"),
            WriteError::Nifti(e) => write!(f, "nifti 写出错误: {e}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Io(e) => Some(e),
            WriteError::Nifti(e) => Some(e),
        }
    }
}

impl From<io::Error> for WriteError {
    fn from(e: io::Error) -> Self {
        WriteError::Io(e)
    }
}

impl From<nifti::error::NiftiError> for WriteError {
    fn from(e: nifti::error::NiftiError) -> Self {
        WriteError::Nifti(e)
    }
}

/// 一次写出的结果: 成功落盘的路径与尽力而为产物的 warning.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// 成功写出的产物路径.
    pub written: Vec<PathBuf>,

    /// 尽力而为产物的失败描述. 非空不代表运行失败.
    pub warnings: Vec<String>,
}

/// 将分区体积表和最终标签体数据写入 `dir` 目录.
///
/// CSV 与 nifti 写出失败返回 `Err`; 电子表格镜像和预览图失败
/// 记入 [`WriteOutcome::warnings`] 后继续.
pub fn write_all(
    table: &RegionTable,
    label: &ParcelMap,
    dir: &Path,
) -> Result<WriteOutcome, WriteError> {
    fs::create_dir_all(dir)?;
    let mut outcome = WriteOutcome::default();

    // 权威产物.
    let csv = dir.join(artifact::VOLUMES_CSV);
    write_csv(table, &csv)?;
    outcome.written.push(csv);

    let nii = dir.join(artifact::SEGMENT_NII);
    label.save_nifti(&nii)?;
    outcome.written.push(nii);

    // 尽力而为产物.
    let xlsx = dir.join(artifact::VOLUMES_XLSX);
    match write_xlsx(table, &xlsx) {
        Ok(()) => outcome.written.push(xlsx),
        Err(e) => {
            let msg = format!("电子表格镜像 `{}` 写出失败: {e}", xlsx.display());
            log::warn!("{msg}");
            outcome.warnings.push(msg);
        }
    }

    let png = dir.join(artifact::PREVIEW_PNG);
    match label.save_preview(&png) {
        Ok(()) => outcome.written.push(png),
        Err(e) => {
            let msg = format!("预览图 `{}` 写出失败: {e}", png.display());
            log::warn!("{msg}");
            outcome.warnings.push(msg);
        }
    }

    Ok(outcome)
}

/// 最小 CSV 字段转义: 含分隔符或引号的字段加引号, 引号翻倍.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}

/// 写出体积统计 CSV. 表头固定, 行序与表序一致 (按编号升序).
/// `File::create` 语义保证按原名覆盖.
fn write_csv(table: &RegionTable, path: &Path) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "{}", artifact::COLUMNS.iter().join(","))?;
    for r in table.iter() {
        writeln!(w, "{},{},{}", r.id, r.volume_mm3, csv_field(&r.name))?;
    }
    w.flush()
}

/// 写出电子表格镜像: 同样的三列, 放在固定名字的工作表中.
fn write_xlsx(table: &RegionTable, path: &Path) -> Result<(), rust_xlsxwriter::XlsxError> {
    let mut book = Workbook::new();
    let sheet = book.add_worksheet();
    sheet.set_name(artifact::SHEET_NAME)?;

    for (col, name) in artifact::COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, r) in table.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_number(row, 0, r.id as f64)?;
        sheet.write_number(row, 1, r.volume_mm3)?;
        sheet.write_string(row, 2, r.name.as_str())?;
    }

    book.save(path)
}

#[cfg(test)]
mod tests {
    use super::{csv_field, write_all};
    use crate::atlas::LabelAtlas;
    use crate::consts::artifact;
    use crate::report::aggregate;
    use crate::ParcelMap;
    use ndarray::Array3;

    fn map_with(ids: &[(usize, u16)]) -> ParcelMap {
        let mut data = Array3::<u16>::zeros((3, 3, 3));
        for &(i, v) in ids {
            data[(i / 9, (i / 3) % 3, i % 3)] = v;
        }
        ParcelMap::fake(data, [1.0, 1.0, 1.0])
    }

    /// 完整写出: 必要产物与尽力而为产物均落盘, 无 warning.
    #[test]
    fn test_write_all() {
        let dir = tempfile::tempdir().unwrap();
        let atlas = LabelAtlas::parse("2 x x x x x x Amygdala\n");
        let map = map_with(&[(0, 2), (1, 2), (5, 9)]);
        let table = aggregate(&map, &atlas);

        let out = write_all(&table, &map, dir.path()).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.written.len(), 4);

        let csv = std::fs::read_to_string(dir.path().join(artifact::VOLUMES_CSV)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "LabelID,Volume_mm3,LabelName");
        assert_eq!(lines[1], "2,2,Amygdala");
        assert_eq!(lines[2], "9,1,");
        assert_eq!(lines.len(), 3);

        assert!(dir.path().join(artifact::VOLUMES_XLSX).is_file());
        assert!(dir.path().join(artifact::SEGMENT_NII).is_file());
        assert!(dir.path().join(artifact::PREVIEW_PNG).is_file());
    }

    /// 重复写出按原名覆盖, 旧行绝不重现.
    #[test]
    fn test_overwrite_no_stale_rows() {
        let dir = tempfile::tempdir().unwrap();
        let atlas = LabelAtlas::default();

        let first = map_with(&[(0, 3), (1, 7)]);
        write_all(&aggregate(&first, &atlas), &first, dir.path()).unwrap();

        let second = map_with(&[(0, 5)]);
        write_all(&aggregate(&second, &atlas), &second, dir.path()).unwrap();

        let csv = std::fs::read_to_string(dir.path().join(artifact::VOLUMES_CSV)).unwrap();
        assert!(csv.contains("\n5,"));
        assert!(!csv.contains("\n3,"));
        assert!(!csv.contains("\n7,"));
        assert_eq!(csv.lines().count(), 2);
    }

    /// CSV 字段转义.
    #[test]
    fn test_csv_field() {
        assert_eq!(csv_field("Amygdala"), "Amygdala");
        assert_eq!(csv_field("CSF, Posterior"), "\"CSF, Posterior\"");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
        assert_eq!(csv_field(""), "");
    }
}
