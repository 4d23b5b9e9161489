//! 解剖区域标签表 (label lookup table).
//!
//! 标签资源文件为 UTF-8 纯文本, 每行一个区域, token 以空白分隔:
//! 第 0 个 token 为标签编号, 从第 [`ATLAS_NAME_COLUMN`] 列起到行尾为显示名
//! (外围的单/双引号会被剥去). 空行与 `#` 开头的注释行被忽略.
//! 无法解析的行以及编号为 0 的行被静默跳过, 绝不导致运行失败.
//!
//! [`ATLAS_NAME_COLUMN`]: crate::consts::ATLAS_NAME_COLUMN

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::consts::{ATLAS_COMMENT, ATLAS_NAME_COLUMN};

/// 标签编号到显示名的只读映射. 每次运行构建一次, 此后不再变化.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelAtlas {
    names: BTreeMap<u16, String>,
}

impl LabelAtlas {
    /// 从本地路径读取标签资源文件.
    ///
    /// 文件缺失或不可读时返回空表并记录 warning, 流水线的其余部分
    /// 必须容忍空表 (显示名留空), 而不是失败.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                log::warn!("标签资源文件 `{}` 不可用: {e}", path.display());
                Self::default()
            }
        }
    }

    /// 逐行解析标签资源文本. 解析规则见模块文档.
    ///
    /// 同一编号多次出现时, 最后一次出现的显示名生效.
    pub fn parse(text: &str) -> Self {
        let mut names = BTreeMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(ATLAS_COMMENT) {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() <= ATLAS_NAME_COLUMN {
                continue;
            }

            // 编号必须是正整数; 0 是背景, 永远不会成为可报告的标签.
            let id = match tokens[0].parse::<u16>() {
                Ok(0) | Err(_) => continue,
                Ok(id) => id,
            };

            let name = tokens[ATLAS_NAME_COLUMN..]
                .join(" ")
                .trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_owned();
            if name.is_empty() {
                continue;
            }

            // 重复编号: 后出现者覆盖先出现者.
            let _ = names.insert(id, name);
        }

        Self { names }
    }

    /// 查询编号 `id` 对应的显示名.
    #[inline]
    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// 已登记的区域个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 按编号升序迭代所有 (编号, 显示名) 对.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.names.iter().map(|(&id, name)| (id, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::LabelAtlas;

    /// 基本解析: 注释、空行与名称拼接.
    #[test]
    fn test_parse_basic() {
        let text = "\
# 这是注释
4 0 118 14 0 1 1 \"3rd-Ventricle\"

11 0 118 14 0 1 1 CSF Posterior
";
        let atlas = LabelAtlas::parse(text);
        assert_eq!(atlas.len(), 2);
        assert_eq!(atlas.name_of(4), Some("3rd-Ventricle"));
        // 多 token 名称以单空格拼接.
        assert_eq!(atlas.name_of(11), Some("CSF Posterior"));
        assert_eq!(atlas.name_of(5), None);
    }

    /// 无法解析的行被跳过, 不影响其余行.
    #[test]
    fn test_skip_malformed() {
        let text = "\
abc 0 0 0 0 0 0 NotAnId
7 0 0 0 0 0 0
0 0 0 0 0 0 0 Background
9 0 0 0 0 0 0 ''
12 0 0 0 0 0 0 'Left Hippocampus'
";
        let atlas = LabelAtlas::parse(text);
        // 依次为: 编号非整数 / token 不足 / 编号为 0 / 名称为空.
        assert_eq!(atlas.len(), 1);
        assert_eq!(atlas.name_of(12), Some("Left Hippocampus"));
        assert_eq!(atlas.name_of(0), None);
        assert_eq!(atlas.name_of(7), None);
        assert_eq!(atlas.name_of(9), None);
    }

    /// 重复编号后出现者生效.
    #[test]
    fn test_duplicate_last_wins() {
        let text = "\
5 x x x x x x Hippocampus
5 x x x x x x Thalamus
";
        let atlas = LabelAtlas::parse(text);
        assert_eq!(atlas.len(), 1);
        assert_eq!(atlas.name_of(5), Some("Thalamus"));
    }

    /// 同一资源解析两次结果一致.
    #[test]
    fn test_idempotent() {
        let text = "3 a b c d e f Amygdala\n17 a b c d e f \"Brain Stem\"\n";
        let first = LabelAtlas::parse(text);
        let second = LabelAtlas::parse(text);
        assert_eq!(first, second);
        let pairs: Vec<_> = first.iter().collect();
        assert_eq!(pairs, [(3, "Amygdala"), (17, "Brain Stem")]);
    }

    /// 文件缺失时得到空表.
    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let atlas = LabelAtlas::open(dir.path().join("no-such-file.txt"));
        assert!(atlas.is_empty());
        assert_eq!(atlas.name_of(1), None);
    }
}
