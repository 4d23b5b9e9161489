//! 流水线端到端运行器.
//!
//! 环境变量:
//!
//! 1. `T1_INPUT`: 输入 T1 nii 文件路径 (必需);
//! 2. `T1_OUTPUT_DIR`: 产物输出目录, 默认 `./output`;
//! 3. `T1_LABEL_FILE`: 标签资源文件, 默认 `{输出目录}/Untitled.txt`;
//! 4. `T1_MODEL_DIR`: 模型目录. 设置时校验其中七个权重文件齐全;
//!   未设置时直接使用基线推理后端.

mod baseline;

use std::env;
use std::path::PathBuf;

use t1_berry::prelude::*;

/// 默认标签资源文件名.
const LABEL_FILE: &str = "Untitled.txt";

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
fn sep() {
    println!("{SEP}");
}

fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();

    let Some(input) = env::var_os("T1_INPUT").map(PathBuf::from) else {
        eprintln!("用法: T1_INPUT=<T1 nii 文件> t1-run");
        std::process::exit(2);
    };

    let output_dir = env::var_os("T1_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output"));
    let label_path = env::var_os("T1_LABEL_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| output_dir.join(LABEL_FILE));

    let scan = match T1Scan::open(&input) {
        Ok(scan) => scan,
        Err(e) => {
            log::error!("无法打开 `{}`: {e}", input.display());
            std::process::exit(1);
        }
    };

    let bundle = match env::var_os("T1_MODEL_DIR").map(PathBuf::from) {
        Some(dir) => match ModelBundle::resolve(&dir, &baseline::BaselineLoader) {
            Ok(bundle) => bundle,
            Err(e) => {
                log::error!("模型包解析失败: {e}");
                std::process::exit(1);
            }
        },
        None => {
            log::warn!(
                "T1_MODEL_DIR 未设置, 使用基线推理后端 (模型包默认位置: {})",
                t1_berry::nets::home_bundle_dir()
                    .map_or_else(|| "<无主目录>".to_owned(), |p| p.display().to_string())
            );
            baseline::bundle()
        }
    };

    let device = Device::detect();

    sep();
    println!("输入: {}", input.display());
    println!("形状: {:?}, 体素 {:.3} mm^3", scan.shape(), scan.voxel());
    println!("设备: {device}");
    sep();

    let mut pipeline = Pipeline::new(RunConfig::new(&output_dir, &label_path));
    let out = match pipeline.run(scan, &bundle, device) {
        Ok(out) => out,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    sep();
    println!("区域总数: {}", out.table.len());
    println!("非背景体素: {}", out.table.total_voxels());
    println!("体积前 5 的区域:");
    for r in out.table.top_by_volume(5) {
        let name = if r.name.is_empty() { "(未命名)" } else { &r.name };
        println!("    {:>5}  {:>14.3} mm^3  {name}", r.id, r.volume_mm3);
    }

    sep();
    println!("产物:");
    for p in &out.written {
        println!("    {}", p.display());
    }
}
