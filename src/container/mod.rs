//! Container file stream and split-part naming (components C and I).

pub mod file_stream;
pub mod split;

use std::path::{Path, PathBuf};

/// Computes the path of part `index` given the part-0 base path, per §3
/// "Split manifest": part 0 is `base.ext` unchanged; part *k* ≥ 1 inserts a
/// 4-digit zero-padded infix before the extension, `base0001.ext`.
pub fn part_path(base: &Path, index: u32) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    let ext = base.extension().map(|e| e.to_string_lossy().to_string());
    let mut name = format!("{stem}{index:04}");
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(&ext);
    }
    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}
