//! 本地图片来源: 单张图片重复使用, 或按文件名顺序循环目录中的图片

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use tracing::{debug, info};

use super::{Frame, FrameError, FrameSource};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

pub struct FileSource {
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    /// 单图模式下缓存解码结果
    cached: Option<Arc<DynamicImage>>,
    next_id: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            bail!("帧来源不存在: {}", path.display());
        };
        info!("🖼️ 图片来源: {} ({} 张)", path.display(), files.len());

        Ok(Self {
            name: path.display().to_string(),
            files,
            cursor: 0,
            cached: None,
            next_id: 0,
        })
    }

    fn load(&mut self) -> Result<Option<Arc<DynamicImage>>, FrameError> {
        if self.files.is_empty() {
            return Ok(None);
        }
        if self.files.len() == 1 {
            if let Some(image) = &self.cached {
                return Ok(Some(Arc::clone(image)));
            }
        }

        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = (self.cursor + 1) % self.files.len();
        debug!("📂 读取 {}", path.display());
        let image = Arc::new(image::open(path)?);

        if self.files.len() == 1 {
            self.cached = Some(Arc::clone(&image));
        }
        Ok(Some(image))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("读取目录失败: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(image) = self.load()? else {
            return Ok(None);
        };
        let frame = Frame {
            id: self.next_id,
            image,
        };
        self.next_id += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tc-files-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_directory_cycles_in_name_order() {
        let dir = temp_dir("cycle");
        DynamicImage::new_rgb8(10, 10).save(dir.join("b.png")).unwrap();
        DynamicImage::new_rgb8(20, 10).save(dir.join("a.png")).unwrap();
        fs::write(dir.join("notes.txt"), "skip").unwrap();

        let mut source = FileSource::open(&dir).unwrap();
        let widths: Vec<u32> = (0..3)
            .map(|_| source.next_frame().unwrap().unwrap().image.width())
            .collect();
        assert_eq!(widths, vec![20, 10, 20]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_directory_is_not_ready() {
        let dir = temp_dir("empty");
        let mut source = FileSource::open(&dir).unwrap();
        assert!(source.next_frame().unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_image_is_error() {
        let dir = temp_dir("corrupt");
        let path = dir.join("broken.jpg");
        fs::write(&path, b"not a jpeg").unwrap();

        let mut source = FileSource::open(&path).unwrap();
        assert!(matches!(source.next_frame(), Err(FrameError::Decode(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}
