//! 上传前处理: 限宽缩放 (保持宽高比) → JPEG 编码

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::Frame;
use crate::detection::FrameSize;

/// 编码后的上传帧
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    /// 编码图像尺寸 (检测框所在坐标系)
    pub size: FrameSize,
}

/// 宽度超过 `max_width` 时等比缩小
pub fn target_size(size: FrameSize, max_width: u32) -> FrameSize {
    if size.width <= max_width || size.width == 0 {
        return size;
    }
    let scale = max_width as f32 / size.width as f32;
    let height = ((size.height as f32 * scale).round() as u32).max(1);
    FrameSize::new(max_width, height)
}

/// 缩放并编码为 JPEG
pub fn encode_for_upload(frame: &Frame, max_width: u32, quality: u8) -> Result<EncodedFrame> {
    let src_size = frame.size();
    let dst_size = target_size(src_size, max_width);

    let rgb = frame.image.to_rgb8();
    let rgb = if dst_size == src_size {
        rgb
    } else {
        resize_rgb(rgb, dst_size)?
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&rgb)
        .context("JPEG编码失败")?;

    Ok(EncodedFrame {
        jpeg,
        size: dst_size,
    })
}

fn resize_rgb(rgb: RgbImage, dst: FrameSize) -> Result<RgbImage> {
    let (width, height) = rgb.dimensions();
    let src_image = fr::images::Image::from_vec_u8(width, height, rgb.into_raw(), fr::PixelType::U8x3)
        .context("创建缩放源图像失败")?;
    let mut dst_image = fr::images::Image::new(dst.width, dst.height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .context("图像缩放失败")?;

    RgbImage::from_raw(dst.width, dst.height, dst_image.into_vec()).context("缩放结果尺寸不匹配")
}
