// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 本地 YOLOv8 检测 (ONNX Runtime)
//!
//! 预处理: 左上角对齐 letterbox, 填充 144/255, Triangle 插值, NCHW
//! 后处理: 输出 [1, 4 + 80, N], 取最高类别分数, 阈值过滤 → NMS → 截断

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

use super::{DetectError, DetectionSource};
use crate::config::EngineConfig;
use crate::detection::{DetectionBatch, FrameSize, RawDetection};
use crate::input::Frame;
use crate::tracking::{iou, BBox};

/// COCO 类别数
const NUM_CLASSES: usize = 80;

/// 检测框 cx, cy, w, h
const CXYWH_OFFSET: usize = 4;

/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

pub const COCO_NAMES: [&str; NUM_CLASSES] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// 后处理参数
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub min_score: f32,
    pub nms_iou: f32,
    pub max_boxes: usize,
}

impl DecodeParams {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_score: config.local_min_score,
            nms_iou: config.local_nms_iou,
            max_boxes: config.local_max_boxes,
        }
    }
}

/// 按编译特性选择执行器, 都未启用时使用 CPU
fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    {
        info!("⚡ 启用 TensorRT 执行器");
        providers.push(
            ort::execution_providers::TensorRTExecutionProvider::default()
                .with_engine_cache(true)
                .build(),
        );
    }
    // TensorRT 不可用时回退到 CUDA
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    providers
}

/// 本地 YOLOv8 检测器
pub struct LocalDetector {
    session: Session,
    name: String,
    input_size: u32,
    params: DecodeParams,
}

impl LocalDetector {
    pub fn new(model_path: &Path, config: &EngineConfig) -> Result<Self> {
        info!("📦 加载检测模型: {}", model_path.display());

        let session = Session::builder()?
            .with_execution_providers(execution_providers())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .with_context(|| format!("加载模型失败: {}", model_path.display()))?;

        info!("✅ 检测模型就绪 (输入 {}x{})", config.local_input_size, config.local_input_size);
        Ok(Self {
            session,
            name: model_path.display().to_string(),
            input_size: config.local_input_size,
            params: DecodeParams::from_config(config),
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> ort::Result<Vec<f32>> {
        let side = self.input_size as usize;
        let shape = [1, 3, side, side];
        let input = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl DetectionSource for LocalDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionBatch, DetectError> {
        let t_pre = std::time::Instant::now();
        let (input, ratio) = letterbox(&frame.image, self.input_size);
        let pre_ms = t_pre.elapsed().as_secs_f64() * 1000.0;

        let t_run = std::time::Instant::now();
        let output = self
            .infer(input)
            .map_err(|e| DetectError::Model(e.to_string()))?;
        let run_ms = t_run.elapsed().as_secs_f64() * 1000.0;

        let size = frame.size();
        let predictions = decode_predictions(&output, ratio, size, self.params)?;
        debug!(
            "🔍 帧 #{}: {} 个目标 (预处理 {:.1}ms, 推理 {:.1}ms)",
            frame.id,
            predictions.len(),
            pre_ms,
            run_ms
        );

        Ok(DetectionBatch::new(predictions, Some(size)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 缩放比例 (保持宽高比放入 side × side)
fn scale_wh(w0: f32, h0: f32, side: f32) -> (f32, f32, f32) {
    let r = (side / w0).min(side / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 预处理为 NCHW 输入, 返回 (数据, 缩放比例)
pub fn letterbox(image: &DynamicImage, side: u32) -> (Vec<f32>, f32) {
    let (w0, h0) = image.dimensions();
    let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, side as f32);
    let resized = image.resize_exact(
        (w_new as u32).clamp(1, side),
        (h_new as u32).clamp(1, side),
        image::imageops::FilterType::Triangle,
    );

    let s = side as usize;
    let mut ys = Array4::from_elem((1, 3, s, s), PAD_VALUE);
    for (x, y, rgb) in resized.pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b, _] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    let (data, _) = ys.into_raw_vec_and_offset();
    (data, ratio)
}

/// 解析模型输出 `[1, 4 + 80, N]` 为原图坐标的检测
pub fn decode_predictions(
    output: &[f32],
    ratio: f32,
    frame: FrameSize,
    params: DecodeParams,
) -> Result<Vec<RawDetection>, DetectError> {
    let stride = CXYWH_OFFSET + NUM_CLASSES;
    if output.is_empty() || output.len() % stride != 0 || ratio <= 0.0 {
        return Err(DetectError::Model(format!(
            "输出尺寸 {} 不是 {} 的整数倍",
            output.len(),
            stride
        )));
    }
    let num_preds = output.len() / stride;
    let at = |row: usize, i: usize| output[row * num_preds + i];

    let width = frame.width as f32;
    let height = frame.height as f32;
    let mut candidates: Vec<(usize, f32, BBox)> = Vec::new();
    for i in 0..num_preds {
        let (class_id, score) = (0..NUM_CLASSES)
            .map(|c| (c, at(CXYWH_OFFSET + c, i)))
            .fold((0, f32::MIN), |best, x| if x.1 > best.1 { x } else { best });
        if score < params.min_score {
            continue;
        }

        let cx = at(0, i) / ratio;
        let cy = at(1, i) / ratio;
        let w = at(2, i) / ratio;
        let h = at(3, i) / ratio;
        let x = (cx - w / 2.).max(0.0).min(width);
        let y = (cy - h / 2.).max(0.0).min(height);
        candidates.push((class_id, score, BBox::new(x, y, w, h)));
    }

    non_max_suppression(&mut candidates, params.nms_iou);
    candidates.truncate(params.max_boxes);

    Ok(candidates
        .into_iter()
        .map(|(class_id, score, bbox)| RawDetection::new(COCO_NAMES[class_id], Some(score), bbox))
        .collect())
}

/// 按类别做 NMS, 结果按分数降序
fn non_max_suppression(xs: &mut Vec<(usize, f32, BBox)>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].0 == xs[index].0 && iou(&xs[prev_index].2, &xs[index].2) > iou_threshold
            {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PARAMS: DecodeParams = DecodeParams {
        min_score: 0.35,
        nms_iou: 0.45,
        max_boxes: 50,
    };

    /// 构造 [84, n] 输出
    fn output(preds: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let n = preds.len();
        let mut data = vec![0.0; (CXYWH_OFFSET + NUM_CLASSES) * n];
        for (i, &(cx, cy, w, h, class, score)) in preds.iter().enumerate() {
            data[i] = cx;
            data[n + i] = cy;
            data[2 * n + i] = w;
            data[3 * n + i] = h;
            data[(CXYWH_OFFSET + class) * n + i] = score;
        }
        data
    }

    #[test]
    fn test_letterbox_shape_and_padding() {
        let image = DynamicImage::new_rgb8(1280, 640);
        let (data, ratio) = letterbox(&image, 640);
        assert_eq!(data.len(), 3 * 640 * 640);
        assert_relative_eq!(ratio, 0.5);
        // 上半部分是图像 (黑色), 下半部分是填充
        assert_relative_eq!(data[0], 0.0);
        assert_relative_eq!(data[639 * 640], PAD_VALUE);
    }

    #[test]
    fn test_decode_scales_back_to_frame() {
        let data = output(&[(100.0, 50.0, 40.0, 20.0, 2, 0.9)]);
        let dets = decode_predictions(&data, 0.5, FrameSize::new(1280, 640), PARAMS).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class, "car");
        assert_eq!(dets[0].bbox, Some(vec![160.0, 80.0, 80.0, 40.0]));
    }

    #[test]
    fn test_decode_filters_low_scores_and_suppresses_duplicates() {
        let data = output(&[
            (100.0, 100.0, 50.0, 50.0, 2, 0.9),
            (102.0, 100.0, 50.0, 50.0, 2, 0.8),
            (102.0, 100.0, 50.0, 50.0, 0, 0.7),
            (300.0, 300.0, 50.0, 50.0, 2, 0.2),
        ]);
        let dets = decode_predictions(&data, 1.0, FrameSize::new(640, 640), PARAMS).unwrap();
        let classes: Vec<&str> = dets.iter().map(|d| d.class.as_str()).collect();
        assert_eq!(classes, vec!["car", "person"]);
    }

    #[test]
    fn test_decode_truncates_to_max_boxes() {
        let preds: Vec<_> = (0..10)
            .map(|i| (20.0 + i as f32 * 60.0, 20.0, 30.0, 30.0, 2, 0.9))
            .collect();
        let params = DecodeParams {
            max_boxes: 3,
            ..PARAMS
        };
        let dets = decode_predictions(&output(&preds), 1.0, FrameSize::new(640, 640), params).unwrap();
        assert_eq!(dets.len(), 3);
    }

    #[test]
    fn test_decode_rejects_bad_output_shape() {
        assert!(matches!(
            decode_predictions(&[0.0; 85], 1.0, FrameSize::new(640, 640), PARAMS),
            Err(DetectError::Model(_))
        ));
    }

    #[test]
    fn test_execution_providers_follow_features() {
        let expected = usize::from(cfg!(feature = "tensorrt")) + usize::from(cfg!(feature = "cuda"));
        assert_eq!(execution_providers().len(), expected);
    }
}
