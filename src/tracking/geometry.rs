//! 几何工具: 边界框、中心点、IOU
//! Geometry helpers for bounding boxes

use serde::{Deserialize, Serialize};

/// 边界框 (左上角 + 宽高, 像素坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 从 `[x, y, w, h]` 数组构造, 任一分量非有限值时返回 None
    pub fn from_xywh(values: &[f32]) -> Option<Self> {
        match values {
            [x, y, w, h] if values.iter().all(|v| v.is_finite()) => Some(Self::new(*x, *y, *w, *h)),
            _ => None,
        }
    }

    pub fn xmax(&self) -> f32 {
        self.x + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// 按轴缩放 (检测源坐标 → 标准帧坐标)
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x: self.x * scale_x,
            y: self.y * scale_y,
            width: self.width * scale_x,
            height: self.height * scale_y,
        }
    }

    /// 平移 (测试和回放脚本中常用)
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// 计算两个边界框的IOU (Intersection over Union)
///
/// 不相交、交集面积非正或并集面积非正时返回 0, 不会除零
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.xmax().min(b.xmax());
    let y2 = a.ymax().min(b.ymax());

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if intersection <= 0.0 {
        return 0.0;
    }

    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }

    (intersection / union).clamp(0.0, 1.0)
}

/// 两点间欧氏距离
pub fn distance(p: (f32, f32), q: (f32, f32)) -> f32 {
    (q.0 - p.0).hypot(q.1 - p.1)
}

/// 两个框中心点的位移
pub fn center_displacement(from: &BBox, to: &BBox) -> f32 {
    distance(from.center(), to.center())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BBox::new(10.0, 10.0, 50.0, 30.0);
        assert_relative_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_touching_edges_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 10.0, 10.0);
        // 交集 50, 并集 150
        assert_relative_eq!(iou(&a, &b), 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_degenerate_boxes() {
        let zero = BBox::new(5.0, 5.0, 0.0, 0.0);
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&zero, &a), 0.0);
        assert_eq!(iou(&zero, &zero), 0.0);

        let negative = BBox::new(5.0, 5.0, -3.0, -3.0);
        assert_eq!(iou(&negative, &a), 0.0);
    }

    #[test]
    fn test_from_xywh_rejects_bad_shapes() {
        assert!(BBox::from_xywh(&[1.0, 2.0, 3.0]).is_none());
        assert!(BBox::from_xywh(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_none());
        assert!(BBox::from_xywh(&[1.0, f32::NAN, 3.0, 4.0]).is_none());
        assert_eq!(
            BBox::from_xywh(&[1.0, 2.0, 3.0, 4.0]),
            Some(BBox::new(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[test]
    fn test_center_displacement() {
        let a = BBox::new(10.0, 10.0, 50.0, 30.0);
        let b = a.shifted(3.0, 4.0);
        assert_relative_eq!(center_displacement(&a, &b), 5.0);
    }

    fn any_box() -> impl Strategy<Value = BBox> {
        (
            -500.0f32..500.0,
            -500.0f32..500.0,
            0.0f32..300.0,
            0.0f32..300.0,
        )
            .prop_map(|(x, y, w, h)| BBox::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn prop_iou_is_symmetric(a in any_box(), b in any_box()) {
            prop_assert_eq!(iou(&a, &b), iou(&b, &a));
        }

        #[test]
        fn prop_iou_in_unit_range(a in any_box(), b in any_box()) {
            let v = iou(&a, &b);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        #[test]
        fn prop_iou_self_is_one(x in -500.0f32..500.0, y in -500.0f32..500.0, w in 1.0f32..300.0, h in 1.0f32..300.0) {
            let a = BBox::new(x, y, w, h);
            prop_assert!((iou(&a, &a) - 1.0).abs() < 1e-3);
        }
    }
}
