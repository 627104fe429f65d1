use footfall_geom::BoundingBox;

/// Greedy non-maximum suppression, highest confidence first.
pub fn nms_filter(mut dets: Vec<BoundingBox>, iou_th: f32, max_det: usize) -> Vec<BoundingBox> {
    dets.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<BoundingBox> = Vec::new();

    'outer: for d in dets {
        if kept.len() >= max_det {
            break;
        }
        for k in &kept {
            if d.iou(k) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}
