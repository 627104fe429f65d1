//! Frame annotation: zone fills and outlines, counting lines, detections and
//! a small panel. Text is not rendered; the panel shows IN, OUT and the net
//! count inside as bars, top to bottom.

use footfall_analytics::{CountingLine, Zone};
use footfall_geom::{point_in_polygon, BoundingBox, Point};
use footfall_proto::analytics::{LineCounts, ZoneState};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const ACTIVE: Rgb<u8> = Rgb([0, 255, 0]);
const IDLE: Rgb<u8> = Rgb([255, 0, 0]);
const LINE: Rgb<u8> = Rgb([255, 255, 0]);
const DETECTION: Rgb<u8> = Rgb([0, 255, 0]);
const PANEL: Rgb<u8> = Rgb([24, 24, 24]);
const IN_BAR: Rgb<u8> = Rgb([0, 200, 0]);
const OUT_BAR: Rgb<u8> = Rgb([220, 60, 60]);
const INSIDE_BAR: Rgb<u8> = Rgb([80, 160, 255]);

const FILL_ALPHA: f32 = 0.3;
const BAR_STEP_PX: u32 = 4;

struct ZoneStyle {
    points: Vec<Point>,
    outline: Option<Rgb<u8>>,
}

struct LineStyle {
    start: Point,
    end: Point,
    color: Rgb<u8>,
}

pub struct Overlay {
    zones: Vec<ZoneStyle>,
    lines: Vec<LineStyle>,
}

fn to_px(p: Point, w: u32, h: u32) -> (f32, f32) {
    (p.x.clamp(0.0, 1.0) * (w - 1) as f32, p.y.clamp(0.0, 1.0) * (h - 1) as f32)
}

fn blend(dst: &mut Rgb<u8>, src: Rgb<u8>, alpha: f32) {
    for c in 0..3 {
        let v = dst.0[c] as f32 * (1.0 - alpha) + src.0[c] as f32 * alpha;
        dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
    }
}

fn thick_segment(img: &mut RgbImage, a: (f32, f32), b: (f32, f32), color: Rgb<u8>, half_width: i32) {
    for d in -half_width..=half_width {
        let o = d as f32;
        draw_line_segment_mut(img, (a.0 + o, a.1), (b.0 + o, b.1), color);
        draw_line_segment_mut(img, (a.0, a.1 + o), (b.0, b.1 + o), color);
    }
}

impl Overlay {
    pub fn new(zones: &[Zone], lines: &[CountingLine]) -> Self {
        Self {
            zones: zones.iter().map(|z| ZoneStyle { points: z.points.clone(), outline: z.color.map(Rgb) }).collect(),
            lines: lines
                .iter()
                .map(|l| LineStyle { start: l.start, end: l.end, color: l.color.map(Rgb).unwrap_or(LINE) })
                .collect(),
        }
    }

    /// `states` is per zone in configuration order; `totals` is the
    /// cumulative count over all lines.
    pub fn draw(&self, img: &mut RgbImage, states: &[ZoneState], boxes: &[BoundingBox], totals: LineCounts) {
        let (w, h) = img.dimensions();
        if w < 2 || h < 2 {
            return;
        }

        for (zone, state) in self.zones.iter().zip(states) {
            let fill = if state.is_occupied() { ACTIVE } else { IDLE };
            self.fill_zone(img, &zone.points, fill);
            let outline = zone.outline.unwrap_or(fill);
            let n = zone.points.len();
            for i in 0..n {
                let a = to_px(zone.points[i], w, h);
                let b = to_px(zone.points[(i + 1) % n], w, h);
                thick_segment(img, a, b, outline, 1);
            }
        }

        for line in &self.lines {
            thick_segment(img, to_px(line.start, w, h), to_px(line.end, w, h), line.color, 1);
        }

        for b in boxes {
            let b = b.clamped();
            let (x1, y1) = to_px(Point::new(b.x1, b.y1), w, h);
            let (x2, y2) = to_px(Point::new(b.x2, b.y2), w, h);
            let (bw, bh) = ((x2 - x1).round() as u32, (y2 - y1).round() as u32);
            if bw > 0 && bh > 0 {
                let rect = Rect::at(x1.round() as i32, y1.round() as i32).of_size(bw, bh);
                draw_hollow_rect_mut(img, rect, DETECTION);
            }
            let (cx, cy) = to_px(b.centroid(), w, h);
            draw_filled_circle_mut(img, (cx.round() as i32, cy.round() as i32), 3, DETECTION);
        }

        self.draw_panel(img, totals);
    }

    fn fill_zone(&self, img: &mut RgbImage, poly: &[Point], color: Rgb<u8>) {
        if poly.len() < 3 {
            return;
        }
        let (w, h) = img.dimensions();
        let (mut x0, mut y0, mut x1, mut y1) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for p in poly {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        let px0 = (x0.clamp(0.0, 1.0) * w as f32).floor() as u32;
        let py0 = (y0.clamp(0.0, 1.0) * h as f32).floor() as u32;
        let px1 = ((x1.clamp(0.0, 1.0) * w as f32).ceil() as u32).min(w);
        let py1 = ((y1.clamp(0.0, 1.0) * h as f32).ceil() as u32).min(h);

        for py in py0..py1 {
            for px in px0..px1 {
                let centre = Point::new((px as f32 + 0.5) / w as f32, (py as f32 + 0.5) / h as f32);
                if point_in_polygon(centre, poly) {
                    blend(img.get_pixel_mut(px, py), color, FILL_ALPHA);
                }
            }
        }
    }

    fn draw_panel(&self, img: &mut RgbImage, totals: LineCounts) {
        let (w, h) = img.dimensions();
        let panel_w = (w / 4).clamp(40, 240);
        let panel_h = (h / 8).clamp(24, 60);
        if panel_w + 16 > w || panel_h + 16 > h {
            return;
        }
        draw_filled_rect_mut(img, Rect::at(8, 8).of_size(panel_w, panel_h), PANEL);

        let bar_max = panel_w - 8;
        let bar_h = ((panel_h - 16) / 3).max(1);
        let bars = [(totals.inbound, IN_BAR), (totals.outbound, OUT_BAR), (totals.inside(), INSIDE_BAR)];
        for (i, (count, color)) in bars.into_iter().enumerate() {
            let len = (count.min(u32::MAX as u64) as u32).saturating_mul(BAR_STEP_PX).min(bar_max);
            if len == 0 {
                continue;
            }
            let y = 12 + i as i32 * (bar_h as i32 + 4);
            draw_filled_rect_mut(img, Rect::at(12, y).of_size(len, bar_h), color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left_half() -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(0.5, 1.0), Point::new(0.0, 1.0)]
    }

    #[test]
    fn occupied_zone_is_tinted_green() {
        let ov = Overlay::new(&[Zone::occupancy("left", left_half(), 0.2)], &[]);
        let mut img = RgbImage::new(200, 200);
        ov.draw(&mut img, &[ZoneState::Count(2)], &[], LineCounts::default());
        let p = img.get_pixel(40, 150);
        assert!(p.0[1] > 60 && p.0[0] < 10, "{:?}", p);
        // right half untouched
        assert_eq!(*img.get_pixel(160, 150), Rgb([0, 0, 0]));
    }

    #[test]
    fn empty_zone_is_tinted_red() {
        let ov = Overlay::new(&[Zone::presence("left", left_half())], &[]);
        let mut img = RgbImage::new(200, 200);
        ov.draw(&mut img, &[ZoneState::Active(false)], &[], LineCounts::default());
        let p = img.get_pixel(40, 150);
        assert!(p.0[0] > 60 && p.0[1] < 10, "{:?}", p);
    }

    #[test]
    fn lines_boxes_and_panel_are_drawn() {
        let line = CountingLine::new("door", Point::new(0.0, 0.75), Point::new(1.0, 0.75));
        let ov = Overlay::new(&[], &[line]);
        let mut img = RgbImage::new(200, 200);
        let b = BoundingBox::new(0.5, 0.25, 0.75, 0.5, 0.9);
        ov.draw(&mut img, &[], &[b], LineCounts { inbound: 3, outbound: 0 });

        let y = (0.75f32 * 199.0).round() as u32;
        assert_eq!(*img.get_pixel(120, y), LINE);
        let cx = (0.625f32 * 199.0).round() as u32;
        let cy = (0.375f32 * 199.0).round() as u32;
        assert_eq!(*img.get_pixel(cx, cy), DETECTION);
        assert_eq!(*img.get_pixel(13, 13), IN_BAR);
    }

    #[test]
    fn panel_shows_net_inside() {
        let ov = Overlay::new(&[], &[]);
        let mut img = RgbImage::new(200, 200);
        ov.draw(&mut img, &[], &[], LineCounts { inbound: 3, outbound: 1 });
        // bars are 3 px tall, 4 px apart, starting at y = 12
        assert_eq!(*img.get_pixel(13, 13), IN_BAR);
        assert_eq!(*img.get_pixel(13, 20), OUT_BAR);
        assert_eq!(*img.get_pixel(13, 27), INSIDE_BAR);
        // two inside, 4 px per person
        assert_eq!(*img.get_pixel(19, 27), INSIDE_BAR);
        assert_eq!(*img.get_pixel(21, 27), PANEL);

        let mut img = RgbImage::new(200, 200);
        ov.draw(&mut img, &[], &[], LineCounts { inbound: 1, outbound: 3 });
        assert_eq!(*img.get_pixel(13, 27), PANEL);
    }

    #[test]
    fn tiny_frames_are_left_alone() {
        let ov = Overlay::new(&[Zone::presence("all", left_half())], &[]);
        let mut img = RgbImage::new(1, 1);
        ov.draw(&mut img, &[ZoneState::Active(true)], &[], LineCounts::default());
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
    }
}
