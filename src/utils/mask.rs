//! Mask region analysis for crop-mode inpainting

use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Mask values above this (on the `[0,1]` scale) count as painted
pub const MASK_REGION_THRESHOLD: f32 = 127.0 / 255.0;

/// Axis-aligned bounding box of one painted region, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskBox {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl MaskBox {
    /// Window of this box grown by `margin` on every side, centred on the box
    /// and clamped to the image. Returns `(left, top, right, bottom)`, exclusive
    /// on the right and bottom.
    #[must_use]
    pub fn crop_window(
        &self,
        margin: usize,
        image_height: usize,
        image_width: usize,
    ) -> (usize, usize, usize, usize) {
        let center_x = self.x + self.width / 2;
        let center_y = self.y + self.height / 2;
        let half_w = (self.width + 2 * margin) / 2;
        let half_h = (self.height + 2 * margin) / 2;

        let left = center_x.saturating_sub(half_w);
        let top = center_y.saturating_sub(half_h);
        let right = (center_x + half_w).min(image_width);
        let bottom = (center_y + half_h).min(image_height);
        (left, top, right.max(left + 1), bottom.max(top + 1))
    }
}

/// Bounding boxes of the outer 8-connected regions of a `[1,H,W]` mask
///
/// Regions are returned in raster order of their first pixel.
#[must_use]
pub fn boxes_from_mask(mask: &Array3<f32>) -> Vec<MaskBox> {
    let (_, height, width) = mask.dim();
    let mut visited = vec![false; height * width];
    let mut boxes = Vec::new();
    let mut stack = Vec::new();

    let painted = |y: usize, x: usize| mask[[0, y, x]] > MASK_REGION_THRESHOLD;

    for start_y in 0..height {
        for start_x in 0..width {
            let start = start_y * width + start_x;
            if visited[start] || !painted(start_y, start_x) {
                continue;
            }

            visited[start] = true;
            stack.push((start_y, start_x));
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (start_x, start_y, start_x, start_y);

            while let Some((y, x)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        let index = ny * width + nx;
                        if !visited[index] && painted(ny, nx) {
                            visited[index] = true;
                            stack.push((ny, nx));
                        }
                    }
                }
            }

            boxes.push(MaskBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            });
        }
    }

    // A region fully enclosed by another region's box is already covered by it
    boxes
        .iter()
        .filter(|candidate| {
            !boxes.iter().any(|other| {
                other != *candidate
                    && other.x < candidate.x
                    && other.y < candidate.y
                    && other.x + other.width > candidate.x + candidate.width
                    && other.y + other.height > candidate.y + candidate.height
            })
        })
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(height: usize, width: usize, pixels: &[(usize, usize)]) -> Array3<f32> {
        let mut mask = Array3::<f32>::zeros((1, height, width));
        for &(y, x) in pixels {
            mask[[0, y, x]] = 1.0;
        }
        mask
    }

    #[test]
    fn test_empty_mask_has_no_boxes() {
        assert!(boxes_from_mask(&Array3::<f32>::zeros((1, 8, 8))).is_empty());
    }

    #[test]
    fn test_separate_regions() {
        let mask = mask_with(10, 10, &[(1, 1), (1, 2), (2, 2), (7, 6), (8, 8)]);
        let boxes = boxes_from_mask(&mask);
        assert_eq!(boxes.len(), 3);
        assert_eq!(
            boxes[0],
            MaskBox {
                x: 1,
                y: 1,
                width: 2,
                height: 2
            }
        );
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mask = mask_with(5, 5, &[(0, 0), (1, 1), (2, 2)]);
        let boxes = boxes_from_mask(&mask);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].width, 3);
        assert_eq!(boxes[0].height, 3);
    }

    #[test]
    fn test_faint_values_below_threshold_are_ignored() {
        let mut mask = Array3::<f32>::zeros((1, 4, 4));
        mask[[0, 1, 1]] = 0.4;
        assert!(boxes_from_mask(&mask).is_empty());
    }

    #[test]
    fn test_island_inside_ring_is_dropped() {
        let mut pixels = Vec::new();
        for i in 0..7 {
            pixels.extend([(0, i), (6, i), (i, 0), (i, 6)]);
        }
        pixels.push((3, 3));
        let boxes = boxes_from_mask(&mask_with(7, 7, &pixels));
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].width, 7);
    }

    #[test]
    fn test_crop_window_is_centred_and_clamped() {
        let region = MaskBox {
            x: 100,
            y: 100,
            width: 50,
            height: 20,
        };
        assert_eq!(region.crop_window(10, 1000, 1000), (90, 90, 160, 130));
        assert_eq!(region.crop_window(500, 400, 300), (0, 0, 300, 400));
    }
}
