use dpi::{PhysicalPosition, PhysicalSize};

/// ### English
/// What the scene traversal should draw for one pass.
///
/// `origin` is the lower-left corner of the current tile inside the full image, in GL
/// window coordinates (y grows upwards). Untiled renders have a single region whose tile
/// covers the whole image. The traversal draws the tile into the lower-left corner of the
/// current context.
///
/// ### 中文
/// 单次遍历应绘制的内容。
///
/// `origin` 为当前分块在完整图像中的左下角，使用 GL 窗口坐标（y 向上增长）。
/// 不分块的渲染只有一个覆盖整幅图像的区域。遍历将分块绘制到当前上下文的左下角。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportRegion {
    image: PhysicalSize<u32>,
    origin: PhysicalPosition<u32>,
    tile: PhysicalSize<u32>,
}

impl ViewportRegion {
    pub fn full(image: PhysicalSize<u32>) -> Self {
        Self {
            image,
            origin: PhysicalPosition::new(0, 0),
            tile: image,
        }
    }

    pub fn image_size(&self) -> PhysicalSize<u32> {
        self.image
    }

    pub fn tile_origin(&self) -> PhysicalPosition<u32> {
        self.origin
    }

    pub fn tile_size(&self) -> PhysicalSize<u32> {
        self.tile
    }

    pub fn is_tiled(&self) -> bool {
        self.tile != self.image
    }

    /// ### English
    /// Width over height of the full image, for building the projection.
    ///
    /// ### 中文
    /// 完整图像的宽高比，用于构建投影。
    pub fn aspect_ratio(&self) -> f32 {
        self.image.width as f32 / self.image.height.max(1) as f32
    }
}

/// ### English
/// Split of an image into tiles no larger than the backend allows.
///
/// ### 中文
/// 将图像切分为不超过后端上限的分块。
#[derive(Clone, Copy, Debug)]
pub(crate) struct TilePlan {
    image: PhysicalSize<u32>,
    tile: PhysicalSize<u32>,
}

impl TilePlan {
    pub(crate) fn new(image: PhysicalSize<u32>, limit: PhysicalSize<u32>) -> Self {
        let tile = PhysicalSize::new(
            image.width.min(limit.width.max(1)),
            image.height.min(limit.height.max(1)),
        );
        Self { image, tile }
    }

    /// ### English
    /// Size of the one context that renders every tile.
    ///
    /// ### 中文
    /// 渲染所有分块所用的那个上下文的尺寸。
    pub(crate) fn context_size(&self) -> PhysicalSize<u32> {
        self.tile
    }

    pub(crate) fn len(&self) -> usize {
        self.image.width.div_ceil(self.tile.width) as usize
            * self.image.height.div_ceil(self.tile.height) as usize
    }

    pub(crate) fn regions(&self) -> impl Iterator<Item = ViewportRegion> + '_ {
        let rows = (0..self.image.height).step_by(self.tile.height as usize);
        rows.flat_map(move |y| {
            (0..self.image.width)
                .step_by(self.tile.width as usize)
                .map(move |x| ViewportRegion {
                    image: self.image,
                    origin: PhysicalPosition::new(x, y),
                    tile: PhysicalSize::new(
                        self.tile.width.min(self.image.width - x),
                        self.tile.height.min(self.image.height - y),
                    ),
                })
        })
    }
}

/// ### English
/// Copies the rendered part of a top-left ordered context readback into the top-left
/// ordered output image.
///
/// ### 中文
/// 将上下文读回（顶部优先行序）中已渲染的部分复制到输出图像（顶部优先行序）。
pub(crate) fn blit_tile(
    output: &mut [u8],
    region: &ViewportRegion,
    context: &[u8],
    context_size: PhysicalSize<u32>,
    components: usize,
) {
    let image = region.image;
    let tile = region.tile;
    let row_bytes = tile.width as usize * components;
    let context_stride = context_size.width as usize * components;
    let image_stride = image.width as usize * components;

    // The tile sits in the bottom rows of the context.
    let context_first_row = (context_size.height - tile.height) as usize;
    let image_first_row = (image.height - region.origin.y - tile.height) as usize;
    let x_offset = region.origin.x as usize * components;

    for row in 0..tile.height as usize {
        let src = (context_first_row + row) * context_stride;
        let dst = (image_first_row + row) * image_stride + x_offset;
        output[dst..dst + row_bytes].copy_from_slice(&context[src..src + row_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_are_a_single_full_region() {
        let plan = TilePlan::new(PhysicalSize::new(64, 64), PhysicalSize::new(4096, 4096));
        let regions: Vec<_> = plan.regions().collect();
        assert_eq!(regions, vec![ViewportRegion::full(PhysicalSize::new(64, 64))]);
        assert!(!regions[0].is_tiled());
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let plan = TilePlan::new(PhysicalSize::new(5, 3), PhysicalSize::new(2, 2));
        assert_eq!(plan.context_size(), PhysicalSize::new(2, 2));
        assert_eq!(plan.len(), 6);

        let regions: Vec<_> = plan.regions().collect();
        assert_eq!(regions.len(), 6);
        assert_eq!(regions[2].tile_origin(), PhysicalPosition::new(4, 0));
        assert_eq!(regions[2].tile_size(), PhysicalSize::new(1, 2));
        assert_eq!(regions[5].tile_size(), PhysicalSize::new(1, 1));
    }

    #[test]
    fn blit_places_bottom_tile_at_image_bottom() {
        let image = PhysicalSize::new(2, 3);
        let plan = TilePlan::new(image, PhysicalSize::new(2, 2));
        let bottom = plan.regions().next().unwrap();
        let mut output = vec![0u8; 6];
        blit_tile(&mut output, &bottom, &[1, 1, 2, 2], PhysicalSize::new(2, 2), 1);
        assert_eq!(output, vec![0, 0, 1, 1, 2, 2]);

        let top = plan.regions().nth(1).unwrap();
        blit_tile(&mut output, &top, &[0, 0, 9, 9], PhysicalSize::new(2, 2), 1);
        assert_eq!(output, vec![9, 9, 1, 1, 2, 2]);
    }
}
