//! ### English
//! The pixel buffer a successful offscreen render produces, plus its export paths.
//!
//! ### 中文
//! 离屏渲染成功后得到的像素缓冲区及其导出方式。

use std::io;
use std::path::Path;

use dpi::PhysicalSize;

use crate::engine::context::{PixelFormat, PixelOrigin, is_valid_size};
use crate::engine::io::Writer;

const SGI_MAGIC: u16 = 474;
const SGI_HEADER_LEN: usize = 512;

/// ### English
/// Rendered pixels, tightly packed, first row at the top of the image.
///
/// ### 中文
/// 渲染得到的像素，紧密排列，第一行位于图像顶部。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedImage {
    size: PhysicalSize<u32>,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl RenderedImage {
    /// ### English
    /// Wraps a readback buffer, flipping it first when its rows start at the bottom.
    /// Returns `None` for an empty size or when the length does not match `size` and `format`.
    ///
    /// ### 中文
    /// 封装读回缓冲区；若其行序从底部开始则先翻转。尺寸为空或长度与 `size`、`format` 不符时
    /// 返回 `None`。
    pub fn from_raw(
        size: PhysicalSize<u32>,
        format: PixelFormat,
        mut pixels: Vec<u8>,
        origin: PixelOrigin,
    ) -> Option<Self> {
        if !is_valid_size(size) {
            return None;
        }
        let stride = (size.width as usize).checked_mul(format.components())?;
        if Some(pixels.len()) != stride.checked_mul(size.height as usize) {
            return None;
        }
        if origin == PixelOrigin::BottomLeft {
            flip_rows(&mut pixels, stride);
        }
        Some(Self {
            size,
            format,
            pixels,
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// ### English
    /// Channels of the pixel at column `x`, row `y` (row 0 is the top).
    ///
    /// ### 中文
    /// 第 `x` 列、第 `y` 行（第 0 行为顶部）像素的各通道。
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let components = self.format.components();
        let start = (y as usize * self.size.width as usize + x as usize) * components;
        self.pixels.get(start..start + components)
    }

    /// ### English
    /// Converts to an [`image::RgbaImage`]; RGB buffers get an opaque alpha channel.
    ///
    /// ### 中文
    /// 转换为 [`image::RgbaImage`]；RGB 缓冲区会补上不透明的 alpha 通道。
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        let rgba = match self.format {
            PixelFormat::Rgba => self.pixels.clone(),
            PixelFormat::Rgb => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], u8::MAX])
                .collect(),
        };
        image::RgbaImage::from_raw(self.size.width, self.size.height, rgba)
    }

    /// ### English
    /// Saves through the `image` crate; the format follows the file extension.
    ///
    /// ### 中文
    /// 通过 `image` crate 保存；格式由文件扩展名决定。
    pub fn save(&self, path: impl AsRef<Path>) -> image::ImageResult<()> {
        let Some(image) = self.to_rgba_image() else {
            return Err(image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            )));
        };
        image.save(path)
    }

    /// ### English
    /// Writes an uncompressed SGI `.rgb` file: 512-byte big-endian header, then one plane
    /// per channel with scanlines stored bottom to top.
    ///
    /// ### 中文
    /// 写出未压缩的 SGI `.rgb` 文件：512 字节大端文件头，之后每个通道一个平面，
    /// 扫描线自下而上存储。
    pub fn write_sgi_rgb(&self, writer: &mut dyn Writer) -> io::Result<()> {
        let (Ok(width), Ok(height)) = (
            u16::try_from(self.size.width),
            u16::try_from(self.size.height),
        ) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "SGI images are limited to 65535 pixels per side",
            ));
        };
        let components = self.format.components();

        let mut header = Vec::with_capacity(SGI_HEADER_LEN);
        header.extend_from_slice(&SGI_MAGIC.to_be_bytes());
        header.push(0); // verbatim storage
        header.push(1); // bytes per channel
        header.extend_from_slice(&3u16.to_be_bytes());
        header.extend_from_slice(&width.to_be_bytes());
        header.extend_from_slice(&height.to_be_bytes());
        header.extend_from_slice(&(components as u16).to_be_bytes());
        header.extend_from_slice(&0i32.to_be_bytes());
        header.extend_from_slice(&255i32.to_be_bytes());
        header.resize(SGI_HEADER_LEN, 0);
        write_all(writer, &header)?;

        let width = width as usize;
        let mut scanline = vec![0u8; width];
        for channel in 0..components {
            for row in self.pixels.chunks_exact(width * components).rev() {
                for (dst, px) in scanline.iter_mut().zip(row.chunks_exact(components)) {
                    *dst = px[channel];
                }
                write_all(writer, &scanline)?;
            }
        }
        if !writer.flush() {
            return Err(io::Error::other("flushing the SGI image failed"));
        }
        Ok(())
    }
}

fn write_all(writer: &mut dyn Writer, bytes: &[u8]) -> io::Result<()> {
    if writer.write(bytes, true) == bytes.len() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::WriteZero,
            "writer accepted fewer bytes than requested",
        ))
    }
}

/// ### English
/// Reverses row order in place.
///
/// ### 中文
/// 原地反转行顺序。
pub(crate) fn flip_rows(pixels: &mut [u8], stride: usize) {
    if stride == 0 {
        return;
    }
    let height = pixels.len() / stride;
    for y in 0..(height / 2) {
        let top_start = y * stride;
        let bottom_start = (height - y - 1) * stride;
        let (head, tail) = pixels.split_at_mut(bottom_start);
        head[top_start..top_start + stride].swap_with_slice(&mut tail[..stride]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::MemoryWriter;

    fn two_by_two() -> RenderedImage {
        // rows bottom to top: red green / blue white
        let pixels = vec![
            255, 0, 0, 0, 255, 0, //
            0, 0, 255, 255, 255, 255,
        ];
        RenderedImage::from_raw(
            PhysicalSize::new(2, 2),
            PixelFormat::Rgb,
            pixels,
            PixelOrigin::BottomLeft,
        )
        .unwrap()
    }

    #[test]
    fn bottom_left_readback_is_flipped() {
        let image = two_by_two();
        assert_eq!(image.pixel(0, 0), Some(&[0, 0, 255][..]));
        assert_eq!(image.pixel(1, 1), Some(&[0, 255, 0][..]));
        assert!(image.pixel(2, 0).is_none());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let raw = RenderedImage::from_raw(
            PhysicalSize::new(3, 3),
            PixelFormat::Rgba,
            vec![0; 35],
            PixelOrigin::TopLeft,
        );
        assert!(raw.is_none());
    }

    #[test]
    fn odd_height_flip_keeps_middle_row() {
        let mut rows = vec![1, 2, 3];
        flip_rows(&mut rows, 1);
        assert_eq!(rows, vec![3, 2, 1]);
    }

    #[test]
    fn sgi_layout_is_planar_bottom_up() {
        let image = two_by_two();
        let mut writer = MemoryWriter::growable();
        image.write_sgi_rgb(&mut writer).unwrap();

        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), SGI_HEADER_LEN + 2 * 2 * 3);
        assert_eq!(&bytes[..2], &[0x01, 0xDA]);
        assert_eq!(&bytes[10..12], &[0, 3]);
        // red plane: bottom row (red, green) then top row (blue, white)
        assert_eq!(&bytes[SGI_HEADER_LEN..SGI_HEADER_LEN + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn sgi_write_fails_on_short_writer() {
        let image = two_by_two();
        let mut writer = MemoryWriter::new(16, None);
        assert!(image.write_sgi_rgb(&mut writer).is_err());
    }

    #[test]
    fn empty_size_is_rejected() {
        for size in [PhysicalSize::new(0, 3), PhysicalSize::new(3, 0)] {
            let raw = RenderedImage::from_raw(size, PixelFormat::Rgb, vec![], PixelOrigin::TopLeft);
            assert!(raw.is_none());
        }
    }

    #[test]
    fn rgb_gets_opaque_alpha() {
        let rgba = two_by_two().to_rgba_image().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }
}
