//! CPU-side pixel repacking for plane uploads and the software compositing
//! path.

use bytemuck::{Pod, Zeroable};

use super::frame::{PlaneData, VideoFrame};

/// Upload rows are padded to this many bytes (the GL unpack default).
pub const UPLOAD_ROW_ALIGNMENT: usize = 4;

/// OR-ing a 9/10-bit sample with this yields a half-float in [0.5, 1.0).
pub const HALF_FLOAT_BIAS: u16 = 0x3800;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Per-row transform applied while repacking a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowConversion {
    /// Same format, different stride.
    Copy,
    /// 16-bit samples shifted right into 8 bits.
    DownShift(u32),
    /// 16-bit samples turned into biased half-floats.
    HalfFloat,
}

/// Round `row_bytes` up to the upload row alignment.
pub fn aligned_row_bytes(row_bytes: usize) -> usize {
    row_bytes.next_multiple_of(UPLOAD_ROW_ALIGNMENT)
}

/// Offset and multiplier the consumer applies to recover sample values from
/// biased half-floats of the given bit depth.
pub fn half_float_range(bits_per_channel: u32) -> (f32, f32) {
    let max_input = ((1u32 << bits_per_channel) - 1) as f32;
    // 2048 is 1.0 at the exponent the bias selects.
    (0.5, 2048.0 / max_input)
}

fn read_u16(bytes: &[u8], index: usize) -> u16 {
    bytemuck::pod_read_unaligned(&bytes[index * 2..index * 2 + 2])
}

/// Repack `rows` rows of `src` (row starts `src_stride` apart) into `dst`
/// with rows `dst_stride` apart. `row_bytes` is the output width in bytes.
pub fn repack_rows(
    src: &[u8],
    src_stride: usize,
    rows: usize,
    row_bytes: usize,
    conversion: RowConversion,
    dst_stride: usize,
    dst: &mut Vec<u8>,
) {
    let needed = dst_stride * rows;
    if dst.len() < needed {
        dst.resize(needed, 0);
    }

    for row in 0..rows {
        let src_row = &src[row * src_stride..];
        let dst_row = &mut dst[row * dst_stride..row * dst_stride + row_bytes];
        match conversion {
            RowConversion::Copy => dst_row.copy_from_slice(&src_row[..row_bytes]),
            RowConversion::DownShift(shift) => {
                for (i, out) in dst_row.iter_mut().enumerate() {
                    *out = (read_u16(src_row, i) >> shift) as u8;
                }
            }
            RowConversion::HalfFloat => {
                for (i, out) in dst_row.chunks_exact_mut(2).enumerate() {
                    let value = read_u16(src_row, i) | HALF_FLOAT_BIAS;
                    out.copy_from_slice(bytemuck::bytes_of(&value));
                }
            }
        }
    }
}

/// Sample an 8-bit value at element (x, y), shifting down high-bit-depth
/// samples. Missing planes read as `fallback`.
fn sample(plane: Option<&PlaneData>, x: usize, y: usize, shift: u32, fallback: u8) -> u8 {
    let Some(data) = plane else {
        return fallback;
    };
    let row = &data.data[y * data.stride..];
    if shift == 0 {
        row[x]
    } else {
        (read_u16(row, x) >> shift) as u8
    }
}

/// Convert a planar YUV frame to RGBA (BT.601, limited range) at coded size.
/// `out` is resized to `width * height` pixels.
pub fn yuv_to_rgba(frame: &VideoFrame, out: &mut Vec<Rgba8>) {
    let format = frame.format();
    let size = frame.coded_size();
    let (width, height) = (size.width as usize, size.height as usize);
    let shift = format.bits_per_channel().saturating_sub(8);
    let (sx, sy) = format.sample_size(1);
    let (y_plane, u_plane, v_plane) = (frame.plane(0), frame.plane(1), frame.plane(2));
    let a_plane = if format.num_planes() == 4 {
        frame.plane(3)
    } else {
        None
    };

    out.clear();
    out.reserve(width * height);

    for y in 0..height {
        let cy = y / sy as usize;
        for x in 0..width {
            let cx = x / sx as usize;
            let c = i32::from(sample(y_plane, x, y, shift, 16)) - 16;
            let d = i32::from(sample(u_plane, cx, cy, shift, 128)) - 128;
            let e = i32::from(sample(v_plane, cx, cy, shift, 128)) - 128;
            let a = sample(a_plane, x, y, shift, 255);
            out.push(Rgba8 {
                r: clamp_channel((298 * c + 409 * e + 128) >> 8),
                g: clamp_channel((298 * c - 100 * d - 208 * e + 128) >> 8),
                b: clamp_channel((298 * c + 516 * d + 128) >> 8),
                a,
            });
        }
    }
}

fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
