//! Pixel-buffer copies between FFmpeg frames and packed buffers.
//!
//! FFmpeg pads each row of a video frame to its line size ("stride"), while
//! [`Frame`](crate::Frame) buffers are tightly packed. These helpers copy
//! row by row when the two layouts differ.

use ffmpeg_next::frame::Video as VideoFrame;

/// Copy plane 0 of an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel of the frame's format
/// (3 for RGB24, 4 for RGBA, 1 for GRAY8).
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_len = width as usize * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_len {
        data[..row_len * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_len]);
        }
        buffer
    }
}

/// Copy a tightly-packed buffer into plane 0 of an FFmpeg video frame that
/// was allocated with matching dimensions and format.
pub(crate) fn buffer_to_frame(
    buffer: &[u8],
    video_frame: &mut VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) {
    let stride = video_frame.stride(0);
    let row_len = width as usize * bytes_per_pixel;
    let data = video_frame.data_mut(0);

    for row in 0..height as usize {
        let src_start = row * row_len;
        let dst_start = row * stride;
        data[dst_start..dst_start + row_len]
            .copy_from_slice(&buffer[src_start..src_start + row_len]);
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::format::Pixel;

    use super::*;

    #[test]
    fn packed_copy_survives_padding() {
        // Odd width forces FFmpeg to pad rows.
        let (width, height) = (5u32, 3u32);
        let buffer: Vec<u8> = (0..width * height * 3).map(|v| v as u8).collect();
        let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
        buffer_to_frame(&buffer, &mut frame, width, height, 3);
        assert_eq!(frame_to_buffer(&frame, width, height, 3), buffer);
    }
}
