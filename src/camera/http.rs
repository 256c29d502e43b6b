use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Read;

use super::{permission_denied, CameraConfig};
use crate::frame::{Frame, Resolution};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// HTTP camera: an MJPEG stream (`multipart/x-mixed-replace`) or a JPEG
/// snapshot endpoint polled once per frame.
pub(super) struct HttpCamera {
    config: CameraConfig,
    stream: Option<HttpStream>,
    /// First frame decoded during `open()`, handed out by the next `next_frame()`.
    pending: Option<Frame>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpCamera {
    pub(super) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            stream: None,
            pending: None,
        }
    }

    pub(super) fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and decode one frame to learn the delivered resolution.
    pub(super) fn open(&mut self) -> Result<Resolution> {
        log::info!(
            "camera: requesting {} (ideal {}x{}, facing={})",
            self.config.url,
            self.config.ideal_width,
            self.config.ideal_height,
            self.config.facing.as_str()
        );
        let response = request(&self.config.url).context("connect to camera stream")?;
        let multipart = response
            .header("Content-Type")
            .unwrap_or("")
            .to_lowercase()
            .contains("multipart");
        let (stream, first) = if multipart {
            let mut mjpeg = MjpegStream::new(response.into_reader());
            let first = mjpeg.read_next_jpeg()?;
            (HttpStream::Mjpeg(mjpeg), first)
        } else {
            let first = read_body(response).context("read jpeg snapshot")?;
            (HttpStream::Snapshot, first)
        };

        let frame = decode_jpeg(&first)?;
        let resolution = frame.resolution();
        self.pending = Some(frame);
        self.stream = Some(stream);
        Ok(resolution)
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("camera stream not connected; call open() first"))?;
        let jpeg = match stream {
            HttpStream::Mjpeg(mjpeg) => mjpeg.read_next_jpeg()?,
            HttpStream::Snapshot => fetch_snapshot(&self.config.url)?,
        };
        decode_jpeg(&jpeg)
    }

    pub(super) fn release(&mut self) {
        self.stream = None;
        self.pending = None;
    }
}

fn request(url: &str) -> Result<ureq::Response> {
    match ureq::get(url).call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code @ (401 | 403), _)) => Err(permission_denied(format!(
            "camera at {} answered HTTP {}",
            url, code
        ))),
        Err(ureq::Error::Status(code, _)) => {
            Err(anyhow!("camera at {} answered HTTP {}", url, code))
        }
        Err(err) => Err(anyhow!("camera at {} unreachable: {}", url, err)),
    }
}

fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
    let response = request(url).with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    read_body(response).context("read jpeg snapshot")
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(anyhow!("jpeg snapshot exceeds {} bytes", MAX_JPEG_BYTES));
    }
    Ok(bytes)
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                // Drop the stalled frame and resync on the next SOI.
                let stalled = find_marker(&self.buffer, 0, SOI).map_or(0, |i| i + 1);
                let next = find_marker(&self.buffer, stalled, SOI).unwrap_or(self.buffer.len() - 1);
                self.buffer.drain(..next);
            }
        }
    }
}

fn decode_jpeg(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    Frame::new(image.into_rgb8().into_raw(), width, height)
}

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;

enum Segments {
    /// End offset, one past the EOI.
    Complete(usize),
    Incomplete,
    Malformed,
}

/// Locate the first complete JPEG in `buffer`.
///
/// Header segments are skipped by their length, so an EOI inside an EXIF
/// thumbnail does not cut the frame short. Headers that do not parse fall
/// back to the first EOI after SOI.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buffer, 0, SOI)?;
    match walk_segments(buffer, start + 2) {
        Segments::Complete(end) => Some((start, end)),
        Segments::Incomplete => None,
        Segments::Malformed => {
            let end = find_marker(buffer, start + 2, EOI)?;
            Some((start, end + 2))
        }
    }
}

fn walk_segments(buffer: &[u8], mut pos: usize) -> Segments {
    loop {
        let Some(&[prefix, marker]) = buffer.get(pos..pos + 2) else {
            return Segments::Incomplete;
        };
        if prefix != 0xFF {
            return Segments::Malformed;
        }
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            EOI => return Segments::Complete(pos + 2),
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            0x00 | SOI => return Segments::Malformed,
            _ => {}
        }

        let Some(&[hi, lo]) = buffer.get(pos + 2..pos + 4) else {
            return Segments::Incomplete;
        };
        let len = u16::from_be_bytes([hi, lo]) as usize;
        if len < 2 {
            return Segments::Malformed;
        }
        pos += 2 + len;

        if marker == SOS {
            // Entropy-coded data never contains FF D9.
            return match find_marker(buffer, pos, EOI) {
                Some(end) => Segments::Complete(end + 2),
                None => Segments::Incomplete,
            };
        }
    }
}

fn find_marker(buffer: &[u8], from: usize, marker: u8) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|w| w == [0xFF, marker])
        .map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tiny_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10]));
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        out
    }

    #[test]
    fn finds_jpeg_bounds_inside_multipart_noise() {
        let buffer = [0x00, 0x11, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x33];
        assert_eq!(find_jpeg_bounds(&buffer), Some((2, 8)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x00]), None);
    }

    /// Outer JPEG with an APP1 segment carrying a complete thumbnail JPEG.
    fn jpeg_with_exif_thumbnail() -> Vec<u8> {
        let outer = tiny_jpeg(8, 6);
        let thumb = tiny_jpeg(2, 2);
        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&thumb);
        let len = (app1.len() + 2) as u16;

        let mut out = outer[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&outer[2..]);
        out
    }

    #[test]
    fn exif_thumbnail_does_not_end_the_frame() {
        let jpeg = jpeg_with_exif_thumbnail();
        let mut buffer = b"--frame\r\n\r\n".to_vec();
        let offset = buffer.len();
        buffer.extend_from_slice(&jpeg);
        buffer.extend_from_slice(b"\r\n--frame");

        assert_eq!(
            find_jpeg_bounds(&buffer),
            Some((offset, offset + jpeg.len()))
        );
        let partial = &buffer[..offset + jpeg.len() - 1];
        assert_eq!(find_jpeg_bounds(partial), None);

        let mut stream = MjpegStream::new(Box::new(Cursor::new(buffer)));
        let frame = decode_jpeg(&stream.read_next_jpeg().unwrap()).unwrap();
        assert_eq!(frame.resolution(), Resolution::new(8, 6));
    }

    #[test]
    fn mjpeg_stream_yields_consecutive_frames() {
        let jpeg = tiny_jpeg(8, 6);
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(&jpeg);
        body.extend_from_slice(b"\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&jpeg);
        body.extend_from_slice(b"\r\n");

        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));
        for _ in 0..2 {
            let frame = decode_jpeg(&stream.read_next_jpeg().unwrap()).unwrap();
            assert_eq!(frame.resolution(), Resolution::new(8, 6));
        }
        assert!(stream.read_next_jpeg().is_err());
    }
}
