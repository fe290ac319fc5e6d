//! XVID (MPEG-4) recording via ffmpeg.
//!
//! Mirrors the decode direction used for file ingestion elsewhere in the
//! stack: one format context, one codec context, one RGB->YUV scaler.
//! Only compiled with the `record-ffmpeg` feature.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::RecordError;
use crate::frame::Frame;

fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

pub(crate) struct XvidRecorder {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl XvidRecorder {
    pub(crate) fn open(
        path: &Path,
        frame_rate: u32,
        dimensions: (u32, u32),
    ) -> Result<Self, RecordError> {
        let (width, height) = dimensions;
        let open = || -> Result<Self, ffmpeg::Error> {
            ffmpeg::init()?;
            let mut output = ffmpeg::format::output(&path)?;

            let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
                .ok_or(ffmpeg::Error::EncoderNotFound)?;
            let mut stream = output.add_stream(codec)?;

            let mut video = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
                .encoder()
                .video()?;
            video.set_width(width);
            video.set_height(height);
            video.set_format(ffmpeg::format::Pixel::YUV420P);
            video.set_time_base(ffmpeg::Rational(1, frame_rate as i32));
            video.set_frame_rate(Some(ffmpeg::Rational(frame_rate as i32, 1)));
            // The AVI muxer writes the codec tag verbatim; request XVID
            // rather than ffmpeg's default FMP4.
            unsafe {
                (*video.as_mut_ptr()).codec_tag = fourcc(b"XVID");
            }

            let encoder = video.open_as(codec)?;
            stream.set_parameters(&encoder);
            stream.set_time_base(ffmpeg::Rational(1, frame_rate as i32));

            let scaler = ffmpeg::software::scaling::Context::get(
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::format::Pixel::YUV420P,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )?;

            output.write_header()?;
            // The muxer may have adjusted the time base while writing the
            // header; packets are rescaled against what it settled on.
            let stream_time_base = output
                .stream(0)
                .map(|s| s.time_base())
                .unwrap_or(ffmpeg::Rational(1, frame_rate as i32));
            Ok(Self {
                output,
                encoder,
                scaler,
                stream_time_base,
                width,
                height,
                pts: 0,
            })
        };
        open().map_err(|e| RecordError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let mut rgb = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        copy_rgb_into(frame, &mut rgb);

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .map_err(|e| RecordError::Encode(e.to_string()))?;
        yuv.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| RecordError::Encode(e.to_string()))?;
        self.drain_packets()
    }

    pub(crate) fn close(mut self) -> Result<(), RecordError> {
        self.encoder
            .send_eof()
            .map_err(|e| RecordError::Finalize(e.to_string()))?;
        self.drain_packets()
            .map_err(|e| RecordError::Finalize(e.to_string()))?;
        self.output
            .write_trailer()
            .map_err(|e| RecordError::Finalize(e.to_string()))?;
        Ok(())
    }

    fn drain_packets(&mut self) -> Result<(), RecordError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder.time_base(), self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| RecordError::Write(std::io::Error::other(e.to_string())))?;
        }
        Ok(())
    }
}

fn copy_rgb_into(frame: &Frame, dst: &mut ffmpeg::frame::Video) {
    let row_bytes = frame.width() as usize * 3;
    let stride = dst.stride(0);
    let data = dst.data_mut(0);
    for row in 0..frame.height() as usize {
        let src = &frame.data()[row * row_bytes..(row + 1) * row_bytes];
        data[row * stride..row * stride + row_bytes].copy_from_slice(src);
    }
}
