//! Minimal RIFF/AVI muxer for MJPG streams.
//!
//! Writes a single-video-stream AVI: `hdrl` (main header + one stream
//! header), `movi` (one `00dc` chunk per JPEG frame, word-aligned), and a
//! terminating `idx1` index. Frame-count and size fields are written as
//! placeholders and patched in `finalize`.

use std::io::{self, Seek, SeekFrom, Write};

const AVIF_HASINDEX: u32 = 0x0000_0010;
const AVIIF_KEYFRAME: u32 = 0x0000_0010;
const PLACEHOLDER: u32 = 0;

pub struct AviWriter<W: Write + Seek> {
    writer: W,
    fps: u32,
    // Positions of the fields patched at finalize.
    riff_size_pos: u64,
    total_frames_pos: u64,
    stream_length_pos: u64,
    movi_size_pos: u64,
    movi_list_pos: u64,
    /// (offset relative to the `movi` fourcc, chunk data size) per frame.
    index: Vec<(u32, u32)>,
}

impl<W: Write + Seek> AviWriter<W> {
    /// Write the container headers for a `width`x`height` stream at `fps`.
    pub fn new(mut writer: W, width: u32, height: u32, fps: u32) -> io::Result<Self> {
        writer.write_all(b"RIFF")?;
        let riff_size_pos = writer.stream_position()?;
        write_u32(&mut writer, PLACEHOLDER)?;
        writer.write_all(b"AVI ")?;

        // hdrl list: avih + one strl.
        writer.write_all(b"LIST")?;
        write_u32(&mut writer, 4 + (8 + 56) + (8 + 4 + (8 + 56) + (8 + 40)))?;
        writer.write_all(b"hdrl")?;

        writer.write_all(b"avih")?;
        write_u32(&mut writer, 56)?;
        write_u32(&mut writer, 1_000_000 / fps.max(1))?; // microseconds per frame
        write_u32(&mut writer, 0)?; // max bytes per second
        write_u32(&mut writer, 0)?; // padding granularity
        write_u32(&mut writer, AVIF_HASINDEX)?;
        let total_frames_pos = writer.stream_position()?;
        write_u32(&mut writer, PLACEHOLDER)?; // total frames
        write_u32(&mut writer, 0)?; // initial frames
        write_u32(&mut writer, 1)?; // stream count
        write_u32(&mut writer, 0)?; // suggested buffer size
        write_u32(&mut writer, width)?;
        write_u32(&mut writer, height)?;
        for _ in 0..4 {
            write_u32(&mut writer, 0)?; // reserved
        }

        writer.write_all(b"LIST")?;
        write_u32(&mut writer, 4 + (8 + 56) + (8 + 40))?;
        writer.write_all(b"strl")?;

        writer.write_all(b"strh")?;
        write_u32(&mut writer, 56)?;
        writer.write_all(b"vids")?;
        writer.write_all(b"MJPG")?;
        write_u32(&mut writer, 0)?; // flags
        write_u32(&mut writer, 0)?; // priority + language
        write_u32(&mut writer, 0)?; // initial frames
        write_u32(&mut writer, 1)?; // scale
        write_u32(&mut writer, fps)?; // rate; rate/scale = fps
        write_u32(&mut writer, 0)?; // start
        let stream_length_pos = writer.stream_position()?;
        write_u32(&mut writer, PLACEHOLDER)?; // length in frames
        write_u32(&mut writer, 0)?; // suggested buffer size
        write_u32(&mut writer, u32::MAX)?; // quality: default
        write_u32(&mut writer, 0)?; // sample size
        write_u32(&mut writer, 0)?; // rcFrame left/top
        write_u32(&mut writer, 0)?; // rcFrame right/bottom

        writer.write_all(b"strf")?;
        write_u32(&mut writer, 40)?;
        write_u32(&mut writer, 40)?; // BITMAPINFOHEADER size
        write_u32(&mut writer, width)?;
        write_u32(&mut writer, height)?;
        write_u32(&mut writer, 1 | (24 << 16))?; // planes + bit count
        writer.write_all(b"MJPG")?;
        write_u32(&mut writer, width * height * 3)?; // size image
        for _ in 0..4 {
            write_u32(&mut writer, 0)?; // pels/meter, colors used/important
        }

        let movi_list_pos = writer.stream_position()?;
        writer.write_all(b"LIST")?;
        let movi_size_pos = writer.stream_position()?;
        write_u32(&mut writer, PLACEHOLDER)?;
        writer.write_all(b"movi")?;

        Ok(Self {
            writer,
            fps,
            riff_size_pos,
            total_frames_pos,
            stream_length_pos,
            movi_size_pos,
            movi_list_pos,
            index: Vec::new(),
        })
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    /// Append one already-encoded JPEG frame.
    pub fn write_jpeg_frame(&mut self, jpeg: &[u8]) -> io::Result<()> {
        let chunk_pos = self.writer.stream_position()?;
        let movi_data_start = self.movi_list_pos + 8;
        let offset = (chunk_pos - movi_data_start) as u32;

        self.writer.write_all(b"00dc")?;
        write_u32(&mut self.writer, jpeg.len() as u32)?;
        self.writer.write_all(jpeg)?;
        if jpeg.len() % 2 == 1 {
            self.writer.write_all(&[0])?;
        }

        self.index.push((offset, jpeg.len() as u32));
        Ok(())
    }

    /// Write the index, patch the deferred size fields, and flush.
    pub fn finalize(mut self) -> io::Result<W> {
        let movi_end = self.writer.stream_position()?;

        self.writer.write_all(b"idx1")?;
        write_u32(&mut self.writer, (self.index.len() * 16) as u32)?;
        for &(offset, size) in &self.index {
            self.writer.write_all(b"00dc")?;
            write_u32(&mut self.writer, AVIIF_KEYFRAME)?;
            write_u32(&mut self.writer, offset)?;
            write_u32(&mut self.writer, size)?;
        }

        let file_end = self.writer.stream_position()?;
        let frames = self.index.len() as u32;

        self.patch(self.riff_size_pos, (file_end - 8) as u32)?;
        self.patch(self.total_frames_pos, frames)?;
        self.patch(self.stream_length_pos, frames)?;
        self.patch(self.movi_size_pos, (movi_end - self.movi_list_pos - 8) as u32)?;

        self.writer.seek(SeekFrom::Start(file_end))?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn patch(&mut self, pos: u64, value: u32) -> io::Result<()> {
        self.writer.seek(SeekFrom::Start(pos))?;
        write_u32(&mut self.writer, value)
    }
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}
