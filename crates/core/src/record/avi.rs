//! In-memory RIFF AVI muxer: one Motion-JPEG video stream and one 16-bit
//! mono PCM audio stream.
//!
//! Layout of the finished file:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih                      main header
//!     LIST 'strl' strh strf     stream 0, video (BITMAPINFOHEADER)
//!     LIST 'strl' strh strf     stream 1, audio (WAVEFORMATEX)
//!   LIST 'movi'
//!     00dc | 01wb ...           one chunk per frame / audio block
//!   idx1                        offsets relative to the 'movi' fourcc
//! ```

use crate::RecordingError;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const VIDEO_CHUNK: &[u8; 4] = b"00dc";
const AUDIO_CHUNK: &[u8; 4] = b"01wb";
const PCM_BLOCK_ALIGN: u16 = 2;
/// Leaves room for the headers and the index inside a 32-bit RIFF size.
const MAX_MOVI_BYTES: usize = (u32::MAX as usize) / 2;

/// Parameters of both streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AviFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    id: [u8; 4],
    offset: u32,
    size: u32,
}

/// Accumulates chunks; [`AviWriter::finish`] assembles the container.
#[derive(Debug)]
pub struct AviWriter {
    format: AviFormat,
    movi: Vec<u8>,
    index: Vec<IndexEntry>,
    video_frames: u32,
    audio_bytes: u32,
    largest_chunk: u32,
}

impl AviWriter {
    pub fn new(format: AviFormat) -> Self {
        Self {
            format,
            movi: Vec::new(),
            index: Vec::new(),
            video_frames: 0,
            audio_bytes: 0,
            largest_chunk: 0,
        }
    }

    pub fn format(&self) -> AviFormat {
        self.format
    }

    pub fn video_frames(&self) -> u32 {
        self.video_frames
    }

    /// Audio samples written so far.
    pub fn audio_samples(&self) -> u32 {
        self.audio_bytes / PCM_BLOCK_ALIGN as u32
    }

    /// Appends one encoded JPEG frame.
    pub fn push_video(&mut self, jpeg: &[u8]) -> Result<(), RecordingError> {
        self.push_chunk(*VIDEO_CHUNK, jpeg)?;
        self.video_frames += 1;
        Ok(())
    }

    /// Appends one block of little-endian 16-bit PCM samples.
    pub fn push_audio(&mut self, pcm: &[u8]) -> Result<(), RecordingError> {
        if pcm.is_empty() {
            return Ok(());
        }
        self.push_chunk(*AUDIO_CHUNK, pcm)?;
        self.audio_bytes += pcm.len() as u32;
        Ok(())
    }

    fn push_chunk(&mut self, id: [u8; 4], data: &[u8]) -> Result<(), RecordingError> {
        let padded = data.len() + data.len() % 2;
        if self.movi.len() + padded + 8 > MAX_MOVI_BYTES {
            return Err(RecordingError::StreamCreationFailure(
                "recording exceeds the AVI size limit".into(),
            ));
        }
        let size = data.len() as u32;
        self.index.push(IndexEntry {
            id,
            // Offsets count from the 'movi' fourcc, which precedes the chunks.
            offset: 4 + self.movi.len() as u32,
            size,
        });
        self.movi.extend_from_slice(&id);
        self.movi.extend_from_slice(&size.to_le_bytes());
        self.movi.extend_from_slice(data);
        if data.len() % 2 == 1 {
            self.movi.push(0);
        }
        self.largest_chunk = self.largest_chunk.max(size);
        Ok(())
    }

    /// Assembles headers, chunk list and index into a complete file.
    pub fn finish(self) -> Vec<u8> {
        let hdrl = self.header_list();
        let idx1_len = 8 + self.index.len() * 16;
        let movi_list_len = 12 + self.movi.len();
        let riff_len = 4 + hdrl.len() + movi_list_len + idx1_len;

        let mut out = Vec::with_capacity(8 + riff_len);
        out.extend_from_slice(b"RIFF");
        put_u32(&mut out, riff_len as u32);
        out.extend_from_slice(b"AVI ");
        out.extend_from_slice(&hdrl);

        out.extend_from_slice(b"LIST");
        put_u32(&mut out, (movi_list_len - 8) as u32);
        out.extend_from_slice(b"movi");
        out.extend_from_slice(&self.movi);

        out.extend_from_slice(b"idx1");
        put_u32(&mut out, (self.index.len() * 16) as u32);
        for entry in &self.index {
            out.extend_from_slice(&entry.id);
            put_u32(&mut out, AVIIF_KEYFRAME);
            put_u32(&mut out, entry.offset);
            put_u32(&mut out, entry.size);
        }
        out
    }

    fn header_list(&self) -> Vec<u8> {
        let AviFormat {
            width,
            height,
            fps,
            sample_rate,
        } = self.format;
        let fps = fps.max(1);
        let byte_rate = sample_rate * PCM_BLOCK_ALIGN as u32;

        let mut avih = Vec::with_capacity(56);
        put_u32(&mut avih, 1_000_000 / fps);
        put_u32(&mut avih, self.largest_chunk.saturating_mul(fps).saturating_add(byte_rate));
        put_u32(&mut avih, 0);
        put_u32(&mut avih, AVIF_HASINDEX);
        put_u32(&mut avih, self.video_frames);
        put_u32(&mut avih, 0);
        put_u32(&mut avih, 2);
        put_u32(&mut avih, self.largest_chunk);
        put_u32(&mut avih, width);
        put_u32(&mut avih, height);
        avih.extend_from_slice(&[0; 16]);

        let video_header = stream_header(StreamHeader {
            kind: b"vids",
            handler: b"MJPG",
            scale: 1,
            rate: fps,
            length: self.video_frames,
            buffer_size: self.largest_chunk,
            sample_size: 0,
            frame: (width, height),
        });
        let mut bitmap = Vec::with_capacity(40);
        put_u32(&mut bitmap, 40);
        put_u32(&mut bitmap, width);
        put_u32(&mut bitmap, height);
        put_u16(&mut bitmap, 1);
        put_u16(&mut bitmap, 24);
        bitmap.extend_from_slice(b"MJPG");
        put_u32(&mut bitmap, width.saturating_mul(height).saturating_mul(3));
        bitmap.extend_from_slice(&[0; 16]);

        let audio_header = stream_header(StreamHeader {
            kind: b"auds",
            handler: &[0; 4],
            scale: PCM_BLOCK_ALIGN as u32,
            rate: byte_rate,
            length: self.audio_samples(),
            buffer_size: byte_rate,
            sample_size: PCM_BLOCK_ALIGN as u32,
            frame: (0, 0),
        });
        let mut wave = Vec::with_capacity(18);
        put_u16(&mut wave, 1);
        put_u16(&mut wave, 1);
        put_u32(&mut wave, sample_rate);
        put_u32(&mut wave, byte_rate);
        put_u16(&mut wave, PCM_BLOCK_ALIGN);
        put_u16(&mut wave, 16);
        put_u16(&mut wave, 0);

        let video = list(b"strl", &[chunk(b"strh", &video_header), chunk(b"strf", &bitmap)]);
        let audio = list(b"strl", &[chunk(b"strh", &audio_header), chunk(b"strf", &wave)]);
        list(b"hdrl", &[chunk(b"avih", &avih), video, audio])
    }
}

struct StreamHeader<'a> {
    kind: &'a [u8; 4],
    handler: &'a [u8; 4],
    scale: u32,
    rate: u32,
    length: u32,
    buffer_size: u32,
    sample_size: u32,
    frame: (u32, u32),
}

fn stream_header(header: StreamHeader<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(56);
    out.extend_from_slice(header.kind);
    out.extend_from_slice(header.handler);
    put_u32(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, header.scale);
    put_u32(&mut out, header.rate);
    put_u32(&mut out, 0);
    put_u32(&mut out, header.length);
    put_u32(&mut out, header.buffer_size);
    put_u32(&mut out, u32::MAX);
    put_u32(&mut out, header.sample_size);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, header.frame.0.min(u16::MAX as u32) as u16);
    put_u16(&mut out, header.frame.1.min(u16::MAX as u32) as u16);
    out
}

fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len() + 1);
    out.extend_from_slice(id);
    put_u32(&mut out, data.len() as u32);
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = children.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(12 + body);
    out.extend_from_slice(b"LIST");
    put_u32(&mut out, (4 + body) as u32);
    out.extend_from_slice(kind);
    for child in children {
        out.extend_from_slice(child);
    }
    out
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Converts `[-1, 1]` samples into little-endian 16-bit PCM.
pub fn pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
}
