//! Fetching and decoding file/URL payloads into mono samples.

use std::{
    io::{Cursor, Read},
    path::Path,
};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::source::DecodedAudio;
use crate::SourceError;

/// Upper bound on a fetched stream.
const MAX_FETCH_BYTES: u64 = 256 * 1024 * 1024;

pub fn read_file(path: &Path) -> Result<DecodedAudio, SourceError> {
    let bytes = std::fs::read(path).map_err(SourceError::decode)?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    decode_bytes(bytes, extension)
}

pub fn fetch_url(url: &str) -> Result<DecodedAudio, SourceError> {
    if let Some(path) = url.strip_prefix("file://") {
        return read_file(Path::new(path));
    }

    let response = ureq::get(url).call().map_err(SourceError::decode)?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_FETCH_BYTES)
        .read_to_end(&mut bytes)
        .map_err(SourceError::decode)?;
    tracing::debug!(url, bytes = bytes.len(), "fetched audio stream");

    decode_bytes(bytes, url_extension(url))
}

/// Decodes any container/codec symphonia understands, averaging channels
/// down to mono.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, SourceError> {
    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(SourceError::decode)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SourceError::decode("no supported audio tracks"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(SourceError::decode)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(SourceError::decode(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count().max(1);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                mix_to_mono(buffer.samples(), channels, &mut samples);
            }
            // Corrupt packets are skipped.
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "skipping undecodable packet");
            }
            Err(err) => return Err(SourceError::decode(err)),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(SourceError::decode("stream contains no audio"));
    }

    Ok(DecodedAudio {
        samples: samples.into(),
        sample_rate,
    })
}

fn mix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, extension) = file.rsplit_once('.')?;
    (!extension.is_empty() && extension.len() <= 5).then_some(extension)
}
