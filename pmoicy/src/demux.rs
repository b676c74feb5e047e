//! ICY frame demuxer
//!
//! Sans-IO state machine splitting an ICY byte stream into audio chunks and
//! metadata blocks. The server sends exactly `metaint` audio bytes, then one
//! length byte `n`, then `n × 16` bytes of metadata, and starts over.
//!
//! ```text
//! | metaint audio bytes | n | n*16 metadata | metaint audio bytes | 0 | ...
//! ```
//!
//! The demuxer does not care how the input is chunked: feeding the stream
//! byte by byte or in one piece produces the same audio and metadata.

use crate::error::{Error, Result};
use crate::metadata::{decode_block_text, MetadataBlock};
use bytes::Bytes;
use tracing::{debug, warn};

/// Output of the demuxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcyFrame {
    /// Audio bytes, in stream order, with metadata removed
    Audio(Bytes),
    /// A non-empty metadata block
    Metadata(MetadataBlock),
}

impl IcyFrame {
    pub fn as_audio(&self) -> Option<&Bytes> {
        match self {
            IcyFrame::Audio(bytes) => Some(bytes),
            IcyFrame::Metadata(_) => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataBlock> {
        match self {
            IcyFrame::Metadata(block) => Some(block),
            IcyFrame::Audio(_) => None,
        }
    }
}

#[derive(Debug)]
enum State {
    Audio { remaining: usize },
    Length,
    Metadata { expected: usize, buf: Vec<u8> },
    Failed { desync: bool, message: String },
}

/// Incremental ICY demuxer
#[derive(Debug)]
pub struct IcyDemuxer {
    metaint: usize,
    strict: bool,
    state: State,
    audio_bytes: u64,
    metadata_blocks: u64,
    empty_blocks: u64,
    skipped_blocks: u64,
}

impl IcyDemuxer {
    /// Creates a demuxer for the interval declared by the server.
    ///
    /// `metaint == 0` means the stream carries no metadata: every byte is audio.
    pub fn new(metaint: usize) -> Self {
        Self {
            metaint,
            strict: false,
            state: State::Audio { remaining: metaint },
            audio_bytes: 0,
            metadata_blocks: 0,
            empty_blocks: 0,
            skipped_blocks: 0,
        }
    }

    /// Demuxer without metadata interleaving
    pub fn passthrough() -> Self {
        Self::new(0)
    }

    /// Fail on malformed tag text instead of logging and skipping the block
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn metaint(&self) -> usize {
        self.metaint
    }

    /// Audio bytes emitted so far
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    /// Non-empty metadata blocks emitted so far
    pub fn metadata_blocks(&self) -> u64 {
        self.metadata_blocks
    }

    /// Blocks with a zero length byte ("no change")
    pub fn empty_blocks(&self) -> u64 {
        self.empty_blocks
    }

    /// Blocks dropped because their text could not be parsed
    pub fn skipped_blocks(&self) -> u64 {
        self.skipped_blocks
    }

    /// Audio bytes consumed since the last metadata block.
    ///
    /// Equals `metaint` while the demuxer waits for, or reads, a metadata block.
    pub fn interval_offset(&self) -> usize {
        match &self.state {
            State::Audio { remaining } if self.metaint > 0 => self.metaint - remaining,
            State::Audio { .. } => 0,
            _ => self.metaint,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed { .. })
    }

    /// Feeds bytes read from the connection.
    ///
    /// Frames are appended to `out`. On error, the frames decoded before the
    /// faulty block are still in `out`, and the demuxer stays failed: every
    /// later call returns the same error.
    pub fn push(&mut self, mut input: &[u8], out: &mut Vec<IcyFrame>) -> Result<()> {
        if let Some(err) = self.failure() {
            return Err(err);
        }

        if self.metaint == 0 {
            if !input.is_empty() {
                self.audio_bytes += input.len() as u64;
                out.push(IcyFrame::Audio(Bytes::copy_from_slice(input)));
            }
            return Ok(());
        }

        while !input.is_empty() {
            match &mut self.state {
                State::Audio { remaining } => {
                    let n = (*remaining).min(input.len());
                    out.push(IcyFrame::Audio(Bytes::copy_from_slice(&input[..n])));
                    self.audio_bytes += n as u64;
                    input = &input[n..];
                    *remaining -= n;
                    if *remaining == 0 {
                        self.state = State::Length;
                    }
                }
                State::Length => {
                    let expected = input[0] as usize * 16;
                    input = &input[1..];
                    if expected == 0 {
                        self.empty_blocks += 1;
                        self.state = State::Audio {
                            remaining: self.metaint,
                        };
                    } else {
                        self.state = State::Metadata {
                            expected,
                            buf: Vec::with_capacity(expected),
                        };
                    }
                }
                State::Metadata { expected, buf } => {
                    let n = (*expected - buf.len()).min(input.len());
                    buf.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    if buf.len() == *expected {
                        let payload = std::mem::take(buf);
                        self.state = State::Audio {
                            remaining: self.metaint,
                        };
                        self.handle_block(&payload, out)?;
                    }
                }
                State::Failed { .. } => unreachable!("checked before the loop"),
            }
        }

        Ok(())
    }

    /// Signals the end of the stream.
    ///
    /// Ending inside a metadata block is a desync; ending inside audio, or
    /// right before a length byte, is a clean end.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if let State::Metadata { expected, buf } = &self.state {
            let message = format!(
                "stream ended after {} of {} metadata bytes",
                buf.len(),
                expected
            );
            return Err(self.fail(Error::desync(message)));
        }
        Ok(())
    }

    fn handle_block(&mut self, payload: &[u8], out: &mut Vec<IcyFrame>) -> Result<()> {
        let text = match decode_block_text(payload) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(len = payload.len(), "Metadata block holds only padding");
                self.empty_blocks += 1;
                return Ok(());
            }
            Err(err) => return Err(self.fail(err)),
        };

        match MetadataBlock::parse(&text, self.audio_bytes) {
            Ok(block) => {
                self.metadata_blocks += 1;
                out.push(IcyFrame::Metadata(block));
                Ok(())
            }
            Err(err) if self.strict => Err(self.fail(err)),
            Err(err) => {
                warn!("Skipping ICY metadata block: {}", err);
                self.skipped_blocks += 1;
                Ok(())
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        let desync = matches!(err, Error::Desync(_));
        let message = match &err {
            Error::Desync(msg) | Error::Decode(msg) => msg.clone(),
            other => other.to_string(),
        };
        self.state = State::Failed { desync, message };
        err
    }

    fn failure(&self) -> Option<Error> {
        match &self.state {
            State::Failed {
                desync: true,
                message,
            } => Some(Error::desync(message.clone())),
            State::Failed {
                desync: false,
                message,
            } => Some(Error::decode(message.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::encode_metadata_block;

    /// Builds an ICY stream: each element is (audio, metadata text)
    fn build_stream(metaint: usize, parts: &[(&[u8], &str)]) -> Vec<u8> {
        let mut stream = Vec::new();
        for (audio, text) in parts {
            assert_eq!(audio.len(), metaint);
            stream.extend_from_slice(audio);
            stream.extend_from_slice(&encode_metadata_block(text).unwrap());
        }
        stream
    }

    fn collect(frames: &[IcyFrame]) -> (Vec<u8>, Vec<MetadataBlock>) {
        let mut audio = Vec::new();
        let mut blocks = Vec::new();
        for frame in frames {
            match frame {
                IcyFrame::Audio(bytes) => audio.extend_from_slice(bytes),
                IcyFrame::Metadata(block) => blocks.push(block.clone()),
            }
        }
        (audio, blocks)
    }

    #[test]
    fn test_demux_single_push() {
        let stream = build_stream(
            8,
            &[
                (&b"AAAAAAAA"[..], "StreamTitle='One';"),
                (&b"BBBBBBBB"[..], ""),
                (&b"CCCCCCCC"[..], "StreamTitle='Two';"),
            ],
        );
        let mut demuxer = IcyDemuxer::new(8);
        let mut frames = Vec::new();
        demuxer.push(&stream, &mut frames).unwrap();
        demuxer.finish().unwrap();

        let (audio, blocks) = collect(&frames);
        assert_eq!(audio, b"AAAAAAAABBBBBBBBCCCCCCCC");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].stream_title(), Some("One"));
        assert_eq!(blocks[0].audio_offset(), 8);
        assert_eq!(blocks[1].stream_title(), Some("Two"));
        assert_eq!(blocks[1].audio_offset(), 24);
        assert_eq!(demuxer.metadata_blocks(), 2);
        assert_eq!(demuxer.empty_blocks(), 1);
    }

    #[test]
    fn test_demux_is_independent_of_chunking() {
        let stream = build_stream(
            16,
            &[
                (&[1u8; 16][..], "StreamTitle='Artist - Song';StreamUrl='http://a/b';"),
                (&[2u8; 16][..], ""),
                (&[3u8; 16][..], "StreamTitle='Next';"),
            ],
        );

        let mut whole = Vec::new();
        let mut demuxer = IcyDemuxer::new(16);
        demuxer.push(&stream, &mut whole).unwrap();

        for chunk_size in [1usize, 2, 3, 7, 17, 64] {
            let mut frames = Vec::new();
            let mut demuxer = IcyDemuxer::new(16);
            for chunk in stream.chunks(chunk_size) {
                demuxer.push(chunk, &mut frames).unwrap();
            }
            demuxer.finish().unwrap();
            assert_eq!(collect(&frames), collect(&whole), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_audio_between_metadata_equals_interval() {
        let metaint = 32;
        let mut stream = Vec::new();
        for i in 0..5u8 {
            stream.extend_from_slice(&[i; 32]);
            stream.extend_from_slice(
                &encode_metadata_block(&format!("StreamTitle='Track {}';", i)).unwrap(),
            );
        }

        let mut frames = Vec::new();
        let mut demuxer = IcyDemuxer::new(metaint);
        for chunk in stream.chunks(5) {
            demuxer.push(chunk, &mut frames).unwrap();
        }

        let mut audio_since_last = 0usize;
        let mut blocks = 0;
        for frame in &frames {
            match frame {
                IcyFrame::Audio(bytes) => audio_since_last += bytes.len(),
                IcyFrame::Metadata(block) => {
                    assert_eq!(audio_since_last, metaint);
                    assert_eq!(block.audio_offset() % metaint as u64, 0);
                    audio_since_last = 0;
                    blocks += 1;
                }
            }
        }
        assert_eq!(blocks, 5);
    }

    #[test]
    fn test_interval_offset_tracks_position() {
        let mut demuxer = IcyDemuxer::new(10);
        let mut frames = Vec::new();
        assert_eq!(demuxer.interval_offset(), 0);
        demuxer.push(&[0u8; 4], &mut frames).unwrap();
        assert_eq!(demuxer.interval_offset(), 4);
        demuxer.push(&[0u8; 6], &mut frames).unwrap();
        assert_eq!(demuxer.interval_offset(), 10);
        demuxer.push(&[0u8], &mut frames).unwrap(); // bloc vide
        assert_eq!(demuxer.interval_offset(), 0);
    }

    #[test]
    fn test_passthrough() {
        let mut demuxer = IcyDemuxer::passthrough();
        let mut frames = Vec::new();
        demuxer.push(b"StreamTitle='x';", &mut frames).unwrap();
        demuxer.finish().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_audio().unwrap().as_ref(), b"StreamTitle='x';");
        assert_eq!(demuxer.interval_offset(), 0);
    }

    #[test]
    fn test_truncated_block_is_desync_on_finish() {
        let mut stream = vec![7u8; 8];
        stream.push(2); // 32 bytes annoncés
        stream.extend_from_slice(b"StreamTitle='cut");

        let mut demuxer = IcyDemuxer::new(8);
        let mut frames = Vec::new();
        demuxer.push(&stream, &mut frames).unwrap();
        let (audio, _) = collect(&frames);
        assert_eq!(audio, vec![7u8; 8]);

        let err = demuxer.finish().unwrap_err();
        assert!(matches!(err, Error::Desync(_)));
        assert!(demuxer.is_failed());
    }

    #[test]
    fn test_end_at_length_byte_is_clean() {
        let mut demuxer = IcyDemuxer::new(4);
        let mut frames = Vec::new();
        demuxer.push(b"abcd", &mut frames).unwrap();
        demuxer.finish().unwrap();
    }

    #[test]
    fn test_binary_block_is_desync_and_keeps_audio() {
        let mut stream = vec![1u8; 8];
        stream.push(1);
        // des octets audio (trame MP3) à la place du texte
        stream.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64, 0x00, 0x0F, 0xF0, 0x00, 0x05, 0xAA, 0, 0, 0, 0, 0, 0]);
        stream.extend_from_slice(&[2u8; 8]);

        let mut demuxer = IcyDemuxer::new(8);
        let mut frames = Vec::new();
        let err = demuxer.push(&stream, &mut frames).unwrap_err();
        assert!(matches!(err, Error::Desync(_)));

        // L'audio livré avant le bloc n'est pas perdu
        let (audio, blocks) = collect(&frames);
        assert_eq!(audio, vec![1u8; 8]);
        assert!(blocks.is_empty());

        // Non redémarrable
        let mut more = Vec::new();
        assert!(matches!(
            demuxer.push(&[0u8; 4], &mut more),
            Err(Error::Desync(_))
        ));
        assert!(more.is_empty());
    }

    #[test]
    fn test_malformed_text_is_skipped_by_default() {
        let stream = build_stream(4, &[(&b"aaaa"[..], "garbage text"), (&b"bbbb"[..], "StreamTitle='ok';")]);
        let mut demuxer = IcyDemuxer::new(4);
        let mut frames = Vec::new();
        demuxer.push(&stream, &mut frames).unwrap();

        let (audio, blocks) = collect(&frames);
        assert_eq!(audio, b"aaaabbbb");
        assert_eq!(blocks.len(), 1);
        assert_eq!(demuxer.skipped_blocks(), 1);
    }

    #[test]
    fn test_malformed_text_fails_in_strict_mode() {
        let stream = build_stream(4, &[(&b"aaaa"[..], "garbage text"), (&b"bbbb"[..], "StreamTitle='ok';")]);
        let mut demuxer = IcyDemuxer::new(4).strict(true);
        let mut frames = Vec::new();
        let err = demuxer.push(&stream, &mut frames).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(collect(&frames).0, b"aaaa");
        assert!(matches!(demuxer.finish(), Err(Error::Decode(_))));
    }
}
