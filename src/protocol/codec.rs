//! Encode/decode for audio packets and video fragments
//!
//! Lengths are validated before any payload is touched; a short or
//! inconsistent datagram is an error for the caller to drop, never a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::{AudioPacket, VideoFragment, AUDIO_HEADER_LEN, VIDEO_HEADER_LEN};

/// Stateless encoder/decoder bound to the session's media parameters
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    /// Interleaved samples per audio packet (period_frames x channels)
    samples_per_period: usize,
    /// Largest fragment payload accepted on the encode side
    max_fragment_payload: usize,
}

impl PacketCodec {
    pub fn new(samples_per_period: usize, max_fragment_payload: usize) -> Self {
        Self {
            samples_per_period,
            max_fragment_payload,
        }
    }

    /// Encoded size of one audio datagram
    pub fn audio_datagram_len(&self) -> usize {
        AUDIO_HEADER_LEN + self.samples_per_period * 2
    }

    /// Encode one capture period
    pub fn encode_audio(
        &self,
        sequence: u32,
        timestamp: u64,
        samples: &[i16],
    ) -> Result<Bytes, ProtocolError> {
        if samples.len() != self.samples_per_period {
            return Err(ProtocolError::InvalidSampleCount {
                expected: self.samples_per_period,
                actual: samples.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(self.audio_datagram_len());
        buf.put_u32(sequence);
        buf.put_u64(timestamp);
        for &sample in samples {
            buf.put_i16(sample);
        }
        Ok(buf.freeze())
    }

    /// Decode one audio datagram
    pub fn decode_audio(&self, mut data: &[u8]) -> Result<AudioPacket, ProtocolError> {
        if data.len() < AUDIO_HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: AUDIO_HEADER_LEN,
                actual: data.len(),
            });
        }

        let sequence = data.get_u32();
        let timestamp = data.get_u64();

        let expected_payload = self.samples_per_period * 2;
        if data.remaining() != expected_payload {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared: expected_payload,
                available: data.remaining(),
            });
        }

        let mut samples = Vec::with_capacity(self.samples_per_period);
        for _ in 0..self.samples_per_period {
            samples.push(data.get_i16());
        }

        Ok(AudioPacket {
            sequence,
            timestamp,
            samples,
        })
    }

    /// Encode one fragment of a compressed frame
    pub fn encode_video_fragment(
        &self,
        frame_sequence: u32,
        fragment_index: u32,
        total_fragments: u32,
        payload: &[u8],
    ) -> Result<Bytes, ProtocolError> {
        if payload.len() > self.max_fragment_payload {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_fragment_payload,
            });
        }

        let is_last = fragment_index == total_fragments.saturating_sub(1);

        let mut buf = BytesMut::with_capacity(VIDEO_HEADER_LEN + payload.len());
        buf.put_u32(frame_sequence);
        buf.put_u32(fragment_index);
        buf.put_u32(total_fragments);
        buf.put_u8(is_last as u8);
        buf.put_u64(payload.len() as u64);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Decode one video fragment datagram
    pub fn decode_video_fragment(&self, mut data: &[u8]) -> Result<VideoFragment, ProtocolError> {
        if data.len() < VIDEO_HEADER_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: VIDEO_HEADER_LEN,
                actual: data.len(),
            });
        }

        let frame_sequence = data.get_u32();
        let fragment_index = data.get_u32();
        let total_fragments = data.get_u32();
        let is_last = data.get_u8() != 0;
        let declared = data.get_u64() as usize;

        if declared > data.remaining() {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared,
                available: data.remaining(),
            });
        }

        Ok(VideoFragment {
            frame_sequence,
            fragment_index,
            total_fragments,
            is_last,
            payload: Bytes::copy_from_slice(&data[..declared]),
        })
    }

    /// Split a compressed frame into ordered fragments ready to send
    pub fn fragment_frame(
        &self,
        frame_sequence: u32,
        frame: &[u8],
    ) -> Result<Vec<Bytes>, ProtocolError> {
        let chunk = self.max_fragment_payload;
        let total = frame.len().div_ceil(chunk).max(1) as u32;

        let mut fragments = Vec::with_capacity(total as usize);
        for (index, piece) in frame.chunks(chunk).enumerate() {
            fragments.push(self.encode_video_fragment(frame_sequence, index as u32, total, piece)?);
        }
        // A frame with no bytes still occupies one (empty) fragment so the
        // receiver sees the sequence advance
        if fragments.is_empty() {
            fragments.push(self.encode_video_fragment(frame_sequence, 0, 1, &[])?);
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> PacketCodec {
        PacketCodec::new(8, 16)
    }

    #[test]
    fn test_audio_roundtrip() {
        let codec = codec();
        let samples: Vec<i16> = vec![0, -1, 1, i16::MIN, i16::MAX, 42, -42, 7];

        let wire = codec.encode_audio(9, 123_456, &samples).unwrap();
        assert_eq!(wire.len(), codec.audio_datagram_len());

        let packet = codec.decode_audio(&wire).unwrap();
        assert_eq!(packet.sequence, 9);
        assert_eq!(packet.timestamp, 123_456);
        assert_eq!(packet.samples, samples);
    }

    #[test]
    fn test_audio_rejects_wrong_sample_count() {
        let err = codec().encode_audio(0, 0, &[0i16; 3]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidSampleCount {
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_audio_decode_short_header() {
        let err = codec().decode_audio(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { .. }));
    }

    #[test]
    fn test_audio_decode_truncated_payload() {
        let codec = codec();
        let wire = codec.encode_audio(1, 2, &[0i16; 8]).unwrap();
        let err = codec.decode_audio(&wire[..wire.len() - 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadLengthMismatch { .. }));
    }

    #[test]
    fn test_video_roundtrip() {
        let codec = codec();
        let wire = codec
            .encode_video_fragment(3, 1, 3, &[0xAB; 10])
            .unwrap();

        let fragment = codec.decode_video_fragment(&wire).unwrap();
        assert_eq!(fragment.frame_sequence, 3);
        assert_eq!(fragment.fragment_index, 1);
        assert_eq!(fragment.total_fragments, 3);
        assert!(!fragment.is_last);
        assert_eq!(&fragment.payload[..], &[0xAB; 10]);
    }

    #[test]
    fn test_video_last_flag_set_on_final_index() {
        let codec = codec();
        let wire = codec.encode_video_fragment(0, 2, 3, &[1]).unwrap();
        assert!(codec.decode_video_fragment(&wire).unwrap().is_last);
    }

    #[test]
    fn test_video_rejects_oversized_payload() {
        let err = codec()
            .encode_video_fragment(0, 0, 1, &[0u8; 17])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_video_decode_declared_length_exceeds_data() {
        let codec = codec();
        let wire = codec.encode_video_fragment(0, 0, 1, &[9; 8]).unwrap();
        // Chop two payload bytes; the declared length now overruns
        let err = codec.decode_video_fragment(&wire[..wire.len() - 2]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadLengthMismatch {
                declared: 8,
                available: 6
            }
        );
    }

    #[test]
    fn test_fragment_frame_splits_and_covers() {
        let codec = codec();
        let frame: Vec<u8> = (0..40u8).collect();

        // 40 bytes at 16 per fragment -> 3 fragments
        let fragments = codec.fragment_frame(7, &frame).unwrap();
        assert_eq!(fragments.len(), 3);

        let mut reassembled = Vec::new();
        for (i, wire) in fragments.iter().enumerate() {
            let fragment = codec.decode_video_fragment(wire).unwrap();
            assert_eq!(fragment.frame_sequence, 7);
            assert_eq!(fragment.fragment_index, i as u32);
            assert_eq!(fragment.total_fragments, 3);
            assert_eq!(fragment.is_last, i == 2);
            reassembled.extend_from_slice(&fragment.payload);
        }
        assert_eq!(reassembled, frame);
    }

    #[test]
    fn test_fragment_frame_single_datagram() {
        let fragments = codec().fragment_frame(0, &[1, 2, 3]).unwrap();
        assert_eq!(fragments.len(), 1);
        let fragment = codec().decode_video_fragment(&fragments[0]).unwrap();
        assert_eq!(fragment.total_fragments, 1);
        assert!(fragment.is_last);
    }

    proptest! {
        #[test]
        fn prop_audio_roundtrip(seq: u32, ts: u64, samples in proptest::collection::vec(any::<i16>(), 8)) {
            let codec = codec();
            let wire = codec.encode_audio(seq, ts, &samples).unwrap();
            let packet = codec.decode_audio(&wire).unwrap();
            prop_assert_eq!(packet.sequence, seq);
            prop_assert_eq!(packet.timestamp, ts);
            prop_assert_eq!(packet.samples, samples);
        }

        #[test]
        fn prop_video_roundtrip(
            frame_seq: u32,
            index in 0u32..16,
            extra in 0u32..16,
            payload in proptest::collection::vec(any::<u8>(), 0..=16),
        ) {
            let codec = codec();
            let total = index + extra + 1;
            let wire = codec.encode_video_fragment(frame_seq, index, total, &payload).unwrap();
            let fragment = codec.decode_video_fragment(&wire).unwrap();
            prop_assert_eq!(fragment.frame_sequence, frame_seq);
            prop_assert_eq!(fragment.fragment_index, index);
            prop_assert_eq!(fragment.total_fragments, total);
            prop_assert_eq!(fragment.is_last, index == total - 1);
            prop_assert_eq!(&fragment.payload[..], &payload[..]);
        }
    }
}
