//! Transcoder argument construction

use super::SourceDescriptor;
use crate::config::{AudioMode, TranscoderConfig};

/// Fragmented MP4 flags: empty initial index, a fragment per keyframe and
/// self-contained fragments so the decoder can start mid-stream
const FRAGMENTED_MP4_FLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";

/// Build the transcoder command line for a source
pub fn build_args(config: &TranscoderConfig, source: &SourceDescriptor) -> Vec<String> {
    let mut args = config.global_args.clone();

    // Low-latency input options only for pull-based real-time sources
    if source.is_pull_realtime() {
        args.extend([
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            "-fflags".to_string(),
            "+nobuffer+genpts".to_string(),
            "-probesize".to_string(),
            config.probe_size.clone(),
            "-analyzeduration".to_string(),
            config.analyze_duration_us.to_string(),
        ]);
    }

    args.extend(["-i".to_string(), source.as_str().to_string()]);

    match config.audio {
        AudioMode::Strip => args.push("-an".to_string()),
        AudioMode::Aac => args.extend(["-c:a".to_string(), "aac".to_string()]),
    }

    args.extend([
        "-c:v".to_string(),
        config.video_codec.clone(),
        "-preset".to_string(),
        config.preset.clone(),
        "-tune".to_string(),
        config.tune.clone(),
        "-muxdelay".to_string(),
        config.mux_delay.clone(),
        "-f".to_string(),
        "mp4".to_string(),
        "-movflags".to_string(),
        FRAGMENTED_MP4_FLAGS.to_string(),
        // stdout
        "-".to_string(),
    ]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_rtsp_args() {
        let config = TranscoderConfig::default();
        let source = SourceDescriptor::parse("rtsp://cam1/live").unwrap();
        let args = build_args(&config, &source);

        let transport = position(&args, "-rtsp_transport").unwrap();
        assert_eq!(args[transport + 1], "tcp");
        assert_eq!(args[position(&args, "-fflags").unwrap() + 1], "+nobuffer+genpts");
        assert_eq!(args[position(&args, "-probesize").unwrap() + 1], "500k");
        assert_eq!(
            args[position(&args, "-analyzeduration").unwrap() + 1],
            "1000000"
        );

        // Input options must precede -i
        let input = position(&args, "-i").unwrap();
        assert!(transport < input);
        assert_eq!(args[input + 1], "rtsp://cam1/live");
    }

    #[test]
    fn test_common_output_args() {
        let config = TranscoderConfig::default();
        let source = SourceDescriptor::parse("rtmp://cam2/app/stream").unwrap();
        let args = build_args(&config, &source);

        assert!(position(&args, "-rtsp_transport").is_none());
        assert!(position(&args, "-an").is_some());
        assert_eq!(args[position(&args, "-preset").unwrap() + 1], "ultrafast");
        assert_eq!(args[position(&args, "-tune").unwrap() + 1], "zerolatency");
        assert_eq!(args[position(&args, "-f").unwrap() + 1], "mp4");
        assert_eq!(
            args[position(&args, "-movflags").unwrap() + 1],
            FRAGMENTED_MP4_FLAGS
        );
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert_eq!(&args[..3], &["-hide_banner", "-loglevel", "warning"]);
    }

    #[test]
    fn test_aac_audio() {
        let config = TranscoderConfig {
            audio: AudioMode::Aac,
            ..Default::default()
        };
        let source = SourceDescriptor::parse("http://cam3/stream.m3u8").unwrap();
        let args = build_args(&config, &source);

        assert!(position(&args, "-an").is_none());
        assert_eq!(args[position(&args, "-c:a").unwrap() + 1], "aac");
    }
}
