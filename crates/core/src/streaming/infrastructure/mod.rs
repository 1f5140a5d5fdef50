pub mod ffmpeg_hls_encoder;
