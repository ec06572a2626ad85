//! Tests for the blur pipeline's GPU-independent parts.

use std::time::{Duration, Instant};

use crate::decode::{DecodedImage, Decoder};
use crate::error::BlurError;
use crate::gpu::blur::{
    self, BlurUniforms, FRAGMENT_SHADER, PassTarget, VERTEX_SHADER, pass_plan,
};
use crate::gpu::texture::{FilterPolicy, mip_level_count};
use crate::gpu::{TextureSlot, validate_sources};
use crate::math::{is_power_of_two, pixel_projection, transform};
use crate::params::BlurParams;

#[test]
fn test_power_of_two_predicate() {
    for v in [1u32, 2, 4, 8, 64, 256, 1024, 4096] {
        assert!(is_power_of_two(v), "{v} is a power of two");
    }
    for v in [0u32, 3, 5, 6, 100, 255, 257, 1000] {
        assert!(!is_power_of_two(v), "{v} is not a power of two");
    }
}

#[test]
fn test_filter_policy_selection() {
    // Both dimensions pow2 -> mipmaps, anything else -> clamp + linear
    assert_eq!(FilterPolicy::for_size(4, 4), FilterPolicy::Mipmapped);
    assert_eq!(FilterPolicy::for_size(256, 256), FilterPolicy::Mipmapped);
    assert_eq!(FilterPolicy::for_size(256, 128), FilterPolicy::Mipmapped);

    assert_eq!(FilterPolicy::for_size(100, 1), FilterPolicy::ClampLinear);
    assert_eq!(FilterPolicy::for_size(1, 100), FilterPolicy::ClampLinear);
    assert_eq!(FilterPolicy::for_size(640, 480), FilterPolicy::ClampLinear);
    assert_eq!(FilterPolicy::for_size(255, 256), FilterPolicy::ClampLinear);
}

#[test]
fn test_filter_policy_matches_predicate() {
    for w in 1u32..=64 {
        for h in 1u32..=64 {
            let expected = if is_power_of_two(w) && is_power_of_two(h) {
                FilterPolicy::Mipmapped
            } else {
                FilterPolicy::ClampLinear
            };
            assert_eq!(FilterPolicy::for_size(w, h), expected, "{w}x{h}");
        }
    }
}

#[test]
fn test_mip_level_count() {
    assert_eq!(mip_level_count(1, 1), 1);
    assert_eq!(mip_level_count(2, 2), 2);
    assert_eq!(mip_level_count(4, 4), 3);
    assert_eq!(mip_level_count(256, 256), 9);
    // Chain length follows the larger axis
    assert_eq!(mip_level_count(256, 16), 9);
}

#[test]
fn test_projection_corner_mapping() {
    // The [0,1]^2 quadrant of the unit quad must span the full viewport:
    // (0,0) lands at clip-space top-left, (1,1) at bottom-right.
    for (w, h) in [(1u32, 1u32), (4, 4), (100, 1), (1920, 1080)] {
        let m = pixel_projection(w, h);

        let top_left = transform(&m, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(top_left, [-1.0, 1.0, 0.0, 1.0], "{w}x{h} top-left");

        let bottom_right = transform(&m, [1.0, 1.0, 0.0, 1.0]);
        assert_eq!(bottom_right, [1.0, -1.0, 0.0, 1.0], "{w}x{h} bottom-right");

        let center = transform(&m, [0.5, 0.5, 0.0, 1.0]);
        assert_eq!(center, [0.0, 0.0, 0.0, 1.0], "{w}x{h} center");
    }
}

#[test]
fn test_params_clamp_to_domain() {
    let mut params = BlurParams::new(-3.0, 5.0);
    assert_eq!(params.radius(), 0.0);
    assert_eq!(params.strength(), 1.0);

    assert_eq!(params.set_radius(10.0), 10.0);
    assert_eq!(params.set_radius(10.5), 10.0);
    assert_eq!(params.set_radius(-0.1), 0.0);
    assert_eq!(params.set_radius(7.0), 7.0);

    assert_eq!(params.set_strength(0.01), 0.01);
    assert_eq!(params.set_strength(0.0), 0.01);
    assert_eq!(params.set_strength(1.2), 1.0);
    assert_eq!(params.set_strength(0.5), 0.5);
}

#[test]
fn test_params_default_is_minimal_blur() {
    let params = BlurParams::default();
    assert_eq!(params.radius(), 0.0);
    assert_eq!(params.strength(), 0.01);
}

#[test]
fn test_pass_plan_gated_on_readiness() {
    // No image loaded -> zero draws
    assert!(pass_plan(false).is_empty());
    assert_eq!(pass_plan(true).len(), 2);
}

#[test]
fn test_pass_plan_ordering() {
    let plan = pass_plan(true);

    // First draw: horizontal, source -> offscreen target, no flip
    assert_eq!(plan[0].target, PassTarget::Offscreen);
    assert_eq!(plan[0].input, TextureSlot::Source);
    assert_eq!(plan[0].direction, [1.0, 0.0]);
    assert_eq!(plan[0].flip, 0);

    // Second draw: vertical, intermediate -> surface, flipped
    assert_eq!(plan[1].target, PassTarget::Surface);
    assert_eq!(plan[1].input, TextureSlot::Intermediate);
    assert_eq!(plan[1].direction, [0.0, 1.0]);
    assert_eq!(plan[1].flip, 1);
}

#[test]
fn test_shipped_shaders_validate() {
    let table = validate_sources(VERTEX_SHADER, FRAGMENT_SHADER)
        .expect("shipped shader assets must validate");

    for name in crate::gpu::REQUIRED_UNIFORMS {
        assert!(table.offset(name).is_some(), "uniform {name} must resolve");
    }
    assert!(table.offset("no_such_uniform").is_none());
}

#[test]
fn test_uniform_offsets_match_cpu_layout() {
    let table = validate_sources(VERTEX_SHADER, FRAGMENT_SHADER).unwrap();

    assert_eq!(
        table.offset("matrix").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, matrix)
    );
    assert_eq!(
        table.offset("resolution").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, resolution)
    );
    assert_eq!(
        table.offset("direction").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, direction)
    );
    assert_eq!(
        table.offset("radius").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, radius)
    );
    assert_eq!(
        table.offset("strength").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, strength)
    );
    assert_eq!(
        table.offset("flip").unwrap() as usize,
        std::mem::offset_of!(BlurUniforms, flip)
    );
}

fn write_test_png(name: &str, color: [u8; 4], width: u32, height: u32) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("blurview_test_{name}.png"));
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
    img.save(&path).expect("failed to write test image");
    path
}

fn wait_for_decode(decoder: &mut Decoder) -> Result<DecodedImage, BlurError> {
    let start = Instant::now();
    loop {
        if let Some(result) = decoder.poll() {
            return result;
        }
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "decode timed out"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_decoder_roundtrip() {
    let path = write_test_png("roundtrip", [255, 0, 0, 255], 4, 4);

    let mut decoder = Decoder::new();
    decoder.request(path.clone());

    let image = wait_for_decode(&mut decoder).expect("decode should succeed");
    assert_eq!((image.width, image.height), (4, 4));
    assert_eq!(image.pixels.len(), 4 * 4 * 4);
    assert_eq!(&image.pixels[0..4], &[255, 0, 0, 255]);

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_decoder_newest_request_wins() {
    let red = write_test_png("super_red", [255, 0, 0, 255], 2, 2);
    let blue = write_test_png("super_blue", [0, 0, 255, 255], 3, 3);

    let mut decoder = Decoder::new();
    decoder.request(red.clone());
    decoder.request(blue.clone());

    // The red decode may well finish first; its result must never surface.
    let image = wait_for_decode(&mut decoder).expect("decode should succeed");
    assert_eq!((image.width, image.height), (3, 3));
    assert_eq!(&image.pixels[0..4], &[0, 0, 255, 255]);

    // And nothing stale is left queued behind it.
    assert!(decoder.poll().is_none());

    let _ = std::fs::remove_file(red);
    let _ = std::fs::remove_file(blue);
}

#[test]
fn test_decoder_surfaces_decode_errors() {
    let mut decoder = Decoder::new();
    decoder.request(std::env::temp_dir().join("blurview_test_does_not_exist.png"));

    let result = wait_for_decode(&mut decoder);
    assert!(matches!(result, Err(BlurError::Decode { .. })));
}

#[test]
fn test_unpad_rows_strips_copy_alignment() {
    // 3px-wide rows (12 bytes) padded out to 256
    let width = 3u32;
    let height = 2u32;
    let padded = 256usize;

    let mut data = vec![0u8; padded * height as usize];
    for row in 0..height as usize {
        for b in 0..12 {
            data[row * padded + b] = (row * 12 + b) as u8;
        }
    }

    let pixels = blur::unpad_rows(&data, width, height, padded);
    assert_eq!(pixels.len(), 24);
    assert_eq!(pixels[0], 0);
    assert_eq!(pixels[11], 11);
    assert_eq!(pixels[12], 12);
    assert_eq!(pixels[23], 23);
}

#[test]
fn test_bgra_swizzle() {
    let mut pixels = vec![1u8, 2, 3, 4, 10, 20, 30, 40];
    blur::bgra_to_rgba(&mut pixels);
    assert_eq!(pixels, vec![3, 2, 1, 4, 30, 20, 10, 40]);
}
