// tests/test_sift.rs — Integration tests for the SIFT patch descriptor.
//
// Run with `cargo test --test test_sift`.

use ndarray::{s, Array3, Array4, ArrayD, IxDyn};

use morphsift::image::Image;
use morphsift::sift::{
    extract_patches, get_sift_bin_ksize_stride_pad, get_sift_pooling_kernel, sift_describe,
    SiftConfig, SiftDescriptor,
};
use morphsift::Error;

// ===== Pooling kernel & geometry =====

#[test]
fn pooling_kernel_shape() {
    for ksize in [5, 13, 25] {
        let k = get_sift_pooling_kernel(ksize).unwrap();
        assert_eq!(k.dim(), (ksize, ksize));
    }
}

#[test]
fn pooling_kernel_peaks_in_the_middle() {
    let k = get_sift_pooling_kernel(6).unwrap();
    // k2 = 3, profile = [0.5, 1.5, 2.5, 2.5, 1.5, 0.5] / 3
    assert!((k[[2, 3]] - 6.25 / 9.0).abs() < 1e-6);
    assert!((k[[0, 0]] - 0.25 / 9.0).abs() < 1e-6);
    let peak = k.iter().cloned().fold(f32::MIN, f32::max);
    assert!((peak - k[[2, 2]]).abs() < 1e-7);
}

#[test]
fn bin_geometry_reference_values() {
    assert_eq!(get_sift_bin_ksize_stride_pad(41, 3).unwrap(), (20, 13, 5));
    assert_eq!(get_sift_bin_ksize_stride_pad(32, 4).unwrap(), (12, 8, 3));
    assert_eq!(get_sift_bin_ksize_stride_pad(19, 3).unwrap(), (8, 6, 2));
    assert_eq!(get_sift_bin_ksize_stride_pad(15, 4).unwrap(), (6, 3, 1));
    assert_eq!(get_sift_bin_ksize_stride_pad(6, 1).unwrap(), (6, 6, 1));
}

#[test]
fn bin_geometry_rejects_tiny_patch() {
    let err = get_sift_bin_ksize_stride_pad(4, 4).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

// ===== Output shapes =====

#[test]
fn describe_shape() {
    let inp = Array4::<f32>::ones((1, 1, 32, 32));
    let sift = SiftDescriptor::new(SiftConfig::new(32)).unwrap();
    assert_eq!(sift.describe(&inp).unwrap().dim(), (1, 128));
}

#[test]
fn describe_batch_shape() {
    let inp = Array4::<f32>::ones((2, 1, 15, 15));
    let sift = SiftDescriptor::new(SiftConfig::new(15)).unwrap();
    assert_eq!(sift.describe(&inp).unwrap().dim(), (2, 128));
}

#[test]
fn describe_batch_shape_non_standard() {
    let inp = Array4::<f32>::ones((3, 1, 19, 19));
    let cfg = SiftConfig::new(19).with_ang_bins(5).with_spatial_bins(3);
    let sift = SiftDescriptor::new(cfg).unwrap();
    assert_eq!(sift.describe(&inp).unwrap().dim(), (3, 3 * 3 * 5));
}

#[test]
fn describe_accepts_dynamic_rank_arrays() {
    let inp = ArrayD::<f32>::ones(IxDyn(&[2, 1, 16, 16]));
    let out = sift_describe(&inp, SiftConfig::new(16)).unwrap();
    assert_eq!(out.dim(), (2, 128));
}

// ===== Display =====

#[test]
fn display_names_every_parameter() {
    let sift = SiftDescriptor::new(SiftConfig::default()).unwrap();
    assert_eq!(
        sift.to_string(),
        "SiftDescriptor(num_ang_bins=8, num_spatial_bins=4, patch_size=41, rootsift=true, clipval=0.2)"
    );
}

// ===== Values =====

#[test]
fn toy_patch_vertical_edge() {
    // Bright left half, dark right half: every gradient points left (π),
    // which lands exactly on angular bin 2 of 4.
    let mut patch = Array4::<f32>::ones((1, 1, 6, 6));
    patch.slice_mut(s![0, 0, .., 3..]).fill(0.0);
    let cfg = SiftConfig::new(6)
        .with_ang_bins(4)
        .with_spatial_bins(1)
        .with_clipval(0.2)
        .with_rootsift(false);
    let out = SiftDescriptor::new(cfg).unwrap().describe(&patch).unwrap();
    let expected = [0.0, 0.0, 1.0, 0.0];
    for (i, (&got, want)) in out.iter().zip(expected).enumerate() {
        assert!((got - want).abs() < 1e-3, "bin {i}: expected {want}, got {got}");
    }
}

#[test]
fn descriptor_is_invariant_to_brightness_offset() {
    let patch = Array4::from_shape_fn((1, 1, 21, 21), |(_, _, y, x)| {
        ((x as f32 * 0.7).sin() + (y as f32 * 0.3).cos()) * 0.25
    });
    let shifted = patch.mapv(|v| v + 0.5);
    let sift = SiftDescriptor::new(SiftConfig::new(21)).unwrap();
    let a = sift.describe(&patch).unwrap();
    let b = sift.describe(&shifted).unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-4);
    }
}

#[test]
fn batch_entries_are_independent() {
    let mut batch = Array4::<f32>::zeros((2, 1, 16, 16));
    batch.slice_mut(s![0, 0, .., 8..]).fill(1.0);
    batch.slice_mut(s![1, 0, 8.., ..]).fill(1.0);
    let sift = SiftDescriptor::new(SiftConfig::new(16)).unwrap();
    let both = sift.describe(&batch).unwrap();
    let second = sift.describe(&batch.slice(s![1..2, .., .., ..])).unwrap();
    for (x, y) in both.row(1).iter().zip(second.row(0).iter()) {
        assert!((x - y).abs() < 1e-6);
    }
    assert!(both.row(0).iter().zip(both.row(1).iter()).any(|(x, y)| (x - y).abs() > 1e-2));
}

// ===== Errors =====

#[test]
fn wrong_patch_size_is_shape_error() {
    let sift = SiftDescriptor::new(SiftConfig::new(32)).unwrap();
    let err = sift.describe(&Array4::<f32>::ones((1, 1, 31, 32))).unwrap_err();
    assert!(matches!(err, Error::Shape(_)), "{err}");
}

#[test]
fn multichannel_input_is_shape_error() {
    let sift = SiftDescriptor::new(SiftConfig::new(16)).unwrap();
    assert!(matches!(
        sift.describe(&Array4::<f32>::ones((1, 3, 16, 16))),
        Err(Error::Shape(_))
    ));
}

#[test]
fn rank3_input_is_shape_error() {
    let sift = SiftDescriptor::new(SiftConfig::new(16)).unwrap();
    assert!(matches!(
        sift.describe(&Array3::<f32>::ones((1, 16, 16))),
        Err(Error::Shape(_))
    ));
}

// ===== Patch extraction =====

#[test]
fn extracted_patches_feed_the_descriptor() {
    let img = Image::from_fn(64, 48, |x, y| ((x * 13 + y * 7) % 256) as u8);
    let centers = [(20, 20), (40, 24), (32, 30)];
    let patches = extract_patches(&img, &centers, 32).unwrap();
    assert_eq!(patches.dim(), (3, 1, 32, 32));
    // Top-left of the patch centred at (20, 20) is image pixel (4, 4).
    assert!((patches[[0, 0, 0, 0]] - img.get(4, 4) as f32 / 255.0).abs() < 1e-6);

    let desc = sift_describe(&patches, SiftConfig::new(32)).unwrap();
    assert_eq!(desc.dim(), (3, 128));
    assert!(desc.iter().all(|v| v.is_finite()));
}
