// demos/sift_demo.rs
//
// Describe patches on a regular grid of a grayscale image and report the
// nearest neighbour of each descriptor among the others.
//
// Usage:
//   cargo run --example sift_demo --release -- <input> [patch_size] [grid_step]
//
// Defaults: 41×41 patches every 48 pixels.

use std::env;
use std::path::Path;

use ndarray::{Array2, Axis};
use tracing::info;

use morphsift::image::Image;
use morphsift::sift::{extract_patches, SiftConfig, SiftDescriptor};
use morphsift::telemetry;

fn main() {
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("tracing disabled: {e}");
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <input> [patch_size] [grid_step]", args[0]);
        std::process::exit(1);
    }
    let img = load_grayscale(Path::new(&args[1]));
    let patch_size: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(41);
    let step: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(48).max(1);

    let half = patch_size / 2;
    let mut centers = Vec::new();
    let mut y = half;
    while y + patch_size - half <= img.height() {
        let mut x = half;
        while x + patch_size - half <= img.width() {
            centers.push((x, y));
            x += step;
        }
        y += step;
    }
    if centers.len() < 2 {
        eprintln!("image too small for two {patch_size}×{patch_size} patches");
        std::process::exit(1);
    }

    let sift = SiftDescriptor::new(SiftConfig::new(patch_size))
        .unwrap_or_else(|e| panic!("bad patch size: {e}"));
    println!("{sift}");

    let patches = extract_patches(&img, &centers, patch_size).unwrap_or_else(|e| panic!("{e}"));
    let start = std::time::Instant::now();
    let desc = sift.describe(&patches).unwrap_or_else(|e| panic!("{e}"));
    info!(
        patches = centers.len(),
        dim = desc.ncols(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
        "described"
    );

    let dists = pairwise_l2(&desc);
    for (i, row) in dists.axis_iter(Axis(0)).enumerate().take(10) {
        let (j, d) = row
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .fold((i, f32::INFINITY), |best, (j, &d)| if d < best.1 { (j, d) } else { best });
        println!("{:?} → nearest {:?} (L2 {d:.4})", centers[i], centers[j]);
    }
}

fn pairwise_l2(desc: &Array2<f32>) -> Array2<f32> {
    let n = desc.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        desc.row(i)
            .iter()
            .zip(desc.row(j).iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    })
}

fn load_grayscale(path: &Path) -> Image<u8> {
    let img = image::open(path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e));
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    Image::from_vec(w as usize, h as usize, gray.into_raw())
}
