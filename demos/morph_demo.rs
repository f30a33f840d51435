// demos/morph_demo.rs
//
// Apply a morphological operator to a grayscale image and save the result.
//
// Usage:
//   cargo run --example morph_demo --release -- <input> <op> [ksize] [output.png]
//
//   op: erode | dilate | open | close | gradient | tophat | blackhat
//
// The structuring element is a flat ksize×ksize square (default 5).
// Set RUST_LOG=debug to see per-call shapes.

use std::env;
use std::path::Path;

use ndarray::Array2;
use tracing::info;

use morphsift::convert::{batch_plane, f32_normalized_to_u8, image_to_batch, u8_to_f32_normalized};
use morphsift::image::Image;
use morphsift::morphology::Morphology;
use morphsift::telemetry;

fn main() {
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("tracing disabled: {e}");
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <op> [ksize] [output.png]", args[0]);
        eprintln!("  op: erode | dilate | open | close | gradient | tophat | blackhat");
        std::process::exit(1);
    }
    let input = Path::new(&args[1]);
    let op_name = args[2].as_str();
    let ksize: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(5);
    let output = args
        .get(4)
        .cloned()
        .unwrap_or_else(|| format!("{op_name}_{ksize}.png"));

    let img = load_grayscale(input);
    info!(width = img.width(), height = img.height(), op = op_name, ksize, "loaded");

    let op = Morphology::new(&Array2::<f32>::ones((ksize, ksize)))
        .unwrap_or_else(|e| panic!("bad kernel size {ksize}: {e}"));
    let batch = image_to_batch(&u8_to_f32_normalized(&img));

    let start = std::time::Instant::now();
    let result = match op_name {
        "erode" => op.erode(&batch),
        "dilate" => op.dilate(&batch),
        "open" => op.open(&batch),
        "close" => op.close(&batch),
        "gradient" => op.gradient(&batch),
        "tophat" => op.top_hat(&batch),
        "blackhat" => op.bottom_hat(&batch),
        other => {
            eprintln!("unknown op: {other}");
            std::process::exit(1);
        }
    }
    .unwrap_or_else(|e| panic!("{op_name} failed: {e}"));
    info!(elapsed_ms = start.elapsed().as_secs_f64() * 1e3, "done");

    let plane = batch_plane(result.view(), 0, 0).unwrap_or_else(|e| panic!("{e}"));
    save_grayscale(&f32_normalized_to_u8(&plane), Path::new(&output));
    println!("wrote {output}");
}

fn load_grayscale(path: &Path) -> Image<u8> {
    let img = image::open(path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e));
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    Image::from_vec(w as usize, h as usize, gray.into_raw())
}

fn save_grayscale(img: &Image<u8>, path: &Path) {
    let raw: Vec<u8> = img.pixels().map(|(_, _, v)| v).collect();
    let gray = image::GrayImage::from_raw(img.width() as u32, img.height() as u32, raw)
        .unwrap_or_else(|| panic!("buffer does not match {}×{}", img.width(), img.height()));
    gray.save(path)
        .unwrap_or_else(|e| panic!("Failed to save {}: {}", path.display(), e));
}
