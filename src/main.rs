mod decode;
mod error;
mod gpu;
mod math;
mod params;
mod viewer;

#[cfg(test)]
mod tests;

// Re-export public API
pub use decode::{DecodedImage, Decoder};
pub use error::BlurError;
pub use gpu::{BlurPipeline, FilterPolicy, GpuContext};
pub use params::BlurParams;
pub use viewer::{ViewerConfig, run_viewer};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        println!("Usage: blurview [IMAGE]");
        println!();
        println!("Interactive GPU blur viewer.");
        println!("Pass an image path to load it at startup, or press O in the viewer.");
        return;
    }

    let mut config = ViewerConfig::default();
    if let Some(path) = args.get(1) {
        config.initial_image = Some(path.into());
    }

    if let Err(e) = run_viewer(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
