//! Background image decoding with supersede semantics.
//!
//! Decoding runs on a dedicated worker thread so large images never stall the
//! event loop. Each request carries a generation number; results from a
//! request that was superseded by a newer one are discarded on arrival, so
//! the last *issued* load always wins regardless of decode completion order.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use crate::error::BlurError;

/// A decoded image ready for texture upload: tightly packed RGBA8 rows,
/// top to bottom.
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

struct Job {
    generation: u64,
    path: PathBuf,
}

struct Outcome {
    generation: u64,
    result: Result<DecodedImage, BlurError>,
}

/// Handle to the decode worker. Dropping it shuts the worker down.
pub struct Decoder {
    jobs: Sender<Job>,
    outcomes: Receiver<Outcome>,
    generation: u64,
}

impl Decoder {
    pub fn new() -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>();

        thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let result = decode_file(&job.path);
                // Receiver gone means the app is shutting down.
                if outcome_tx
                    .send(Outcome {
                        generation: job.generation,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            jobs: job_tx,
            outcomes: outcome_rx,
            generation: 0,
        }
    }

    /// Queue a decode of `path`, superseding any request still in flight.
    pub fn request(&mut self, path: PathBuf) {
        self.generation += 1;
        log::info!("loading image {:?}", path);
        // The worker outlives every sender unless the process is exiting.
        let _ = self.jobs.send(Job {
            generation: self.generation,
            path,
        });
    }

    /// Drain finished decodes, returning the newest-generation result if the
    /// latest request has completed. Superseded results are dropped silently.
    pub fn poll(&mut self) -> Option<Result<DecodedImage, BlurError>> {
        let mut latest = None;
        loop {
            match self.outcomes.try_recv() {
                Ok(outcome) if outcome.generation == self.generation => {
                    latest = Some(outcome.result);
                }
                Ok(stale) => {
                    log::debug!("discarding superseded decode (gen {})", stale.generation);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_file(path: &std::path::Path) -> Result<DecodedImage, BlurError> {
    let image = image::open(path)
        .map_err(|source| BlurError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();

    let (width, height) = image.dimensions();
    Ok(DecodedImage {
        pixels: image.into_raw(),
        width,
        height,
    })
}
