/// Menu OCR worker binary
use menu_ocr_recognition::TesseractRecognizer;
use menu_ocr_worker::{Worker, WorkerConfig};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Menu OCR Worker v0.1.0");

    let config = WorkerConfig::default();

    // The recognizer is the one construction that may refuse to start:
    // without language data there is nothing this process can do.
    let recognizer = match TesseractRecognizer::new(config.recognizer.clone()) {
        Ok(recognizer) => Arc::new(recognizer),
        Err(e) => {
            error!("Failed to initialize recognizer: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "OCR worker initialized. Database: {}, shared root: {}",
        config.queue.database,
        config.shared_root.display()
    );

    Worker::new(config, recognizer).run().await;
}
