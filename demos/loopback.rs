//! Loopback - a harness and a tracker in one process.
//!
//! This example demonstrates:
//! - Connecting both roles over an in-memory duplex stream
//! - Running the tracker as a task and driving it from the client
//! - Reading elapsed time and overlap from each reply
//!
//! ```sh
//! RUST_LOG=trax::wire=trace cargo run --example loopback
//! ```

use trax_protocol::codec::{Image, ImageList, Properties, Region};
use trax_protocol::session::{Metadata, ObjectList};
use trax_protocol::{Client, Request, Response, Server};
use tracing_subscriber::EnvFilter;

const FRAMES: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("loopback=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let (harness, tracker) = tokio::io::duplex(64 * 1024);
    let (tracker_read, tracker_write) = tokio::io::split(tracker);

    // Tracker: shifts its region one pixel right per frame.
    let tracker = tokio::spawn(async move {
        let metadata = Metadata::default().with_name("drift");
        let mut server = Server::start(metadata, tracker_read, tracker_write).await?;
        let mut region = Region::special(0);
        loop {
            match server.wait().await? {
                Request::Initialize { objects, .. } => {
                    if let Some(initial) = objects.first_region() {
                        region = initial.clone();
                    }
                }
                Request::Frame { .. } => {
                    if let Region::Rectangle(mut rect) = region {
                        rect.x += 1.0;
                        region = Region::Rectangle(rect);
                    }
                }
                Request::Quit { .. } => return Ok::<_, trax_protocol::TraxError>(()),
            }
            server
                .status(&ObjectList::from(region.clone()), &Properties::new())
                .await?;
        }
    });

    let (harness_read, harness_write) = tokio::io::split(harness);
    let mut client = Client::connect(harness_read, harness_write).await?;
    tracing::info!("Connected to tracker '{}'", client.metadata().name);

    let ground_truth = Region::rectangle(100.0, 80.0, 40.0, 30.0);
    let frame = |index: usize| ImageList::from(Image::path(format!("/seq/{:08}.jpg", index + 1)));

    let mut response = client
        .initialize(&frame(0), &ObjectList::from(ground_truth.clone()), &Properties::new())
        .await?;
    for index in 1..=FRAMES {
        match response {
            Response::Status {
                ref objects,
                elapsed,
                ..
            } => {
                if let Some(region) = objects.first_region() {
                    let overlap = region.overlap(&ground_truth, None)?;
                    tracing::info!("Frame {}: {} overlap {:.3} in {:?}", index, region, overlap, elapsed);
                }
            }
            Response::Quit { ref reason, .. } => {
                tracing::warn!("Tracker quit: {:?}", reason);
                break;
            }
        }
        if index < FRAMES {
            response = client.frame(&frame(index), &Properties::new(), None).await?;
        }
    }

    client.quit(Some("evaluation complete")).await?;
    tracker.await??;
    Ok(())
}
