//! Dummy Tracker - reports the initialization region on every frame.
//!
//! This example demonstrates:
//! - Advertising tracker metadata with the server builder
//! - Opening the transport named by `TRAX_SOCKET` or `TRAX_IN`/`TRAX_OUT`
//!   (stdin/stdout when neither is set)
//! - Answering every request with `status`
//!
//! # Running
//!
//! ```sh
//! printf '@@TRAX:initialize file:///tmp/1.jpg 10,10,50,50\n@@TRAX:frame file:///tmp/2.jpg\n@@TRAX:quit\n' \
//!     | RUST_LOG=debug cargo run --example dummy_tracker
//! ```

use trax_protocol::codec::{ImageKind, Properties, RegionKind};
use trax_protocol::session::{ImageFormats, Metadata, ObjectList, RegionFormats};
use trax_protocol::{Request, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout may be the protocol channel.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trax_protocol=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let metadata = Metadata::new(
        RegionFormats::of(&[RegionKind::Rectangle, RegionKind::Polygon]),
        ImageFormats::of(&[ImageKind::Path, ImageKind::Url]),
    )
    .with_name("dummy")
    .with_description("Reports the initialization region on every frame")
    .with_family("static")
    .with_custom("dummy.frames", 0)?;

    let mut server = Server::builder(metadata).start_from_env().await?;

    let mut objects = ObjectList::new();
    let mut frames = 0u64;
    loop {
        match server.wait().await? {
            Request::Initialize {
                objects: initial, ..
            } => {
                tracing::info!("Initialized with {} object(s)", initial.len());
                objects = initial;
                frames = 0;
            }
            Request::Frame { .. } => frames += 1,
            Request::Quit { properties } => {
                tracing::info!(
                    "Client quit after {} frame(s): {}",
                    frames,
                    properties.get("trax.reason").unwrap_or("no reason")
                );
                break;
            }
        }

        let mut properties = Properties::new();
        properties.set("dummy.frames", frames)?;
        server.status(&objects, &properties).await?;
    }

    Ok(())
}
