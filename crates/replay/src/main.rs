//! Brushwork replay - run a stroke script headlessly and save the layer

mod logging;
mod replay;
mod script;

use std::path::PathBuf;

use anyhow::Context;
use brushwork_config::BackendKind;
use brushwork_engine::{DabDevice, SoftwareDevice, StrokeEngine};
use clap::Parser;
use tracing::info;

use script::Script;

#[derive(Parser, Debug)]
#[command(about = "Replay a JSON stroke script through the Brushwork engine")]
struct Args {
    /// Stroke script to replay.
    script: PathBuf,
    /// Where to write the committed layer as PNG.
    #[arg(short, long, default_value = "replay.png")]
    output: PathBuf,
    /// Device backend (software or wgpu). Defaults to BRUSHWORK_BACKEND, then the script.
    #[arg(short, long, value_parser = parse_backend)]
    backend: Option<BackendKind>,
    /// Pointer samples delivered between display frames.
    #[arg(long, default_value_t = 4)]
    points_per_frame: usize,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_backend(val: &str) -> Result<BackendKind, String> {
    match val.trim().to_ascii_lowercase().as_str() {
        "software" | "cpu" => Ok(BackendKind::Software),
        "wgpu" | "gpu" => Ok(BackendKind::Wgpu),
        other => Err(format!("Unknown backend '{}' (expected software or wgpu)", other)),
    }
}

fn make_device(backend: BackendKind) -> anyhow::Result<Box<dyn DabDevice>> {
    match backend {
        BackendKind::Software => Ok(Box::new(SoftwareDevice::new())),
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu => {
            let device = brushwork_engine::WgpuDevice::new().context("Failed to create wgpu device")?;
            Ok(Box::new(device))
        }
        #[cfg(not(feature = "wgpu"))]
        BackendKind::Wgpu => anyhow::bail!("This build does not include the wgpu backend"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let script = Script::load(&args.script)?;
    let mut config = script.engine.clone();
    if let Some(backend) = args.backend {
        config.backend = backend;
    } else if std::env::var(brushwork_config::BACKEND_ENV).is_ok() {
        config.backend = BackendKind::from_env();
    }

    info!(
        "Replaying {} strokes on a {}x{} canvas ({:?} backend)",
        script.strokes.len(),
        config.width,
        config.height,
        config.backend
    );

    let device = make_device(config.backend)?;
    let mut engine = StrokeEngine::new(device, config)?;
    let layer = replay::blank_layer(&engine);
    let report = replay::run(&mut engine, &script, &layer, args.points_per_frame);

    let (width, height, pixels) = {
        let layer = layer
            .lock()
            .map_err(|_| anyhow::anyhow!("Layer lock poisoned"))?;
        (layer.width, layer.height, layer.to_rgba8())
    };
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("Layer size does not match its pixel buffer")?;
    image
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        "Wrote {} ({} strokes committed, {} previews reused)",
        args.output.display(),
        report.committed,
        report.reused_previews
    );
    Ok(())
}
