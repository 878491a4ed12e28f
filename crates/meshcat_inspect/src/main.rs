// Inspect a meshcat HTML recording and print what an importer would create.
// Run with: cargo run --release --bin meshcat_inspect -- <recording.html>

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use meshcat_core::{build_export, ImportOptions, Recording, SceneGraph};

/// Meshcat Inspect - summarize the scene in a meshcat recording
#[derive(Parser)]
#[command(name = "meshcat_inspect")]
#[command(version)]
struct Args {
    /// Recording exported from a meshcat viewer
    input: PathBuf,

    /// JSON file with import options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the frame rate the recording was captured at
    #[arg(long)]
    recording_fps: Option<f64>,

    #[arg(long)]
    target_fps: Option<f64>,

    #[arg(long)]
    start_frame: Option<i64>,

    /// Keep every keyframe instead of resampling to the target rate
    #[arg(long)]
    no_downsample: bool,

    /// Print the full export as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn options(&self) -> Result<ImportOptions> {
        let mut options = match &self.config {
            Some(path) => ImportOptions::from_path(path)
                .with_context(|| format!("failed to load options from {}", path.display()))?,
            None => ImportOptions::default(),
        };
        if self.recording_fps.is_some() {
            options.recording_fps = self.recording_fps;
        }
        if let Some(fps) = self.target_fps {
            options.target_fps = fps;
        }
        if let Some(frame) = self.start_frame {
            options.start_frame = frame;
        }
        if self.no_downsample {
            options.downsample = false;
        }
        options.validate().context("invalid import options")?;
        Ok(options)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let options = args.options()?;

    log::info!("Loading recording: {}", args.input.display());
    let recording = Recording::from_path(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut graph = SceneGraph::with_assets(recording.assets.clone());
    let stats = graph.process(&recording.commands);
    log::info!(
        "{} applied, {} ignored, {} no-op",
        stats.applied,
        stats.ignored,
        stats.no_op
    );

    let scene = build_export(&graph, &options);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&scene)?);
        return Ok(());
    }

    let extraction = &recording.stats;
    println!("Payloads:  {}", extraction.payloads_found);
    println!(
        "Commands:  {} ({} undecodable, {} unknown)",
        extraction.commands, extraction.decode_failures, extraction.unknown_commands
    );
    println!("Assets:    {}", recording.assets.len());
    println!(
        "Nodes:     {} ({} mesh, {} animated)",
        graph.node_count(),
        graph.mesh_nodes().count(),
        graph.animated_nodes().count()
    );
    println!(
        "Animation: {} fps -> {} fps",
        scene.recording_fps, scene.target_fps
    );
    if let Some((first, last)) = scene.frame_range {
        println!("Frames:    {}..={}", first, last);
    }

    println!("\nFound {} object(s), {} excluded", scene.objects.len(), scene.excluded);
    for object in &scene.objects {
        let t = &object.world_transform;
        println!("\n=== {} ===", object.name);
        println!("Path:     {}", object.path);
        println!("Geometry: {}", object.geometry);
        if let Some(material) = &object.material {
            println!(
                "Material: {:?} color ({:.3}, {:.3}, {:.3}) opacity {:.2}",
                material.kind, material.color.x, material.color.y, material.color.z, material.opacity
            );
        }
        println!(
            "Position: ({:.3}, {:.3}, {:.3})",
            t.translation.x, t.translation.y, t.translation.z
        );
        if !object.visible {
            println!("Hidden");
        }
        if let Some(source) = &object.animation_source {
            println!("Animated: {} keyframe(s) from {}", object.keyframes.len(), source);
        }
    }

    Ok(())
}
