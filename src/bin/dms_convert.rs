//! dms-convert: convert a glTF/GLB model into a DMS file
//!
//! Usage:
//!   dms-convert <input.gltf> [-o output.dms] [--fps 30] [--no-reduce] [--static]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dms_engine::{dms_file, gltf_import::{import_gltf, ImportOptions}, optimize::{build_model, KeyframeThresholds}};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// glTF or GLB file to convert
    input: PathBuf,

    /// Output path. Defaults to the input path with a .dms extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rate animations are resampled at, in frames per second
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// Keep every sampled keyframe
    #[arg(long)]
    no_reduce: bool,

    #[arg(long, default_value_t = 0.001)]
    position_threshold: f32,

    #[arg(long, default_value_t = 0.001)]
    rotation_threshold: f32,

    #[arg(long, default_value_t = 0.001)]
    scale_threshold: f32,

    /// Ignore skins & animations and write a static model
    #[arg(long = "static")]
    static_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps <= 0.0 {
        anyhow::bail!("--fps must be positive, got {}", args.fps);
    }

    let options = ImportOptions {
        sample_rate: args.fps,
        thresholds: KeyframeThresholds {
            position: args.position_threshold,
            rotation: args.rotation_threshold,
            scale: args.scale_threshold,
        },
        reduce_keyframes: !args.no_reduce,
        static_only: args.static_only,
    };

    let output = args.output.clone().unwrap_or_else(|| args.input.with_extension("dms"));

    let source = import_gltf(&args.input, &options)
        .with_context(|| format!("import '{}'", args.input.display()))?;
    let model = build_model(source)
        .context("optimize model")?;
    dms_file::save(&model, &output)
        .with_context(|| format!("write '{}'", output.display()))?;

    log::info!("Wrote {} ({} meshes, {} animations)", output.display(), model.meshes.len(), model.animation_count());

    Ok(())
}
