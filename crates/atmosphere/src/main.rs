//! Headless atmosphere preview: runs a theme for a number of frames while
//! panning and zooming a simulated map, then writes a PNG snapshot.

use anyhow::{bail, Result};
use atmosphere::{config, AtmosphereConfig, AtmosphereHost};
use clap::Parser;
use engine_core::{Rgba, ViewTransform};
use glam::Vec2;
use particles::Theme;
use renderer::{save_font_atlas, ContainerMetrics, HostContainer, RasterSurface};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use viewport::HostViewport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a headless atmosphere snapshot")]
struct Args {
    /// Theme id (cave, dungeon, crypt, grassland, forest, town, tundra, desert, marsh)
    #[arg(long, default_value = "forest")]
    theme: String,

    /// Frames to simulate before the snapshot
    #[arg(long, default_value_t = 180)]
    frames: u32,

    /// Map container width in CSS px
    #[arg(long, default_value_t = 800.0)]
    width: f32,

    /// Map container height in CSS px
    #[arg(long, default_value_t = 600.0)]
    height: f32,

    /// Device pixel ratio
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,

    /// Config file (default: ./atmosphere.ron)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the fog and overlay seeds
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the container at 0x0 for this many frames to exercise deferred sizing
    #[arg(long, default_value_t = 0)]
    layout_delay: u32,

    /// Output PNG
    #[arg(long, default_value = "atmosphere.png")]
    out: PathBuf,

    /// Pace frames with the wall clock instead of a fixed timestep
    #[arg(long)]
    realtime: bool,

    /// Also write the final overlay frame as a vertex/index buffer dump
    #[arg(long)]
    mesh: Option<PathBuf>,

    /// Also write the glyph font atlas PNG that mesh UVs refer to
    #[arg(long)]
    atlas: Option<PathBuf>,
}

/// Tile size of the placeholder map drawn under the atmosphere.
const TILE: f32 = 32.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.theme.parse::<Theme>().is_err() {
        let ids: Vec<&str> = Theme::ALL.iter().map(|t| t.as_str()).collect();
        bail!("unknown theme `{}` (expected one of: {})", args.theme, ids.join(", "));
    }

    let mut cfg = match &args.config {
        Some(path) => AtmosphereConfig::load_from(path),
        None => {
            log::debug!("loading {:?}", config::config_path());
            AtmosphereConfig::load()
        }
    };
    if let Some(seed) = args.seed {
        cfg.fog.seed = seed;
        cfg.overlay.seed = seed;
    }

    let container = Rc::new(HostContainer::new(0.0, 0.0).with_dpr(args.dpr));
    if args.layout_delay == 0 {
        container.set_size(args.width, args.height);
    }
    let mut viewport = HostViewport::new();
    let mut host = AtmosphereHost::new(&cfg, container.clone());
    host.attach_viewport(&mut viewport);
    host.set_theme(&args.theme);

    log::info!(
        "running {} for {} frames at {}x{} (dpr {})",
        args.theme,
        args.frames,
        args.width,
        args.height,
        args.dpr
    );

    let dt = cfg.frame_dt();
    for i in 0..args.frames {
        if i == args.layout_delay && args.layout_delay > 0 {
            log::info!("layout complete after {} frames", i);
            container.set_size(args.width, args.height);
            host.resize();
        }
        // Slow circular pan with a gentle zoom pulse.
        let t = i as f32 * dt;
        viewport.scroll_to(Vec2::new(t.cos() - 1.0, t.sin()) * 24.0);
        if i % 30 == 0 {
            viewport.set_zoom(1.0 + 0.1 * (t * 0.5).sin());
        }
        if args.realtime {
            host.frame_realtime();
            std::thread::sleep(Duration::from_secs_f32(dt));
        } else {
            host.frame(dt);
        }
    }

    let size = container.size();
    let mut target = RasterSurface::new(size.x, size.y, container.device_pixel_ratio())?;
    draw_map(&mut target, host.transform());
    host.compose(&mut target);
    target.save_png(&args.out)?;

    let mesh = host.overlay_mesh();
    log::info!("overlay mesh: {} quads, {} vertices", mesh.quad_count(), mesh.vertices.len());
    if let Some(path) = &args.mesh {
        mesh.write_to(path)?;
        log::info!("wrote {}", path.display());
    }
    if let Some(path) = &args.atlas {
        save_font_atlas(path)?;
        log::info!("wrote {}", path.display());
    }

    if let Some(fog) = host.fog() {
        log::info!(
            "fog: {:?}, {} frames drawn, {} particles skipped",
            fog.state(),
            fog.frames_drawn(),
            fog.skipped_particles()
        );
    }
    log::info!("wrote {}", args.out.display());

    host.destroy(&mut viewport);
    Ok(())
}

/// Checkerboard floor moved by the same transform as the overlay, so the
/// snapshot shows whether particles stay locked to the map.
fn draw_map(target: &mut RasterSurface, view: ViewTransform) {
    let light = Rgba::from_rgb8(58, 52, 46);
    let dark = Rgba::from_rgb8(44, 40, 36);
    let css = target.css_size();
    let (Some(top_left), Some(bottom_right)) = (view.inverse_apply(Vec2::ZERO), view.inverse_apply(css)) else {
        return;
    };
    target.fill_rect(Vec2::ZERO, css, dark);
    let first = (top_left / TILE).floor();
    let last = (bottom_right / TILE).ceil();
    for ty in first.y as i32..last.y as i32 {
        for tx in first.x as i32..last.x as i32 {
            if (tx + ty).rem_euclid(2) == 0 {
                let min = Vec2::new(tx as f32, ty as f32) * TILE;
                target.fill_rect(view.apply(min), view.apply(min + Vec2::splat(TILE)), light);
            }
        }
    }
}
