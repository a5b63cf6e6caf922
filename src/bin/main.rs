//! conevol CLI
//!
//! Diagnostics for cone schedules, extinction pyramids and renders of
//! synthetic volumes.

#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};
use conevol::prelude::*;
use conevol::render::DEFAULT_LIGHT_CACHE_RESOLUTION;

#[derive(Parser)]
#[command(name = "conevol")]
#[command(version = conevol::VERSION)]
#[command(about = "Cone-traced occlusion and shadows for scalar volumes", long_about = None)]
struct Cli {
    /// Session configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the section table of one cone
    Schedule {
        /// Cone half-angle (degrees)
        #[arg(long, default_value = "20")]
        half_angle: f32,
        /// Maximum sub-rays per section (1, 3 or 7)
        #[arg(long, default_value = "3")]
        packing: u32,
        /// Distance of the first section
        #[arg(long, default_value = "3")]
        initial_step: f32,
        /// Distance to cover
        #[arg(long, default_value = "100")]
        covered: f32,
        /// Pyramid base sigma
        #[arg(long, default_value = "1")]
        sigma0: f64,
    },

    /// Build a pyramid over a synthetic sphere and print its levels
    Pyramid {
        /// Field resolution (cube)
        #[arg(short, long, default_value = "64")]
        resolution: u32,
        /// Level-0 resolution (cube); native when omitted
        #[arg(long)]
        level0: Option<u32>,
    },

    /// Render a synthetic sphere and print image statistics
    Render {
        /// Field resolution (cube)
        #[arg(short, long, default_value = "64")]
        resolution: u32,
        /// Renderer
        #[arg(long, value_enum, default_value = "cone")]
        renderer: RendererArg,
        /// Print a coarse luminance preview
        #[arg(long)]
        preview: bool,
        /// Attenuate lights by shadow cones
        #[arg(long)]
        shadows: bool,
        /// Pre-illumination cache, optionally with its resolution (cube)
        #[arg(long, num_args = 0..=1)]
        light_cache: Option<Option<u32>>,
    },

    /// Write the default configuration as JSON
    DefaultConfig {
        /// Output file
        #[arg(short, long, default_value = "conevol.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RendererArg {
    Null,
    Direct,
    Cone,
}

impl From<RendererArg> for RendererKind {
    fn from(arg: RendererArg) -> Self {
        match arg {
            RendererArg::Null => RendererKind::Null,
            RendererArg::Direct => RendererKind::DirectRayCast,
            RendererArg::Cone => RendererKind::ConeOcclusion,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path).unwrap_or_else(|e| fail("Config error", e)),
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Schedule {
            half_angle,
            packing,
            initial_step,
            covered,
            sigma0,
        } => cmd_schedule(half_angle, packing, initial_step, covered, sigma0),
        Commands::Pyramid { resolution, level0 } => cmd_pyramid(&config, resolution, level0),
        Commands::Render {
            resolution,
            renderer,
            preview,
            shadows,
            light_cache,
        } => {
            config.march.shadows |= shadows;
            if let Some(n) = light_cache {
                config.march.light_cache = Some([n.unwrap_or(DEFAULT_LIGHT_CACHE_RESOLUTION); 3]);
            }
            cmd_render(config, resolution, renderer.into(), preview)
        }
        Commands::DefaultConfig { output } => cmd_default_config(output),
    }
}

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, e);
    process::exit(1);
}

fn demo_scene(resolution: u32) -> Scene {
    let field = sphere_field([resolution; 3], Vec3::ONE, 0.6).unwrap_or_else(|e| fail("Field error", e));
    Scene {
        field,
        transfer_function: TransferFunction::ramp(Vec3::new(1.0, 0.85, 0.7), 0.25),
    }
}

fn cmd_schedule(half_angle: f32, packing: u32, initial_step: f32, covered: f32, sigma0: f64) {
    let mut params = ConeParams {
        max_packing: ConePacking::from_ray_count(packing).unwrap_or_else(|| fail("Invalid packing", packing)),
        ..Default::default()
    };
    params.set_half_angle(half_angle);
    params.set_initial_step(initial_step);
    params.set_covered_distance(covered);

    let mut sampler = ConeGaussianSampler::new(params);
    let schedule = sampler
        .compute_cone_integration_steps(sigma0)
        .unwrap_or_else(|e| fail("Schedule error", e));

    println!(
        "{:>4} {:>10} {:>5} {:>9} {:>8} {:>6} {:>10} {:>10}",
        "#", "distance", "rays", "radius", "sigma", "mip", "amplitude", "integral"
    );
    for (i, s) in schedule.sections.iter().enumerate() {
        println!(
            "{:>4} {:>10.3} {:>5} {:>9.4} {:>8.3} {:>6.2} {:>10.5} {:>10.4}",
            i,
            s.distance_from_origin,
            s.ray_count,
            s.cone_radius,
            s.sampled_sigma,
            s.mip_level,
            s.amplitude,
            s.integral_contribution
        );
    }
    println!(
        "{} sections (1 ray: {}, 3 rays: {}, 7 rays: {})",
        schedule.len(),
        schedule.packing_counts[0],
        schedule.packing_counts[1],
        schedule.packing_counts[2]
    );
    println!(
        "adjacent weights: ray3 {:.5}, ray7 {:.5}",
        schedule.directions.ray3_adjacent_weight(),
        schedule.directions.ray7_adjacent_weight()
    );
}

fn cmd_pyramid(config: &SessionConfig, resolution: u32, level0: Option<u32>) {
    let scene = demo_scene(resolution);
    let mut builder = config.pyramid;
    if let Some(r) = level0 {
        builder.resolution = PyramidResolution::Custom([r; 3]);
    }

    let start = Instant::now();
    let pyramid = builder
        .build(&scene.field, &scene.transfer_function)
        .unwrap_or_else(|e| fail("Pyramid error", e));
    let elapsed = start.elapsed();

    for level in pyramid.levels() {
        let (lo, hi) = level.grid.min_max();
        println!(
            "level {:>2}: {:>4}x{:<4}x{:<4} sigma {:>8.3}  extinction [{:.5}, {:.5}] mean {:.5}",
            level.index,
            level.grid.resolution[0],
            level.grid.resolution[1],
            level.grid.resolution[2],
            level.sigma,
            lo,
            hi,
            level.grid.mean()
        );
    }
    println!("{} levels in {:.2?}", pyramid.level_count(), elapsed);
}

fn cmd_render(mut config: SessionConfig, resolution: u32, renderer: RendererKind, preview: bool) {
    config.renderer = renderer;
    let scene = demo_scene(resolution);
    let camera = Camera::framing(&scene.field.bounds(), 1.5);
    let light = Light {
        position: scene.field.bounds().center() + Vec3::new(1.0, 1.0, 0.5) * scene.field.diagonal(),
        ..Default::default()
    };

    let mut session = RenderSession::new(scene, config).unwrap_or_else(|e| fail("Session error", e));
    let start = Instant::now();
    let image = session.render_frame(&Frame {
        camera,
        lights: vec![light],
    });
    let elapsed = start.elapsed();

    let mean = image.mean();
    let covered = image.pixels.iter().filter(|p| p.w > 0.01).count();
    println!("renderer:  {}", session.renderer().name());
    println!("image:     {}x{} in {:.2?}", image.width, image.height, elapsed);
    println!("mean rgba: {:.4} {:.4} {:.4} {:.4}", mean.x, mean.y, mean.z, mean.w);
    println!(
        "coverage:  {:.1}%",
        100.0 * covered as f32 / image.pixels.len().max(1) as f32
    );

    if preview {
        print_preview(&image);
    }
}

fn print_preview(image: &ColorBuffer) {
    const RAMP: &[u8] = b" .:-=+*#%@";
    let cols = 64.min(image.width);
    let rows = (cols / 2).min(image.height);
    if cols == 0 || rows == 0 {
        return;
    }
    for r in 0..rows {
        let line: String = (0..cols)
            .map(|c| {
                let p = image.get(c * image.width / cols, r * image.height / rows);
                // Darkness over the background reads as density
                let lum = 1.0 - (p.x + p.y + p.z) / 3.0;
                let i = (lum.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32).round() as usize;
                RAMP[i] as char
            })
            .collect();
        println!("{}", line);
    }
}

fn cmd_default_config(output: PathBuf) {
    match SessionConfig::default().save(&output) {
        Ok(()) => println!("Wrote {}", output.display()),
        Err(e) => fail("Save error", e),
    }
}
