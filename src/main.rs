//! Command-line driver: run a 1D pulse-in-a-box problem and report the
//! frequency response at a probe point.

use anyhow::Result;
use clap::Parser;
use nalgebra::Vector3;
use tracing::info;

use fdtd_core::{
    BoundarySet, Component, DftRegion, PmlConfig, Simulation, SimulationConfig, Source,
    SourceTime,
};

#[derive(Parser, Debug)]
#[command(name = "fdtd-run", about = "Run a 1D FDTD demo problem", version)]
struct Args {
    /// Domain length in normalized units.
    #[arg(long, default_value_t = 10.0)]
    size: f64,

    /// Lattice points per unit length.
    #[arg(long, default_value_t = 20.0)]
    resolution: f64,

    /// Courant factor.
    #[arg(long, default_value_t = 0.5)]
    courant: f64,

    /// Source center frequency.
    #[arg(long, default_value_t = 0.65)]
    fcen: f64,

    /// Source spectral width.
    #[arg(long, default_value_t = 0.2)]
    fwidth: f64,

    /// Absorber thickness on both ends (0 for metallic walls).
    #[arg(long, default_value_t = 1.0)]
    pml: f64,

    /// Simulated run time.
    #[arg(long, default_value_t = 60.0)]
    time: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = SimulationConfig {
        size: [args.size, 0.0, 0.0],
        resolution: args.resolution,
        courant: args.courant,
        ..Default::default()
    };

    let boundaries = if args.pml > 0.0 {
        let mut b = BoundarySet::new();
        for side in [fdtd_core::Side::Lo, fdtd_core::Side::Hi] {
            b.declare(
                0,
                side,
                fdtd_core::Boundary::Pml(PmlConfig {
                    thickness: args.pml,
                    ..Default::default()
                }),
            )?;
        }
        b
    } else {
        BoundarySet::new()
    };

    let scene = fdtd_core::Scene::vacuum();
    let mut sim = Simulation::new(config, &scene, boundaries, None)?;

    let source_pos = Vector3::new(args.size / 2.0, 0.0, 0.0);
    sim.add_source(Source::new(
        source_pos,
        Component::Ez,
        SourceTime::gaussian(args.fcen, args.fwidth),
    ));

    let probe = Vector3::new(args.size / 4.0, 0.0, 0.0);
    let freqs: Vec<f64> = (0..9)
        .map(|i| args.fcen + (i as f64 - 4.0) / 4.0 * args.fwidth)
        .collect();
    let dft = sim.add_dft(&DftRegion::point(
        probe,
        vec![Component::Ez],
        freqs.clone(),
    ))?;

    info!(size = args.size, resolution = args.resolution, "starting run");
    sim.run(args.time)?;
    info!(steps = sim.step_count(), t = sim.time(), "run finished");

    println!("# freq  |Ez(f)|  at probe x = {:.3}", probe[0]);
    for (fi, f) in freqs.iter().enumerate() {
        let v = sim.dft(dft).value_at(
            Component::Ez,
            [(probe[0] * args.resolution).round() as usize, 0, 0],
            fi,
        )?;
        println!("{f:.4}  {:.6e}", v.norm());
    }
    Ok(())
}
