//! vmiprofile CLI — speed distributions and anisotropy parameters from VMI images.

mod config;
mod input;

use clap::{Args, Parser, Subcommand};
use ndarray::Array2;
use std::path::{Path, PathBuf};

use config::ProfileConfig;
use vmiprofile::{
    angular_integration, anisotropy_per_band, average_radial_intensity, radial_integration,
    BandAnisotropy, Origin, PolarConfig, RadialBand, RadialIntegration, RadialProfile,
    RadialRangeSpec,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "vmiprofile")]
#[command(about = "Radial speed distributions and anisotropy parameters of velocity-map images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate over angle: intensity vs radius (speed distribution).
    Speeds(CliSpeedsArgs),

    /// Mean intensity per unit angle vs radius.
    Average(CliCommonArgs),

    /// Integrate radial bands: intensity vs angle per band.
    Bands(CliBandsArgs),

    /// Fit the anisotropy parameter β for every radial band.
    Anisotropy(CliAnisotropyArgs),
}

#[derive(Debug, Clone, Args)]
struct CliCommonArgs {
    /// Path to the input image (any format `image` decodes, or a .txt/.dat/.csv/.asc matrix).
    #[arg(long)]
    image: PathBuf,

    /// Path to write results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// JSON run configuration; command-line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Image center as ROW,COL (default: rows/2 + rows%2, cols/2 + cols%2).
    #[arg(long, value_parser = parse_origin)]
    origin: Option<Origin>,

    /// Radial step in pixels.
    #[arg(long)]
    dr: Option<f64>,

    /// Angular step in degrees (default: as many angles as image rows).
    #[arg(long)]
    dt: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct CliSpeedsArgs {
    #[command(flatten)]
    common: CliCommonArgs,

    /// Skip the r² sin θ weighting.
    #[arg(long)]
    no_jacobian: bool,
}

#[derive(Debug, Clone, Args)]
struct CliBandSelection {
    /// Sliding-window width in radial grid samples.
    #[arg(long, conflicts_with = "range")]
    step: Option<usize>,

    /// Explicit radial band LO:HI in pixels (repeatable).
    #[arg(long = "range", value_parser = parse_range)]
    range: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Args)]
struct CliBandsArgs {
    #[command(flatten)]
    common: CliCommonArgs,

    #[command(flatten)]
    bands: CliBandSelection,
}

#[derive(Debug, Clone, Args)]
struct CliAnisotropyArgs {
    #[command(flatten)]
    common: CliCommonArgs,

    #[command(flatten)]
    bands: CliBandSelection,

    /// Restrict the fit to angles LO:HI in radians (repeatable; ranges are intersected).
    #[arg(long = "theta-range", value_parser = parse_range)]
    theta_range: Vec<(f64, f64)>,

    /// Initial β for the fit.
    #[arg(long)]
    beta_init: Option<f64>,

    /// Initial amplitude for the fit.
    #[arg(long)]
    amplitude_init: Option<f64>,
}

impl CliCommonArgs {
    /// Config file (or defaults) with the polar flags applied on top.
    fn to_config(&self) -> CliResult<ProfileConfig> {
        let mut cfg = ProfileConfig::load_or_default(self.config.as_deref())?;
        self.apply_polar(&mut cfg.polar);
        Ok(cfg)
    }

    fn apply_polar(&self, polar: &mut PolarConfig) {
        if let Some(origin) = self.origin {
            polar.origin = Some(origin);
        }
        if let Some(dr) = self.dr {
            polar.dr = dr;
        }
        if let Some(dt) = self.dt {
            polar.dt_deg = Some(dt);
        }
    }
}

impl CliBandSelection {
    fn apply(&self, ranges: &mut RadialRangeSpec) {
        if let Some(step) = self.step {
            *ranges = RadialRangeSpec::Step(step);
        } else if !self.range.is_empty() {
            *ranges = RadialRangeSpec::from(self.range.clone());
        }
    }
}

impl CliAnisotropyArgs {
    fn to_config(&self) -> CliResult<ProfileConfig> {
        let mut cfg = self.common.to_config()?;
        self.bands.apply(&mut cfg.radial_ranges);
        if !self.theta_range.is_empty() {
            cfg.theta_ranges = Some(self.theta_range.clone());
        }
        if let Some(beta) = self.beta_init {
            cfg.anisotropy.initial_beta = beta;
        }
        if let Some(amplitude) = self.amplitude_init {
            cfg.anisotropy.initial_amplitude = amplitude;
        }
        Ok(cfg)
    }
}

fn parse_origin(s: &str) -> Result<Origin, String> {
    let (row, col) = parse_pair(s, ',')?;
    Ok(Origin::new(row, col))
}

fn parse_range(s: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = parse_pair(s, ':')?;
    if lo > hi {
        return Err(format!("range {} has LO > HI", s));
    }
    Ok((lo, hi))
}

fn parse_pair(s: &str, sep: char) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected two numbers separated by '{}', got {:?}", sep, s))?;
    let parse = |t: &str| {
        t.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number {:?}: {}", t, e))
    };
    Ok((parse(a)?, parse(b)?))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Speeds(args) => run_speeds(&args),
        Commands::Average(args) => run_average(&args),
        Commands::Bands(args) => run_bands(&args),
        Commands::Anisotropy(args) => run_anisotropy(&args),
    }
}

// ── output ─────────────────────────────────────────────────────────────

/// Run metadata written next to every result.
#[derive(Debug, serde::Serialize)]
struct RunOutput<T> {
    image: String,
    /// Origin actually used (resolved from the image shape when not given).
    origin: Origin,
    polar: PolarConfig,
    result: T,
}

#[derive(Debug, serde::Serialize)]
struct SpeedsOutput {
    jacobian: bool,
    #[serde(flatten)]
    profile: RadialProfile,
}

#[derive(Debug, serde::Serialize)]
struct BandProfile {
    band: RadialBand,
    midpoint: f64,
    n_radial_samples: usize,
    intensity: Vec<f64>,
}

#[derive(Debug, serde::Serialize)]
struct BandsOutput {
    theta: Vec<f64>,
    bands: Vec<BandProfile>,
}

impl From<&RadialIntegration> for BandsOutput {
    fn from(ri: &RadialIntegration) -> Self {
        let bands = ri
            .bands
            .iter()
            .enumerate()
            .map(|(b, band)| BandProfile {
                band: *band,
                midpoint: ri.midpoints[b],
                n_radial_samples: ri.samples_per_band[b],
                intensity: ri.intensity.row(b).to_vec(),
            })
            .collect();
        Self {
            theta: ri.theta.clone(),
            bands,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct AnisotropyOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    theta_ranges: Option<Vec<(f64, f64)>>,
    bands: Vec<BandAnisotropy>,
}

fn load_image(path: &Path) -> CliResult<Array2<f64>> {
    tracing::info!("Loading image: {}", path.display());
    let img = input::load_intensity(path)?;
    let (rows, cols) = img.dim();
    tracing::info!("Image size: {}x{} (rows x cols)", rows, cols);
    Ok(img)
}

fn write_output<T: serde::Serialize>(
    common: &CliCommonArgs,
    img: &Array2<f64>,
    polar: PolarConfig,
    result: T,
) -> CliResult<()> {
    let output = RunOutput {
        image: common.image.display().to_string(),
        origin: Origin::resolve(polar.origin, &img.view()),
        polar,
        result,
    };
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&common.out, &json)?;
    tracing::info!("Results written to {}", common.out.display());
    Ok(())
}

// ── speeds / average ───────────────────────────────────────────────────

fn run_speeds(args: &CliSpeedsArgs) -> CliResult<()> {
    let cfg = args.common.to_config()?;
    let img = load_image(&args.common.image)?;
    let jacobian = !args.no_jacobian;

    let profile = angular_integration(&img.view(), &cfg.polar, jacobian)?;
    if let Some((r, v)) = profile.peak() {
        tracing::info!("{} radial samples, peak {:.4e} at r = {:.2}", profile.len(), v, r);
    }
    write_output(&args.common, &img, cfg.polar, SpeedsOutput { jacobian, profile })
}

fn run_average(args: &CliCommonArgs) -> CliResult<()> {
    let cfg = args.to_config()?;
    let img = load_image(&args.image)?;

    let profile = average_radial_intensity(&img.view(), &cfg.polar)?;
    tracing::info!("{} radial samples", profile.len());
    write_output(args, &img, cfg.polar, profile)
}

// ── bands ──────────────────────────────────────────────────────────────

fn run_bands(args: &CliBandsArgs) -> CliResult<()> {
    let mut cfg = args.common.to_config()?;
    args.bands.apply(&mut cfg.radial_ranges);
    let img = load_image(&args.common.image)?;

    let ri = radial_integration(&img.view(), &cfg.polar, &cfg.radial_ranges)?;
    tracing::info!("{} radial bands, {} angles", ri.n_bands(), ri.theta.len());
    write_output(&args.common, &img, cfg.polar, BandsOutput::from(&ri))
}

// ── anisotropy ─────────────────────────────────────────────────────────

fn run_anisotropy(args: &CliAnisotropyArgs) -> CliResult<()> {
    let cfg = args.to_config()?;
    let img = load_image(&args.common.image)?;

    let ri = radial_integration(&img.view(), &cfg.polar, &cfg.radial_ranges)?;
    let bands = anisotropy_per_band(&ri, cfg.theta_ranges.as_deref(), &cfg.anisotropy);

    let n_ok = bands.iter().filter(|b| b.fit.is_some()).count();
    tracing::info!("Fitted β in {}/{} radial bands", n_ok, bands.len());
    for b in &bands {
        if let Some(fit) = &b.fit {
            tracing::info!(
                "  r = {:.2}: β = {:.4} ± {:.4}, A = {:.4e}",
                b.midpoint,
                fit.beta,
                fit.beta_error,
                fit.amplitude
            );
        }
    }

    let output = AnisotropyOutput {
        theta_ranges: cfg.theta_ranges.clone(),
        bands,
    };
    write_output(&args.common, &img, cfg.polar, output)
}
