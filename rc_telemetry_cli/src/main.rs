use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use rc_telemetry::conditions::format_time;
use rc_telemetry::{
    find_first_conditions, process_records, read_records, ConditionChart, ConditionTimes,
    FillPolicy, Params, ReshapedTable,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod plot;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Reshape a race-car telemetry log and chart its threshold crossings",
    long_about = None
)]
struct Cli {
    /// Tab-separated telemetry log with time/channel/value columns
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Fill missing values (interpolate unless --method is given)
    #[arg(short, long, action = ArgAction::SetTrue)]
    fill: bool,

    /// Fill method (interpolate|ffill|bfill); implies --fill
    #[arg(short, long, value_parser = parse_fill_method)]
    method: Option<FillPolicy>,

    /// Chart title, also used for the image name (defaults to the input file stem)
    #[arg(long)]
    title: Option<String>,

    /// Directory receiving the rendered chart
    #[arg(long, default_value = "plots", value_hint = ValueHint::DirPath)]
    plot_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Number of reshaped rows to preview
    #[arg(long, default_value_t = 5)]
    rows: usize,

    /// Print the run summary as JSON instead of the text report
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

fn parse_fill_method(raw: &str) -> Result<FillPolicy, rc_telemetry::TelemetryError> {
    raw.parse()
}

impl Cli {
    fn params(&self) -> Params {
        Params::with_fill(FillPolicy::from_flags(self.fill, self.method))
    }

    fn title(&self) -> Result<String> {
        if let Some(title) = self.title.as_ref() {
            return Ok(title.clone());
        }
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("cannot derive a title from {}", self.input.display()))
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    input: &'a Path,
    params: &'a Params,
    rows: usize,
    channels: Vec<String>,
    duplicates: usize,
    first_times: ConditionTimes,
    plot: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let params = cli.params();
    let title = cli.title()?;
    debug!("fill policy: {}", params.fill);

    let t_load = Instant::now();
    let records = read_records(&cli.input)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    if cli.profile || cli.verbose {
        info!(
            "Load stage: {:.1} ms ({} records)",
            t_load.elapsed().as_secs_f64() * 1000.0,
            records.len()
        );
    }

    let t_process = Instant::now();
    let table = process_records(records, &params)
        .with_context(|| format!("failed to process {}", cli.input.display()))?;
    if cli.profile || cli.verbose {
        info!(
            "Reshape stage: {:.1} ms",
            t_process.elapsed().as_secs_f64() * 1000.0
        );
    }
    if table.duplicate_count() > 0 {
        warn!(
            "{} duplicate (time, channel) records; kept the last value of each",
            table.duplicate_count()
        );
    }
    info!(
        "Reshaped {} rows x {} channels",
        table.len(),
        table.channels().len()
    );

    let times = find_first_conditions(&table, &params.primary, &params.secondary)?;

    let plot = if cli.no_plot {
        None
    } else {
        let chart = ConditionChart::new(&table, &params, &times, title);
        let t_plot = Instant::now();
        let path = render(&chart, &cli.plot_dir)?;
        if cli.profile || cli.verbose {
            info!(
                "Plot stage: {:.1} ms",
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
        info!("Wrote plot: {}", path.display());
        Some(path)
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        let summary = RunSummary {
            input: &cli.input,
            params: &params,
            rows: table.len(),
            channels: table.column_names(),
            duplicates: table.duplicate_count(),
            first_times: times,
            plot,
        };
        serde_json::to_writer_pretty(&mut out, &summary)?;
        writeln!(out)?;
    } else {
        write_report(&mut out, &table, &params, &times, cli.rows)?;
    }
    Ok(())
}

fn render(chart: &ConditionChart, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = chart.output_path(dir);
    if let Err(err) = plot::render_chart_guard(chart, &path) {
        let _ = fs::remove_file(&path);
        return Err(anyhow!("failed to render {}: {}", path.display(), err));
    }
    Ok(path)
}

fn write_report<W: Write>(
    out: &mut W,
    table: &ReshapedTable,
    params: &Params,
    times: &ConditionTimes,
    rows: usize,
) -> Result<()> {
    writeln!(out, "Processed Data (First Few Rows):\n")?;
    writeln!(out, "{}", table.head(rows))?;
    writeln!(
        out,
        "First Time {} is Met: {}",
        params.primary.describe(),
        format_time(times.primary)
    )?;
    writeln!(
        out,
        "First Time {} is Met: {}",
        params.secondary.describe(),
        format_time(times.secondary)
    )?;
    writeln!(
        out,
        "First Time Both Conditions are Met: {}",
        format_time(times.both)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    const SESSION: &str = "time\tchannel\tvalue\n\
        0\t2\t-0.2\n0\t4\t1.0\n0\t5\t0.5\n\
        1\t2\t-0.6\n1\t4\t1.0\n1\t5\t0.2\n";

    #[test]
    fn invalid_method_is_rejected_at_parse_time() {
        for method in ["spline", "pad", "FFILL"] {
            let err = Cli::try_parse_from(["rc-telemetry", "-i", "missing.tsv", "-m", method])
                .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
            assert!(err.to_string().contains(method));
        }
    }

    #[test]
    fn method_implies_fill() {
        let cli = Cli::try_parse_from(["rc-telemetry", "-i", "lap.tsv", "-m", "ffill"]).unwrap();
        assert_eq!(cli.params().fill, FillPolicy::ForwardFill);

        let cli = Cli::try_parse_from(["rc-telemetry", "-i", "lap.tsv", "-f"]).unwrap();
        assert_eq!(cli.params().fill, FillPolicy::Interpolate);

        let cli = Cli::try_parse_from(["rc-telemetry", "-i", "lap.tsv"]).unwrap();
        assert_eq!(cli.params().fill, FillPolicy::None);
    }

    #[test]
    fn title_defaults_to_input_stem() {
        let cli = Cli::try_parse_from(["rc-telemetry", "-i", "data/Practice.tsv"]).unwrap();
        assert_eq!(cli.title().unwrap(), "Practice");

        let cli =
            Cli::try_parse_from(["rc-telemetry", "-i", "x.tsv", "--title", "Race"]).unwrap();
        assert_eq!(cli.title().unwrap(), "Race");
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["rc-telemetry", "-f"]).is_err());
    }

    #[test]
    fn report_lists_head_and_crossings() {
        let records = rc_telemetry::parse_records(SESSION.as_bytes()).unwrap();
        let params = Params::default();
        let table = process_records(records, &params).unwrap();
        let times = find_first_conditions(&table, &params.primary, &params.secondary).unwrap();

        let mut buf = Vec::new();
        write_report(&mut buf, &table, &params, &times, 5).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Processed Data (First Few Rows):"));
        assert!(text.contains("Channel_7"));
        assert!(text.contains("First Time Channel_2 < -0.5 is Met: 1\n"));
        assert!(text.contains("First Time Channel_7 < 0 is Met: 0\n"));
        assert!(text.contains("First Time Both Conditions are Met: 1\n"));
    }

    #[test]
    fn run_without_plot_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("session.tsv");
        fs::write(&input, SESSION).unwrap();
        let plot_dir = dir.path().join("plots");

        let args: Vec<OsString> = vec![
            "rc-telemetry".into(),
            "-i".into(),
            input.into_os_string(),
            "--no-plot".into(),
            "--plot-dir".into(),
            plot_dir.clone().into_os_string(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        run(cli).unwrap();
        assert!(!plot_dir.exists());
    }

    #[test]
    fn missing_derivation_source_fails_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("session.tsv");
        fs::write(&input, "time\tchannel\tvalue\n0\t2\t-1\n0\t4\t1\n").unwrap();
        let plot_dir = dir.path().join("plots");

        let args: Vec<OsString> = vec![
            "rc-telemetry".into(),
            "-i".into(),
            input.into_os_string(),
            "--plot-dir".into(),
            plot_dir.clone().into_os_string(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let err = run(cli).unwrap_err();
        assert!(format!("{err:#}").contains("Channel_5"));
        assert!(!plot_dir.exists());
    }

    fn session_args(dir: &Path, extra: &[&str]) -> Vec<OsString> {
        let input = dir.join("session.tsv");
        fs::write(&input, SESSION).unwrap();
        let mut args: Vec<OsString> = vec![
            "rc-telemetry".into(),
            "-i".into(),
            input.into_os_string(),
            "--plot-dir".into(),
            dir.join("plots").into_os_string(),
        ];
        args.extend(extra.iter().map(OsString::from));
        args
    }

    #[test]
    fn run_renders_chart_named_after_title_and_fill() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(session_args(dir.path(), &["-m", "bfill"])).unwrap();
        run(cli).unwrap();

        let image = dir.path().join("plots").join("session_bfill.png");
        let meta = fs::metadata(&image).unwrap();
        assert!(meta.len() > 0);
    }

    #[test]
    fn failed_render_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(session_args(dir.path(), &["--title", "nested/x"])).unwrap();
        let err = run(cli).unwrap_err();
        assert!(err.to_string().contains("failed to render"));

        let plot_dir = dir.path().join("plots");
        assert!(!plot_dir.join("nested").join("x_no_fill.png").exists());
        let images = fs::read_dir(&plot_dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "png"))
            .count();
        assert_eq!(images, 0);
    }
}
