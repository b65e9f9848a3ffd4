use std::panic;
use std::path::Path;

use anyhow::Result;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rc_telemetry::{ChartSeries, ConditionChart};

const CANVAS: (u32, u32) = (1600, 800);

const PRIMARY_COLOR: RGBColor = RGBColor(31, 119, 180);
const SECONDARY_COLOR: RGBColor = RGBColor(214, 39, 40);
const MARKER_COLOR: RGBColor = RGBColor(44, 160, 44);

/// Render `chart` to a PNG at `path`, turning backend panics into errors.
pub fn render_chart_guard(chart: &ConditionChart, path: &Path) -> Result<(), String> {
    let render = || -> Result<(), String> {
        let backend = BitMapBackend::new(path, CANVAS);
        draw_chart(backend.into_drawing_area(), chart)
            .map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

type TimeChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_chart<DB>(root: DrawingArea<DB, Shift>, chart: &ConditionChart) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root;
    area.fill(&WHITE)?;

    let bounds = chart.bounds();
    let (x0, x1) = (bounds.x.start, bounds.x.end);
    let (y0, y1) = (bounds.y.start, bounds.y.end);

    let mut ctx = ChartBuilder::on(&area)
        .caption(
            chart.caption(),
            FontDesc::new(FontFamily::SansSerif, 28.0, FontStyle::Normal),
        )
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(bounds.x.clone(), bounds.y.clone())?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    ctx.configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Channel Value")
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for (series, color) in [
        (&chart.primary, PRIMARY_COLOR),
        (&chart.secondary, SECONDARY_COLOR),
    ] {
        draw_highlights(&mut ctx, series, color)?;
    }

    for (series, color) in [
        (&chart.primary, PRIMARY_COLOR),
        (&chart.secondary, SECONDARY_COLOR),
    ] {
        let line_style = color.mix(0.7).stroke_width(2);
        ctx.draw_series(
            LineSeries::new(series.points.iter().copied(), line_style).point_size(3),
        )?
        .label(series.label())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));

        let threshold_style = color.mix(0.5).stroke_width(1);
        ctx.draw_series(DashedLineSeries::new(
            [(x0, series.threshold), (x1, series.threshold)],
            8,
            6,
            threshold_style,
        ))?
        .label(series.threshold_label())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color.mix(0.5)));
    }

    let marker_style = MARKER_COLOR.mix(0.5).stroke_width(2);
    match chart.marker {
        Some(t) => {
            ctx.draw_series(DashedLineSeries::new(
                [(t, y0), (t, y1)],
                8,
                6,
                marker_style,
            ))?
            .label("First Both Conditions Met")
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 30, y)], MARKER_COLOR.mix(0.5))
            });
            let text_y = 0.0_f64.clamp(y0, y1);
            ctx.draw_series(std::iter::once(Text::new(
                t.to_string(),
                (t, text_y),
                FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal)
                    .color(&MARKER_COLOR),
            )))?;
        }
        None => {
            // keep the legend entry so every chart has the same key
            ctx.draw_series(std::iter::empty::<PathElement<(f64, f64)>>())?
                .label("First Both Conditions Met")
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 30, y)], MARKER_COLOR.mix(0.5))
                });
        }
    }

    ctx.configure_series_labels()
        .background_style(WHITE.mix(0.7))
        .border_style(BLACK.mix(0.3))
        .label_font(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    area.present()?;
    Ok(())
}

fn draw_highlights<DB>(
    ctx: &mut TimeChart<'_, DB>,
    series: &ChartSeries,
    color: RGBColor,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let regions = series.highlight_regions();
    if regions.is_empty() {
        return Ok(());
    }
    let fill = color.mix(0.3).filled();
    ctx.draw_series(regions.into_iter().map(|points| Polygon::new(points, fill)))?
        .label(series.highlight_label())
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 30, y + 5)], fill));
    Ok(())
}
