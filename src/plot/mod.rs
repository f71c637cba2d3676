use crate::error::RenderError;
use crate::evaluate::EvaluationReport;
use image::{ImageFormat, Rgb, RgbImage};
use log::info;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN: u32 = 48;
const NUM_TICKS: u32 = 5;
const TICK_LENGTH: i64 = 5;
const POINT_RADIUS: i64 = 3;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const REFERENCE: Rgb<u8> = Rgb([170, 170, 170]);
const POINT: Rgb<u8> = Rgb([31, 119, 180]);

/// Serializes writes so concurrent runs never interleave on one file
static WRITE_GATE: Mutex<()> = Mutex::new(());

/// A rendered scatter plot on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Maps data values onto the plot area. Both axes share one range so the
/// `y = x` line is the diagonal
struct Frame {
    lo: f64,
    hi: f64,
}

impl Frame {
    fn fit(report: &EvaluationReport) -> Frame {
        let (lo, hi) = report
            .pairs
            .iter()
            .flat_map(|&(p, a)| [p, a])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));

        if hi - lo < f64::EPSILON * hi.abs().max(1f64) {
            return Frame {
                lo: lo - 1f64,
                hi: hi + 1f64,
            };
        }

        let pad = (hi - lo) * 0.05;
        Frame {
            lo: lo - pad,
            hi: hi + pad,
        }
    }

    fn x(&self, value: f64) -> i64 {
        let span = (WIDTH - 2 * MARGIN) as f64;
        MARGIN as i64 + ((value - self.lo) / (self.hi - self.lo) * span).round() as i64
    }

    fn y(&self, value: f64) -> i64 {
        let span = (HEIGHT - 2 * MARGIN) as f64;
        (HEIGHT - MARGIN) as i64 - ((value - self.lo) / (self.hi - self.lo) * span).round() as i64
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < WIDTH as i64 && y < HEIGHT as i64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).max(1);

    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        let x = from.0 as f64 + t * (to.0 - from.0) as f64;
        let y = from.1 as f64 + t * (to.1 - from.1) as f64;
        put(img, x.round() as i64, y.round() as i64, color);
    }
}

fn draw_point(img: &mut RgbImage, center: (i64, i64), color: Rgb<u8>) {
    for dy in -POINT_RADIUS..=POINT_RADIUS {
        for dx in -POINT_RADIUS..=POINT_RADIUS {
            if dx * dx + dy * dy <= POINT_RADIUS * POINT_RADIUS {
                put(img, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}

fn draw_axes(img: &mut RgbImage) {
    let left = MARGIN as i64;
    let right = (WIDTH - MARGIN) as i64;
    let top = MARGIN as i64;
    let bottom = (HEIGHT - MARGIN) as i64;

    draw_line(img, (left, bottom), (right, bottom), AXIS);
    draw_line(img, (left, bottom), (left, top), AXIS);

    for tick in 0..=NUM_TICKS as i64 {
        let x = left + (right - left) * tick / NUM_TICKS as i64;
        let y = bottom - (bottom - top) * tick / NUM_TICKS as i64;
        draw_line(img, (x, bottom), (x, bottom + TICK_LENGTH), AXIS);
        draw_line(img, (left - TICK_LENGTH, y), (left, y), AXIS);
    }
}

/// Draw predicted (x axis) against actual (y axis) as a PNG image
pub fn draw_scatter(report: &EvaluationReport) -> Result<RgbImage, RenderError> {
    if report.pairs.is_empty() {
        return Err(RenderError::NoPairs);
    }
    if report
        .pairs
        .iter()
        .any(|(p, a)| !p.is_finite() || !a.is_finite())
    {
        return Err(RenderError::NonFinite);
    }

    let frame = Frame::fit(report);
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    draw_line(
        &mut img,
        (frame.x(frame.lo), frame.y(frame.lo)),
        (frame.x(frame.hi), frame.y(frame.hi)),
        REFERENCE,
    );
    draw_axes(&mut img);

    for &(predicted, actual) in &report.pairs {
        draw_point(&mut img, (frame.x(predicted), frame.y(actual)), POINT);
    }

    Ok(img)
}

/// Render the scatter plot and write it to `output`, replacing any file there
pub fn render_scatter(report: &EvaluationReport, output: &Path) -> Result<PlotArtifact, RenderError> {
    let img = draw_scatter(report)?;

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

    {
        let _gate = WRITE_GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::fs::write(output, &bytes).map_err(|source| RenderError::Write {
            path: output.to_path_buf(),
            source,
        })?;
    }

    info!(
        "wrote {} point scatter plot to {}",
        report.pairs.len(),
        output.display()
    );

    Ok(PlotArtifact {
        path: output.to_path_buf(),
        width: WIDTH,
        height: HEIGHT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn report(pairs: Vec<(f64, f64)>) -> EvaluationReport {
        EvaluationReport {
            metrics: BTreeMap::from([("mse".to_string(), 0.0)]),
            pairs,
        }
    }

    #[test]
    fn points_land_where_expected() {
        let report = report(vec![(0.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let img = draw_scatter(&report).unwrap();
        let frame = Frame::fit(&report);

        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        let (x, y) = (frame.x(0.0), frame.y(10.0));
        assert_eq!(*img.get_pixel(x as u32, y as u32), POINT);
        assert_eq!(*img.get_pixel(WIDTH - 1, 0), BACKGROUND);
    }

    #[test]
    fn writes_png_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        std::fs::write(&path, b"stale").unwrap();

        let artifact = render_scatter(&report(vec![(1.0, 2.0), (2.0, 1.5)]), &path).unwrap();
        assert_eq!(artifact.path, path);

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
    }

    #[test]
    fn rendering_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let report = report(vec![(1.0, 2.0), (2.0, 1.5), (3.0, 3.3)]);

        render_scatter(&report, &path).unwrap();
        let first = std::fs::read(&path).unwrap();
        render_scatter(&report, &path).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn single_value_still_renders() {
        assert!(draw_scatter(&report(vec![(4.0, 4.0)])).is_ok());
    }

    #[test]
    fn empty_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let err = render_scatter(&report(vec![]), &path).unwrap_err();

        assert!(matches!(err, RenderError::NoPairs));
        assert!(!path.exists());
    }

    #[test]
    fn non_finite_pairs_are_rejected() {
        let err = draw_scatter(&report(vec![(f64::NAN, 1.0)])).unwrap_err();
        assert!(matches!(err, RenderError::NonFinite));
    }

    #[test]
    fn unwritable_location_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("plot.png");
        let err = render_scatter(&report(vec![(1.0, 1.0)]), &path).unwrap_err();

        assert!(matches!(err, RenderError::Write { .. }));
    }
}
