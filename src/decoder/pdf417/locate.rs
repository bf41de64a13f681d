//! Start and stop pattern location.
//!
//! Each scan line is searched for a start pattern followed by a stop pattern
//! (or the reversed stop followed by the reversed start, for a symbol upside
//! down on the line). Hits on consecutive lines at the same place form a
//! track; the middle line of a long enough track seeds the region.

use super::codewords::{START_PATTERN, STOP_PATTERN};
use crate::decoder::config::line_band_radius;
use crate::detector::pattern::{FoundPattern, PatternFinder, PatternTemplate};
use crate::detector::region::{track_pattern_region, BarCodeRegion, ScanLine};
use crate::models::BitImage;
use tracing::trace;

const START: usize = 0;
const STOP: usize = 1;
/// Lines a track must span before it becomes a region
const MIN_TRACK_LINES: usize = 3;

#[derive(Debug, Clone, Copy)]
struct LineHit {
    line: ScanLine,
    start: usize,
    end: usize,
    module: f32,
    reversed: bool,
}

#[derive(Debug)]
struct Track {
    hits: Vec<LineHit>,
    last_ordinal: usize,
}

impl Track {
    fn accepts(&self, hit: &LineHit, ordinal: usize) -> bool {
        let Some(last) = self.hits.last() else {
            return false;
        };
        let slack = (2.0 * last.module).max(3.0) as usize;
        last.reversed == hit.reversed
            && ordinal <= self.last_ordinal + 2
            && last.start.abs_diff(hit.start) <= slack
            && last.end.abs_diff(hit.end) <= slack
    }
}

/// Reusable locator for one orientation of scan lines
pub struct Pdf417Locator {
    finder: PatternFinder,
    line: Vec<bool>,
}

impl Default for Pdf417Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Pdf417Locator {
    pub fn new() -> Self {
        let finder = PatternFinder::new(vec![
            PatternTemplate::from_modules(&START_PATTERN, Some(true)),
            PatternTemplate::from_modules(&STOP_PATTERN, Some(true)),
        ])
        .with_reversed()
        .with_tolerance(0.3, 0.8);
        Self {
            finder,
            line: Vec::new(),
        }
    }

    /// Start/stop pairs on one line
    fn line_hits(&mut self, image: &BitImage, line: ScanLine) -> Vec<LineHit> {
        line.read_band(image, line_band_radius(), &mut self.line);
        self.finder.load(&self.line);
        let matches = self.finder.matches();
        let mut hits = Vec::new();
        for (i, first) in matches.iter().enumerate() {
            // forward: start then stop; upside down: reversed stop then reversed start
            let (want_first, want_second) = if first.reversed { (STOP, START) } else { (START, STOP) };
            if first.template != want_first {
                continue;
            }
            let second = matches[i + 1..].iter().find(|m| {
                m.template == want_second
                    && m.reversed == first.reversed
                    && m.start >= first.end
                    && plausible_width(first, m)
            });
            if let Some(second) = second {
                hits.push(LineHit {
                    line,
                    start: first.start,
                    end: second.end,
                    module: (first.module_len + second.module_len) * 0.5,
                    reversed: first.reversed,
                });
            }
        }
        hits
    }

    /// Regions found on `lines`, which must be ordered and parallel
    pub fn locate(&mut self, image: &BitImage, lines: &[ScanLine]) -> Vec<BarCodeRegion> {
        let mut open: Vec<Track> = Vec::new();
        let mut closed: Vec<Track> = Vec::new();
        for (ordinal, &line) in lines.iter().enumerate() {
            for hit in self.line_hits(image, line) {
                match open.iter_mut().find(|t| t.accepts(&hit, ordinal)) {
                    Some(track) => {
                        track.hits.push(hit);
                        track.last_ordinal = ordinal;
                    }
                    None => open.push(Track {
                        hits: vec![hit],
                        last_ordinal: ordinal,
                    }),
                }
            }
            let (stale, live): (Vec<Track>, Vec<Track>) =
                open.into_iter().partition(|t| t.last_ordinal + 2 < ordinal);
            closed.extend(stale);
            open = live;
        }
        closed.extend(open);

        let mut regions: Vec<BarCodeRegion> = Vec::new();
        for track in closed.iter().filter(|t| t.hits.len() >= MIN_TRACK_LINES) {
            let seed = track.hits[track.hits.len() / 2];
            let Some(region) = track_pattern_region(image, &seed.line, seed.start, seed.end, seed.module) else {
                continue;
            };
            if region.height() < 3.0 * seed.module {
                trace!(height = region.height(), "pdf417 track too short");
                continue;
            }
            let region = expand(region, 0.5);
            let region = if seed.reversed { region.rotated180() } else { region };
            if regions.iter().any(|r| r.overlaps(&region)) {
                continue;
            }
            regions.push(region);
        }
        regions
    }
}

/// Start-to-stop distance must be `17 * columns + 69` modules
fn plausible_width(first: &FoundPattern, second: &FoundPattern) -> bool {
    let module = (first.module_len + second.module_len) * 0.5;
    if module <= 0.0 || (first.module_len - second.module_len).abs() > 0.5 * module.max(1.0) {
        return false;
    }
    let columns = ((second.end - first.start) as f32 / module - 69.0) / 17.0;
    let nearest = columns.round();
    (1.0..=30.0).contains(&nearest) && (columns - nearest).abs() < 0.35
}

/// Grow a region outward by `by` pixels on every side
fn expand(region: BarCodeRegion, by: f32) -> BarCodeRegion {
    let ux = (region.d - region.c).normalized() * by;
    let uy = (region.a - region.c).normalized() * by;
    BarCodeRegion {
        c: region.c - ux - uy,
        d: region.d + ux - uy,
        a: region.a - ux + uy,
        b: region.b + ux + uy,
        ..region
    }
}
