//! Scan orchestration.
//!
//! One pass per symbology family runs over the image in a fixed order:
//! matrix codes, PDF417, DataBar, then Code39. Work inside a pass is spread
//! over rayon workers; each worker returns its own list and the lists are
//! merged once the pass completes. The deadline is checked between passes
//! and before every line or region.
//!
//! When nothing is found and mirroring is allowed, the passes run once more
//! on the left-right mirror of the image. Structured-append parts are merged
//! after every pass has finished.

use crate::config::ScanOptions;
use crate::decoder::code39;
use crate::decoder::config::{line_band_radius, max_regions_per_pass};
use crate::decoder::databar::{DataBarRead, ExpandedCollector, OmniCollector};
use crate::decoder::pdf417::{Pdf417Decoder, Pdf417Locator, Pdf417Read};
use crate::decoder::qr::{self, triangulate, QrRead};
use crate::decoder::LinearRead;
use crate::detector::finder::{merge_finder, FinderDetector, FinderPattern};
use crate::detector::pattern::merge_noise_runs;
use crate::detector::region::{BarCodeRegion, ScanLine};
use crate::error::ScanError;
use crate::models::{BarcodeType, BarcodeTypes, BitImage, FoundBarcode, Point, Rect, StructuredAppend};
use crate::utils::line::run_lengths;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, trace, warn};

/// Rows handed to one finder-detection worker
const FINDER_ROW_CHUNK: usize = 32;

/// Wall-clock budget for one scan
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub(crate) fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub(crate) fn check(&self) -> Result<(), ScanError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let elapsed = self.start.elapsed();
        if elapsed >= limit {
            warn!(?elapsed, ?limit, "scan deadline expired");
            return Err(ScanError::Timeout { elapsed });
        }
        Ok(())
    }
}

/// An accepted symbol before the structured-append merge
#[derive(Debug, Clone)]
struct Candidate {
    found: FoundBarcode,
    /// Macro PDF417 last-segment marker
    last_segment: bool,
}

impl Candidate {
    fn new(found: FoundBarcode) -> Self {
        Self {
            found,
            last_segment: false,
        }
    }

    /// Map a result from the mirrored image back onto the original
    fn unmirror(mut self, width: f32) -> Self {
        let flip = |p: Point| Point::new(width - p.x, p.y);
        let [p0, p1, p2, p3] = self.found.polygon;
        self.found.polygon = [flip(p1), flip(p0), flip(p3), flip(p2)];
        self.found.bounds = Rect::bounding(&self.found.polygon);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Matrix,
    Pdf417,
    DataBar,
    Linear,
}

impl Pass {
    const ORDER: [Pass; 4] = [Pass::Matrix, Pass::Pdf417, Pass::DataBar, Pass::Linear];

    fn kinds(self) -> BarcodeTypes {
        match self {
            Pass::Matrix => BarcodeTypes::QR_FAMILY,
            Pass::Pdf417 => BarcodeTypes::only(BarcodeType::Pdf417),
            Pass::DataBar => BarcodeTypes::only(BarcodeType::DataBar).with(BarcodeType::DataBarExpanded),
            Pass::Linear => BarcodeTypes::CODE39_FAMILY,
        }
    }
}

/// Shared state of one pass over one image
struct ScanContext<'a> {
    image: &'a BitImage,
    options: &'a ScanOptions,
    deadline: &'a Deadline,
}

impl ScanContext<'_> {
    fn wants(&self, kind: BarcodeType) -> bool {
        self.options.symbologies.contains(kind)
    }

    /// Rows and columns inside the clip, `line_step` apart
    fn lines(&self) -> (Vec<ScanLine>, Vec<ScanLine>) {
        let clip = self.image.clip();
        let (left, top) = (clip.left.max(0) as usize, clip.top.max(0) as usize);
        let (right, bottom) = (clip.right.max(0) as usize, clip.bottom.max(0) as usize);
        let row_step = self.options.effective_line_step(bottom.saturating_sub(top));
        let col_step = self.options.effective_line_step(right.saturating_sub(left));
        let rows = (top + row_step / 2..bottom)
            .step_by(row_step)
            .map(|y| ScanLine::row(y, self.image.width()))
            .collect();
        let columns = (left + col_step / 2..right)
            .step_by(col_step)
            .map(|x| ScanLine::column(x, self.image.height()))
            .collect();
        (rows, columns)
    }

    fn run(&self, pass: Pass) -> Result<Vec<Candidate>, ScanError> {
        match pass {
            Pass::Matrix => self.matrix_pass(),
            Pass::Pdf417 => self.pdf417_pass(),
            Pass::DataBar => self.databar_pass(),
            Pass::Linear => self.linear_pass(),
        }
    }

    fn linear_pass(&self) -> Result<Vec<Candidate>, ScanError> {
        let (rows, columns) = self.lines();
        let (row_hits, column_hits) = rayon::join(|| self.linear_hits(&rows), || self.linear_hits(&columns));
        let mut groups = group_linear(row_hits?, linear_gap(&rows));
        groups.extend(group_linear(column_hits?, linear_gap(&columns)));
        let candidates = join_split_groups(groups, self.image)
            .into_iter()
            .map(LinearGroup::into_candidate)
            .collect();
        Ok(drop_duplicates(candidates))
    }

    fn linear_hits(&self, lines: &[ScanLine]) -> Result<Vec<(ScanLine, LinearRead)>, ScanError> {
        let kinds = self.options.symbologies;
        let checksum = self.options.code39_checksum;
        let radius = line_band_radius();
        let per_line = lines
            .par_iter()
            .map_init(
                || (Vec::new(), Vec::new(), Vec::new()),
                |(bits, runs, merged), &line| {
                    self.deadline.check()?;
                    line.read_band(self.image, radius, bits);
                    let first_dark = run_lengths(bits, runs);
                    let mut reads = code39::decode_runs(runs, first_dark, kinds, checksum);
                    if reads.is_empty() {
                        // merged runs keep their pixel lengths, so offsets stay valid
                        merge_noise_runs(runs, merged);
                        if merged.len() < runs.len() {
                            reads = code39::decode_runs(merged, first_dark, kinds, checksum);
                        }
                    }
                    Ok(reads.into_iter().map(|r| (line, r)).collect::<Vec<_>>())
                },
            )
            .collect::<Result<Vec<_>, ScanError>>()?;
        Ok(per_line.into_iter().flatten().collect())
    }

    fn databar_pass(&self) -> Result<Vec<Candidate>, ScanError> {
        let (rows, columns) = self.lines();
        let (from_rows, from_columns) =
            rayon::join(|| self.databar_direction(&rows), || self.databar_direction(&columns));
        let mut candidates = from_rows?;
        candidates.extend(from_columns?);
        Ok(drop_duplicates(candidates))
    }

    /// DataBar rows accumulate across lines, so one direction is scanned
    /// sequentially in line order
    fn databar_direction(&self, lines: &[ScanLine]) -> Result<Vec<Candidate>, ScanError> {
        let Some(first) = lines.first() else {
            return Ok(Vec::new());
        };
        let column = first.is_column();
        let mut omni = self.wants(BarcodeType::DataBar).then(OmniCollector::new);
        let mut expanded = self.wants(BarcodeType::DataBarExpanded).then(ExpandedCollector::new);
        let radius = line_band_radius();
        let mut bits = Vec::new();
        let mut runs = Vec::new();
        for line in lines {
            self.deadline.check()?;
            line.read_band(self.image, radius, &mut bits);
            let first_dark = run_lengths(&bits, &mut runs);
            if let Some(c) = omni.as_mut() {
                c.scan_line(line.index(), &runs, first_dark);
            }
            if let Some(c) = expanded.as_mut() {
                c.scan_line(line.index(), &runs, first_dark);
            }
        }
        let mut reads = omni.map(OmniCollector::finish).unwrap_or_default();
        reads.extend(expanded.map(ExpandedCollector::finish).unwrap_or_default());
        Ok(reads
            .into_iter()
            .filter_map(|read| databar_candidate(read, column))
            .collect())
    }

    fn pdf417_pass(&self) -> Result<Vec<Candidate>, ScanError> {
        let (rows, columns) = self.lines();
        let (mut regions, column_regions) = rayon::join(
            || Pdf417Locator::new().locate(self.image, &rows),
            || Pdf417Locator::new().locate(self.image, &columns),
        );
        for region in column_regions {
            if !regions.iter().any(|r| r.overlaps(&region)) {
                regions.push(region);
            }
        }
        let limit = max_regions_per_pass();
        if regions.len() > limit {
            debug!(located = regions.len(), limit, "pdf417 regions capped");
            regions.truncate(limit);
        }
        self.deadline.check()?;
        let encoding = self.options.encoding;
        let reads = regions
            .par_iter()
            .map_init(Pdf417Decoder::new, |decoder, region| {
                self.deadline.check()?;
                Ok(decoder.decode_region(self.image, region, encoding))
            })
            .collect::<Result<Vec<_>, ScanError>>()?;

        let mut claimed: Vec<BarCodeRegion> = Vec::new();
        let mut candidates = Vec::new();
        let mut reads: Vec<Pdf417Read> = reads.into_iter().flatten().collect();
        reads.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        for read in reads {
            if claimed.iter().any(|r| r.overlaps(&read.region)) {
                trace!("pdf417 region already claimed");
                continue;
            }
            claimed.push(read.region);
            candidates.push(pdf417_candidate(read));
        }
        Ok(candidates)
    }

    fn matrix_pass(&self) -> Result<Vec<Candidate>, ScanError> {
        let finders = self.finders()?;
        debug!(finders = finders.len(), "qr finder patterns");
        let allow_mirror = self.options.allow_mirror;
        let encoding = self.options.encoding;

        let mut reads: Vec<QrRead> = Vec::new();
        let mut used = vec![false; finders.len()];
        if self.wants(BarcodeType::QrCode) {
            let triples = triangulate(&finders);
            let decoded = triples
                .par_iter()
                .map(|triple| {
                    self.deadline.check()?;
                    Ok(qr::decode_triple(self.image, triple, allow_mirror, encoding).map(|r| (triple.members, r)))
                })
                .collect::<Result<Vec<_>, ScanError>>()?;
            for (members, read) in decoded.into_iter().flatten() {
                if claims(&reads, &read) {
                    continue;
                }
                for m in members {
                    if let Some(u) = used.get_mut(m) {
                        *u = true;
                    }
                }
                reads.push(read);
            }
        }

        if self.wants(BarcodeType::MicroQr) {
            let lone: Vec<&FinderPattern> = finders
                .iter()
                .zip(&used)
                .filter(|&(f, &u)| !u && !reads.iter().any(|r| inside(&r.polygon, f.center)))
                .map(|(f, _)| f)
                .collect();
            let decoded = lone
                .par_iter()
                .map(|finder| {
                    self.deadline.check()?;
                    Ok(qr::decode_micro(self.image, finder, allow_mirror, encoding))
                })
                .collect::<Result<Vec<_>, ScanError>>()?;
            for read in decoded.into_iter().flatten() {
                if !claims(&reads, &read) {
                    reads.push(read);
                }
            }
        }

        Ok(reads
            .into_iter()
            .filter(|r| self.wants(r.symbology))
            .map(qr_candidate)
            .collect())
    }

    /// Finder patterns over every row of the clip; chunks are detected in
    /// parallel and merged afterwards
    fn finders(&self) -> Result<Vec<FinderPattern>, ScanError> {
        let clip = self.image.clip();
        let rows: Vec<usize> = (clip.top.max(0) as usize..clip.bottom.max(0) as usize).collect();
        let per_chunk = rows
            .par_chunks(FINDER_ROW_CHUNK)
            .map_init(FinderDetector::new, |detector, chunk| {
                self.deadline.check()?;
                Ok(detector.detect(self.image, chunk.iter().copied()))
            })
            .collect::<Result<Vec<_>, ScanError>>()?;
        let mut merged = Vec::new();
        for found in per_chunk {
            for p in found {
                merge_finder(&mut merged, p);
            }
        }
        Ok(merged)
    }
}

/// True when `read` covers a symbol already in `reads`
fn claims(reads: &[QrRead], read: &QrRead) -> bool {
    let bounds = Rect::bounding(&read.polygon);
    reads
        .iter()
        .any(|r| Rect::bounding(&r.polygon).overlap_ratio(&bounds) > 0.5)
}

/// Point-in-quadrilateral test for a convex polygon in either winding
fn inside(polygon: &[Point; 4], p: Point) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = polygon[i];
        let b = polygon[(i + 1) % 4];
        let c = (b - a).cross(&(p - a));
        if c.abs() < f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = c.signum();
        } else if c.signum() != sign {
            return false;
        }
    }
    true
}

/// Corners of a symbol read on parallel lines, clockwise from the top-left
/// of its reading frame.
///
/// `lines` is the first line index and one past the last, `span` the pixel
/// extent along the lines. For a column read downwards the symbol's top
/// edge is on the right.
fn line_polygon(column: bool, lines: (f32, f32), span: (f32, f32), reversed: bool) -> [Point; 4] {
    let (near, far) = lines;
    let (start, end) = span;
    let at = |along: f32, across: f32| {
        if column {
            Point::new(across, along)
        } else {
            Point::new(along, across)
        }
    };
    let (top, bottom) = if column { (far, near) } else { (near, far) };
    let corners = [at(start, top), at(end, top), at(end, bottom), at(start, bottom)];
    if reversed {
        [corners[2], corners[3], corners[0], corners[1]]
    } else {
        corners
    }
}

/// Largest line-index gap bridged when grouping reads of one symbol
fn linear_gap(lines: &[ScanLine]) -> usize {
    let step = match lines {
        [a, b, ..] => b.index().saturating_sub(a.index()),
        _ => 1,
    };
    3 * step.max(1)
}

#[derive(Debug)]
struct LinearGroup {
    column: bool,
    first: usize,
    last: usize,
    read: LinearRead,
    lines: usize,
}

impl LinearGroup {
    fn same_reading(&self, read: &LinearRead) -> bool {
        let slack = (3.0 * self.read.module_len.max(read.module_len)).max(3.0) as usize;
        self.read.symbology == read.symbology
            && self.read.reversed == read.reversed
            && self.read.text == read.text
            && self.read.start.abs_diff(read.start) <= slack
            && self.read.end.abs_diff(read.end) <= slack
    }

    fn accepts(&self, column: bool, index: usize, read: &LinearRead, gap: usize) -> bool {
        self.column == column && index <= self.last + gap && self.same_reading(read)
    }

    /// True when `later` reads the same symbol on lines after this group
    fn continues_into(&self, later: &LinearGroup) -> bool {
        self.column == later.column && self.last < later.first && self.same_reading(&later.read)
    }

    fn absorb(&mut self, other: LinearGroup) {
        self.first = self.first.min(other.first);
        self.last = self.last.max(other.last);
        self.lines += other.lines;
        self.read.start = self.read.start.min(other.read.start);
        self.read.end = self.read.end.max(other.read.end);
        self.read.confidence = self.read.confidence.min(other.read.confidence);
    }

    fn into_candidate(self) -> Candidate {
        trace!(symbology = ?self.read.symbology, lines = self.lines, "linear symbol grouped");
        let polygon = line_polygon(
            self.column,
            (self.first as f32, (self.last + 1) as f32),
            (self.read.start as f32, self.read.end as f32),
            self.read.reversed,
        );
        let bytes = self.read.text.clone().into_bytes();
        Candidate::new(FoundBarcode::new(
            self.read.symbology,
            self.read.text,
            bytes,
            polygon,
            self.read.confidence,
        ))
    }
}

/// Collapse reads of the same symbol on neighbouring lines into groups
fn group_linear(hits: Vec<(ScanLine, LinearRead)>, gap: usize) -> Vec<LinearGroup> {
    let mut groups: Vec<LinearGroup> = Vec::new();
    for (line, read) in hits {
        let (column, index) = (line.is_column(), line.index());
        match groups.iter_mut().find(|g| g.accepts(column, index, &read, gap)) {
            Some(group) => {
                group.last = index;
                group.lines += 1;
                group.read.start = group.read.start.min(read.start);
                group.read.end = group.read.end.max(read.end);
                group.read.confidence = group.read.confidence.min(read.confidence);
            }
            None => groups.push(LinearGroup {
                column,
                first: index,
                last: index,
                read,
                lines: 1,
            }),
        }
    }
    groups
}

/// True when every pixel line strictly between `upper` and `lower` still
/// crosses bars over their common span, so no quiet zone separates them
fn bars_between(image: &BitImage, upper: &LinearGroup, lower: &LinearGroup) -> bool {
    let start = upper.read.start.max(lower.read.start);
    let end = upper.read.end.min(lower.read.end);
    if end <= start {
        return false;
    }
    (upper.last + 1..lower.first).all(|index| {
        let dark = (start..end)
            .filter(|&t| {
                let (x, y) = if upper.column { (index, t) } else { (t, index) };
                image.is_black(x as i32, y as i32)
            })
            .count();
        dark * 4 >= end - start
    })
}

/// Join groups of one symbol that lines failing to decode split apart
fn join_split_groups(mut groups: Vec<LinearGroup>, image: &BitImage) -> Vec<LinearGroup> {
    groups.sort_by_key(|g| (g.column, g.first));
    let mut out: Vec<LinearGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        match out
            .iter_mut()
            .find(|k| k.continues_into(&group) && bars_between(image, k, &group))
        {
            Some(kept) => {
                trace!(from = kept.last, to = group.first, "split linear group joined");
                kept.absorb(group);
            }
            None => out.push(group),
        }
    }
    out
}

/// Drop candidates repeating the symbology and text of an earlier candidate
/// whose bounds cover most of theirs
fn drop_duplicates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let duplicate = kept.iter().any(|k| {
            k.found.symbology == c.found.symbology
                && k.found.text == c.found.text
                && k.found.bounds.overlap_ratio(&c.found.bounds) > 0.5
        });
        if duplicate {
            trace!(symbology = ?c.found.symbology, "duplicate read dropped");
            continue;
        }
        kept.push(c);
    }
    kept
}

fn databar_candidate(read: DataBarRead, column: bool) -> Option<Candidate> {
    let first = read.spans.iter().map(|s| s.line).min()?;
    let last = read.spans.iter().map(|s| s.line).max()?;
    let start = read.spans.iter().map(|s| s.start).min()?;
    let end = read.spans.iter().map(|s| s.end).max()?;
    let polygon = line_polygon(
        column,
        (first as f32, (last + 1) as f32),
        (start as f32, end as f32),
        read.reversed,
    );
    let bytes = read.text.clone().into_bytes();
    Some(Candidate::new(FoundBarcode::new(
        read.symbology,
        read.text,
        bytes,
        polygon,
        read.confidence,
    )))
}

fn pdf417_candidate(read: Pdf417Read) -> Candidate {
    let payload = read.payload;
    let last_segment = payload.macro_block.as_ref().is_some_and(|m| m.last_segment);
    let sa = payload.macro_block.map(|m| StructuredAppend {
        index: m.segment_index,
        count: m.segment_count,
        id: m.file_id,
    });
    let found = FoundBarcode::new(
        BarcodeType::Pdf417,
        payload.text,
        payload.bytes,
        read.region.polygon(),
        read.confidence,
    )
    .with_structured_append(sa);
    Candidate { found, last_segment }
}

fn qr_candidate(read: QrRead) -> Candidate {
    let sa = read.payload.structured_append;
    Candidate::new(
        FoundBarcode::new(
            read.symbology,
            read.payload.text,
            read.payload.bytes,
            read.polygon,
            read.confidence,
        )
        .with_structured_append(sa),
    )
}

/// Run every selected pass on one image
fn scan_passes(image: &BitImage, options: &ScanOptions, deadline: &Deadline) -> Result<Vec<Candidate>, ScanError> {
    let ctx = ScanContext {
        image,
        options,
        deadline,
    };
    let mut found: Vec<Candidate> = Vec::new();
    for pass in Pass::ORDER {
        if !options.symbologies.intersects(pass.kinds()) {
            continue;
        }
        deadline.check()?;
        let span = debug_span!("pass", ?pass);
        let _guard = span.enter();
        debug!("pass started");
        let mut candidates = ctx.run(pass)?;
        candidates.retain(|c| options.symbologies.contains(c.found.symbology));
        debug!(candidates = candidates.len(), "pass finished");
        found.extend(candidates);
        if options.expected_count.is_some_and(|n| found.len() >= n) {
            debug!(found = found.len(), "expected count reached");
            break;
        }
    }
    Ok(found)
}

/// Merge complete structured-append sets into one result each.
///
/// A set is complete when every index below its count is present; Macro
/// PDF417 sets without a count are complete once the last segment and
/// everything before it are present. Parts of incomplete sets are returned
/// unchanged.
fn merge_structured_append(candidates: Vec<Candidate>) -> Vec<FoundBarcode> {
    let mut out = Vec::new();
    let mut sets: BTreeMap<(BarcodeType, String), Vec<Candidate>> = BTreeMap::new();
    for c in candidates {
        match &c.found.structured_append {
            Some(sa) => sets.entry((c.found.symbology, sa.id.clone())).or_default().push(c),
            None => out.push(c.found),
        }
    }
    for ((symbology, id), mut parts) in sets {
        parts.sort_by_key(|c| c.found.structured_append.as_ref().map_or(0, |sa| sa.index));
        parts.dedup_by_key(|c| c.found.structured_append.as_ref().map_or(0, |sa| sa.index));
        let declared = parts
            .iter()
            .find_map(|c| c.found.structured_append.as_ref().and_then(|sa| sa.count));
        let total = declared.or_else(|| {
            parts
                .iter()
                .filter(|c| c.last_segment)
                .find_map(|c| c.found.structured_append.as_ref().map(|sa| sa.index + 1))
        });
        let complete = total.is_some_and(|n| {
            parts.len() == n
                && parts
                    .iter()
                    .enumerate()
                    .all(|(i, c)| c.found.structured_append.as_ref().is_some_and(|sa| sa.index == i))
        });
        if !complete {
            trace!(?symbology, %id, parts = parts.len(), ?total, "structured append set incomplete");
            out.extend(parts.into_iter().map(|c| c.found));
            continue;
        }
        debug!(?symbology, %id, parts = parts.len(), "structured append set merged");
        let mut text = String::new();
        let mut bytes = Vec::new();
        let mut confidence = 1.0f32;
        for part in &parts {
            text.push_str(&part.found.text);
            bytes.extend_from_slice(&part.found.bytes);
            confidence = confidence.min(part.found.confidence);
        }
        let polygon = parts[0].found.polygon;
        out.push(FoundBarcode::new(symbology, text, bytes, polygon, confidence));
    }
    out
}

/// Scan `image` with `options`; results are ordered by symbology, then by
/// the top and left edges of their bounds
pub(crate) fn run(image: &BitImage, options: &ScanOptions) -> Result<Vec<FoundBarcode>, ScanError> {
    options.validate()?;
    let deadline = Deadline::new(options.timeout);
    deadline.check()?;
    let clipped;
    let image = match options.clip {
        Some(clip) => {
            clipped = image.clone().with_clip(clip)?;
            &clipped
        }
        None => image,
    };

    let mut found = scan_passes(image, options, &deadline)?;
    if found.is_empty() && options.allow_mirror {
        debug!("nothing found, retrying the mirrored image");
        let mirrored = image.mirrored();
        let width = image.width() as f32;
        found = scan_passes(&mirrored, options, &deadline)?
            .into_iter()
            .map(|c| c.unmirror(width))
            .collect();
    }

    let mut results = merge_structured_append(found);
    results.sort_by(|a, b| {
        a.symbology
            .cmp(&b.symbology)
            .then(a.bounds.top.cmp(&b.bounds.top))
            .then(a.bounds.left.cmp(&b.bounds.left))
    });
    debug!(results = results.len(), elapsed = ?deadline.start.elapsed(), "scan finished");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BitMatrix;
    use crate::test_utils::{canvas, code39 as code39_fixture};

    fn found(symbology: BarcodeType, text: &str, sa: Option<(usize, Option<usize>, &str)>) -> FoundBarcode {
        let polygon = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        FoundBarcode::new(symbology, text.into(), text.as_bytes().to_vec(), polygon, 1.0).with_structured_append(
            sa.map(|(index, count, id)| StructuredAppend {
                index,
                count,
                id: id.into(),
            }),
        )
    }

    fn code39_image(text: &str, scale: usize) -> BitImage {
        let elements = code39_fixture::elements(text).expect("encodable");
        let modules = canvas::bars(&[(true, elements)], 12);
        canvas::to_image(&canvas::render(&modules, scale, 10))
    }

    #[test]
    fn test_line_polygon_orientation() {
        let row = line_polygon(false, (4.0, 9.0), (10.0, 50.0), false);
        assert_eq!(row[0], Point::new(10.0, 4.0));
        assert_eq!(row[2], Point::new(50.0, 9.0));
        let reversed = line_polygon(false, (4.0, 9.0), (10.0, 50.0), true);
        assert_eq!(reversed[0], Point::new(50.0, 9.0));
        // reading down a column, the top of the symbol faces +x
        let column = line_polygon(true, (4.0, 9.0), (10.0, 50.0), false);
        assert_eq!(column[0], Point::new(9.0, 10.0));
        assert_eq!(column[1], Point::new(9.0, 50.0));
    }

    #[test]
    fn test_inside_polygon() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(inside(&square, Point::new(5.0, 5.0)));
        assert!(!inside(&square, Point::new(15.0, 5.0)));
        let mut ccw = square;
        ccw.reverse();
        assert!(inside(&ccw, Point::new(2.0, 8.0)));
    }

    #[test]
    fn test_merge_complete_set_in_index_order() {
        let parts = vec![
            Candidate::new(found(BarcodeType::QrCode, "world", Some((1, Some(2), "90")))),
            Candidate::new(found(BarcodeType::QrCode, "hello ", Some((0, Some(2), "90")))),
            Candidate::new(found(BarcodeType::Code39, "LONE", None)),
        ];
        let merged = merge_structured_append(parts);
        assert_eq!(merged.len(), 2);
        let qr = merged.iter().find(|f| f.symbology == BarcodeType::QrCode).expect("merged");
        assert_eq!(qr.text, "hello world");
        assert_eq!(qr.bytes, b"hello world");
        assert!(qr.structured_append.is_none());
    }

    #[test]
    fn test_merge_keeps_incomplete_set_as_parts() {
        let parts = vec![
            Candidate::new(found(BarcodeType::QrCode, "a", Some((0, Some(3), "7")))),
            Candidate::new(found(BarcodeType::QrCode, "c", Some((2, Some(3), "7")))),
        ];
        let merged = merge_structured_append(parts);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|f| f.structured_append.is_some()));
    }

    #[test]
    fn test_merge_macro_set_closed_by_last_segment() {
        let mut last = Candidate::new(found(BarcodeType::Pdf417, "two", Some((1, None, "017"))));
        last.last_segment = true;
        let parts = vec![
            Candidate::new(found(BarcodeType::Pdf417, "one ", Some((0, None, "017")))),
            last,
        ];
        let merged = merge_structured_append(parts);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "one two");

        let open = vec![Candidate::new(found(BarcodeType::Pdf417, "one ", Some((0, None, "017"))))];
        assert_eq!(merge_structured_append(open).len(), 1);
    }

    #[test]
    fn test_group_linear_merges_neighbouring_lines() {
        let read = LinearRead {
            symbology: BarcodeType::Code39,
            text: "AB".into(),
            start: 20,
            end: 120,
            reversed: false,
            module_len: 2.0,
            confidence: 1.0,
        };
        let hits = vec![
            (ScanLine::row(10, 200), read.clone()),
            (ScanLine::row(12, 200), LinearRead { start: 21, ..read.clone() }),
            (ScanLine::row(14, 200), read.clone()),
            // same text far below is a second symbol
            (ScanLine::row(90, 200), read),
        ];
        let candidates: Vec<Candidate> = group_linear(hits.clone(), 6)
            .into_iter()
            .map(LinearGroup::into_candidate)
            .collect();
        assert_eq!(candidates.len(), 2);
        let first = &candidates[0].found;
        assert_eq!(first.polygon[0], Point::new(20.0, 10.0));
        assert_eq!(first.polygon[2], Point::new(120.0, 15.0));

        // a quiet gap between the groups keeps them apart
        let blank = BitImage::from_bits(BitMatrix::new(200, 100));
        assert_eq!(join_split_groups(group_linear(hits.clone(), 6), &blank).len(), 2);
        // bars on every line in between make them one symbol
        let mut bars = BitMatrix::new(200, 100);
        for x in (20..120).step_by(4) {
            bars.set_region(x, 0, 2, 100);
        }
        let joined = join_split_groups(group_linear(hits, 6), &BitImage::from_bits(bars));
        assert_eq!(joined.len(), 1);
        assert_eq!((joined[0].first, joined[0].last, joined[0].lines), (10, 90, 4));
    }

    #[test]
    fn test_duplicates_need_same_text_and_overlap() {
        let at = |text: &str, x: f32| {
            let polygon = [
                Point::new(x, 0.0),
                Point::new(x + 40.0, 0.0),
                Point::new(x + 40.0, 20.0),
                Point::new(x, 20.0),
            ];
            Candidate::new(FoundBarcode::new(BarcodeType::Code39, text.into(), text.as_bytes().to_vec(), polygon, 1.0))
        };
        let kept = drop_duplicates(vec![at("A", 0.0), at("A", 5.0), at("B", 5.0), at("A", 100.0)]);
        let summary: Vec<(&str, i32)> = kept.iter().map(|c| (c.found.text.as_str(), c.found.bounds.left)).collect();
        assert_eq!(summary, vec![("A", 0), ("B", 5), ("A", 100)]);
    }

    #[test]
    fn test_symbol_split_by_damaged_lines_is_reported_once() {
        let mut pixels = canvas::render(
            &canvas::bars(&[(true, code39_fixture::elements("PIPE-1").expect("encodable"))], 12),
            2,
            10,
        );
        // rub out the first bar of the start character on nine rows
        for y in 28..37 {
            pixels.set(20, y, false);
            pixels.set(21, y, false);
        }
        let results = run(&canvas::to_image(&pixels), &ScanOptions::only(BarcodeType::Code39)).expect("scan");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "PIPE-1");
        assert!(results[0].bounds.top < 28 && results[0].bounds.bottom > 37, "{:?}", results[0].bounds);
    }

    #[test]
    fn test_zero_timeout_fails() {
        let image = code39_image("A", 2);
        let options = ScanOptions::builder().timeout(Duration::ZERO).build();
        let err = run(&image, &options).expect_err("deadline");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_run_finds_code39() {
        let image = code39_image("PIPE-1", 2);
        let options = ScanOptions::only(BarcodeType::Code39);
        let results = run(&image, &options).expect("scan");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "PIPE-1");
        assert!(results[0].bounds.width() > 100);
    }

    #[test]
    fn test_run_finds_rotated_code39_on_columns() {
        let elements = code39_fixture::elements("COL").expect("encodable");
        let modules = canvas::rotate(&canvas::bars(&[(true, elements)], 12), 1);
        let image = canvas::to_image(&canvas::render(&modules, 2, 10));
        let results = run(&image, &ScanOptions::only(BarcodeType::Code39)).expect("scan");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "COL");
    }

    #[test]
    fn test_clip_outside_image_is_rejected() {
        let image = code39_image("A", 1);
        let options = ScanOptions::builder().clip(Rect::new(5000, 5000, 10, 10)).build();
        assert!(matches!(run(&image, &options), Err(ScanError::InvalidImage { .. })));
    }

    #[test]
    fn test_unselected_symbology_is_not_reported() {
        let image = code39_image("SKIP", 2);
        let options = ScanOptions::only(BarcodeType::Pdf417);
        assert!(run(&image, &options).expect("scan").is_empty());
    }
}
