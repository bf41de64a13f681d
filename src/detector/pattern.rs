//! Run-length template matching shared by every symbology.
//!
//! A [`PatternFinder`] is loaded with one scan line at a time and yields
//! successive [`FoundPattern`]s. All buffers are kept between lines, so a
//! worker allocates once and reuses the finder for the whole image.

/// Fold single-pixel noise runs into `out`.
///
/// A one-pixel run flanked by runs of at least three pixels is merged,
/// together with both neighbours, into one run of the neighbours' colour.
/// The colour of the first run is preserved.
pub fn merge_noise_runs(runs: &[u32], out: &mut Vec<u32>) {
    out.clear();
    if runs.len() < 3 {
        out.extend_from_slice(runs);
        return;
    }
    let mut i = 0usize;
    while i < runs.len() {
        let is_noise = i > 0
            && i + 1 < runs.len()
            && runs[i] == 1
            && runs[i + 1] >= 3
            && out.last().is_some_and(|&prev| prev >= 3);
        if is_noise {
            if let Some(prev) = out.last_mut() {
                *prev += runs[i] + runs[i + 1];
            }
            i += 2;
        } else {
            out.push(runs[i]);
            i += 1;
        }
    }
}

/// Relative bar widths of a start, stop or finder pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTemplate {
    widths: Vec<f32>,
    first_dark: Option<bool>,
    modules: f32,
}

impl PatternTemplate {
    /// Template from relative widths; `first_dark` pins the colour of the first element
    pub fn new(widths: &[f32], first_dark: Option<bool>) -> Self {
        Self {
            widths: widths.to_vec(),
            first_dark,
            modules: widths.iter().sum(),
        }
    }

    /// Template from integer module counts
    pub fn from_modules(widths: &[u8], first_dark: Option<bool>) -> Self {
        let widths: Vec<f32> = widths.iter().map(|&w| w as f32).collect();
        Self::new(&widths, first_dark)
    }

    /// The same pattern read right to left
    pub fn reversed(&self) -> Self {
        let mut widths = self.widths.clone();
        widths.reverse();
        let odd = self.widths.len() % 2 == 1;
        Self {
            widths,
            first_dark: self.first_dark.map(|d| if odd { d } else { !d }),
            modules: self.modules,
        }
    }

    /// Number of bars and spaces
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// True for a template without elements
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Total width in modules
    pub fn modules(&self) -> f32 {
        self.modules
    }

    /// Relative widths
    pub fn widths(&self) -> &[f32] {
        &self.widths
    }

    /// Mean absolute deviation of `counts` from the template, as a fraction of
    /// the total width. `f32::INFINITY` when any element deviates by more than
    /// `max_element` modules or the run is narrower than one pixel per module.
    pub fn variance(&self, counts: &[u32], max_element: f32) -> f32 {
        if counts.len() != self.widths.len() {
            return f32::INFINITY;
        }
        let total: u32 = counts.iter().sum();
        let total = total as f32;
        if total < self.modules {
            return f32::INFINITY;
        }
        let unit = total / self.modules;
        let max_individual = max_element * unit;
        let mut sum = 0.0f32;
        for (&count, &width) in counts.iter().zip(&self.widths) {
            let deviation = (count as f32 - width * unit).abs();
            if deviation > max_individual {
                return f32::INFINITY;
            }
            sum += deviation;
        }
        sum / total
    }
}

/// Bar widths captured along a line, alternating dark and light
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunPattern {
    /// Pixel widths
    pub widths: Vec<u32>,
    /// Colour of the first element
    pub first_dark: bool,
}

impl RunPattern {
    /// Sum of widths
    pub fn total(&self) -> u32 {
        self.widths.iter().sum()
    }
}

/// A template match on one scan line
#[derive(Debug, Clone, PartialEq)]
pub struct FoundPattern {
    /// Index of the matched template in the finder's template list
    pub template: usize,
    /// True when the match was against the reversed template
    pub reversed: bool,
    /// Index of the first matched run
    pub run_index: usize,
    /// First pixel of the match
    pub start: usize,
    /// One past the last pixel of the match
    pub end: usize,
    /// Average pixel width of one module
    pub module_len: f32,
    /// Normalized deviation from the template
    pub error: f32,
    /// The matched runs
    pub runs: RunPattern,
}

impl FoundPattern {
    /// Pixel centre of the match along the line
    pub fn center(&self) -> f32 {
        (self.start + self.end) as f32 * 0.5
    }
}

struct Slot {
    template: usize,
    reversed: bool,
    pattern: PatternTemplate,
}

/// Restartable template matcher over run lengths
pub struct PatternFinder {
    slots: Vec<Slot>,
    max_variance: f32,
    max_element_variance: f32,
    merge_noise: bool,
    runs: Vec<u32>,
    offsets: Vec<usize>,
    scratch: Vec<u32>,
    first_dark: bool,
    cursor_run: usize,
    cursor_slot: usize,
}

impl PatternFinder {
    /// Matcher for `templates`, in order of preference
    pub fn new(templates: Vec<PatternTemplate>) -> Self {
        let slots = templates
            .into_iter()
            .enumerate()
            .map(|(template, pattern)| Slot {
                template,
                reversed: false,
                pattern,
            })
            .collect();
        Self {
            slots,
            max_variance: 0.25,
            max_element_variance: 0.7,
            merge_noise: true,
            runs: Vec::new(),
            offsets: Vec::new(),
            scratch: Vec::new(),
            first_dark: false,
            cursor_run: 0,
            cursor_slot: 0,
        }
    }

    /// Also match every template read right to left
    pub fn with_reversed(mut self) -> Self {
        let mirrored: Vec<Slot> = self
            .slots
            .iter()
            .filter(|s| !s.reversed)
            .map(|s| Slot {
                template: s.template,
                reversed: true,
                pattern: s.pattern.reversed(),
            })
            .collect();
        self.slots.extend(mirrored);
        self
    }

    /// Acceptance thresholds: total normalized variance and per-element deviation in modules
    pub fn with_tolerance(mut self, max_variance: f32, max_element_variance: f32) -> Self {
        self.max_variance = max_variance;
        self.max_element_variance = max_element_variance;
        self
    }

    /// Toggle merging of single-pixel noise runs into their neighbours
    pub fn with_noise_merge(mut self, merge: bool) -> Self {
        self.merge_noise = merge;
        self
    }

    /// Load a new line and rewind the match cursor
    pub fn load(&mut self, line: &[bool]) {
        self.runs.clear();
        self.offsets.clear();
        self.cursor_run = 0;
        self.cursor_slot = 0;
        let Some(&first) = line.first() else {
            return;
        };
        self.first_dark = first;
        let mut color = first;
        let mut start = 0usize;
        for (x, &bit) in line.iter().enumerate() {
            if bit != color {
                self.runs.push((x - start) as u32);
                start = x;
                color = bit;
            }
        }
        self.runs.push((line.len() - start) as u32);
        if self.merge_noise {
            self.merge_noise_runs();
        }
        self.rebuild_offsets();
    }

    /// Load pre-computed runs (first run colour given)
    pub fn load_runs(&mut self, runs: &[u32], first_dark: bool) {
        self.runs.clear();
        self.runs.extend_from_slice(runs);
        self.first_dark = first_dark;
        self.cursor_run = 0;
        self.cursor_slot = 0;
        if self.merge_noise {
            self.merge_noise_runs();
        }
        self.rebuild_offsets();
    }

    fn merge_noise_runs(&mut self) {
        merge_noise_runs(&self.runs, &mut self.scratch);
        std::mem::swap(&mut self.runs, &mut self.scratch);
    }

    fn rebuild_offsets(&mut self) {
        self.offsets.clear();
        let mut pos = 0usize;
        for &r in &self.runs {
            self.offsets.push(pos);
            pos += r as usize;
        }
    }

    /// Runs of the loaded line
    pub fn runs(&self) -> &[u32] {
        &self.runs
    }

    /// Colour of run `index`
    pub fn is_dark_run(&self, index: usize) -> bool {
        self.first_dark ^ (index % 2 == 1)
    }

    /// Next match after the previous one, scanning runs left to right
    pub fn next_match(&mut self) -> Option<FoundPattern> {
        while self.cursor_run < self.runs.len() {
            while self.cursor_slot < self.slots.len() {
                let slot = self.cursor_slot;
                self.cursor_slot += 1;
                if let Some(found) = self.match_slot(self.cursor_run, slot) {
                    return Some(found);
                }
            }
            self.cursor_run += 1;
            self.cursor_slot = 0;
        }
        None
    }

    /// Every match on the loaded line
    pub fn matches(&mut self) -> Vec<FoundPattern> {
        let mut out = Vec::new();
        while let Some(found) = self.next_match() {
            out.push(found);
        }
        out
    }

    fn match_slot(&self, run_index: usize, slot: usize) -> Option<FoundPattern> {
        let s = &self.slots[slot];
        let len = s.pattern.len();
        if len == 0 || run_index + len > self.runs.len() {
            return None;
        }
        if s.pattern.first_dark.is_some_and(|dark| self.is_dark_run(run_index) != dark) {
            return None;
        }
        let counts = &self.runs[run_index..run_index + len];
        let error = s.pattern.variance(counts, self.max_element_variance);
        if error > self.max_variance {
            return None;
        }
        let start = self.offsets[run_index];
        let last = run_index + len - 1;
        let end = self.offsets[last] + self.runs[last] as usize;
        Some(FoundPattern {
            template: s.template,
            reversed: s.reversed,
            run_index,
            start,
            end,
            module_len: (end - start) as f32 / s.pattern.modules(),
            error,
            runs: RunPattern {
                widths: counts.to_vec(),
                first_dark: self.is_dark_run(run_index),
            },
        })
    }
}
